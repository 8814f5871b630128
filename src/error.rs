//! Compile-time error types
//!
//! Runtime errors do not exist in this language: every operation with a
//! conventional failure mode is defined to produce zero instead, so presets
//! cannot take the host down.

use thiserror::Error;

/// Reason a compilation failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileErrorKind {
    /// The parser met a token it cannot use at this point.
    #[error("syntax error, unexpected '{0}'")]
    UnexpectedToken(String),
    /// The input ended in the middle of an expression.
    #[error("syntax error, unexpected end of input")]
    UnexpectedEnd,
    /// The lexer could not form a token at all.
    #[error("syntax error, invalid token")]
    InvalidToken,
    /// A call names no known intrinsic or host-registered function.
    #[error("Invalid function")]
    InvalidFunction,
    /// A call passes the wrong number of arguments.
    #[error("Invalid argument count")]
    InvalidArgumentCount,
}

/// A failed compilation, with the source position it was detected at.
///
/// Lines are 1-based, columns 1-based from the start of the line. The same
/// record is kept in the context's error slot until the next compile
/// overwrites it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at line {line}, column {column_start}")]
pub struct CompileError {
    pub kind: CompileErrorKind,
    pub line: usize,
    pub column_start: usize,
    pub column_end: usize,
}

impl CompileError {
    /// The bare message without position information.
    pub fn message(&self) -> String {
        self.kind.to_string()
    }
}

/// A tree-builder error tagged with the byte offset it was raised at,
/// carried through the parser's user-error channel.
#[derive(Debug, Clone)]
pub(crate) struct LocatedError {
    pub kind: CompileErrorKind,
    pub offset: usize,
}
