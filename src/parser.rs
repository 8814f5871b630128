//! Parse entry point and source-location plumbing

use lalrpop_util::lexer::Token;
use lalrpop_util::ParseError;

use crate::context::Context;
use crate::error::{CompileError, CompileErrorKind};
use crate::grammar::ProgramParser;
use crate::tree::ExprNode;

/// Parses `source` against `ctx`'s function and variable lists, returning
/// the finished tree root.
pub(crate) fn parse(ctx: &Context, source: &str) -> Result<ExprNode, CompileError> {
    ProgramParser::new()
        .parse(ctx, source)
        .map(|root| root.node)
        .map_err(|error| convert_error(source, error))
}

fn convert_error(source: &str, error: ParseError<usize, Token<'_>, crate::error::LocatedError>) -> CompileError {
    match error {
        ParseError::InvalidToken { location } => {
            locate(source, location, location + 1, CompileErrorKind::InvalidToken)
        }
        ParseError::UnrecognizedEof { location, .. } => {
            locate(source, location, location, CompileErrorKind::UnexpectedEnd)
        }
        ParseError::UnrecognizedToken { token: (start, token, end), .. } => locate(
            source,
            start,
            end,
            CompileErrorKind::UnexpectedToken(token.1.to_string()),
        ),
        ParseError::ExtraToken { token: (start, token, end) } => locate(
            source,
            start,
            end,
            CompileErrorKind::UnexpectedToken(token.1.to_string()),
        ),
        ParseError::User { error } => locate(source, error.offset, error.offset, error.kind),
    }
}

fn locate(source: &str, start: usize, end: usize, kind: CompileErrorKind) -> CompileError {
    let (line, column_start) = line_column(source, start);
    let (_, column_end) = line_column(source, end);

    CompileError {
        kind,
        line,
        column_start,
        column_end,
    }
}

/// 1-based line and column of a byte offset.
fn line_column(source: &str, offset: usize) -> (usize, usize) {
    let prefix = &source[..offset.min(source.len())];
    let line = prefix.bytes().filter(|&b| b == b'\n').count() + 1;
    let line_start = prefix.rfind('\n').map(|pos| pos + 1).unwrap_or(0);

    (line, prefix.len() - line_start + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_column_counts_from_one() {
        let source = "a = 1;\nb = 2;";

        assert_eq!(line_column(source, 0), (1, 1));
        assert_eq!(line_column(source, 4), (1, 5));
        assert_eq!(line_column(source, 7), (2, 1));
        assert_eq!(line_column(source, 11), (2, 5));
    }

    #[test]
    fn offsets_past_the_end_clamp() {
        assert_eq!(line_column("ab", 100), (1, 3));
    }
}
