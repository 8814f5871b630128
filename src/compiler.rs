//! Tree builder called by the parser
//!
//! Wires parsed productions into expression nodes, interns variables,
//! folds constant subexpressions and drops pure statements whose value is
//! discarded. Nodes carry their folding flags only while the tree is under
//! construction; the run-time tree has none of this.

use lalrpop_util::lexer::Token;
use lalrpop_util::ParseError;

use crate::context::Context;
use crate::error::{CompileErrorKind, LocatedError};
use crate::functions::MemoryScope;
use crate::tree::ExprNode;
use crate::value::F;

/// A node under construction, with the attributes that drive constant
/// folding and dead-store elimination.
pub(crate) struct CompilerNode {
    pub node: ExprNode,
    /// Depends only on literals and pure functions of literals.
    pub is_const: bool,
    /// Contains an assignment, memory write or impure function anywhere.
    pub is_state_changing: bool,
    /// Whether `node` is a statement list rather than a single expression.
    pub is_list: bool,
    /// The state-changing flag of the list's last statement; equals
    /// `is_state_changing` for single expressions.
    pub last_state_changing: bool,
}

impl std::fmt::Debug for CompilerNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompilerNode")
            .field("is_const", &self.is_const)
            .field("is_state_changing", &self.is_state_changing)
            .field("is_list", &self.is_list)
            .field("last_state_changing", &self.last_state_changing)
            .finish()
    }
}

pub(crate) type GrammarError<'input> = ParseError<usize, Token<'input>, LocatedError>;

pub(crate) fn constant(value: F) -> CompilerNode {
    CompilerNode {
        node: ExprNode::constant(value),
        is_const: true,
        is_state_changing: false,
        is_list: false,
        last_state_changing: false,
    }
}

pub(crate) fn variable(ctx: &Context, name: &str) -> Result<CompilerNode, CompileErrorKind> {
    // Function names are not values; the parser reports them where an
    // operand was expected.
    if ctx.find_function(name).is_some() {
        return Err(CompileErrorKind::UnexpectedToken(name.to_ascii_lowercase()));
    }

    Ok(CompilerNode {
        node: ExprNode::variable(ctx.intern_variable(name)),
        is_const: false,
        is_state_changing: false,
        is_list: false,
        last_state_changing: false,
    })
}

pub(crate) fn call(
    ctx: &Context,
    name: &str,
    args: Vec<CompilerNode>,
) -> Result<CompilerNode, CompileErrorKind> {
    let def = ctx.find_function(name).ok_or(CompileErrorKind::InvalidFunction)?;

    if args.len() != def.arity {
        return Err(CompileErrorKind::InvalidArgumentCount);
    }

    let foldable = def.const_eval
        && args.iter().all(|arg| arg.is_const)
        && !args.iter().any(|arg| arg.is_state_changing);
    let is_state_changing = def.state_changing || args.iter().any(|arg| arg.is_state_changing);

    let buffer = def.memory.map(|scope| match scope {
        MemoryScope::Local => ctx.memory().clone(),
        MemoryScope::Global => ctx.global_memory().clone(),
    });

    let node = ExprNode {
        func: def.eval,
        value: 0.0,
        var: None,
        buffer,
        math: def.math,
        args: args.into_iter().map(|arg| arg.node).collect(),
        list: Vec::new(),
    };

    if foldable {
        return Ok(constant(node.eval().get()));
    }

    Ok(CompilerNode {
        node,
        is_const: false,
        is_state_changing,
        is_list: false,
        last_state_changing: is_state_changing,
    })
}

/// Appends `next` to the statement sequence ending in `prev`.
///
/// A pure statement whose value is discarded has no effect, so it is
/// dropped: a single pure `prev` disappears entirely, and a pure last
/// statement of an existing list is replaced by `next`.
pub(crate) fn append_statement(prev: CompilerNode, next: CompilerNode) -> CompilerNode {
    if !prev.is_list && !prev.is_state_changing {
        return next;
    }

    let (mut node, is_const, is_state_changing) = if prev.is_list {
        let mut node = prev.node;
        if !prev.last_state_changing {
            node.list.pop();
        }
        (node, prev.is_const, prev.is_state_changing)
    } else {
        (
            ExprNode::statement_list(vec![prev.node]),
            prev.is_const,
            prev.is_state_changing,
        )
    };

    node.list.push(next.node);

    CompilerNode {
        node,
        is_const: is_const && next.is_const,
        is_state_changing: is_state_changing || next.is_state_changing,
        is_list: true,
        last_state_changing: next.is_state_changing,
    }
}

/* Fallible wrappers for grammar actions, tagging errors with the source
 * offset they were raised at. */

pub(crate) fn call_at<'input>(
    ctx: &Context,
    name: &str,
    args: Vec<CompilerNode>,
    offset: usize,
) -> Result<CompilerNode, GrammarError<'input>> {
    call(ctx, name, args).map_err(|kind| ParseError::User {
        error: LocatedError { kind, offset },
    })
}

pub(crate) fn variable_at<'input>(
    ctx: &Context,
    name: &str,
    offset: usize,
) -> Result<CompilerNode, GrammarError<'input>> {
    variable(ctx, name).map_err(|kind| ParseError::User {
        error: LocatedError { kind, offset },
    })
}
