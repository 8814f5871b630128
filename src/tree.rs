//! Expression tree nodes and the by-reference evaluation protocol

use std::sync::Arc;

use crate::functions::{self, MathFn};
use crate::memory::{BankSlot, MemoryBuffer};
use crate::value::{ValueCell, F};

/// Evaluator attached to a node. Dispatch is a plain function pointer so the
/// intrinsic table stays data and hosts can add entries of their own.
pub type EvalFn = for<'a> fn(&'a ExprNode) -> Reference<'a>;

/// What evaluating a node produced.
///
/// By-value evaluators (arithmetic, comparisons, math wrappers) return
/// [`Reference::Value`]. By-reference evaluators (variables, memory access,
/// assignment, `if`, statement lists, loops, `exec2`/`exec3`) return the
/// addressable cell they resolved to, which is what lets expressions like
/// `if(c, x, y) = v` or `megabuf(i) = v` assign through the result.
///
/// Writing through a `Value` updates scratch the caller is about to discard;
/// that is exactly what assigning to a non-addressable expression does in
/// ns-eel2, so no case needs to fail.
pub enum Reference<'a> {
    Value(F),
    Cell(&'a ValueCell),
    Mem(BankSlot),
}

impl Reference<'_> {
    pub fn get(&self) -> F {
        match self {
            Reference::Value(value) => *value,
            Reference::Cell(cell) => cell.get(),
            Reference::Mem(slot) => slot.get(),
        }
    }

    pub fn set(&mut self, value: F) {
        match self {
            Reference::Value(scratch) => *scratch = value,
            Reference::Cell(cell) => cell.set(value),
            Reference::Mem(slot) => slot.set(value),
        }
    }
}

/// A single constant, variable, function call or statement list in a
/// compiled expression tree.
///
/// Nodes own their children outright; the tree is strictly a tree, and
/// dropping the root releases every descendant. Variable cells and memory
/// banks are shared with the owning context through `Arc` and outlive the
/// node.
pub struct ExprNode {
    pub(crate) func: EvalFn,
    pub(crate) value: F,
    pub(crate) var: Option<Arc<ValueCell>>,
    pub(crate) buffer: Option<Arc<MemoryBuffer>>,
    pub(crate) math: Option<MathFn>,
    pub(crate) args: Vec<ExprNode>,
    pub(crate) list: Vec<ExprNode>,
}

impl ExprNode {
    /// Runs this node's evaluator.
    pub fn eval(&self) -> Reference<'_> {
        (self.func)(self)
    }

    /// The node's child expressions, in argument order.
    pub fn args(&self) -> &[ExprNode] {
        &self.args
    }

    pub(crate) fn arg(&self, index: usize) -> &ExprNode {
        &self.args[index]
    }

    pub(crate) fn constant(value: F) -> Self {
        Self {
            func: functions::eval_const,
            value,
            var: None,
            buffer: None,
            math: None,
            args: Vec::new(),
            list: Vec::new(),
        }
    }

    pub(crate) fn variable(cell: Arc<ValueCell>) -> Self {
        Self {
            func: functions::eval_var,
            value: 0.0,
            var: Some(cell),
            buffer: None,
            math: None,
            args: Vec::new(),
            list: Vec::new(),
        }
    }

    pub(crate) fn statement_list(items: Vec<ExprNode>) -> Self {
        Self {
            func: functions::eval_list,
            value: 0.0,
            var: None,
            buffer: None,
            math: None,
            args: Vec::new(),
            list: items,
        }
    }

    /// The folded constant this node carries, if it is a plain constant.
    pub(crate) fn as_constant(&self) -> Option<F> {
        let plain = self.args.is_empty()
            && self.list.is_empty()
            && self.var.is_none()
            && self.buffer.is_none()
            && self.math.is_none();

        plain.then_some(self.value)
    }
}
