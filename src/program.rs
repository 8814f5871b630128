//! Compiled program handle

use crate::context::Context;
use crate::tree::ExprNode;
use crate::value::F;

/// One compiled expression tree bound to its compile context.
///
/// The borrow ties every program to its context's lifetime, so programs are
/// necessarily dropped first. Execution is synchronous and deterministic;
/// the only runaway protection is the iteration cap inside `loop`/`while`.
pub struct Program<'ctx> {
    root: ExprNode,
    context: &'ctx Context,
}

impl std::fmt::Debug for Program<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Program").finish()
    }
}

impl<'ctx> Program<'ctx> {
    pub(crate) fn new(root: ExprNode, context: &'ctx Context) -> Self {
        Self { root, context }
    }

    /// Runs the program and returns the value of its last statement.
    pub fn execute(&self) -> F {
        self.root.eval().get()
    }

    /// The context this program compiles against.
    pub fn context(&self) -> &'ctx Context {
        self.context
    }

    pub(crate) fn root(&self) -> &ExprNode {
        &self.root
    }
}
