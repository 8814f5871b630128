//! Embeddable evaluator for the ns-eel2 expression dialect used by
//! Milkdrop-style visualization presets.
//!
//! A host compiles a source string once into a [`program::Program`], then
//! executes it many times per second, reading and writing named variables
//! and the `megabuf`/`gmegabuf` memory banks between runs.

use lalrpop_util::lalrpop_mod;

lalrpop_mod!(
    #[allow(clippy::all)]
    grammar
);

mod compiler;
mod parser;

pub mod consts;
pub mod context;
pub mod error;
pub mod functions;
pub mod memory;
pub mod program;
pub mod tree;
pub mod value;

pub mod prelude {
    pub use crate::context::Context;
    pub use crate::error::{CompileError, CompileErrorKind};
    pub use crate::functions::{FunctionDef, MathFn, MemoryScope};
    pub use crate::memory::{global_memory, global_memory_destroy, BankSlot, MemBlock, MemoryBuffer};
    pub use crate::program::Program;
    pub use crate::tree::{EvalFn, ExprNode, Reference};
    pub use crate::value::{RegisterBank, ValueCell, F};
}
