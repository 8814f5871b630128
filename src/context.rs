//! Compile context: functions, variables, banks and the error slot

use std::cell::RefCell;
use std::sync::Arc;

use lazy_static::lazy_static;
use tracing::debug;

use crate::error::CompileError;
use crate::functions::{self, FunctionDef};
use crate::memory::{self, MemoryBuffer};
use crate::parser;
use crate::program::Program;
use crate::value::{RegisterBank, ValueCell};

struct Variable {
    name: String,
    cell: Arc<ValueCell>,
}

lazy_static! {
    static ref GLOBAL_REGISTERS: Arc<RegisterBank> = Arc::new(RegisterBank::default());
}

/// The compile-and-execute environment.
///
/// Owns the function list (seeded from the intrinsic table), the variables
/// interned during compilation, a local memory bank, and the record of the
/// last compile error. Shares a global bank and a register bank with other
/// contexts. A context may move between threads, but it and its programs
/// are used from one thread at a time; contexts on different threads only
/// meet at the shared banks.
pub struct Context {
    functions: RefCell<Vec<FunctionDef>>,
    variables: RefCell<Vec<Variable>>,
    registers: Arc<RegisterBank>,
    memory: Arc<MemoryBuffer>,
    global_memory: Arc<MemoryBuffer>,
    error: RefCell<Option<CompileError>>,
}

impl Context {
    /// A context on the process-wide global bank and register bank.
    pub fn new() -> Self {
        Self::with_shared(None, None)
    }

    /// A context sharing the given global bank and registers; `None` picks
    /// the process-wide defaults.
    pub fn with_shared(
        global_memory: Option<Arc<MemoryBuffer>>,
        registers: Option<Arc<RegisterBank>>,
    ) -> Self {
        Self {
            functions: RefCell::new(functions::intrinsic_functions().to_vec()),
            variables: RefCell::new(Vec::new()),
            registers: registers.unwrap_or_else(|| Arc::clone(&GLOBAL_REGISTERS)),
            memory: Arc::new(MemoryBuffer::new()),
            global_memory: global_memory.unwrap_or_else(memory::global_memory),
            error: RefCell::new(None),
        }
    }

    /// Compiles `source` into a program bound to this context.
    ///
    /// On failure the error is returned and kept in the error slot until the
    /// next compile; the context is otherwise untouched.
    pub fn compile(&self, source: &str) -> Result<Program<'_>, CompileError> {
        self.error.borrow_mut().take();

        match parser::parse(self, source) {
            Ok(root) => Ok(Program::new(root, self)),
            Err(error) => {
                debug!("compile failed: {}", error);
                *self.error.borrow_mut() = Some(error.clone());
                Err(error)
            }
        }
    }

    /// The error of the most recent [`Context::compile`], if it failed.
    pub fn last_error(&self) -> Option<CompileError> {
        self.error.borrow().clone()
    }

    /// The stable cell behind `name`, created on first use. The handle
    /// remains valid for the life of the context; the host reads and writes
    /// it between executions.
    pub fn register_variable(&self, name: &str) -> Arc<ValueCell> {
        self.intern_variable(name)
    }

    pub(crate) fn intern_variable(&self, name: &str) -> Arc<ValueCell> {
        let name = name.to_ascii_lowercase();

        // reg00..reg99 live in the shared register bank, not the variable
        // list, so resets do not clear them.
        if let Some(cell) = self.register_cell(&name) {
            return cell;
        }

        let mut variables = self.variables.borrow_mut();

        if let Some(var) = variables.iter().find(|var| var.name == name) {
            return Arc::clone(&var.cell);
        }

        let cell = Arc::new(ValueCell::default());
        variables.push(Variable {
            name,
            cell: Arc::clone(&cell),
        });

        cell
    }

    fn register_cell(&self, name: &str) -> Option<Arc<ValueCell>> {
        let digits = name.strip_prefix("reg")?;

        if digits.len() != 2 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }

        let index: usize = digits.parse().ok()?;

        self.registers.cell(index).cloned()
    }

    /// Writes zero into every variable of this context, including
    /// host-registered ones. Used between preset loads.
    pub fn reset_variables(&self) {
        for var in self.variables.borrow().iter() {
            var.cell.set(0.0);
        }
    }

    /// Empties the local bank; `megabuf` reads zero on next touch.
    pub fn free_memory(&self) {
        self.memory.free_all();
    }

    /// Makes an additional function available to subsequent compiles.
    pub fn register_function(&self, function: FunctionDef) {
        self.functions.borrow_mut().push(function);
    }

    pub(crate) fn find_function(&self, name: &str) -> Option<FunctionDef> {
        self.functions
            .borrow()
            .iter()
            .find(|def| def.name.eq_ignore_ascii_case(name))
            .cloned()
    }

    /// The context-local bank backing `megabuf`.
    pub fn memory(&self) -> &Arc<MemoryBuffer> {
        &self.memory
    }

    /// The shared bank backing `gmegabuf`.
    pub fn global_memory(&self) -> &Arc<MemoryBuffer> {
        &self.global_memory
    }

    /// The shared `reg00`..`reg99` bank.
    pub fn registers(&self) -> &Arc<RegisterBank> {
        &self.registers
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variable_addresses_are_stable() {
        let ctx = Context::new();

        let first = ctx.register_variable("Foo");
        let second = ctx.register_variable("foo");

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn reset_zeroes_registered_variables() {
        let ctx = Context::new();

        let var = ctx.register_variable("x");
        var.set(42.0);
        ctx.reset_variables();

        assert_eq!(var.get(), 0.0);
    }

    #[test]
    fn reg_names_bind_to_the_register_bank() {
        let registers = Arc::new(RegisterBank::default());
        let ctx = Context::with_shared(None, Some(Arc::clone(&registers)));

        let cell = ctx.register_variable("reg07");
        assert!(Arc::ptr_eq(
            &cell,
            registers.cell(7).expect("register in range")
        ));

        // Registers survive a variable reset.
        cell.set(3.0);
        ctx.reset_variables();
        assert_eq!(cell.get(), 3.0);
    }

    #[test]
    fn constant_folding_reduces_to_a_single_node() {
        let ctx = Context::new();

        let program = ctx.compile("5 + 3").expect("valid program");
        assert_eq!(program.root().as_constant(), Some(8.0));
        assert_eq!(program.execute(), 8.0);
    }

    #[test]
    fn folding_stops_at_variables() {
        let ctx = Context::new();

        let program = ctx.compile("x + 3").expect("valid program");
        assert_eq!(program.root().as_constant(), None);
    }

    #[test]
    fn discarded_pure_statements_vanish_from_the_tree() {
        let ctx = Context::new();

        // The leading constant has no effect and is dropped during
        // flattening, leaving the assignment as the root.
        let program = ctx.compile("1; x = 2").expect("valid program");
        assert!(program.root().args().len() == 2);
    }

    #[test]
    fn error_slot_tracks_the_latest_compile() {
        let ctx = Context::new();

        assert!(ctx.compile("x = (").is_err());
        let error = ctx.last_error().expect("recorded error");
        assert_eq!(error.line, 1);

        ctx.compile("x = 1").expect("valid program");
        assert!(ctx.last_error().is_none());
    }

    #[test]
    fn unknown_function_reports_invalid_function() {
        let ctx = Context::new();

        let error = ctx.compile("nosuchfunc(1)").unwrap_err();
        assert_eq!(error.message(), "Invalid function");
    }

    #[test]
    fn wrong_arity_reports_invalid_argument_count() {
        let ctx = Context::new();

        let error = ctx.compile("sin(1, 2)").unwrap_err();
        assert_eq!(error.message(), "Invalid argument count");
    }

    #[test]
    fn error_locations_span_lines() {
        let ctx = Context::new();

        let error = ctx.compile("x = 1;\ny = %").unwrap_err();
        assert_eq!(error.line, 2);
        assert!(error.column_start >= 5);
    }
}
