use std::sync::Arc;

use eel_eval::prelude::*;

fn run(ctx: &Context, source: &str) -> F {
    ctx.compile(source).expect("failed to compile").execute()
}

#[test]
fn pythagoras() {
    let ctx = Context::new();
    let x = ctx.register_variable("x");
    let y = ctx.register_variable("y");

    let result = run(&ctx, "x = 3; y = 4; sqrt(sqr(x) + sqr(y))");

    assert_eq!(result, 5.0);
    assert_eq!(x.get(), 3.0);
    assert_eq!(y.get(), 4.0);
}

#[test]
fn local_memory_reads_back() {
    let ctx = Context::new();

    let result = run(&ctx, "megabuf(10) = 42; megabuf(10) + 1");

    assert_eq!(result, 43.0);
    assert_eq!(ctx.memory().slot(10).expect("in-range slot").get(), 42.0);
}

#[test]
fn conditional_assignment_picks_its_target() {
    let ctx = Context::new();
    let x = ctx.register_variable("x");
    let y = ctx.register_variable("y");

    let program = ctx.compile("if(x < 10, 1, y) = 99").expect("failed to compile");

    // Constant branch chosen: the write lands in discarded scratch.
    x.set(0.0);
    assert_eq!(program.execute(), 99.0);
    assert_eq!(y.get(), 0.0);

    // Variable branch chosen: the write goes through to y.
    x.set(100.0);
    assert_eq!(program.execute(), 99.0);
    assert_eq!(y.get(), 99.0);
}

#[test]
fn loop_accumulates() {
    let ctx = Context::new();
    let a = ctx.register_variable("a");

    assert_eq!(run(&ctx, "a = 0; loop(5, a = a + 2)"), 10.0);
    assert_eq!(a.get(), 10.0);
}

#[test]
fn while_counts_down() {
    let ctx = Context::new();
    let b = ctx.register_variable("b");

    assert_eq!(run(&ctx, "b = 10; while(b = b - 1)"), 0.0);
    assert_eq!(b.get(), 0.0);
}

#[test]
fn folded_constant_still_assigns() {
    let ctx = Context::new();
    let c = ctx.register_variable("c");

    assert_eq!(run(&ctx, "c = 5 + 3"), 8.0);
    assert_eq!(c.get(), 8.0);
}

#[test]
fn exec2_returns_the_last_expression() {
    let ctx = Context::new();
    let x = ctx.register_variable("x");

    assert_eq!(run(&ctx, "exec2(x = 5, x)"), 5.0);
    assert_eq!(x.get(), 5.0);
}

#[test]
fn exec_results_are_addressable() {
    let ctx = Context::new();
    let y = ctx.register_variable("y");

    assert_eq!(run(&ctx, "exec2(x = 1, y) = 7; y"), 7.0);
    assert_eq!(y.get(), 7.0);
}

#[test]
fn while_terminates_at_the_iteration_cap() {
    let ctx = Context::new();

    assert_eq!(run(&ctx, "while(1)"), 1.0);
}

#[test]
fn loop_count_is_clamped() {
    let ctx = Context::new();
    let x = ctx.register_variable("x");

    run(&ctx, "x = 0; loop(1e12, x += 1)");

    assert_eq!(x.get(), 1_048_576.0);
}

#[test]
fn loop_with_nonpositive_count_skips_the_body() {
    let ctx = Context::new();
    let x = ctx.register_variable("x");

    run(&ctx, "x = 0; loop(0 - 5, x += 1)");

    assert_eq!(x.get(), 0.0);
}

#[test]
fn registers_are_shared_between_contexts() {
    let registers = Arc::new(RegisterBank::default());
    let writer = Context::with_shared(None, Some(Arc::clone(&registers)));
    let reader = Context::with_shared(None, Some(registers));

    run(&writer, "reg05 = 7");

    assert_eq!(run(&reader, "reg05 + 1"), 8.0);
}

#[test]
fn global_bank_is_shared_between_contexts() {
    let bank = Arc::new(MemoryBuffer::new());
    let writer = Context::with_shared(Some(Arc::clone(&bank)), None);
    let reader = Context::with_shared(Some(Arc::clone(&bank)), None);

    run(&writer, "gmegabuf(100) = 7");

    assert_eq!(run(&reader, "gmegabuf(100)"), 7.0);
    assert_eq!(bank.slot(100).expect("in-range slot").get(), 7.0);
}

#[test]
fn gmem_subscript_is_gmegabuf() {
    let bank = Arc::new(MemoryBuffer::new());
    let ctx = Context::with_shared(Some(Arc::clone(&bank)), None);

    run(&ctx, "gmem[3] = 2");

    assert_eq!(bank.slot(3).expect("in-range slot").get(), 2.0);
    assert_eq!(run(&ctx, "gmegabuf(3)"), 2.0);
}

#[test]
fn free_memory_detaches_the_local_bank() {
    let ctx = Context::new();

    run(&ctx, "megabuf(5) = 9");
    ctx.free_memory();

    assert_eq!(run(&ctx, "megabuf(5)"), 0.0);
}

#[test]
fn reset_variables_survives_recompiles() {
    let ctx = Context::new();
    let x = ctx.register_variable("x");

    run(&ctx, "x = 3");
    assert_eq!(x.get(), 3.0);

    ctx.reset_variables();
    assert_eq!(x.get(), 0.0);

    // The same cell keeps serving later programs.
    assert_eq!(run(&ctx, "x + 1"), 1.0);
}

#[test]
fn variables_are_case_insensitive() {
    let ctx = Context::new();
    let x = ctx.register_variable("LoudVar");

    run(&ctx, "loudvar = 3; LOUDVAR = LOUDVAR + 1");

    assert_eq!(x.get(), 4.0);
}

#[test]
fn programs_share_context_variables() {
    let ctx = Context::new();

    let writer = ctx.compile("n = n + 1").expect("failed to compile");
    let reader = ctx.compile("n * 10").expect("failed to compile");

    writer.execute();
    writer.execute();

    assert_eq!(reader.execute(), 20.0);
}

#[test]
fn compile_errors_keep_the_context_usable() {
    let ctx = Context::new();

    assert!(ctx.compile("x = ").is_err());
    assert!(ctx.last_error().is_some());

    assert_eq!(run(&ctx, "1 + 1"), 2.0);
}

#[test]
fn host_functions_participate_in_compiles() {
    fn eval_double(node: &ExprNode) -> Reference<'_> {
        Reference::Value(node.args()[0].eval().get() * 2.0)
    }

    let ctx = Context::new();
    ctx.register_function(FunctionDef {
        name: "double".into(),
        eval: eval_double,
        math: None,
        arity: 1,
        const_eval: false,
        state_changing: false,
        memory: None,
    });

    assert_eq!(run(&ctx, "x = 21; double(x)"), 42.0);
}
