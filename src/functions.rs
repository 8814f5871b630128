//! The intrinsic function table and every node evaluator
//!
//! The table is data: each entry pairs a case-insensitive name with an
//! evaluator function pointer, its arity and the flags the tree builder
//! needs for constant folding and dead-store elimination. Underscore names
//! are ns-eel2 internals that Milkdrop presets may still call directly, so
//! they are listed as plain aliases.

use std::borrow::Cow;
use std::sync::Mutex;

use lazy_static::lazy_static;
use rand_mt::Mt19937GenRand32;

use crate::consts::{CLOSE_FACTOR, CLOSE_FACTOR_LOW, INVSQRT_MAGIC, MAX_LOOP_COUNT, MEM_CAPACITY, RAND_SEED};
use crate::memory::MemoryBuffer;
use crate::tree::{EvalFn, ExprNode, Reference};
use crate::value::F;

/// Which bank a memory intrinsic addresses. Resolved to a concrete bank by
/// the tree builder when the node is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryScope {
    /// The context's own bank (`megabuf`).
    Local,
    /// The bank shared across contexts (`gmegabuf`).
    Global,
}

/// Math-library function pointer dispatched by the shared wrapper
/// evaluators.
#[derive(Debug, Clone, Copy)]
pub enum MathFn {
    Unary(fn(F) -> F),
    Binary(fn(F, F) -> F),
}

/// One available function: an intrinsic, or an entry the host registered
/// with [`crate::context::Context::register_function`].
#[derive(Debug, Clone)]
pub struct FunctionDef {
    /// Name in the expression syntax, matched case-insensitively.
    pub name: Cow<'static, str>,
    pub eval: EvalFn,
    pub math: Option<MathFn>,
    /// Accepted argument count, 0 to 3.
    pub arity: usize,
    /// Whether a call over constant arguments may be folded at compile time.
    pub const_eval: bool,
    /// Whether evaluation mutates a variable or memory; such statements are
    /// immune to dead-store elimination.
    pub state_changing: bool,
    /// Set for memory intrinsics only.
    pub memory: Option<MemoryScope>,
}

const fn func(
    name: &'static str,
    eval: EvalFn,
    arity: usize,
    const_eval: bool,
    state_changing: bool,
) -> FunctionDef {
    FunctionDef {
        name: Cow::Borrowed(name),
        eval,
        math: None,
        arity,
        const_eval,
        state_changing,
        memory: None,
    }
}

const fn math1(name: &'static str, f: fn(F) -> F) -> FunctionDef {
    FunctionDef {
        name: Cow::Borrowed(name),
        eval: eval_math1,
        math: Some(MathFn::Unary(f)),
        arity: 1,
        const_eval: true,
        state_changing: false,
        memory: None,
    }
}

const fn math2(name: &'static str, f: fn(F, F) -> F) -> FunctionDef {
    FunctionDef {
        name: Cow::Borrowed(name),
        eval: eval_math2,
        math: Some(MathFn::Binary(f)),
        arity: 2,
        const_eval: true,
        state_changing: false,
        memory: None,
    }
}

const fn mem_func(name: &'static str, eval: EvalFn, arity: usize, scope: MemoryScope) -> FunctionDef {
    FunctionDef {
        name: Cow::Borrowed(name),
        eval,
        math: None,
        arity,
        const_eval: false,
        state_changing: true,
        memory: Some(scope),
    }
}

static INTRINSIC_FUNCTIONS: &[FunctionDef] = &[
    /* Reserved entries used by the tree builder; unreachable from source. */
    func("<const>", eval_const, 0, true, false),
    func("<var>", eval_var, 0, false, false),
    func("<list>", eval_list, 0, true, false),

    func("if", eval_if, 3, true, false),
    func("_if", eval_if, 3, true, false),
    func("_and", eval_and, 2, true, false),
    func("_or", eval_or, 2, true, false),
    func("loop", eval_loop, 2, true, false),
    func("while", eval_while, 1, true, false),

    func("_not", eval_not, 1, true, false),
    func("bnot", eval_not, 1, true, false),
    func("_equal", eval_equal, 2, true, false),
    func("equal", eval_equal, 2, true, false),
    func("_noteq", eval_not_equal, 2, true, false),
    func("_below", eval_below, 2, true, false),
    func("below", eval_below, 2, true, false),
    func("_above", eval_above, 2, true, false),
    func("above", eval_above, 2, true, false),
    func("_beleq", eval_below_equal, 2, true, false),
    func("_aboeq", eval_above_equal, 2, true, false),

    func("_set", eval_set, 2, false, true),
    func("assign", eval_set, 2, false, true),
    func("_add", eval_add, 2, true, false),
    func("_sub", eval_sub, 2, true, false),
    func("_mul", eval_mul, 2, true, false),
    func("_div", eval_div, 2, true, false),
    func("_mod", eval_mod, 2, true, false),
    func("_bitor", eval_bitor, 2, true, false),
    func("_bitand", eval_bitand, 2, true, false),
    func("_neg", eval_neg, 1, true, false),
    func("_addop", eval_add_op, 2, false, true),
    func("_subop", eval_sub_op, 2, false, true),
    func("_mulop", eval_mul_op, 2, false, true),
    func("_divop", eval_div_op, 2, false, true),
    func("_modop", eval_mod_op, 2, false, true),
    func("_orop", eval_or_op, 2, false, true),
    func("_andop", eval_and_op, 2, false, true),
    func("_powop", eval_pow_op, 2, false, true),

    math1("sin", F::sin),
    math1("cos", F::cos),
    math1("tan", F::tan),
    math1("asin", math::asin),
    math1("acos", math::acos),
    math1("atan", F::atan),
    math2("atan2", F::atan2),
    func("sqr", eval_sqr, 1, true, false),
    math1("sqrt", math::sqrt),
    math2("pow", math::pow),
    math1("exp", F::exp),
    math1("log", math::log),
    math1("log10", math::log10),
    math1("abs", F::abs),
    math2("min", F::min),
    math2("max", F::max),
    func("sign", eval_sign, 1, true, false),
    func("rand", eval_rand, 1, false, false),
    math1("floor", F::floor),
    math1("int", F::floor),
    math1("ceil", F::ceil),
    func("invsqrt", eval_invsqrt, 1, true, false),
    func("sigmoid", eval_sigmoid, 2, true, false),

    func("band", eval_band, 2, true, false),
    func("bor", eval_bor, 2, true, false),

    func("exec2", eval_exec2, 2, true, false),
    func("exec3", eval_exec3, 3, true, false),
    mem_func("_mem", eval_mem, 1, MemoryScope::Local),
    mem_func("megabuf", eval_mem, 1, MemoryScope::Local),
    mem_func("_gmem", eval_mem, 1, MemoryScope::Global),
    mem_func("gmem", eval_mem, 1, MemoryScope::Global),
    mem_func("gmegabuf", eval_mem, 1, MemoryScope::Global),
    mem_func("freembuf", eval_freembuf, 1, MemoryScope::Local),
    mem_func("memcpy", eval_memcpy, 3, MemoryScope::Local),
    mem_func("memset", eval_memset, 3, MemoryScope::Local),
];

/// The full intrinsic table, copied into every new context's function list.
pub(crate) fn intrinsic_functions() -> &'static [FunctionDef] {
    INTRINSIC_FUNCTIONS
}

/// Guarded math wrappers. The language defines every out-of-domain input to
/// produce a benign value instead of NaN or infinity.
pub(crate) mod math {
    use crate::value::F;

    pub fn div(a: F, b: F) -> F {
        if b == 0.0 {
            0.0
        } else {
            a / b
        }
    }

    /// Integer remainder with truncated operands; modulo by zero is zero.
    pub fn modulo(a: F, b: F) -> F {
        let divisor = b as i64;
        if divisor == 0 {
            0.0
        } else {
            ((a as i64) % divisor) as F
        }
    }

    /// Bitwise OR over operands rounded to the nearest integer.
    pub fn bitor(a: F, b: F) -> F {
        ((a.round() as i64) | (b.round() as i64)) as F
    }

    /// Bitwise AND over operands rounded to the nearest integer.
    pub fn bitand(a: F, b: F) -> F {
        ((a.round() as i64) & (b.round() as i64)) as F
    }

    pub fn pow(base: F, exponent: F) -> F {
        if base == 0.0 && exponent < 0.0 {
            0.0
        } else {
            base.powf(exponent)
        }
    }

    pub fn asin(x: F) -> F {
        if (-1.0..=1.0).contains(&x) {
            x.asin()
        } else {
            0.0
        }
    }

    pub fn acos(x: F) -> F {
        if (-1.0..=1.0).contains(&x) {
            x.acos()
        } else {
            0.0
        }
    }

    pub fn sqrt(x: F) -> F {
        x.abs().sqrt()
    }

    pub fn log(x: F) -> F {
        if x > 0.0 {
            x.ln()
        } else {
            0.0
        }
    }

    pub fn log10(x: F) -> F {
        if x > 0.0 {
            x.log10()
        } else {
            0.0
        }
    }
}

lazy_static! {
    static ref RAND_STATE: Mutex<Mt19937GenRand32> = Mutex::new(Mt19937GenRand32::new(RAND_SEED));
}

fn next_random() -> u32 {
    RAND_STATE
        .lock()
        .map(|mut rng| rng.next_u32())
        .unwrap_or(0)
}

fn binary_args(node: &ExprNode) -> (F, F) {
    (node.arg(0).eval().get(), node.arg(1).eval().get())
}

fn compound_assign(node: &ExprNode, op: impl FnOnce(F, F) -> F) -> Reference<'_> {
    let mut target = node.arg(0).eval();
    let operand = node.arg(1).eval().get();
    let result = op(target.get(), operand);

    target.set(result);

    target
}

fn bool_value(condition: bool) -> Reference<'static> {
    Reference::Value(if condition { 1.0 } else { 0.0 })
}

/* Constant and variable access */

pub(crate) fn eval_const(node: &ExprNode) -> Reference<'_> {
    Reference::Value(node.value)
}

pub(crate) fn eval_var(node: &ExprNode) -> Reference<'_> {
    match node.var.as_deref() {
        Some(cell) => Reference::Cell(cell),
        None => Reference::Value(0.0),
    }
}

/* Execution control */

pub(crate) fn eval_list(node: &ExprNode) -> Reference<'_> {
    let mut result = Reference::Value(0.0);

    for statement in &node.list {
        result = statement.eval();
    }

    result
}

fn eval_if(node: &ExprNode) -> Reference<'_> {
    if node.arg(0).eval().get() != 0.0 {
        node.arg(1).eval()
    } else {
        node.arg(2).eval()
    }
}

fn eval_loop(node: &ExprNode) -> Reference<'_> {
    let mut result = node.arg(0).eval();
    let count = (result.get() as i64).min(MAX_LOOP_COUNT);

    for _ in 0..count {
        result = node.arg(1).eval();
    }

    result
}

fn eval_while(node: &ExprNode) -> Reference<'_> {
    let mut remaining = MAX_LOOP_COUNT;

    loop {
        let result = node.arg(0).eval();
        remaining -= 1;

        if result.get().abs() <= CLOSE_FACTOR_LOW || remaining == 0 {
            return result;
        }
    }
}

fn eval_exec2(node: &ExprNode) -> Reference<'_> {
    node.arg(0).eval();
    node.arg(1).eval()
}

fn eval_exec3(node: &ExprNode) -> Reference<'_> {
    node.arg(0).eval();
    node.arg(1).eval();
    node.arg(2).eval()
}

/* Assignment */

fn eval_set(node: &ExprNode) -> Reference<'_> {
    let mut target = node.arg(0).eval();
    let value = node.arg(1).eval().get();

    target.set(value);

    target
}

fn eval_add_op(node: &ExprNode) -> Reference<'_> {
    compound_assign(node, |a, b| a + b)
}

fn eval_sub_op(node: &ExprNode) -> Reference<'_> {
    compound_assign(node, |a, b| a - b)
}

fn eval_mul_op(node: &ExprNode) -> Reference<'_> {
    compound_assign(node, |a, b| a * b)
}

fn eval_div_op(node: &ExprNode) -> Reference<'_> {
    compound_assign(node, math::div)
}

fn eval_mod_op(node: &ExprNode) -> Reference<'_> {
    compound_assign(node, math::modulo)
}

fn eval_or_op(node: &ExprNode) -> Reference<'_> {
    compound_assign(node, math::bitor)
}

fn eval_and_op(node: &ExprNode) -> Reference<'_> {
    compound_assign(node, math::bitand)
}

fn eval_pow_op(node: &ExprNode) -> Reference<'_> {
    compound_assign(node, math::pow)
}

/* Arithmetic */

fn eval_add(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    Reference::Value(a + b)
}

fn eval_sub(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    Reference::Value(a - b)
}

fn eval_mul(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    Reference::Value(a * b)
}

fn eval_div(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    Reference::Value(math::div(a, b))
}

fn eval_mod(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    Reference::Value(math::modulo(a, b))
}

fn eval_neg(node: &ExprNode) -> Reference<'_> {
    Reference::Value(-node.arg(0).eval().get())
}

/* Comparisons */

fn eval_equal(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    bool_value((a - b).abs() < CLOSE_FACTOR_LOW)
}

fn eval_not_equal(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    bool_value((a - b).abs() > CLOSE_FACTOR_LOW)
}

fn eval_below(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    bool_value(a < b)
}

fn eval_above(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    bool_value(a > b)
}

fn eval_below_equal(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    bool_value(a <= b)
}

fn eval_above_equal(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    bool_value(a >= b)
}

/* Logical operators */

fn eval_not(node: &ExprNode) -> Reference<'_> {
    bool_value(node.arg(0).eval().get().abs() < CLOSE_FACTOR_LOW)
}

// The && operator evaluates the right side only when the left is non-zero.
fn eval_and(node: &ExprNode) -> Reference<'_> {
    if node.arg(0).eval().get().abs() > CLOSE_FACTOR_LOW {
        bool_value(node.arg(1).eval().get().abs() > CLOSE_FACTOR_LOW)
    } else {
        bool_value(false)
    }
}

// The || operator evaluates the right side only when the left is zero.
fn eval_or(node: &ExprNode) -> Reference<'_> {
    if node.arg(0).eval().get().abs() < CLOSE_FACTOR_LOW {
        bool_value(node.arg(1).eval().get().abs() > CLOSE_FACTOR_LOW)
    } else {
        bool_value(true)
    }
}

// The band/bor function forms always evaluate both operands and use the
// coarse tolerance.
fn eval_band(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    bool_value(a.abs() > CLOSE_FACTOR && b.abs() > CLOSE_FACTOR)
}

fn eval_bor(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    bool_value(a.abs() > CLOSE_FACTOR || b.abs() > CLOSE_FACTOR)
}

/* Bitwise operators */

fn eval_bitor(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    Reference::Value(math::bitor(a, b))
}

fn eval_bitand(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);
    Reference::Value(math::bitand(a, b))
}

/* Math wrappers and helpers */

fn eval_math1(node: &ExprNode) -> Reference<'_> {
    let value = node.arg(0).eval().get();

    match node.math {
        Some(MathFn::Unary(f)) => Reference::Value(f(value)),
        _ => Reference::Value(0.0),
    }
}

fn eval_math2(node: &ExprNode) -> Reference<'_> {
    let (a, b) = binary_args(node);

    match node.math {
        Some(MathFn::Binary(f)) => Reference::Value(f(a, b)),
        _ => Reference::Value(0.0),
    }
}

fn eval_sqr(node: &ExprNode) -> Reference<'_> {
    let value = node.arg(0).eval().get();
    Reference::Value(value * value)
}

fn eval_sign(node: &ExprNode) -> Reference<'_> {
    let value = node.arg(0).eval().get();

    Reference::Value(if value == 0.0 {
        0.0
    } else if value < 0.0 {
        -1.0
    } else {
        1.0
    })
}

fn eval_invsqrt(node: &ExprNode) -> Reference<'_> {
    let value = node.arg(0).eval().get();

    // Fast inverse square root: magic-constant first guess plus one Newton
    // iteration, as Milkdrop does it. The subtraction wraps for negative
    // inputs, same as the unsigned arithmetic it mirrors.
    let half = value * 0.5;
    let estimate = F::from_bits(INVSQRT_MAGIC.wrapping_sub(value.to_bits() >> 1));

    Reference::Value(estimate * (1.5 - half * estimate * estimate))
}

fn eval_sigmoid(node: &ExprNode) -> Reference<'_> {
    let (x, k) = binary_args(node);

    let denominator = 1.0 + (-(x as f64) * (k as f64)).exp();

    Reference::Value(if denominator.abs() > CLOSE_FACTOR as f64 {
        (1.0 / denominator) as F
    } else {
        0.0
    })
}

fn eval_rand(node: &ExprNode) -> Reference<'_> {
    let limit = node.arg(0).eval().get().floor().max(1.0);
    let sample = next_random() as f64 * (1.0 / u32::MAX as f64) * (limit as f64);

    Reference::Value(sample as F)
}

/* Memory access */

/// ns-eel2 rounds memory indices to nearest with a small upward bias.
fn mem_index(index: F) -> i64 {
    (index + 0.0001).round() as i64
}

fn eval_mem(node: &ExprNode) -> Reference<'_> {
    let index = node.arg(0).eval().get();

    let slot = node
        .buffer
        .as_deref()
        .and_then(|buffer| buffer.slot(mem_index(index)));

    match slot {
        Some(slot) => Reference::Mem(slot),
        None => Reference::Value(0.0),
    }
}

fn eval_freembuf(node: &ExprNode) -> Reference<'_> {
    let result = node.arg(0).eval();

    if let Some(buffer) = &node.buffer {
        buffer.free_all();
    }

    result
}

fn copy_slot(buffer: &MemoryBuffer, src: i64, dst: i64) {
    if let (Some(from), Some(to)) = (buffer.slot(src), buffer.slot(dst)) {
        to.set(from.get());
    }
}

fn eval_memcpy(node: &ExprNode) -> Reference<'_> {
    let dst = node.arg(0).eval().get();
    let src = node.arg(1).eval().get();
    // More cells than the bank holds can never be in range.
    let count = (node.arg(2).eval().get() as i64).min(MEM_CAPACITY as i64);

    if let Some(buffer) = node.buffer.as_deref() {
        let dst_start = dst as i64;
        let src_start = src as i64;

        if count > 0 && dst_start != src_start {
            // Overlap-safe: copy upward when moving data down, downward when
            // moving it up.
            if dst_start < src_start {
                for offset in 0..count {
                    copy_slot(buffer, src_start.saturating_add(offset), dst_start.saturating_add(offset));
                }
            } else {
                for offset in (0..count).rev() {
                    copy_slot(buffer, src_start.saturating_add(offset), dst_start.saturating_add(offset));
                }
            }
        }
    }

    Reference::Value(dst)
}

fn eval_memset(node: &ExprNode) -> Reference<'_> {
    let dst = node.arg(0).eval().get();
    let value = node.arg(1).eval().get();
    let count = (node.arg(2).eval().get() as i64).min(MEM_CAPACITY as i64);

    if let Some(buffer) = node.buffer.as_deref() {
        let dst_start = dst as i64;

        for offset in 0..count.max(0) {
            if let Some(slot) = buffer.slot(dst_start.saturating_add(offset)) {
                slot.set(value);
            }
        }
    }

    Reference::Value(dst)
}
