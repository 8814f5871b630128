//! Evaluator parameters

use crate::value::{Bits, F};

/* MEMORY BANK GEOMETRY */

/// Block slots per memory bank.
pub const MEM_BLOCKS: usize = 128;

/// Cells per lazily allocated block.
pub const MEM_BLOCK_SIZE: usize = 65_536;

/// Total addressable cells per bank.
pub const MEM_CAPACITY: usize = MEM_BLOCKS * MEM_BLOCK_SIZE;

/* EXECUTION LIMITS */

/// Hard iteration cap for `loop` and `while`.
pub const MAX_LOOP_COUNT: i64 = 1_048_576;

/// Shared `reg00`..`reg99` cells per register bank.
pub const REGISTER_COUNT: usize = 100;

/* NUMERIC TOLERANCES */

/// Coarse comparison tolerance, used by `band`, `bor` and the sigmoid
/// denominator guard.
pub const CLOSE_FACTOR: F = 1e-5;

/// Near-zero tolerance used by equality tests, the logical operators and
/// `while` termination. Not quite the bit pattern ns-eel2 masks with, but
/// close enough in behavior.
#[cfg(not(feature = "f32"))]
pub const CLOSE_FACTOR_LOW: F = 1e-300;
#[cfg(feature = "f32")]
pub const CLOSE_FACTOR_LOW: F = 1e-41;

/* PSEUDO-RANDOM NUMBERS */

/// Fixed Mersenne Twister seed, same as Milkdrop's `rand()`.
pub const RAND_SEED: u32 = 0x4141_F00D;

/// Fast inverse square root first-guess constant for the active scalar width.
#[cfg(not(feature = "f32"))]
pub(crate) const INVSQRT_MAGIC: Bits = 0x5FE6_EB50_C7B5_37A9;
#[cfg(feature = "f32")]
pub(crate) const INVSQRT_MAGIC: Bits = 0x5F37_59DF;
