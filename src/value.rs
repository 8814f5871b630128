//! Scalar storage primitives shared by variables, registers and memory banks

use std::array;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::consts::REGISTER_COUNT;

#[cfg(not(feature = "f32"))]
mod width {
    /// The numeric scalar every cell, intermediate and result has.
    pub type F = f64;
    pub(crate) type Bits = u64;
    pub(crate) type AtomicBits = std::sync::atomic::AtomicU64;
}

#[cfg(feature = "f32")]
mod width {
    /// The numeric scalar every cell, intermediate and result has.
    pub type F = f32;
    pub(crate) type Bits = u32;
    pub(crate) type AtomicBits = std::sync::atomic::AtomicU32;
}

pub use width::F;
pub(crate) use width::{AtomicBits, Bits};

/// Storage for a single scalar, shared between the host and executing
/// programs.
///
/// The value is kept as its IEEE-754 bit pattern in a relaxed atomic, which
/// gives every cell a stable shared address and makes plain load/store racing
/// well defined. There is deliberately no read-modify-write: concurrent
/// writers land whichever value arrives last, and serializing beyond that is
/// the host's business.
#[derive(Debug, Default)]
pub struct ValueCell(AtomicBits);

impl ValueCell {
    pub fn new(value: F) -> Self {
        Self(AtomicBits::new(value.to_bits()))
    }

    pub fn get(&self) -> F {
        F::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn set(&self, value: F) {
        self.0.store(value.to_bits(), Ordering::Relaxed)
    }
}

/// The 100 `reg00`..`reg99` cells shared by every context holding the same
/// bank. The cells start at zero and are never reset by
/// [`crate::context::Context::reset_variables`].
#[derive(Debug)]
pub struct RegisterBank {
    cells: [Arc<ValueCell>; REGISTER_COUNT],
}

impl Default for RegisterBank {
    fn default() -> Self {
        Self {
            cells: array::from_fn(|_| Arc::new(ValueCell::default())),
        }
    }
}

impl RegisterBank {
    /// Cell backing `regNN`, or `None` past `reg99`.
    pub fn cell(&self, index: usize) -> Option<&Arc<ValueCell>> {
        self.cells.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_defaults_to_zero() {
        assert_eq!(ValueCell::default().get(), 0.0);
    }

    #[test]
    fn cell_round_trips() {
        let cell = ValueCell::new(1.5);
        assert_eq!(cell.get(), 1.5);

        cell.set(-42.0);
        assert_eq!(cell.get(), -42.0);
    }

    #[test]
    fn register_bank_bounds() {
        let bank = RegisterBank::default();

        assert!(bank.cell(0).is_some());
        assert!(bank.cell(REGISTER_COUNT - 1).is_some());
        assert!(bank.cell(REGISTER_COUNT).is_none());
    }
}
