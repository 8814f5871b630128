//! Sparse numeric memory banks backing `megabuf` and `gmegabuf`

use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwapOption;
use lazy_static::lazy_static;
use tracing::trace;

use crate::consts::{MEM_BLOCKS, MEM_BLOCK_SIZE, MEM_CAPACITY};
use crate::value::{ValueCell, F};

/// One lazily allocated slab of [`MEM_BLOCK_SIZE`] zeroed cells.
pub struct MemBlock {
    cells: Box<[ValueCell]>,
}

impl MemBlock {
    fn zeroed() -> Self {
        Self {
            cells: (0..MEM_BLOCK_SIZE).map(|_| ValueCell::default()).collect(),
        }
    }

    pub fn cell(&self, offset: usize) -> &ValueCell {
        &self.cells[offset]
    }
}

/// A handle to a single bank cell.
///
/// The handle keeps its block alive, so it stays readable and writable even
/// if the owning bank is emptied concurrently; the detached block is simply
/// no longer reachable through new lookups.
#[derive(Clone)]
pub struct BankSlot {
    block: Arc<MemBlock>,
    offset: usize,
}

impl BankSlot {
    pub fn get(&self) -> F {
        self.block.cell(self.offset).get()
    }

    pub fn set(&self, value: F) {
        self.block.cell(self.offset).set(value)
    }

    /// Whether both handles address the same cell of the same block.
    pub fn shares_cell(&self, other: &BankSlot) -> bool {
        Arc::ptr_eq(&self.block, &other.block) && self.offset == other.offset
    }
}

/// A two-level sparse array of [`MEM_CAPACITY`] scalar cells.
///
/// Blocks are absent until first touched. Lookups of an existing block are
/// lock-free; only allocation and [`MemoryBuffer::free_all`] take the
/// internal mutex, so the hot path stays allocation- and contention-free
/// once a preset's working set of blocks exists.
pub struct MemoryBuffer {
    blocks: Vec<ArcSwapOption<MemBlock>>,
    alloc: Mutex<()>,
}

impl MemoryBuffer {
    pub fn new() -> Self {
        Self {
            blocks: (0..MEM_BLOCKS).map(|_| ArcSwapOption::empty()).collect(),
            alloc: Mutex::new(()),
        }
    }

    /// Resolves index `i` to its cell, allocating the enclosing block if
    /// absent. Negative and out-of-range indices yield `None`.
    pub fn slot(&self, index: i64) -> Option<BankSlot> {
        if !(0..MEM_CAPACITY as i64).contains(&index) {
            return None;
        }

        let index = index as usize;

        Some(BankSlot {
            block: self.block(index / MEM_BLOCK_SIZE),
            offset: index % MEM_BLOCK_SIZE,
        })
    }

    fn block(&self, block_index: usize) -> Arc<MemBlock> {
        if let Some(block) = self.blocks[block_index].load_full() {
            return block;
        }

        let _guard = self.lock();

        // Another thread may have published the block while we waited.
        if let Some(block) = self.blocks[block_index].load_full() {
            return block;
        }

        trace!("allocating memory block {}", block_index);

        let block = Arc::new(MemBlock::zeroed());
        self.blocks[block_index].store(Some(Arc::clone(&block)));

        block
    }

    /// Detaches every allocated block. The bank stays usable; all cells read
    /// zero again on next touch.
    pub fn free_all(&self) {
        let _guard = self.lock();

        for slot in &self.blocks {
            slot.store(None);
        }
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        // The critical sections cannot panic, but a poisoned lock must not
        // take the evaluator down either.
        self.alloc.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static! {
    static ref GLOBAL_MEMORY: Mutex<Option<Arc<MemoryBuffer>>> = Mutex::new(None);
}

/// The process-wide bank backing `gmegabuf` for contexts created without an
/// explicit global bank. Created lazily on first request.
pub fn global_memory() -> Arc<MemoryBuffer> {
    let mut bank = GLOBAL_MEMORY.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    Arc::clone(bank.get_or_insert_with(|| Arc::new(MemoryBuffer::new())))
}

/// Drops the process-wide bank reference. Contexts still holding the bank
/// keep it alive; the next [`global_memory`] call starts a fresh one.
pub fn global_memory_destroy() {
    let mut bank = GLOBAL_MEMORY.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    *bank = None;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_allocates_once() {
        let bank = MemoryBuffer::new();

        let first = bank.slot(70_000).expect("in-range index");
        let second = bank.slot(70_000).expect("in-range index");

        assert!(first.shares_cell(&second));

        first.set(2.5);
        assert_eq!(second.get(), 2.5);
    }

    #[test]
    fn out_of_range_is_absent() {
        let bank = MemoryBuffer::new();

        assert!(bank.slot(-1).is_none());
        assert!(bank.slot(MEM_CAPACITY as i64).is_none());
        assert!(bank.slot(MEM_CAPACITY as i64 - 1).is_some());
    }

    #[test]
    fn free_all_zeroes_on_next_touch() {
        let bank = MemoryBuffer::new();

        bank.slot(10).expect("in-range index").set(7.0);
        bank.free_all();

        assert_eq!(bank.slot(10).expect("in-range index").get(), 0.0);
    }

    #[test]
    fn detached_slot_survives_free_all() {
        let bank = MemoryBuffer::new();

        let slot = bank.slot(10).expect("in-range index");
        slot.set(7.0);
        bank.free_all();

        assert_eq!(slot.get(), 7.0);
        assert!(!slot.shares_cell(&bank.slot(10).expect("in-range index")));
    }
}
