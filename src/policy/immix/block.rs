use super::defrag::Histogram;
use super::line::Line;
use super::vo_bit::VOBitmap;
use super::ImmixSpace;
use crate::util::constants::*;
use crate::util::linear_scan::Region;
use crate::util::memory;
use crate::util::Address;
use spin::{Mutex, MutexGuard};
use std::io::{Error, ErrorKind};
use std::sync::atomic::{AtomicU8, Ordering};

/// The block allocation state.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum BlockState {
    /// the block is in the free pool.
    Unallocated,
    /// the block was handed to an allocator and has not been swept since.
    Unmarked,
    /// every line of the block is live.
    Full,
    /// the block has free lines that the allocator can reuse.
    Reusable { unavailable_lines: u8 },
}

impl BlockState {
    /// Private constant
    const MARK_UNALLOCATED: u8 = 0;
    /// Private constant
    const MARK_UNMARKED: u8 = u8::MAX;
    /// Private constant
    const MARK_FULL: u8 = u8::MAX - 1;
}

impl From<u8> for BlockState {
    #[inline(always)]
    fn from(state: u8) -> Self {
        match state {
            Self::MARK_UNALLOCATED => BlockState::Unallocated,
            Self::MARK_UNMARKED => BlockState::Unmarked,
            Self::MARK_FULL => BlockState::Full,
            unavailable_lines => BlockState::Reusable { unavailable_lines },
        }
    }
}

impl From<BlockState> for u8 {
    #[inline(always)]
    fn from(state: BlockState) -> Self {
        match state {
            BlockState::Unallocated => BlockState::MARK_UNALLOCATED,
            BlockState::Unmarked => BlockState::MARK_UNMARKED,
            BlockState::Full => BlockState::MARK_FULL,
            BlockState::Reusable { unavailable_lines } => unavailable_lines,
        }
    }
}

impl BlockState {
    /// Test if the block is reuasable.
    pub const fn is_reusable(&self) -> bool {
        matches!(self, BlockState::Reusable { .. })
    }
}

/// Side metadata of one block.
///
/// All fields are atomics whose zero value means "unallocated, no live lines, no objects", so
/// an all-zero `BlockMeta` describes a block still in the free pool.
#[repr(C)]
pub struct BlockMeta {
    state: AtomicU8,
    /// `DEFRAG_SOURCE_STATE` while the block is an evacuation candidate.
    defrag_state: AtomicU8,
    /// Number of live objects overlapping each line.
    line_counts: [AtomicU8; Block::LINES],
    pub(super) vo_bits: VOBitmap,
}

impl BlockMeta {
    pub fn get_state(&self) -> BlockState {
        self.state.load(Ordering::SeqCst).into()
    }

    pub fn set_state(&self, state: BlockState) {
        self.state.store(u8::from(state), Ordering::SeqCst);
    }

    const DEFRAG_SOURCE_STATE: u8 = u8::MAX;

    /// Test if the block is marked for defragmentation.
    pub fn is_defrag_source(&self) -> bool {
        self.defrag_state.load(Ordering::SeqCst) == Self::DEFRAG_SOURCE_STATE
    }

    /// Mark the block for defragmentation.
    pub fn set_as_defrag_source(&self, defrag: bool) {
        let byte = if defrag { Self::DEFRAG_SOURCE_STATE } else { 0 };
        self.defrag_state.store(byte, Ordering::SeqCst);
    }

    pub fn line_count(&self, index: usize) -> u8 {
        self.line_counts[index].load(Ordering::Relaxed)
    }

    pub fn increment_line(&self, index: usize) {
        let old = self.line_counts[index].fetch_add(1, Ordering::Relaxed);
        debug_assert!(old < u8::MAX);
    }

    pub fn decrement_line(&self, index: usize) {
        let old = self.line_counts[index].fetch_sub(1, Ordering::Relaxed);
        debug_assert!(old > 0);
    }

    /// Number of lines with at least one live object.
    pub fn live_lines(&self) -> usize {
        (0..Block::LINES).filter(|i| self.line_count(*i) != 0).count()
    }

    /// Initialize a clean block after it is acquired from the pool.
    pub fn init(&self) {
        self.set_state(BlockState::Unmarked);
        self.defrag_state.store(0, Ordering::SeqCst);
    }

    /// Deinitalize a block before releasing.
    pub fn deinit(&self) {
        debug_assert_eq!(self.live_lines(), 0);
        self.vo_bits.clear_all();
        self.set_state(BlockState::Unallocated);
        self.defrag_state.store(0, Ordering::SeqCst);
    }
}

const _: () = assert!(BlockState::MARK_UNALLOCATED == 0);

/// Side metadata of every block of a reservation.
///
/// The entries live in a demand-zero mapping of their own, so only the pages holding entries of
/// blocks that were touched take memory.
pub struct BlockMetaTable {
    start: Address,
    bytes: usize,
    blocks: usize,
}

impl BlockMetaTable {
    const ENTRY_BYTES: usize = std::mem::size_of::<BlockMeta>();

    pub fn new(blocks: usize) -> std::io::Result<Self> {
        let bytes = blocks
            .checked_mul(Self::ENTRY_BYTES)
            .and_then(|b| b.checked_add(BYTES_IN_PAGE - 1))
            .map(|b| b & !(BYTES_IN_PAGE - 1))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::InvalidInput,
                    format!("block metadata for {} blocks does not fit the address space", blocks),
                )
            })?;
        let start = memory::dzmmap_anywhere(bytes)?;
        Ok(BlockMetaTable {
            start,
            bytes,
            blocks,
        })
    }

    #[inline(always)]
    pub fn get(&self, index: usize) -> &BlockMeta {
        assert!(index < self.blocks);
        unsafe { &*(self.start + index * Self::ENTRY_BYTES).to_ptr::<BlockMeta>() }
    }
}

impl Drop for BlockMetaTable {
    fn drop(&mut self) {
        if let Err(e) = memory::try_munmap(self.start, self.bytes) {
            warn!("Failed to unmap block metadata at {}: {}", self.start, e);
        }
    }
}

/// Data structure to reference an immix block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialOrd, PartialEq, Eq, Hash)]
pub struct Block(Address);

impl Region for Block {
    const LOG_BYTES: usize = 15;

    #[inline(always)]
    fn from_aligned_address(address: Address) -> Self {
        debug_assert!(address.is_aligned_to(Self::BYTES));
        Self(address)
    }

    #[inline(always)]
    fn start(&self) -> Address {
        self.0
    }
}

impl Block {
    /// Log pages in block
    pub const LOG_PAGES: usize = Self::LOG_BYTES - LOG_BYTES_IN_PAGE as usize;
    /// Pages in block
    pub const PAGES: usize = 1 << Self::LOG_PAGES;
    /// Log lines in block
    pub const LOG_LINES: usize = Self::LOG_BYTES - Line::LOG_BYTES;
    /// Lines in block
    pub const LINES: usize = 1 << Self::LOG_LINES;

    #[inline(always)]
    pub fn start_line(&self) -> Line {
        Line::from_aligned_address(self.start())
    }

    #[inline(always)]
    pub fn end_line(&self) -> Line {
        Line::from_aligned_address(self.end())
    }

    /// Sweep this block. Return true if the block is released to the free pool.
    pub fn sweep(&self, space: &ImmixSpace, mark_histogram: &mut Histogram) -> bool {
        let meta = space.block_meta(*self);
        if meta.get_state() == BlockState::Unallocated {
            return false;
        }
        let marked_lines = meta.live_lines();

        meta.set_as_defrag_source(false);
        if marked_lines == 0 {
            // Release the block if none of its lines are live.
            space.release_block(*self);
            true
        } else {
            if marked_lines != Block::LINES {
                // There are holes. Mark the block as reusable.
                meta.set_state(BlockState::Reusable {
                    unavailable_lines: marked_lines as _,
                });
                space.reusable_blocks.push(*self)
            } else {
                meta.set_state(BlockState::Full);
            }
            mark_histogram[marked_lines] += marked_lines;
            false
        }
    }
}

/// A lock-protected list of blocks.
#[derive(Default)]
pub struct BlockList {
    queue: Mutex<Vec<Block>>,
}

impl BlockList {
    /// Get number of blocks in this list.
    #[inline]
    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    /// Add a block to the list.
    #[inline]
    pub fn push(&self, block: Block) {
        self.queue.lock().push(block)
    }

    /// Pop a block out of the list.
    #[inline]
    pub fn pop(&self) -> Option<Block> {
        self.queue.lock().pop()
    }

    /// Clear the list.
    #[inline]
    pub fn reset(&self) {
        *self.queue.lock() = Vec::new()
    }

    /// Get an array of all blocks stored in this BlockList.
    #[inline]
    pub fn get_blocks(&self) -> MutexGuard<Vec<Block>> {
        self.queue.lock()
    }
}
