use super::block::Block;
use crate::util::linear_scan::{Region, RegionIterator};
use crate::util::Address;

/// Data structure to reference a line within an immix block.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialOrd, PartialEq, Eq)]
pub struct Line(Address);

impl Region for Line {
    const LOG_BYTES: usize = 8;

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

impl Line {
    /// Get the block containing the line.
    #[inline(always)]
    pub fn block(&self) -> Block {
        Block::from_unaligned_address(self.0)
    }

    /// Get line index within its containing block.
    #[inline(always)]
    pub fn get_index_within_block(&self) -> usize {
        let addr = self.start();
        (addr.as_usize() - Block::align(addr).as_usize()) >> Line::LOG_BYTES
    }

    /// The lines overlapped by `[start, start + size)`.
    #[inline]
    pub fn lines_for_object(start: Address, size: usize) -> RegionIterator<Line> {
        debug_assert!(size > 0);
        let start_line = Line::from_unaligned_address(start);
        let end_line = Line::from_aligned_address((start + size).align_up(Line::BYTES));
        RegionIterator::<Line>::new(start_line, end_line)
    }
}
