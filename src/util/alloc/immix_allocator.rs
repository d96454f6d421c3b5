use super::allocator::{align_allocation, Allocator};
use crate::policy::immix::block::Block;
use crate::policy::immix::line::Line;
use crate::policy::immix::ImmixSpace;
use crate::util::linear_scan::Region;
use crate::util::Address;

/// Immix allocator
#[repr(C)]
pub struct ImmixAllocator {
    /// bump pointer
    cursor: Address,
    /// limit for bump pointer
    limit: Address,
    /// Is this a copy allocator?
    copy: bool,
    /// bump pointer for large objects
    large_cursor: Address,
    /// limit for bump pointer for large objects
    large_limit: Address,
    /// is the current request for large or small?
    request_for_large: bool,
    /// Where to resume the hole search in the current recyclable block.
    line: Option<Line>,
}

impl ImmixAllocator {
    pub fn new(copy: bool) -> Self {
        ImmixAllocator {
            cursor: Address::ZERO,
            limit: Address::ZERO,
            copy,
            large_cursor: Address::ZERO,
            large_limit: Address::ZERO,
            request_for_large: false,
            line: None,
        }
    }

    pub fn is_copy(&self) -> bool {
        self.copy
    }

    /// Large-object allocation. Objects larger than a line that do not fit in the current hole
    /// are bump-allocated in a dedicated clean block instead of skipping the rest of the hole.
    fn overflow_alloc(&mut self, space: &ImmixSpace, size: usize) -> Option<Address> {
        trace!("{:?}: overflow_alloc", self.copy);
        let start = align_allocation(self.large_cursor);
        let end = start + size;
        if end > self.large_limit {
            self.request_for_large = true;
            let rtn = self.alloc_slow(space, size);
            self.request_for_large = false;
            rtn
        } else {
            self.large_cursor = end;
            Some(start)
        }
    }

    /// Bump-allocate small objects in recyclable lines first.
    #[cold]
    fn alloc_slow_hot(&mut self, space: &ImmixSpace, size: usize) -> Option<Address> {
        trace!("{:?}: alloc_slow_hot", self.copy);
        if self.acquire_recyclable_lines(space) {
            self.alloc(space, size)
        } else {
            self.alloc_slow(space, size)
        }
    }

    /// Search for recyclable lines. Every hole holds at least one free line, which is enough for
    /// any object taking this path.
    fn acquire_recyclable_lines(&mut self, space: &ImmixSpace) -> bool {
        loop {
            let line = match self.line {
                Some(line) => line,
                None => match self.acquire_recyclable_block(space) {
                    Some(block) => block.start_line(),
                    None => return false,
                },
            };
            match space.get_next_available_lines(line) {
                Some(lines) => {
                    self.cursor = lines.start.start();
                    self.limit = lines.end.start();
                    trace!(
                        "{:?}: acquire_recyclable_lines -> {:?} {:?}",
                        self.copy,
                        line,
                        lines
                    );
                    self.line = if lines.end == line.block().end_line() {
                        None
                    } else {
                        Some(lines.end)
                    };
                    return true;
                }
                None => self.line = None,
            }
        }
    }

    /// Get a recyclable block from the space.
    fn acquire_recyclable_block(&mut self, space: &ImmixSpace) -> Option<Block> {
        let block = space.get_reusable_block()?;
        trace!("{:?}: acquire_recyclable_block -> {:?}", self.copy, block);
        Some(block)
    }
}

impl Allocator for ImmixAllocator {
    #[inline(always)]
    fn alloc(&mut self, space: &ImmixSpace, size: usize) -> Option<Address> {
        debug_assert!(size > 0 && size <= Block::BYTES);
        let result = align_allocation(self.cursor);
        let new_cursor = result + size;

        if new_cursor > self.limit {
            trace!("Thread local buffer used up, go to alloc slow path");
            if size > Line::BYTES {
                self.overflow_alloc(space, size)
            } else {
                self.alloc_slow_hot(space, size)
            }
        } else {
            self.cursor = new_cursor;
            trace!(
                "Bump allocation size: {}, result: {}, new_cursor: {}, limit: {}",
                size,
                result,
                self.cursor,
                self.limit
            );
            Some(result)
        }
    }

    /// Acquire a clean block, and bump-allocate the request at its start.
    fn alloc_slow(&mut self, space: &ImmixSpace, size: usize) -> Option<Address> {
        let block = space.get_clean_block(self.copy)?;
        trace!("{:?}: Acquired a new block {:?}", self.copy, block);
        let start = block.start();
        if self.request_for_large {
            self.large_cursor = start + size;
            self.large_limit = block.end();
        } else {
            self.cursor = start + size;
            self.limit = block.end();
            self.line = None;
        }
        Some(start)
    }

    fn reset(&mut self) {
        self.cursor = Address::ZERO;
        self.limit = Address::ZERO;
        self.large_cursor = Address::ZERO;
        self.large_limit = Address::ZERO;
        self.request_for_large = false;
        self.line = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::options::Options;

    fn space(blocks: usize) -> ImmixSpace {
        let mut options = Options::without_env();
        options.heap_size = blocks * Block::BYTES;
        ImmixSpace::new(&options).unwrap()
    }

    #[test]
    fn bump_within_a_block() {
        let space = space(4);
        let mut alloc = ImmixAllocator::new(false);
        let a = alloc.alloc(&space, 32).unwrap();
        let b = alloc.alloc(&space, 64).unwrap();
        assert_eq!(b, a + 32usize);
        assert!(a.is_aligned_to(Block::BYTES));
    }

    #[test]
    fn medium_objects_overflow() {
        let space = space(4);
        let mut alloc = ImmixAllocator::new(false);
        let small = alloc.alloc(&space, 32).unwrap();
        // Fits after the small object in the same clean block.
        let medium = alloc.alloc(&space, 2 * Line::BYTES).unwrap();
        assert_eq!(medium, small + 32usize);
        // Fill the block, then a medium object goes to its own block.
        let rest = Block::BYTES - 32 - 2 * Line::BYTES - 16;
        alloc.alloc(&space, rest).unwrap();
        let big = alloc.alloc(&space, 2 * Line::BYTES).unwrap();
        assert_ne!(Block::from_unaligned_address(big), Block::from_unaligned_address(small));
    }

    #[test]
    fn exhaustion() {
        let space = space(2);
        let mut alloc = ImmixAllocator::new(false);
        assert!(alloc.alloc(&space, Block::BYTES).is_some());
        assert!(alloc.alloc(&space, Block::BYTES).is_some());
        assert!(alloc.alloc(&space, Block::BYTES).is_none());
        assert!(alloc.alloc(&space, 16).is_none());
    }

    #[test]
    fn reset_keeps_allocated_memory() {
        let space = space(4);
        let mut alloc = ImmixAllocator::new(false);
        let a = alloc.alloc(&space, 32).unwrap();
        alloc.reset();
        let b = alloc.alloc(&space, 32).unwrap();
        assert_ne!(Block::from_unaligned_address(a), Block::from_unaligned_address(b));
    }
}
