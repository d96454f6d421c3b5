use super::block::{Block, BlockList, BlockMeta, BlockMetaTable, BlockState};
use super::defrag::Defrag;
use super::line::Line;
use crate::object::header::HeapObject;
use crate::object::table::ObjectTable;
use crate::object::{ObjectReference, TypeDescriptor};
use crate::util::alloc::{Allocator, ImmixAllocator};
use crate::util::linear_scan::Region;
use crate::util::memory;
use crate::util::options::Options;
use crate::util::Address;
use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};

/// The heap: a reserved, block-aligned address range carved into blocks on demand, the side
/// metadata of every block, and the table of live objects.
pub struct ImmixSpace {
    start: Address,
    total_blocks: usize,
    /// Side metadata, one entry for every block of the reservation.
    metadata: BlockMetaTable,
    /// Blocks below this index have been handed out at least once.
    high_water: AtomicUsize,
    free_blocks: BlockList,
    /// Reusable blocks found by the last sweep.
    pub reusable_blocks: BlockList,
    pub(crate) defrag: Defrag,
    objects: ObjectTable,
}

/// Block counts by state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCensus {
    /// Blocks handed to an allocator and not swept since.
    pub unswept: usize,
    pub full: usize,
    pub reusable: usize,
    /// Blocks in the free pool, plus blocks never carved.
    pub free: usize,
}

impl ImmixSpace {
    pub fn new(options: &Options) -> std::io::Result<Self> {
        let total_blocks = options.heap_size >> Block::LOG_BYTES;
        let metadata = BlockMetaTable::new(total_blocks)?;
        let start = memory::dzmmap_aligned(total_blocks << Block::LOG_BYTES, Block::BYTES)?;
        debug!(
            "Reserved {} blocks for the heap at {}",
            total_blocks, start
        );
        Ok(ImmixSpace {
            start,
            total_blocks,
            metadata,
            high_water: AtomicUsize::new(0),
            free_blocks: BlockList::default(),
            reusable_blocks: BlockList::default(),
            defrag: Defrag::new(total_blocks, options.defrag_headroom_percent),
            objects: ObjectTable::new(),
        })
    }

    pub fn start(&self) -> Address {
        self.start
    }

    pub fn extent(&self) -> usize {
        self.total_blocks << Block::LOG_BYTES
    }

    pub fn total_blocks(&self) -> usize {
        self.total_blocks
    }

    pub fn contains(&self, addr: Address) -> bool {
        addr >= self.start && addr < self.start + self.extent()
    }

    fn block_index(&self, block: Block) -> usize {
        debug_assert!(self.contains(block.start()));
        (block.start() - self.start) >> Block::LOG_BYTES
    }

    fn block_at(&self, index: usize) -> Block {
        Block::from_aligned_address(self.start + (index << Block::LOG_BYTES))
    }

    pub fn block_meta(&self, block: Block) -> &BlockMeta {
        self.metadata.get(self.block_index(block))
    }

    /// Blocks that have been carved from the reservation and are not in the free pool.
    pub fn allocated_blocks(&self) -> impl Iterator<Item = Block> + '_ {
        (0..self.high_water.load(Ordering::Acquire))
            .map(move |i| self.block_at(i))
            .filter(move |b| self.block_meta(*b).get_state() != BlockState::Unallocated)
    }

    /// Number of blocks that `get_clean_block` can still hand out.
    pub fn clean_blocks_available(&self) -> usize {
        self.free_blocks.len() + self.total_blocks - self.high_water.load(Ordering::Acquire)
    }

    /// Get a clean block from the free pool, or carve a new one from the reservation.
    pub fn get_clean_block(&self, copy: bool) -> Option<Block> {
        if copy && (self.defrag.space_exhausted() || !self.defrag.claim_clean_block()) {
            return None;
        }
        let block = self.free_blocks.pop().or_else(|| {
            self.high_water
                .fetch_update(Ordering::AcqRel, Ordering::Acquire, |hw| {
                    (hw < self.total_blocks).then_some(hw + 1)
                })
                .ok()
                .map(|index| self.block_at(index))
        })?;
        self.block_meta(block).init();
        Some(block)
    }

    /// Pop a reusable block. Evacuation candidates are never reused.
    pub fn get_reusable_block(&self) -> Option<Block> {
        loop {
            let block = self.reusable_blocks.pop()?;
            let meta = self.block_meta(block);
            if meta.get_state().is_reusable() && !meta.is_defrag_source() {
                return Some(block);
            }
        }
    }

    /// Return a block without live objects to the free pool.
    pub fn release_block(&self, block: Block) {
        trace!("Release {:?}", block);
        self.block_meta(block).deinit();
        #[cfg(feature = "immix_zero_on_release")]
        if let Err(e) = memory::release_pages(block.start(), Block::BYTES) {
            warn!("Failed to release the pages of {:?}: {}", block, e);
        }
        self.free_blocks.push(block);
    }

    /// Find the next hole at or after `search_start`, within the same block.
    pub fn get_next_available_lines(&self, search_start: Line) -> Option<Range<Line>> {
        let block = search_start.block();
        let meta = self.block_meta(block);
        let mut cursor = search_start.get_index_within_block();
        while cursor < Block::LINES && meta.line_count(cursor) != 0 {
            cursor += 1;
        }
        if cursor == Block::LINES {
            return None;
        }
        let start = cursor;
        while cursor < Block::LINES && meta.line_count(cursor) == 0 {
            cursor += 1;
        }
        let first = block.start_line();
        Some(first.next_nth(start)..first.next_nth(cursor))
    }

    /// Account for an object placed at `start`: set its VO bit and count it on every line it
    /// overlaps.
    fn post_alloc(&self, start: Address, size: usize) {
        let meta = self.block_meta(Block::from_unaligned_address(start));
        meta.vo_bits.set(start);
        for line in Line::lines_for_object(start, size) {
            meta.increment_line(line.get_index_within_block());
        }
    }

    /// Undo `post_alloc`.
    fn release_storage(&self, start: Address, size: usize) {
        let meta = self.block_meta(Block::from_unaligned_address(start));
        meta.vo_bits.clear(start);
        for line in Line::lines_for_object(start, size) {
            meta.decrement_line(line.get_index_within_block());
        }
    }

    /// Turn freshly allocated memory into an object. Returns `None` if the object table is full,
    /// in which case the memory stays free.
    pub fn initialize_object(
        &mut self,
        addr: Address,
        rtti: &'static TypeDescriptor,
    ) -> Option<(ObjectReference, HeapObject)> {
        let size = rtti.object_size();
        debug_assert!(
            Block::from_unaligned_address(addr)
                == Block::from_unaligned_address(addr + size - 1usize),
            "object at {} crosses a block boundary",
            addr
        );
        let reference = self.objects.insert(addr)?;
        memory::zero(addr, size);
        let object = unsafe { HeapObject::initialize(addr, rtti, reference.index()) };
        self.post_alloc(addr, size);
        Some((reference, object))
    }

    /// The object named by `r`, or `None` if the reference is stale.
    pub fn resolve(&self, r: ObjectReference) -> Option<HeapObject> {
        let addr = self.objects.resolve(r)?;
        debug_assert!(self.is_object_start(addr), "{:?} resolves to {}", r, addr);
        Some(unsafe { HeapObject::from_address(addr) })
    }

    /// Resolve the raw content of a reference slot.
    pub fn resolve_raw(&self, raw: u64) -> Option<HeapObject> {
        self.resolve(ObjectReference::from_raw(raw)?)
    }

    pub fn is_object_start(&self, addr: Address) -> bool {
        self.contains(addr) && self.block_meta(Block::from_unaligned_address(addr)).vo_bits.is_set(addr)
    }

    /// Reclaim the storage of a dead object. Every reference to it becomes stale.
    pub fn free_object(&mut self, object: HeapObject) {
        let size = object.size();
        trace!("Free {} ({} bytes)", object.to_address(), size);
        self.objects.remove(object.index());
        self.release_storage(object.to_address(), size);
    }

    pub fn live_objects(&self) -> usize {
        self.objects.live_objects()
    }

    pub fn object_table(&self) -> &ObjectTable {
        &self.objects
    }

    /// Objects currently in `block`.
    pub fn objects_in_block(&self, block: Block) -> impl Iterator<Item = HeapObject> + '_ {
        self.block_meta(block)
            .vo_bits
            .objects(block)
            .map(|addr| unsafe { HeapObject::from_address(addr) })
    }

    /// Move `object` to memory obtained from `copy`. The object keeps its reference. Returns
    /// false if there is no room, in which case the object stays where it is.
    pub fn evacuate_object(&self, object: HeapObject, copy: &mut ImmixAllocator) -> bool {
        debug_assert!(copy.is_copy());
        let size = object.size();
        let from = object.to_address();
        let Some(to) = copy.alloc(self, size) else {
            return false;
        };
        debug_assert!(!self.block_meta(Block::from_unaligned_address(to)).is_defrag_source());
        unsafe {
            std::ptr::copy_nonoverlapping(from.to_ptr::<u8>(), to.to_mut_ptr::<u8>(), size);
        }
        self.post_alloc(to, size);
        self.release_storage(from, size);
        self.objects.relocate(object.index(), to);
        trace!("Evacuated {} -> {} ({} bytes)", from, to, size);
        true
    }

    /// Decide whether this collection evacuates, and pick the candidate blocks.
    pub fn prepare(&self, requested: bool, emergency: bool, defrag_stress: bool) -> Vec<Block> {
        let in_defrag =
            self.defrag
                .decide_whether_to_defrag(self, requested, emergency, defrag_stress);
        self.defrag.prepare(self);
        if !in_defrag {
            return vec![];
        }
        let mut candidates = vec![];
        for block in self.reusable_blocks.get_blocks().iter() {
            let meta = self.block_meta(*block);
            if let BlockState::Reusable { unavailable_lines } = meta.get_state() {
                if self.defrag.is_candidate(unavailable_lines as usize) {
                    meta.set_as_defrag_source(true);
                    candidates.push(*block);
                }
            }
        }
        candidates.sort_by_key(|b| b.start());
        debug!(
            "Defrag: {} candidate blocks, spill threshold {} lines",
            candidates.len(),
            self.defrag.defrag_spill_threshold.load(Ordering::Relaxed)
        );
        candidates
    }

    /// Start a sweep. The reusable list is rebuilt by the sweepers.
    pub fn prepare_sweep(&self) {
        self.reusable_blocks.reset();
        self.defrag.reset_mark_histogram();
    }

    /// Finish a sweep.
    pub fn release(&self) {
        // Allocate from low addresses first.
        self.reusable_blocks
            .get_blocks()
            .sort_unstable_by(|a, b| b.start().cmp(&a.start()));
        self.defrag.release();
    }

    pub fn census(&self) -> BlockCensus {
        let mut census = BlockCensus {
            free: self.clean_blocks_available(),
            ..Default::default()
        };
        for block in self.allocated_blocks() {
            match self.block_meta(block).get_state() {
                BlockState::Unmarked => census.unswept += 1,
                BlockState::Full => census.full += 1,
                BlockState::Reusable { .. } => census.reusable += 1,
                BlockState::Unallocated => {}
            }
        }
        census
    }
}

impl Drop for ImmixSpace {
    fn drop(&mut self) {
        if let Err(e) = memory::try_munmap(self.start, self.extent()) {
            warn!("Failed to unmap the heap at {}: {}", self.start, e);
        }
    }
}
