use super::{
    block::{Block, BlockState},
    ImmixSpace,
};
use spin::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// Live lines binned by the number of live lines of their block.
pub type Histogram = [usize; Defrag::NUM_BINS];

pub struct Defrag {
    /// Is current GC a defrag GC?
    in_defrag_collection: AtomicBool,
    /// Is defrag space exhausted?
    defrag_space_exhausted: AtomicBool,
    /// Mark histogram of the last sweep, merged from all sweepers.
    mark_histogram: Mutex<Histogram>,
    spill_avail_histogram: Vec<AtomicUsize>,
    /// Blocks with at most this many live lines are evacuated. 0 selects none.
    pub defrag_spill_threshold: AtomicUsize,
    /// The number of clean blocks the current evacuation may still fill.
    available_clean_blocks_for_defrag: AtomicUsize,
    /// Maximum number of clean blocks one evacuation may fill.
    headroom_blocks: usize,
}

impl Defrag {
    pub const NUM_BINS: usize = Block::LINES + 1;
    const DEFRAG_LINE_REUSE_RATIO: f32 = 0.99;
    /// Blocks denser than this are never evacuated.
    const MAX_DEFRAG_DENSITY: usize = Block::LINES >> 1;

    pub fn new(total_blocks: usize, headroom_percent: usize) -> Self {
        Self {
            in_defrag_collection: AtomicBool::new(false),
            defrag_space_exhausted: AtomicBool::new(false),
            mark_histogram: Mutex::new(Self::new_histogram()),
            spill_avail_histogram: (0..Self::NUM_BINS).map(|_| Default::default()).collect(),
            defrag_spill_threshold: AtomicUsize::new(0),
            available_clean_blocks_for_defrag: AtomicUsize::new(0),
            headroom_blocks: (total_blocks * headroom_percent / 100).max(1),
        }
    }

    pub const fn new_histogram() -> Histogram {
        [0; Self::NUM_BINS]
    }

    /// Check if the current GC is a defrag GC.
    #[inline(always)]
    pub fn in_defrag(&self) -> bool {
        self.in_defrag_collection.load(Ordering::Acquire)
    }

    /// Determine whether the current GC should do defragmentation.
    ///
    /// Without an explicit request, evacuation runs when fewer than a quarter of the blocks are
    /// clean and the last sweep found blocks sparse enough to evacuate.
    pub fn decide_whether_to_defrag(
        &self,
        space: &ImmixSpace,
        requested: bool,
        emergency_collection: bool,
        defrag_stress: bool,
    ) -> bool {
        let fragmented = || {
            let sparse_lines: usize = self.mark_histogram.lock()[1..=Self::MAX_DEFRAG_DENSITY]
                .iter()
                .sum();
            sparse_lines > 0 && space.clean_blocks_available() < space.total_blocks() / 4
        };
        let in_defrag = requested || emergency_collection || defrag_stress || fragmented();
        self.in_defrag_collection
            .store(in_defrag, Ordering::Release);
        in_defrag
    }

    /// Check if the defrag space is exhausted.
    #[inline(always)]
    pub fn space_exhausted(&self) -> bool {
        self.defrag_space_exhausted.load(Ordering::Acquire)
    }

    /// Take one block of the copy reserve before a copying allocator acquires a clean block.
    /// Returns false if the reserve is used up.
    pub fn claim_clean_block(&self) -> bool {
        match self.available_clean_blocks_for_defrag.fetch_update(
            Ordering::AcqRel,
            Ordering::Acquire,
            |available| available.checked_sub(1),
        ) {
            Ok(available) => {
                if available == 1 {
                    self.defrag_space_exhausted.store(true, Ordering::Release);
                }
                true
            }
            Err(_) => {
                self.defrag_space_exhausted.store(true, Ordering::Release);
                false
            }
        }
    }

    /// Size the copy reserve and pick the spill threshold. Called once the defrag decision is made.
    pub fn prepare(&self, space: &ImmixSpace) {
        let available_clean_blocks = space.clean_blocks_available().min(self.headroom_blocks);
        self.available_clean_blocks_for_defrag
            .store(available_clean_blocks, Ordering::Release);
        self.defrag_space_exhausted
            .store(available_clean_blocks == 0, Ordering::Release);

        if self.in_defrag() {
            self.establish_defrag_spill_threshold(space, available_clean_blocks)
        } else {
            self.defrag_spill_threshold.store(0, Ordering::Release);
        }
    }

    /// Get the number of all the recyclable lines in all the reusable blocks.
    fn get_available_lines(&self, space: &ImmixSpace) -> usize {
        for entry in &self.spill_avail_histogram {
            entry.store(0, Ordering::Relaxed);
        }
        let mut total_available_lines = 0;
        for block in space.reusable_blocks.get_blocks().iter() {
            let unavailable_lines = match space.block_meta(*block).get_state() {
                BlockState::Reusable { unavailable_lines } => unavailable_lines as usize,
                s => unreachable!("{:?} {:?}", block, s),
            };
            let available_lines = Block::LINES - unavailable_lines;
            self.spill_avail_histogram[unavailable_lines]
                .fetch_add(available_lines, Ordering::Relaxed);
            total_available_lines += available_lines;
        }
        total_available_lines
    }

    /// Calculate the defrag threshold: the sparsest blocks are evacuated first, for as long as
    /// their live lines fit into the clean reserve and the free lines of the denser blocks.
    fn establish_defrag_spill_threshold(&self, space: &ImmixSpace, clean_blocks: usize) {
        let mut avail_lines = self.get_available_lines(space);
        let clean_lines = clean_blocks * Block::LINES;
        let mark_histogram = self.mark_histogram.lock();

        let mut required_lines = 0usize;
        let mut threshold = 0;
        for density in 1..=Self::MAX_DEFRAG_DENSITY {
            // Blocks of this density are now sources, so their free lines are no longer targets.
            avail_lines -= self.spill_avail_histogram[density].load(Ordering::Relaxed);
            required_lines += mark_histogram[density];
            let limit = ((clean_lines + avail_lines) as f32 * Self::DEFRAG_LINE_REUSE_RATIO) as usize;
            if required_lines > limit {
                break;
            }
            threshold = density;
        }
        trace!("Defrag spill threshold: {}", threshold);
        self.defrag_spill_threshold
            .store(threshold, Ordering::Release);
    }

    /// Should a reusable block with `live_lines` live lines be evacuated in this GC?
    pub fn is_candidate(&self, live_lines: usize) -> bool {
        self.in_defrag() && live_lines <= self.defrag_spill_threshold.load(Ordering::Acquire)
    }

    /// Start a new mark histogram for the coming sweep.
    pub fn reset_mark_histogram(&self) {
        *self.mark_histogram.lock() = Self::new_histogram();
    }

    /// Fold a sweeper's histogram into the global one.
    pub fn add_mark_histogram(&self, histogram: &Histogram) {
        let mut global = self.mark_histogram.lock();
        for (g, l) in global.iter_mut().zip(histogram.iter()) {
            *g += *l;
        }
    }

    /// Release work. Should be called in ImmixSpace::release.
    pub fn release(&self) {
        self.in_defrag_collection.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn copy_reserve_is_never_overrun() {
        let defrag = Defrag::new(1000, 10);
        defrag
            .available_clean_blocks_for_defrag
            .store(37, Ordering::Release);
        defrag.defrag_space_exhausted.store(false, Ordering::Release);
        let claimed = AtomicUsize::new(0);
        crossbeam::scope(|s| {
            for _ in 0..8 {
                s.spawn(|_| {
                    for _ in 0..20 {
                        if defrag.claim_clean_block() {
                            claimed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        })
        .unwrap();
        assert_eq!(claimed.load(Ordering::Relaxed), 37);
        assert!(defrag.space_exhausted());
        assert!(!defrag.claim_clean_block());
    }

    #[test]
    fn last_claim_exhausts_the_reserve() {
        let defrag = Defrag::new(100, 2);
        defrag
            .available_clean_blocks_for_defrag
            .store(2, Ordering::Release);
        defrag.defrag_space_exhausted.store(false, Ordering::Release);
        assert!(defrag.claim_clean_block());
        assert!(!defrag.space_exhausted());
        assert!(defrag.claim_clean_block());
        assert!(defrag.space_exhausted());
    }
}
