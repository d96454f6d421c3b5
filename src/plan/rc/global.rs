use super::barrier::{self, ObjectRememberingBarrier};
use super::counting::RefCounter;
use super::cycle::CycleCollector;
use crate::object::header::HeapObject;
use crate::plan::roots::RootSet;
use crate::policy::immix::gc_work::{EvacuateBlock, SweepChunk, SWEEP_CHUNK_BLOCKS};
use crate::policy::immix::ImmixSpace;
use crate::scheduler::{run_workers, GCWork, GCWorker, WorkBucket};
use crate::util::options::Options;
use crate::util::statistics::{CollectionStats, PhaseTimer};
use enum_map::Enum;
use std::collections::HashMap;
use std::ops::BitOr;
use strum_macros::{Display, EnumIter, IntoStaticStr};

/// The collector's state machine. Collections run Draining, Counting, Tracing, Evacuating and
/// Sweeping in that order, skipping Tracing and Evacuating when not needed, and end in Idle.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Enum, Display, EnumIter, IntoStaticStr,
)]
pub enum CollectionPhase {
    #[default]
    Idle,
    /// Retire old roots, count current roots, scan new and modified objects.
    Draining,
    /// Apply decrements, reclaiming objects whose count drops to zero.
    Counting,
    /// Trial deletion of cycle candidates.
    Tracing,
    /// Copy live objects out of sparse blocks.
    Evacuating,
    /// Classify blocks from their line counts.
    Sweeping,
}

/// The `mode_flag` argument of `collect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CollectionMode(u32);

impl CollectionMode {
    /// Let the collector decide.
    pub const DEFAULT: CollectionMode = CollectionMode(0);
    /// Evacuate sparse blocks.
    pub const EVACUATE: CollectionMode = CollectionMode(0b01);
    /// Run trial deletion over all cycle candidates.
    pub const CYCLE_COLLECT: CollectionMode = CollectionMode(0b10);

    const ALL: u32 = 0b11;

    /// Decode a mode flag. Unknown bits are ignored.
    pub fn from_bits(bits: u32) -> CollectionMode {
        if bits & !Self::ALL != 0 {
            debug!("Ignoring unknown collection mode bits {:#x}", bits & !Self::ALL);
        }
        CollectionMode(bits & Self::ALL)
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn contains(self, other: CollectionMode) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for CollectionMode {
    type Output = CollectionMode;

    fn bitor(self, rhs: Self) -> Self {
        CollectionMode(self.0 | rhs.0)
    }
}

/// The reference-counting immix plan: the write barrier, the deferred counts and the cycle
/// backstop over an [`ImmixSpace`].
#[derive(Default)]
pub struct RCImmixPlan {
    pub barrier: ObjectRememberingBarrier,
    pub rc: RefCounter,
    pub cycles: CycleCollector,
    phase: CollectionPhase,
    collections: usize,
}

impl RCImmixPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> CollectionPhase {
        self.phase
    }

    pub fn collections(&self) -> usize {
        self.collections
    }

    fn set_phase(
        &mut self,
        phase: CollectionPhase,
        timer: &mut PhaseTimer,
        stats: &mut CollectionStats,
    ) {
        timer.switch(phase, stats);
        self.phase = phase;
    }

    /// Run one stop-the-world collection. The mutator's allocation buffers must have been reset.
    pub fn collect(
        &mut self,
        space: &mut ImmixSpace,
        roots: &RootSet,
        options: &Options,
        mode: CollectionMode,
        workers: usize,
        emergency: bool,
    ) -> CollectionStats {
        self.collections += 1;
        let workers = if workers == 0 { options.threads } else { workers };
        let mut stats = CollectionStats {
            collection: self.collections,
            emergency,
            workers,
            ..Default::default()
        };
        debug!(
            "GC #{} start: mode={:?}, workers={}, emergency={}, roots={}",
            self.collections,
            mode,
            workers,
            emergency,
            roots.len()
        );
        let mut timer = PhaseTimer::start(CollectionPhase::Draining);
        self.phase = CollectionPhase::Draining;

        // Candidates are chosen from the previous sweep, before any line counts change.
        let candidates = space.prepare(
            mode.contains(CollectionMode::EVACUATE),
            emergency,
            options.defrag_stress,
        );
        stats.defragmented = !candidates.is_empty();
        stats.evacuation_candidates = candidates.len();

        self.rc.counters = Default::default();
        self.rc.process_roots(space, roots);
        self.rc.process_new_objects(space, emergency);
        let modbuf = self.barrier.flush();
        barrier::process_modified_objects(space, modbuf, &mut self.rc);

        self.set_phase(CollectionPhase::Counting, &mut timer, &mut stats);
        self.rc.process_decrements(space, &mut self.cycles);

        let threshold = options.cycle_collect_threshold;
        let run_backstop = mode.contains(CollectionMode::CYCLE_COLLECT)
            || emergency
            || (threshold > 0 && self.cycles.candidates() >= threshold);
        if run_backstop {
            self.set_phase(CollectionPhase::Tracing, &mut timer, &mut stats);
            stats.cycle_collected = true;
            stats.cycle_objects_reclaimed = self.cycles.collect_cycles(space);
            stats.bytes_reclaimed += self.cycles.bytes_reclaimed;
        } else {
            self.cycles.prune(space);
        }

        let space: &ImmixSpace = space;
        if !candidates.is_empty() {
            self.set_phase(CollectionPhase::Evacuating, &mut timer, &mut stats);
            let bucket = WorkBucket::new();
            bucket.bulk_add(
                candidates
                    .into_iter()
                    .map(|block| Box::new(EvacuateBlock { block }) as Box<dyn GCWork>)
                    .collect(),
            );
            let done = run_workers(space, &bucket, workers);
            merge_worker_stats(&done, &mut stats);
        }

        self.set_phase(CollectionPhase::Sweeping, &mut timer, &mut stats);
        self.sweep(space, options, workers, &mut stats);

        let counters = self.rc.counters;
        stats.increments = counters.increments;
        stats.decrements = counters.decrements;
        stats.objects_reclaimed = counters.objects_reclaimed;
        stats.bytes_reclaimed += counters.bytes_reclaimed;

        self.phase = CollectionPhase::Idle;
        timer.finish(&mut stats);
        info!("{}", stats);

        #[cfg(feature = "extreme_assertions")]
        if let Err(e) = self.verify_reference_counts(space) {
            panic!("Heap verification failed after GC #{}: {}", self.collections, e);
        }
        stats
    }

    fn sweep(
        &self,
        space: &ImmixSpace,
        options: &Options,
        workers: usize,
        stats: &mut CollectionStats,
    ) {
        space.prepare_sweep();
        let blocks: Vec<_> = space.allocated_blocks().collect();
        let threads = if blocks.len() >= options.parallel_sweep_min_blocks {
            workers
        } else {
            1
        };
        let bucket = WorkBucket::new();
        for chunk in blocks.chunks(SWEEP_CHUNK_BLOCKS) {
            bucket.add(SweepChunk {
                blocks: chunk.to_vec(),
            });
        }
        let done = run_workers(space, &bucket, threads);
        for worker in &done {
            space.defrag.add_mark_histogram(&worker.mark_histogram);
        }
        merge_worker_stats(&done, stats);
        space.release();
    }

    /// Check that every live object's count equals the number of references to it from heap
    /// slots and counted roots, plus its initial count if it is still pending. Only meaningful
    /// right after a collection, before the mutator writes again.
    pub fn verify_reference_counts(&self, space: &ImmixSpace) -> Result<(), String> {
        let mut expected: HashMap<u32, u32> = HashMap::new();
        let table = space.object_table();
        for (_, addr) in table.iter_live() {
            let object = unsafe { HeapObject::from_address(addr) };
            for raw in object.children() {
                let child = space
                    .resolve_raw(raw)
                    .ok_or_else(|| format!("{} refers to dead object {:#x}", addr, raw))?;
                *expected.entry(child.index()).or_default() += 1;
            }
        }
        for r in self.rc.old_roots().iter().chain(self.rc.pending_baselines()) {
            let object = space
                .resolve(*r)
                .ok_or_else(|| format!("counted reference {:?} is dead", r))?;
            *expected.entry(object.index()).or_default() += 1;
        }
        for (reference, addr) in table.iter_live() {
            let object = unsafe { HeapObject::from_address(addr) };
            let want = expected.get(&object.index()).copied().unwrap_or(0);
            if object.rc() != want || want == 0 {
                return Err(format!(
                    "{:?} at {} has count {}, expected {}",
                    reference,
                    addr,
                    object.rc(),
                    want
                ));
            }
        }
        Ok(())
    }
}

fn merge_worker_stats(workers: &[GCWorker], stats: &mut CollectionStats) {
    for worker in workers {
        stats.objects_evacuated += worker.stat.objects_evacuated;
        stats.bytes_evacuated += worker.stat.bytes_evacuated;
        stats.evacuation_failures += worker.stat.evacuation_failures;
        stats.blocks_swept += worker.stat.blocks_swept;
        stats.blocks_released += worker.stat.blocks_released;
    }
}
