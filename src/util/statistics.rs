use crate::plan::CollectionPhase;
use enum_map::EnumMap;
use std::fmt;
use std::time::{Duration, Instant};
use strum::IntoEnumIterator;

/// What one collection did.
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    /// Sequence number, starting at 1.
    pub collection: usize,
    /// Run by the allocator after it ran out of space.
    pub emergency: bool,
    pub workers: usize,
    pub cycle_collected: bool,
    pub defragmented: bool,
    pub increments: usize,
    pub decrements: usize,
    /// Objects whose count dropped to zero.
    pub objects_reclaimed: usize,
    /// Objects reclaimed as members of garbage cycles.
    pub cycle_objects_reclaimed: usize,
    pub bytes_reclaimed: usize,
    pub evacuation_candidates: usize,
    pub objects_evacuated: usize,
    pub bytes_evacuated: usize,
    pub evacuation_failures: usize,
    pub blocks_swept: usize,
    pub blocks_released: usize,
    pub phase_times: EnumMap<CollectionPhase, Duration>,
    pub total_time: Duration,
}

impl fmt::Display for CollectionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "GC #{}{}: {} reclaimed ({} in cycles, {} bytes), {} evacuated, {}/{} blocks released, {:?}",
            self.collection,
            if self.emergency { " (emergency)" } else { "" },
            self.objects_reclaimed + self.cycle_objects_reclaimed,
            self.cycle_objects_reclaimed,
            self.bytes_reclaimed,
            self.objects_evacuated,
            self.blocks_released,
            self.blocks_swept,
            self.total_time,
        )?;
        for phase in CollectionPhase::iter().filter(|p| *p != CollectionPhase::Idle) {
            write!(f, " {}={:?}", phase, self.phase_times[phase])?;
        }
        Ok(())
    }
}

/// A snapshot of the heap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
    pub live_objects: usize,
    pub total_blocks: usize,
    /// Blocks in the free pool or never used.
    pub free_blocks: usize,
    pub reusable_blocks: usize,
    pub full_blocks: usize,
    /// Blocks in use that have not been swept since they were handed to an allocator.
    pub unswept_blocks: usize,
    pub collections: usize,
}

/// Attributes wall-clock time to the phases of a collection.
pub struct PhaseTimer {
    phase: CollectionPhase,
    start: Instant,
    begin: Instant,
}

impl PhaseTimer {
    pub fn start(phase: CollectionPhase) -> Self {
        let now = Instant::now();
        PhaseTimer {
            phase,
            start: now,
            begin: now,
        }
    }

    /// End the current phase and start `next`.
    pub fn switch(&mut self, next: CollectionPhase, stats: &mut CollectionStats) {
        let now = Instant::now();
        stats.phase_times[self.phase] += now - self.start;
        trace!("{} -> {}", self.phase, next);
        self.phase = next;
        self.start = now;
    }

    /// End the current phase and the collection.
    pub fn finish(self, stats: &mut CollectionStats) {
        let now = Instant::now();
        stats.phase_times[self.phase] += now - self.start;
        stats.total_time = now - self.begin;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_times_add_up() {
        let mut stats = CollectionStats::default();
        let mut timer = PhaseTimer::start(CollectionPhase::Draining);
        std::thread::sleep(Duration::from_millis(2));
        timer.switch(CollectionPhase::Sweeping, &mut stats);
        timer.finish(&mut stats);
        assert!(stats.phase_times[CollectionPhase::Draining] >= Duration::from_millis(2));
        let sum: Duration = stats.phase_times.values().sum();
        assert!(sum <= stats.total_time);
    }

    #[test]
    fn display_lists_phases() {
        let stats = CollectionStats {
            collection: 3,
            ..Default::default()
        };
        let s = stats.to_string();
        assert!(s.starts_with("GC #3:"));
        assert!(s.contains("Counting="));
        assert!(!s.contains("Idle="));
    }
}
