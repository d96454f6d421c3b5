use super::work_bucket::WorkBucket;
use crate::policy::immix::defrag::{Defrag, Histogram};
use crate::policy::immix::ImmixSpace;
use crate::util::alloc::ImmixAllocator;
use crossbeam::deque::Worker;
use std::time::Duration;

/// Counters a worker accumulates while executing packets.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerLocalStat {
    pub packets: usize,
    pub busy: Duration,
    pub objects_evacuated: usize,
    pub bytes_evacuated: usize,
    /// Objects left in place because the copy reserve ran out.
    pub evacuation_failures: usize,
    pub blocks_swept: usize,
    pub blocks_released: usize,
}

/// A GC worker and its thread-local state.
pub struct GCWorker {
    pub ordinal: usize,
    /// Copy allocator used when evacuating.
    pub copy: ImmixAllocator,
    /// Mark histogram of the blocks this worker swept.
    pub mark_histogram: Histogram,
    pub stat: WorkerLocalStat,
}

impl GCWorker {
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            copy: ImmixAllocator::new(true),
            mark_histogram: Defrag::new_histogram(),
            stat: Default::default(),
        }
    }

    /// Execute packets until the bucket is drained.
    fn run(&mut self, bucket: &WorkBucket, space: &ImmixSpace) {
        let local = Worker::new_fifo();
        while let Some(mut work) = bucket.poll(&local) {
            work.do_work_with_stat(self, space);
        }
        trace!("Worker {} done: {:?}", self.ordinal, self.stat);
    }
}

/// Drain `bucket` with `threads` workers and return their final state.
///
/// With one thread the packets run on the calling thread. Otherwise workers are scoped
/// threads that finish before this returns. Packets must not add work to the bucket.
pub fn run_workers(space: &ImmixSpace, bucket: &WorkBucket, threads: usize) -> Vec<GCWorker> {
    let threads = threads.clamp(1, bucket.len().max(1));
    if threads == 1 {
        let mut worker = GCWorker::new(0);
        worker.run(bucket, space);
        return vec![worker];
    }
    let result = crossbeam::scope(|s| {
        let handles: Vec<_> = (0..threads)
            .map(|ordinal| {
                s.spawn(move |_| {
                    let mut worker = GCWorker::new(ordinal);
                    worker.run(bucket, space);
                    worker
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or_else(|e| std::panic::resume_unwind(e)))
            .collect::<Vec<_>>()
    });
    result.unwrap_or_else(|e| std::panic::resume_unwind(e))
}
