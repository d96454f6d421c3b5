use super::work::GCWork;
use crossbeam::deque::{Injector, Steal, Worker};

/// A queue of work packets shared by all workers.
pub struct WorkBucket {
    queue: Injector<Box<dyn GCWork>>,
}

impl WorkBucket {
    pub fn new() -> Self {
        Self {
            queue: Injector::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Add a work packet to this bucket
    pub fn add<W: GCWork + 'static>(&self, work: W) {
        self.queue.push(Box::new(work));
    }

    /// Add multiple packets
    pub fn bulk_add(&self, work_vec: Vec<Box<dyn GCWork>>) {
        for work in work_vec {
            self.queue.push(work);
        }
    }

    /// Get a work packet, moving a batch into the worker's local queue.
    pub fn poll(&self, worker: &Worker<Box<dyn GCWork>>) -> Option<Box<dyn GCWork>> {
        worker.pop().or_else(|| loop {
            match self.queue.steal_batch_and_pop(worker) {
                Steal::Success(work) => break Some(work),
                Steal::Empty => break None,
                Steal::Retry => continue,
            }
        })
    }
}

impl Default for WorkBucket {
    fn default() -> Self {
        Self::new()
    }
}
