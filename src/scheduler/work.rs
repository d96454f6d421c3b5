use super::worker::GCWorker;
use crate::policy::immix::ImmixSpace;
use std::time::Instant;

/// A packet of collection work that any worker may execute.
pub trait GCWork: Send {
    fn do_work(&mut self, worker: &mut GCWorker, space: &ImmixSpace);

    fn do_work_with_stat(&mut self, worker: &mut GCWorker, space: &ImmixSpace) {
        let start = Instant::now();
        self.do_work(worker, space);
        worker.stat.packets += 1;
        worker.stat.busy += start.elapsed();
    }
}
