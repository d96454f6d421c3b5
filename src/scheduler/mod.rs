//! Parallel execution of the sweep and evacuation phases.
//!
//! A phase fills a [`WorkBucket`] with packets and drains it with a group of scoped worker
//! threads. Each worker keeps its own copy allocator and sweep histogram, which the collector
//! merges once the bucket is empty.

mod work;
pub use work::GCWork;

mod work_bucket;
pub use work_bucket::WorkBucket;

mod worker;
pub use worker::{run_workers, GCWorker, WorkerLocalStat};
