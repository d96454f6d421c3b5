use super::block::Block;
use super::ImmixSpace;
use crate::scheduler::{GCWork, GCWorker};

/// Number of blocks a sweep packet covers.
pub const SWEEP_CHUNK_BLOCKS: usize = 32;

/// Sweep a run of blocks.
pub struct SweepChunk {
    pub blocks: Vec<Block>,
}

impl GCWork for SweepChunk {
    fn do_work(&mut self, worker: &mut GCWorker, space: &ImmixSpace) {
        for block in &self.blocks {
            worker.stat.blocks_swept += 1;
            if block.sweep(space, &mut worker.mark_histogram) {
                worker.stat.blocks_released += 1;
            }
        }
    }
}

/// Evacuate the objects of one candidate block.
pub struct EvacuateBlock {
    pub block: Block,
}

impl GCWork for EvacuateBlock {
    fn do_work(&mut self, worker: &mut GCWorker, space: &ImmixSpace) {
        debug_assert!(space.block_meta(self.block).is_defrag_source());
        // Collect first: moving an object clears its VO bit under the iterator.
        let objects: Vec<_> = space.objects_in_block(self.block).collect();
        for object in objects {
            let size = object.size();
            if space.evacuate_object(object, &mut worker.copy) {
                worker.stat.objects_evacuated += 1;
                worker.stat.bytes_evacuated += size;
            } else {
                worker.stat.evacuation_failures += 1;
            }
        }
    }
}
