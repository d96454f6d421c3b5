//! The collector handle.

use crate::object::header::HeapObject;
use crate::object::{ObjectReference, TypeDescriptor};
use crate::plan::{CollectionMode, CollectionPhase, RCImmixPlan, RootSet};
use crate::policy::immix::block::Block;
use crate::policy::immix::ImmixSpace;
use crate::util::alloc::{Allocator, ImmixAllocator};
use crate::util::error::{AccessError, AllocationError, InitError};
use crate::util::linear_scan::Region;
use crate::util::options::Options;
use crate::util::statistics::{CollectionStats, HeapStats};
use crate::util::Address;

/// Builds a collector handle from options.
///
/// ```ignore
/// let mut builder = RCImmixBuilder::new();
/// builder.set_option("heap_size", "16777216");
/// let handle = builder.build()?;
/// ```
pub struct RCImmixBuilder {
    /// The options for this instance.
    pub options: Options,
}

impl RCImmixBuilder {
    /// Create a builder with options read from the environment.
    pub fn new() -> Self {
        RCImmixBuilder {
            options: Options::default(),
        }
    }

    /// Create a builder with the built-in defaults, ignoring the environment.
    pub fn new_no_env_vars() -> Self {
        RCImmixBuilder {
            options: Options::without_env(),
        }
    }

    /// Set an option by name. Returns false if the option is unknown or the value is invalid.
    pub fn set_option(&mut self, name: &str, val: &str) -> bool {
        self.options.set_from_str(name, val)
    }

    /// Reserve the heap and create a handle.
    pub fn build(&self) -> Result<Box<RCImmix>, InitError> {
        match crate::util::logger::try_init() {
            Ok(_) => debug!("rcimmix initialized the logger."),
            Err(_) => debug!("rcimmix failed to initialize the logger. Possibly a logger has been initialized by user."),
        }
        self.options
            .validate()
            .map_err(InitError::InvalidOptions)?;
        let space = ImmixSpace::new(&self.options)?;
        info!(
            "Created a heap of {} blocks ({} bytes) at {}",
            space.total_blocks(),
            space.extent(),
            space.start()
        );
        Ok(Box::new(RCImmix {
            options: self.options.clone(),
            space,
            allocator: ImmixAllocator::new(false),
            plan: RCImmixPlan::new(),
            roots: RootSet::default(),
            last_stats: None,
        }))
    }
}

impl Default for RCImmixBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// An independent reference-counting immix heap.
///
/// Every operation goes through `&mut self` or `&self`, so one handle is used by one thread at
/// a time. Handles share nothing. Dropping a handle unmaps its heap without running anything
/// on the objects in it.
pub struct RCImmix {
    pub(crate) options: Options,
    space: ImmixSpace,
    allocator: ImmixAllocator,
    plan: RCImmixPlan,
    roots: RootSet,
    last_stats: Option<CollectionStats>,
}

impl RCImmix {
    pub fn options(&self) -> &Options {
        &self.options
    }

    fn resolve(&self, object: ObjectReference) -> Result<HeapObject, AccessError> {
        self.space.resolve(object).ok_or(AccessError::DeadObject)
    }

    /// Allocate a zeroed object of type `rtti`.
    ///
    /// The object starts out alive, and stays alive until the first collection that runs
    /// after it was allocated. To survive that collection, it has to be reachable from a root
    /// or from a surviving object.
    pub fn allocate(
        &mut self,
        rtti: &'static TypeDescriptor,
    ) -> Result<ObjectReference, AllocationError> {
        let size = rtti.object_size();
        if size > Block::BYTES {
            return Err(AllocationError::ObjectTooLarge { size });
        }
        let addr = match self.allocator.alloc(&self.space, size) {
            Some(addr) => addr,
            None => {
                info!("Heap exhausted allocating {} bytes, collecting", size);
                self.collect_internal(CollectionMode::EVACUATE | CollectionMode::CYCLE_COLLECT, 0, true);
                self.allocator
                    .alloc(&self.space, size)
                    .ok_or(AllocationError::OutOfMemory)?
            }
        };
        let (reference, _) = self
            .space
            .initialize_object(addr, rtti)
            .ok_or(AllocationError::OutOfMemory)?;
        self.plan.rc.on_alloc(reference);
        trace!("Allocated {:?} at {} ({} bytes)", reference, addr, size);
        Ok(reference)
    }

    /// Read reference slot `slot` of `object`.
    pub fn read_reference(
        &self,
        object: ObjectReference,
        slot: usize,
    ) -> Result<Option<ObjectReference>, AccessError> {
        let o = self.resolve(object)?;
        check_slot(o, slot)?;
        Ok(ObjectReference::from_raw(o.load_slot(slot)))
    }

    /// Store `value` into reference slot `slot` of `object`.
    ///
    /// The first store into an object that survived a collection must be followed by
    /// [`write_barrier`](Self::write_barrier) before the next collection.
    pub fn write_reference(
        &mut self,
        object: ObjectReference,
        slot: usize,
        value: Option<ObjectReference>,
    ) -> Result<(), AccessError> {
        let o = self.resolve(object)?;
        check_slot(o, slot)?;
        if let Some(value) = value {
            self.resolve(value)?;
        }
        self.plan.barrier.object_reference_write_pre(o, object);
        o.store_slot(slot, value.map_or(0, ObjectReference::to_raw));
        Ok(())
    }

    /// Tell the collector that `object` was written. Calling this more than once, or for an
    /// object that was not written, has no effect.
    pub fn write_barrier(&mut self, object: ObjectReference) {
        match self.space.resolve(object) {
            Some(o) => self.plan.barrier.object_reference_write_post(o, object),
            None => debug!("Write barrier on dead object {:?}", object),
        }
    }

    /// Whether the write barrier has remembered `write_barrier_collect_threshold` objects since
    /// the last collection. The handle never collects on its own for this; the mutator decides
    /// when to call [`collect`](Self::collect).
    pub fn collection_due(&self) -> bool {
        let threshold = self.options.write_barrier_collect_threshold;
        threshold > 0 && self.plan.barrier.remembered_objects() >= threshold
    }

    /// Register `object` as a root. Registrations are counted.
    pub fn add_root(&mut self, object: ObjectReference) -> Result<(), AccessError> {
        self.resolve(object)?;
        self.roots.add(object);
        Ok(())
    }

    /// Remove one registration of `object`. Returns false if it was not registered.
    pub fn remove_root(&mut self, object: ObjectReference) -> bool {
        self.roots.remove(object)
    }

    /// Run a collection. `mode_flag` is a combination of [`CollectionMode`] bits (0 lets the
    /// collector decide), `worker_flag` the number of threads for the parallel phases (0 uses
    /// the `threads` option).
    pub fn collect(&mut self, mode_flag: u32, worker_flag: u32) {
        self.collect_internal(
            CollectionMode::from_bits(mode_flag),
            worker_flag as usize,
            false,
        );
    }

    fn collect_internal(&mut self, mode: CollectionMode, workers: usize, emergency: bool) {
        self.allocator.reset();
        let stats = self.plan.collect(
            &mut self.space,
            &self.roots,
            &self.options,
            mode,
            workers,
            emergency,
        );
        self.last_stats = Some(stats);
    }

    /// The opaque bytes after the reference slots.
    pub fn payload(&self, object: ObjectReference) -> Result<&[u8], AccessError> {
        let (start, len) = self.resolve(object)?.payload_range();
        Ok(unsafe { std::slice::from_raw_parts(start.to_ptr::<u8>(), len) })
    }

    pub fn payload_mut(&mut self, object: ObjectReference) -> Result<&mut [u8], AccessError> {
        let (start, len) = self.resolve(object)?.payload_range();
        Ok(unsafe { std::slice::from_raw_parts_mut(start.to_mut_ptr::<u8>(), len) })
    }

    pub fn is_live(&self, object: ObjectReference) -> bool {
        self.space.resolve(object).is_some()
    }

    /// The object's current count: references from heap slots and from the roots counted at
    /// the last collection, plus one until its first collection.
    pub fn reference_count(&self, object: ObjectReference) -> Result<u32, AccessError> {
        Ok(self.resolve(object)?.rc())
    }

    /// Where the object currently lives. Evacuation may change it; the reference stays valid.
    pub fn object_address(&self, object: ObjectReference) -> Result<Address, AccessError> {
        Ok(self.resolve(object)?.to_address())
    }

    pub fn type_descriptor(
        &self,
        object: ObjectReference,
    ) -> Result<&'static TypeDescriptor, AccessError> {
        Ok(self.resolve(object)?.rtti())
    }

    pub fn heap_stats(&self) -> HeapStats {
        let census = self.space.census();
        HeapStats {
            live_objects: self.space.live_objects(),
            total_blocks: self.space.total_blocks(),
            free_blocks: census.free,
            reusable_blocks: census.reusable,
            full_blocks: census.full,
            unswept_blocks: census.unswept,
            collections: self.plan.collections(),
        }
    }

    /// Statistics of the last collection, if any.
    pub fn last_collection_stats(&self) -> Option<&CollectionStats> {
        self.last_stats.as_ref()
    }

    /// Always [`CollectionPhase::Idle`] outside of `collect`.
    pub fn phase(&self) -> CollectionPhase {
        self.plan.phase()
    }

    /// Check every live object's count against the references to it. Only meaningful right
    /// after `collect`, before the mutator writes again.
    pub fn verify_reference_counts(&self) -> Result<(), String> {
        self.plan.verify_reference_counts(&self.space)
    }
}

fn check_slot(object: HeapObject, slot: usize) -> Result<(), AccessError> {
    let count = object.slot_count();
    if slot < count {
        Ok(())
    } else {
        Err(AccessError::SlotOutOfBounds { slot, count })
    }
}

impl Drop for RCImmix {
    fn drop(&mut self) {
        debug!(
            "Destroying a heap with {} live objects after {} collections",
            self.space.live_objects(),
            self.plan.collections()
        );
    }
}
