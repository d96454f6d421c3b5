//! The entry points of a collector handle as free functions.
//!
//! Each function forwards to the method of the same name on [`RCImmix`]. A client that keeps
//! the handle behind a raw pointer (for example across an FFI boundary) can call these
//! without naming the handle's methods.

use crate::object::{ObjectReference, TypeDescriptor};
use crate::rcimmix::{RCImmix, RCImmixBuilder};
use crate::util::error::{AccessError, AllocationError, InitError};

/// Create a handle with the default options, overridden by `RCIMMIX_*` environment variables.
///
/// This attempts to initialize a logger. A client that wants its own logger should install it
/// before calling this.
pub fn create() -> Result<Box<RCImmix>, InitError> {
    create_with_builder(&RCImmixBuilder::new())
}

/// Create a handle from the options of `builder`.
pub fn create_with_builder(builder: &RCImmixBuilder) -> Result<Box<RCImmix>, InitError> {
    builder.build()
}

/// Release the heap of `handle` and all its metadata. No finalization runs. Every reference
/// obtained from the handle becomes meaningless.
pub fn destroy(handle: Box<RCImmix>) {
    drop(handle)
}

/// Allocate a zeroed object of type `rtti`. Runs an emergency collection before reporting
/// [`AllocationError::OutOfMemory`].
///
/// Arguments:
/// * `handle`: The heap to allocate in.
/// * `rtti`: The type of the object.
pub fn allocate(
    handle: &mut RCImmix,
    rtti: &'static TypeDescriptor,
) -> Result<ObjectReference, AllocationError> {
    handle.allocate(rtti)
}

/// Announce that reference fields of `object` were written since the last collection.
/// Idempotent.
pub fn write_barrier(handle: &mut RCImmix, object: ObjectReference) {
    handle.write_barrier(object)
}

/// Whether enough objects went through the write barrier since the last collection that the
/// mutator should collect (see the `write_barrier_collect_threshold` option).
pub fn collection_due(handle: &RCImmix) -> bool {
    handle.collection_due()
}

/// Run a stop-the-world collection.
///
/// Arguments:
/// * `mode_flag`: A combination of [`crate::CollectionMode`] bits. 0 lets the collector decide
///   whether to evacuate and whether to run the cycle backstop.
/// * `worker_flag`: The number of threads for evacuation and sweeping. 0 uses the `threads`
///   option.
pub fn collect(handle: &mut RCImmix, mode_flag: u32, worker_flag: u32) {
    handle.collect(mode_flag, worker_flag)
}

/// Load reference slot `slot` of `object`.
pub fn read_reference(
    handle: &RCImmix,
    object: ObjectReference,
    slot: usize,
) -> Result<Option<ObjectReference>, AccessError> {
    handle.read_reference(object, slot)
}

/// Store `value` into reference slot `slot` of `object`. The caller still has to call
/// [`write_barrier`] on `object` before the next collection.
pub fn write_reference(
    handle: &mut RCImmix,
    object: ObjectReference,
    slot: usize,
    value: Option<ObjectReference>,
) -> Result<(), AccessError> {
    handle.write_reference(object, slot, value)
}

pub fn add_root(handle: &mut RCImmix, object: ObjectReference) -> Result<(), AccessError> {
    handle.add_root(object)
}

pub fn remove_root(handle: &mut RCImmix, object: ObjectReference) -> bool {
    handle.remove_root(object)
}
