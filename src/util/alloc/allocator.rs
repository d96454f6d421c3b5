use crate::policy::immix::ImmixSpace;
use crate::util::constants::MIN_OBJECT_ALIGNMENT;
use crate::util::Address;

/// Round `region` up to the object alignment.
#[inline(always)]
pub fn align_allocation(region: Address) -> Address {
    region.align_up(MIN_OBJECT_ALIGNMENT)
}

/// A thread-local allocator carving objects out of an [`ImmixSpace`].
///
/// Allocators never hold on to the space. It is passed to each call, so that one space can
/// serve the mutator's allocator and the copy allocators of the GC workers.
pub trait Allocator {
    /// Allocate `size` bytes. `size` must be a multiple of the object alignment.
    /// Returns `None` if the space has no room.
    fn alloc(&mut self, space: &ImmixSpace, size: usize) -> Option<Address>;

    /// Slow path, taken when the current buffer cannot hold the request.
    fn alloc_slow(&mut self, space: &ImmixSpace, size: usize) -> Option<Address>;

    /// Drop the current buffers. The unused parts of them stay free.
    fn reset(&mut self);
}
