pub mod allocator;
pub mod immix_allocator;

pub use self::allocator::Allocator;
pub use self::immix_allocator::ImmixAllocator;
