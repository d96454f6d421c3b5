//! Errors reported by the collector handle.
//!
//! `collect`, `write_barrier` and `destroy` never fail, so there are only three families
//! of errors: failing to create a handle, failing to allocate, and accessing an object
//! through a reference that no longer names a live object.

use std::fmt;
use std::io;

/// The environment could not provide the initial heap reservation, or the
/// options given to the builder are invalid. No handle is usable.
#[derive(Debug)]
pub enum InitError {
    /// mmap (or the equivalent) refused to reserve the heap.
    ReservationFailed(io::Error),
    /// The options describe a heap that cannot be built.
    InvalidOptions(String),
}

impl fmt::Display for InitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitError::ReservationFailed(e) => write!(f, "failed to reserve the heap: {}", e),
            InitError::InvalidOptions(msg) => write!(f, "invalid options: {}", msg),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::ReservationFailed(e) => Some(e),
            InitError::InvalidOptions(_) => None,
        }
    }
}

impl From<io::Error> for InitError {
    fn from(e: io::Error) -> Self {
        InitError::ReservationFailed(e)
    }
}

/// An allocation request could not be satisfied.
///
/// `OutOfMemory` is reported only after the handle has run an emergency collection
/// and retried. The caller may collect explicitly and retry, or abandon the operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationError {
    /// No block or line can hold the object and the block pool cannot grow.
    OutOfMemory,
    /// The object is larger than a block. There is no large object space.
    ObjectTooLarge { size: usize },
}

impl fmt::Display for AllocationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocationError::OutOfMemory => write!(f, "out of memory"),
            AllocationError::ObjectTooLarge { size } => {
                write!(f, "object of {} bytes does not fit in a block", size)
            }
        }
    }
}

impl std::error::Error for AllocationError {}

/// An object access was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessError {
    /// The reference names an object that has been reclaimed, or was never allocated
    /// by this handle.
    DeadObject,
    /// The slot index is not below the type's reference field count.
    SlotOutOfBounds { slot: usize, count: usize },
}

impl fmt::Display for AccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessError::DeadObject => write!(f, "reference to a dead or foreign object"),
            AccessError::SlotOutOfBounds { slot, count } => write!(
                f,
                "reference slot {} out of bounds for an object with {} reference fields",
                slot, count
            ),
        }
    }
}

impl std::error::Error for AccessError {}
