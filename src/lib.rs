//! A reference counting Immix memory manager.
//!
//! Objects live in 32 KiB blocks divided into 256 byte lines. Reference counts are maintained
//! lazily: the mutator announces writes with a write barrier, and each collection applies the
//! increments and decrements those writes imply. Objects whose count drops to zero are
//! reclaimed at once, garbage cycles are found by trial deletion, and sparse blocks are
//! evacuated so their memory can be reused.
//!
//! A client creates a handle with [`memory_manager::create`] (or an [`RCImmixBuilder`]),
//! allocates objects described by static [`TypeDescriptor`]s, and registers the objects it
//! holds outside the heap as roots:
//!
//! ```ignore
//! static NODE: TypeDescriptor = TypeDescriptor::new(HEADER_BYTES + 16, 2);
//!
//! let mut heap = memory_manager::create()?;
//! let a = heap.allocate(&NODE)?;
//! let b = heap.allocate(&NODE)?;
//! heap.add_root(a)?;
//! heap.write_reference(a, 0, Some(b))?;
//! heap.write_barrier(a);
//! heap.collect(0, 0);
//! assert!(heap.is_live(b));
//! ```

#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;

pub mod build_info;
pub mod memory_manager;
pub mod object;
pub mod plan;
pub mod policy;
mod rcimmix;
pub mod scheduler;
pub mod util;

pub use crate::object::{ObjectReference, TypeDescriptor, HEADER_BYTES};
pub use crate::plan::{CollectionMode, CollectionPhase};
pub use crate::rcimmix::{RCImmix, RCImmixBuilder};
pub use crate::util::error::{AccessError, AllocationError, InitError};
pub use crate::util::options::Options;
pub use crate::util::statistics::{CollectionStats, HeapStats};
pub use crate::util::Address;
