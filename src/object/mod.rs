//! The object model: type descriptors, the object header, and the relocatable references the
//! mutator holds.
//!
//! Object layout, from the object start:
//!
//! ```text
//! +--------------------+----------------------------+------------------+
//! | ObjectHeader (24B) | reference slots (8B each)  | opaque payload   |
//! +--------------------+----------------------------+------------------+
//! ```

pub mod descriptor;
pub mod header;
pub mod reference;
pub mod table;

pub use self::descriptor::TypeDescriptor;
pub use self::header::HEADER_BYTES;
pub use self::reference::ObjectReference;
