use super::header::HEADER_BYTES;
use crate::util::constants::BYTES_IN_REFERENCE_SLOT;
use crate::util::conversions::object_size_align_up;

/// Static layout description of a managed type.
///
/// An object of this type is `size_in_bytes` long, starts with the collector's
/// [`ObjectHeader`](super::header::ObjectHeader), and has `reference_field_count`
/// reference slots immediately after the header, one word each, in declaration
/// order. Any bytes after the slots are opaque payload that the collector never scans.
///
/// Descriptors are expected to live in statics:
///
/// ```ignore
/// static PAIR: TypeDescriptor = TypeDescriptor::with_payload(2, 0);
/// ```
#[repr(C)]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct TypeDescriptor {
    size_in_bytes: usize,
    reference_field_count: usize,
}

impl TypeDescriptor {
    /// Describe a type of `size_in_bytes` bytes (header included) with `reference_field_count`
    /// reference slots.
    ///
    /// Panics (at compile time when used in a static) if the size cannot hold the header and
    /// the slots.
    pub const fn new(size_in_bytes: usize, reference_field_count: usize) -> Self {
        assert!(
            size_in_bytes >= HEADER_BYTES + reference_field_count * BYTES_IN_REFERENCE_SLOT,
            "type size cannot hold the object header and its reference slots"
        );
        TypeDescriptor {
            size_in_bytes,
            reference_field_count,
        }
    }

    /// Describe a type with `reference_field_count` slots followed by `payload_bytes` bytes of
    /// non-reference data.
    pub const fn with_payload(reference_field_count: usize, payload_bytes: usize) -> Self {
        Self::new(
            HEADER_BYTES + reference_field_count * BYTES_IN_REFERENCE_SLOT + payload_bytes,
            reference_field_count,
        )
    }

    /// The declared size, header included.
    pub const fn size_in_bytes(&self) -> usize {
        self.size_in_bytes
    }

    /// The number of reference slots the collector scans.
    pub const fn reference_field_count(&self) -> usize {
        self.reference_field_count
    }

    /// The number of bytes an object of this type occupies in the heap.
    pub const fn object_size(&self) -> usize {
        object_size_align_up(self.size_in_bytes)
    }

    /// Offset of the first payload byte from the object start.
    pub const fn payload_offset(&self) -> usize {
        HEADER_BYTES + self.reference_field_count * BYTES_IN_REFERENCE_SLOT
    }

    /// Number of declared payload bytes.
    pub const fn payload_bytes(&self) -> usize {
        self.size_in_bytes - self.payload_offset()
    }
}
