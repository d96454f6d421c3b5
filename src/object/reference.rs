use std::fmt;
use std::num::NonZeroU64;

/// A reference to a managed object.
///
/// The reference names an entry of the handle's object table rather than an address, so it
/// stays valid when the collector moves the object. Each table entry carries a generation that
/// is bumped when its object is reclaimed, so a reference kept past the death of its object is
/// reported as dead instead of aliasing whatever reuses the entry. The reference also carries
/// the id of the handle that allocated it, and other handles treat it as dead.
///
/// Encoding: bits 48..64 hold the handle id, bits 32..48 the generation, bits 0..32 the index.
///
/// In a reference slot, a reference is stored as its [`to_raw`](ObjectReference::to_raw) encoding
/// and null is stored as 0.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, Hash, PartialEq, PartialOrd, Ord)]
pub struct ObjectReference(NonZeroU64);

impl ObjectReference {
    pub(crate) fn new(heap: u16, index: u32, generation: u16) -> ObjectReference {
        debug_assert!(index != 0, "table index 0 is reserved");
        let raw = ((heap as u64) << 48) | ((generation as u64) << 32) | index as u64;
        // index is never 0, so the encoding is never 0
        ObjectReference(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    /// Decode a slot value. Returns `None` for null.
    pub fn from_raw(raw: u64) -> Option<ObjectReference> {
        NonZeroU64::new(raw).map(ObjectReference)
    }

    /// The encoding stored in reference slots. Never 0.
    pub fn to_raw(self) -> u64 {
        self.0.get()
    }

    pub(crate) fn index(self) -> u32 {
        self.0.get() as u32
    }

    pub(crate) fn generation(self) -> u16 {
        (self.0.get() >> 32) as u16
    }

    pub(crate) fn heap(self) -> u16 {
        (self.0.get() >> 48) as u16
    }
}

impl fmt::Debug for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}.{}", self.heap(), self.index(), self.generation())
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
