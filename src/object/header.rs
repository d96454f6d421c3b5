use super::descriptor::TypeDescriptor;
use crate::util::constants::BYTES_IN_REFERENCE_SLOT;
use crate::util::Address;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

/// Size of the collector header at the start of every object.
pub const HEADER_BYTES: usize = 24;

/// The per-object header. The mutator never touches it.
#[repr(C)]
pub struct ObjectHeader {
    rc: AtomicU32,
    /// Index of the object's entry in the object table.
    index: u32,
    flags: AtomicU8,
    _reserved: [u8; 7],
    rtti: &'static TypeDescriptor,
}

static_assertions::const_assert_eq!(std::mem::size_of::<ObjectHeader>(), HEADER_BYTES);

/// Colours used by the trial-deletion cycle collector.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Color {
    /// In use or free.
    Black = 0,
    /// Possible member of a garbage cycle.
    Gray = 1,
    /// Member of a garbage cycle.
    White = 2,
    /// Possible root of a garbage cycle.
    Purple = 3,
}

impl Color {
    const MASK: u8 = 0b11;

    fn from_bits(bits: u8) -> Color {
        match bits & Self::MASK {
            0 => Color::Black,
            1 => Color::Gray,
            2 => Color::White,
            _ => Color::Purple,
        }
    }
}

/// The object is buffered as a cycle candidate.
pub const BUFFERED: u8 = 1 << 2;
/// The object's reference slots were snapshotted since its last scan.
pub const LOGGED: u8 = 1 << 3;
/// The object is in the modified-object buffer.
pub const MODIFIED: u8 = 1 << 4;
/// The object was allocated after the last collection.
pub const NEW: u8 = 1 << 5;

/// A view of an object in the heap, at its current address.
///
/// Only the space hands these out, for addresses that hold an initialized header.
/// A `HeapObject` is invalidated by evacuation of the object and by its reclamation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HeapObject(Address);

impl HeapObject {
    /// # Safety
    /// `addr` must be the start of an initialized object.
    pub(crate) unsafe fn from_address(addr: Address) -> HeapObject {
        debug_assert!(!addr.is_zero());
        HeapObject(addr)
    }

    pub fn to_address(self) -> Address {
        self.0
    }

    fn header(&self) -> &ObjectHeader {
        unsafe { self.0.as_ref::<ObjectHeader>() }
    }

    /// Write a fresh header into zeroed memory.
    ///
    /// # Safety
    /// `addr` must point at `rtti.object_size()` writable bytes not used by any other object.
    pub(crate) unsafe fn initialize(
        addr: Address,
        rtti: &'static TypeDescriptor,
        index: u32,
    ) -> HeapObject {
        addr.store(ObjectHeader {
            rc: AtomicU32::new(1),
            index,
            flags: AtomicU8::new(NEW),
            _reserved: [0; 7],
            rtti,
        });
        HeapObject(addr)
    }

    pub fn index(&self) -> u32 {
        self.header().index
    }

    pub fn rtti(&self) -> &'static TypeDescriptor {
        self.header().rtti
    }

    pub fn size(&self) -> usize {
        self.rtti().object_size()
    }

    pub fn rc(&self) -> u32 {
        self.header().rc.load(Ordering::Relaxed)
    }

    /// Increment the count and return the new value.
    pub fn increment(&self) -> u32 {
        self.header().rc.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the count and return the new value. A count that is already zero stays zero.
    pub fn decrement(&self) -> u32 {
        let rc = &self.header().rc;
        match rc.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |v| v.checked_sub(1)) {
            Ok(old) => old - 1,
            Err(_) => 0,
        }
    }

    pub fn color(&self) -> Color {
        Color::from_bits(self.header().flags.load(Ordering::Relaxed))
    }

    pub fn set_color(&self, color: Color) {
        let flags = &self.header().flags;
        let old = flags.load(Ordering::Relaxed);
        flags.store((old & !Color::MASK) | color as u8, Ordering::Relaxed);
    }

    pub fn test_flag(&self, flag: u8) -> bool {
        self.header().flags.load(Ordering::Relaxed) & flag != 0
    }

    /// Set `flag`. Returns true if it was not set before.
    pub fn attempt_set_flag(&self, flag: u8) -> bool {
        self.header().flags.fetch_or(flag, Ordering::Relaxed) & flag == 0
    }

    pub fn clear_flag(&self, flag: u8) {
        self.header().flags.fetch_and(!flag, Ordering::Relaxed);
    }

    pub fn slot_count(&self) -> usize {
        self.rtti().reference_field_count()
    }

    fn slot(&self, i: usize) -> Address {
        debug_assert!(i < self.slot_count());
        self.0 + HEADER_BYTES + i * BYTES_IN_REFERENCE_SLOT
    }

    /// The raw encoding of the reference in slot `i`. Zero is null.
    pub fn load_slot(&self, i: usize) -> u64 {
        unsafe { self.slot(i).atomic_load::<AtomicU64>(Ordering::Relaxed) }
    }

    pub fn store_slot(&self, i: usize, raw: u64) {
        unsafe { self.slot(i).atomic_store::<AtomicU64>(raw, Ordering::Relaxed) }
    }

    /// Raw encodings of all non-null reference slots.
    pub fn children(&self) -> impl Iterator<Item = u64> + '_ {
        (0..self.slot_count())
            .map(move |i| self.load_slot(i))
            .filter(|raw| *raw != 0)
    }

    /// Start and length of the opaque payload.
    pub fn payload_range(&self) -> (Address, usize) {
        let rtti = self.rtti();
        (self.0 + rtti.payload_offset(), rtti.payload_bytes())
    }
}
