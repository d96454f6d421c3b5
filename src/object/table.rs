use super::reference::ObjectReference;
use crate::util::Address;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};

/// Ids handed to object tables. Two live handles only share an id after 65536 handles were
/// created.
static NEXT_HEAP_ID: AtomicU16 = AtomicU16::new(1);

struct Entry {
    /// Current address of the object, or 0 if the entry is free.
    address: AtomicUsize,
    generation: AtomicU16,
}

impl Entry {
    fn new() -> Self {
        Entry {
            address: AtomicUsize::new(0),
            generation: AtomicU16::new(1),
        }
    }
}

/// Maps object references to the current addresses of live objects.
///
/// Insertion and removal need exclusive access and only happen on the mutator thread or in
/// the serial collection phases. Relocation only touches the address word of an entry the
/// caller owns, so evacuation workers can relocate concurrently.
pub struct ObjectTable {
    /// Stamped into every reference this table hands out.
    heap: u16,
    entries: Vec<Entry>,
    free: Vec<u32>,
    live: usize,
}

impl ObjectTable {
    pub fn new() -> Self {
        ObjectTable {
            heap: NEXT_HEAP_ID.fetch_add(1, Ordering::Relaxed),
            // Entry 0 is never handed out so that no encoding is 0.
            entries: vec![Entry::new()],
            free: vec![],
            live: 0,
        }
    }

    /// Register an object at `address`. Returns `None` if the index space is exhausted.
    pub fn insert(&mut self, address: Address) -> Option<ObjectReference> {
        debug_assert!(!address.is_zero());
        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                let index = u32::try_from(self.entries.len()).ok()?;
                self.entries.push(Entry::new());
                index
            }
        };
        let entry = &self.entries[index as usize];
        entry.address.store(address.as_usize(), Ordering::Relaxed);
        self.live += 1;
        Some(ObjectReference::new(
            self.heap,
            index,
            entry.generation.load(Ordering::Relaxed),
        ))
    }

    /// The current address of the object, or `None` if the reference is stale or was handed
    /// out by another table.
    pub fn resolve(&self, r: ObjectReference) -> Option<Address> {
        if r.heap() != self.heap {
            return None;
        }
        let entry = self.entries.get(r.index() as usize)?;
        if entry.generation.load(Ordering::Relaxed) != r.generation() {
            return None;
        }
        match entry.address.load(Ordering::Relaxed) {
            0 => None,
            a => Some(unsafe { Address::from_usize(a) }),
        }
    }

    /// Point a live entry at the object's new address.
    pub fn relocate(&self, index: u32, to: Address) {
        let entry = &self.entries[index as usize];
        debug_assert!(entry.address.load(Ordering::Relaxed) != 0);
        entry.address.store(to.as_usize(), Ordering::Relaxed);
    }

    /// Free the entry of a reclaimed object. Every reference to it becomes stale.
    pub fn remove(&mut self, index: u32) {
        let entry = &self.entries[index as usize];
        debug_assert!(entry.address.load(Ordering::Relaxed) != 0);
        entry.address.store(0, Ordering::Relaxed);
        let generation = entry.generation.load(Ordering::Relaxed).wrapping_add(1);
        // Generation 0 is skipped so that a fresh entry never matches an old encoding by wrapping.
        entry
            .generation
            .store(generation.max(1), Ordering::Relaxed);
        self.free.push(index);
        self.live -= 1;
    }

    pub fn live_objects(&self) -> usize {
        self.live
    }

    /// References and addresses of all live objects.
    pub fn iter_live(&self) -> impl Iterator<Item = (ObjectReference, Address)> + '_ {
        self.entries
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(index, entry)| match entry.address.load(Ordering::Relaxed) {
                0 => None,
                a => Some((
                    ObjectReference::new(
                        self.heap,
                        index as u32,
                        entry.generation.load(Ordering::Relaxed),
                    ),
                    unsafe { Address::from_usize(a) },
                )),
            })
    }
}

impl Default for ObjectTable {
    fn default() -> Self {
        Self::new()
    }
}
