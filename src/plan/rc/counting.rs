use super::cycle::CycleCollector;
use crate::object::header::{HeapObject, NEW};
use crate::object::ObjectReference;
use crate::plan::roots::RootSet;
use crate::policy::immix::ImmixSpace;
use std::collections::{HashMap, VecDeque};

/// Counters of one collection.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RCCounters {
    pub increments: usize,
    pub decrements: usize,
    pub objects_reclaimed: usize,
    pub bytes_reclaimed: usize,
}

/// Deferred, coalesced reference counting.
///
/// Counts only include references from heap slots and from the roots registered at the last
/// collection. Every object also starts with one count of its own, which its first collection
/// takes back after scanning it.
#[derive(Default)]
pub struct RefCounter {
    decs: VecDeque<ObjectReference>,
    /// Objects allocated since the last collection.
    new_objects: Vec<ObjectReference>,
    /// New objects whose initial count outlived an emergency collection.
    pending_baselines: Vec<ObjectReference>,
    /// Roots incremented by the last collection.
    old_roots: Vec<ObjectReference>,
    pub counters: RCCounters,
}

impl RefCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_alloc(&mut self, reference: ObjectReference) {
        self.new_objects.push(reference);
    }

    pub fn push_decrement(&mut self, reference: ObjectReference) {
        self.decs.push_back(reference);
    }

    pub(crate) fn old_roots(&self) -> &[ObjectReference] {
        &self.old_roots
    }

    pub(crate) fn pending_baselines(&self) -> &[ObjectReference] {
        &self.pending_baselines
    }

    fn increment(&mut self, object: HeapObject) {
        object.increment();
        self.counters.increments += 1;
    }

    /// Increment the object encoded as `raw` in a reference slot.
    pub fn increment_raw(&mut self, space: &ImmixSpace, raw: u64) {
        let child = space.resolve_raw(raw);
        debug_assert!(child.is_some(), "{:x} names a dead object", raw);
        if let Some(child) = child {
            self.increment(child);
        }
    }

    /// Increment every object `object` refers to.
    pub fn increment_children(&mut self, space: &ImmixSpace, object: HeapObject) {
        for raw in object.children() {
            self.increment_raw(space, raw);
        }
    }

    /// Bring the root counts from the registrations of the last collection to the current
    /// ones. Only the difference is applied: a registration that stayed in place costs
    /// nothing and never makes its object a cycle candidate.
    pub fn process_roots(&mut self, space: &ImmixSpace, roots: &RootSet) {
        if self.old_roots.is_empty() && roots.is_empty() {
            return;
        }
        let mut delta: HashMap<ObjectReference, isize> = HashMap::new();
        for root in self.old_roots.drain(..) {
            *delta.entry(root).or_default() -= 1;
        }
        for root in roots.iter() {
            if space.resolve(root).is_some() {
                *delta.entry(root).or_default() += 1;
                self.old_roots.push(root);
            } else {
                warn!("Root {:?} is dead", root);
            }
        }
        for (root, change) in delta {
            if change < 0 {
                for _ in change..0 {
                    self.decs.push_back(root);
                }
            } else if let Some(object) = space.resolve(root) {
                for _ in 0..change {
                    self.increment(object);
                }
            }
        }
    }

    /// Scan the objects allocated since the last collection and take back their initial count.
    ///
    /// An emergency collection runs in the middle of an allocation, when the mutator may hold
    /// new objects it has not linked or rooted yet. It scans them but keeps their initial count
    /// until the next regular collection.
    pub fn process_new_objects(&mut self, space: &ImmixSpace, emergency: bool) {
        if !emergency {
            self.decs.extend(self.pending_baselines.drain(..));
        }
        let new_objects = std::mem::take(&mut self.new_objects);
        for reference in new_objects {
            let Some(object) = space.resolve(reference) else {
                continue;
            };
            object.clear_flag(NEW);
            self.increment_children(space, object);
            if emergency {
                self.pending_baselines.push(reference);
            } else {
                self.decs.push_back(reference);
            }
        }
    }

    /// Apply all buffered decrements. Objects whose count drops to zero are reclaimed and their
    /// referents decremented in turn. Objects that survive a decrement may be the root of a
    /// garbage cycle and are handed to `cycles`.
    pub fn process_decrements(&mut self, space: &mut ImmixSpace, cycles: &mut CycleCollector) {
        while let Some(reference) = self.decs.pop_front() {
            let Some(object) = space.resolve(reference) else {
                continue;
            };
            self.counters.decrements += 1;
            if object.rc() == 0 {
                warn!("Decrement of {:?} whose count is already zero", reference);
                continue;
            }
            if object.decrement() == 0 {
                self.release(space, object);
            } else {
                cycles.possible_root(object, reference);
            }
        }
    }

    fn release(&mut self, space: &mut ImmixSpace, object: HeapObject) {
        for child in object.children() {
            if let Some(child) = ObjectReference::from_raw(child) {
                self.decs.push_back(child);
            }
        }
        self.counters.objects_reclaimed += 1;
        self.counters.bytes_reclaimed += object.size();
        space.free_object(object);
    }
}
