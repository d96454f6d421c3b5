//! Synchronous trial deletion (Bacon & Rajan), the backstop for garbage cycles that reference
//! counting alone never reclaims.
//!
//! Candidates are objects whose count was decremented to a non-zero value. From each candidate,
//! `mark_gray` subtracts the counts contributed by references internal to the subgraph it
//! reaches. `scan` then restores every object still holding an external count, together with
//! everything it reaches, and whitens the rest. White objects are garbage cycles and are
//! reclaimed without further decrements: every reference to them comes from another white
//! object.
//!
//! The traversals use explicit stacks.

use crate::object::header::{Color, HeapObject, BUFFERED};
use crate::object::ObjectReference;
use crate::policy::immix::ImmixSpace;

#[derive(Default)]
pub struct CycleCollector {
    candidates: Vec<ObjectReference>,
    /// Objects reclaimed by the last run.
    pub objects_reclaimed: usize,
    pub bytes_reclaimed: usize,
}

impl CycleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn candidates(&self) -> usize {
        self.candidates.len()
    }

    /// `object` survived a decrement. Objects without reference slots cannot be on a cycle.
    pub fn possible_root(&mut self, object: HeapObject, reference: ObjectReference) {
        if object.slot_count() == 0 {
            return;
        }
        if object.color() != Color::Purple {
            object.set_color(Color::Purple);
            if object.attempt_set_flag(BUFFERED) {
                self.candidates.push(reference);
            }
        }
    }

    /// Forget candidates that have been reclaimed since they were buffered.
    pub fn prune(&mut self, space: &ImmixSpace) {
        self.candidates.retain(|r| space.resolve(*r).is_some());
    }

    /// Reclaim all garbage cycles reachable from the candidates. Returns the number of
    /// objects reclaimed.
    pub fn collect_cycles(&mut self, space: &mut ImmixSpace) -> usize {
        self.objects_reclaimed = 0;
        self.bytes_reclaimed = 0;
        let roots = self.mark_roots(space);
        for root in &roots {
            if let Some(object) = space.resolve(*root) {
                scan(space, object);
            }
        }
        let garbage = collect_roots(space, &roots);
        for object in garbage {
            self.objects_reclaimed += 1;
            self.bytes_reclaimed += object.size();
            space.free_object(object);
        }
        debug!(
            "Trial deletion from {} roots reclaimed {} objects",
            roots.len(),
            self.objects_reclaimed
        );
        self.objects_reclaimed
    }

    fn mark_roots(&mut self, space: &ImmixSpace) -> Vec<ObjectReference> {
        let mut roots = vec![];
        for reference in std::mem::take(&mut self.candidates) {
            let Some(object) = space.resolve(reference) else {
                continue;
            };
            if object.color() == Color::Purple && object.rc() > 0 {
                mark_gray(space, object);
                roots.push(reference);
            } else {
                object.clear_flag(BUFFERED);
            }
        }
        roots
    }
}

/// Color everything reachable from `s` gray, removing the counts of the traversed references.
fn mark_gray(space: &ImmixSpace, s: HeapObject) {
    if s.color() == Color::Gray {
        return;
    }
    s.set_color(Color::Gray);
    let mut stack = vec![s];
    while let Some(object) = stack.pop() {
        for raw in object.children() {
            if let Some(child) = space.resolve_raw(raw) {
                child.decrement();
                if child.color() != Color::Gray {
                    child.set_color(Color::Gray);
                    stack.push(child);
                }
            }
        }
    }
}

/// Restore gray objects with external counts, whiten the others.
fn scan(space: &ImmixSpace, s: HeapObject) {
    let mut stack = vec![s];
    while let Some(object) = stack.pop() {
        if object.color() != Color::Gray {
            continue;
        }
        if object.rc() > 0 {
            scan_black(space, object);
        } else {
            object.set_color(Color::White);
            stack.extend(object.children().filter_map(|raw| space.resolve_raw(raw)));
        }
    }
}

/// Color everything reachable from `s` black, restoring the counts of the traversed references.
fn scan_black(space: &ImmixSpace, s: HeapObject) {
    s.set_color(Color::Black);
    let mut stack = vec![s];
    while let Some(object) = stack.pop() {
        for raw in object.children() {
            if let Some(child) = space.resolve_raw(raw) {
                child.increment();
                if child.color() != Color::Black {
                    child.set_color(Color::Black);
                    stack.push(child);
                }
            }
        }
    }
}

/// Gather the white objects reachable from the roots.
fn collect_roots(space: &ImmixSpace, roots: &[ObjectReference]) -> Vec<HeapObject> {
    let mut garbage = vec![];
    for root in roots {
        let Some(object) = space.resolve(*root) else {
            continue;
        };
        object.clear_flag(BUFFERED);
        let mut stack = vec![object];
        while let Some(object) = stack.pop() {
            if object.color() == Color::White && !object.test_flag(BUFFERED) {
                object.set_color(Color::Black);
                garbage.push(object);
                stack.extend(object.children().filter_map(|raw| space.resolve_raw(raw)));
            }
        }
    }
    garbage
}
