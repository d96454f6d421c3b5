//! The coalescing write barrier.
//!
//! Between two collections, only the first store into an object matters: it logs the object
//! together with a snapshot of its reference slots. The mutator's write barrier then marks the
//! logged object as modified. When the collector drains the log it compares each slot with its
//! snapshot: a changed slot decrements the old referent and increments the new one, and an
//! unchanged slot costs nothing. Intermediate values of a slot are never counted.

use super::counting::RefCounter;
use crate::object::header::{HeapObject, LOGGED, MODIFIED, NEW};
use crate::object::ObjectReference;
use crate::policy::immix::ImmixSpace;

/// An object written since the last collection, with its reference slots as that collection
/// left them.
pub struct LoggedObject {
    reference: ObjectReference,
    snapshot: Box<[u64]>,
}

#[derive(Default)]
pub struct ObjectRememberingBarrier {
    /// Objects to rescan at the next collection.
    modbuf: Vec<LoggedObject>,
    /// Objects the mutator announced since the last collection.
    remembered: usize,
}

impl ObjectRememberingBarrier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called before a store into `object`.
    ///
    /// New objects are scanned in full at their first collection, and logged objects already
    /// have their snapshot, so only the first store into any other object does work.
    #[inline(always)]
    pub fn object_reference_write_pre(&mut self, object: HeapObject, reference: ObjectReference) {
        if object.test_flag(NEW) {
            return;
        }
        if object.attempt_set_flag(LOGGED) {
            self.log_object(object, reference);
        }
    }

    #[cold]
    fn log_object(&mut self, object: HeapObject, reference: ObjectReference) {
        trace!("Log {:?}", reference);
        let snapshot = (0..object.slot_count())
            .map(|i| object.load_slot(i))
            .collect();
        self.modbuf.push(LoggedObject {
            reference,
            snapshot,
        });
    }

    /// The mutator's write barrier. Idempotent.
    #[inline(always)]
    pub fn object_reference_write_post(&mut self, object: HeapObject, reference: ObjectReference) {
        if object.test_flag(LOGGED) && object.attempt_set_flag(MODIFIED) {
            trace!("Remember {:?}", reference);
            self.remembered += 1;
        }
    }

    pub fn remembered_objects(&self) -> usize {
        self.remembered
    }

    /// Take the logged objects.
    pub fn flush(&mut self) -> Vec<LoggedObject> {
        self.remembered = 0;
        std::mem::take(&mut self.modbuf)
    }
}

/// Apply the difference between the current and the logged slots of every logged object, and
/// unlog it.
pub fn process_modified_objects(space: &ImmixSpace, modbuf: Vec<LoggedObject>, rc: &mut RefCounter) {
    for LoggedObject {
        reference,
        snapshot,
    } in modbuf
    {
        let Some(object) = space.resolve(reference) else {
            continue;
        };
        if !object.test_flag(MODIFIED) {
            warn!(
                "{:?} was written without a following write barrier",
                reference
            );
        }
        object.clear_flag(MODIFIED | LOGGED);
        for (i, old) in snapshot.iter().copied().enumerate() {
            let new = object.load_slot(i);
            if new == old {
                continue;
            }
            if new != 0 {
                rc.increment_raw(space, new);
            }
            if let Some(old) = ObjectReference::from_raw(old) {
                rc.push_decrement(old);
            }
        }
    }
}
