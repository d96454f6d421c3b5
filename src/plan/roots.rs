use crate::object::ObjectReference;

/// References the mutator holds outside the heap. A reference may be registered more than once;
/// each registration counts.
#[derive(Debug, Default)]
pub struct RootSet {
    roots: Vec<ObjectReference>,
}

impl RootSet {
    pub fn add(&mut self, reference: ObjectReference) {
        self.roots.push(reference);
    }

    /// Remove one registration of `reference`. Returns false if there is none.
    pub fn remove(&mut self, reference: ObjectReference) -> bool {
        match self.roots.iter().rposition(|r| *r == reference) {
            Some(i) => {
                self.roots.swap_remove(i);
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = ObjectReference> + '_ {
        self.roots.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}
