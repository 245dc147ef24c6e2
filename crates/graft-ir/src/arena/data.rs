use super::id::{Id, Identifier};

/// A deleted slot drops its payload but keeps its index.
#[derive(Debug, Clone)]
enum Slot<T> {
    Live(T),
    Dead,
}

impl<T> Slot<T> {
    fn live(&self) -> Option<&T> {
        match self {
            Slot::Live(value) => Some(value),
            Slot::Dead => None,
        }
    }

    fn live_mut(&mut self) -> Option<&mut T> {
        match self {
            Slot::Live(value) => Some(value),
            Slot::Dead => None,
        }
    }
}

/// Append-only storage addressed by typed handles.
///
/// Deleting an entry tombstones its slot; ids are never reused for the
/// lifetime of the arena.
#[derive(Debug, Clone)]
pub struct Arena<I: Identifier, T> {
    slots: Vec<Slot<T>>,
    live: usize,
    marker: std::marker::PhantomData<I>,
}

impl<I: Identifier, T> Default for Arena<I, T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            live: 0,
            marker: std::marker::PhantomData,
        }
    }
}

impl<I: Identifier, T> Arena<I, T> {
    pub fn next_id(&self) -> I {
        I::from(Id(self.slots.len()))
    }

    /// Number of slots ever allocated, tombstones included.
    pub fn capacity_used(&self) -> usize {
        self.slots.len()
    }

    /// Number of entries that are not deleted.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn alloc(&mut self, value: T) -> I {
        let id = self.next_id();
        self.slots.push(Slot::Live(value));
        self.live += 1;
        id
    }

    /// Returns the entry unless it was never allocated or has been deleted.
    pub fn get(&self, id: I) -> Option<&T> {
        self.slots.get(id.into().raw()).and_then(Slot::live)
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.slots.get_mut(id.into().raw()).and_then(Slot::live_mut)
    }

    pub fn is_deleted(&self, id: I) -> bool {
        self.get(id).is_none()
    }

    /// Tombstones `id`. Returns false if it was already gone.
    pub fn delete(&mut self, id: I) -> bool {
        let Some(slot) = self.slots.get_mut(id.into().raw()) else {
            return false;
        };
        if matches!(slot, Slot::Dead) {
            return false;
        }
        *slot = Slot::Dead;
        self.live -= 1;
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.live().map(|value| (I::from(Id(index)), value)))
    }

    pub fn ids(&self) -> impl Iterator<Item = I> + '_ {
        self.iter().map(|(id, _)| id)
    }
}

impl<T, I: Identifier> std::ops::Index<I> for Arena<I, T> {
    type Output = T;

    fn index(&self, index: I) -> &Self::Output {
        self.get(index)
            .unwrap_or_else(|| panic!("access to deleted arena entry {index:?}"))
    }
}

impl<T, I: Identifier> std::ops::IndexMut<I> for Arena<I, T> {
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        self.get_mut(index)
            .unwrap_or_else(|| panic!("access to deleted arena entry {index:?}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identifier;

    identifier! {
        struct TestId
    }

    #[test]
    fn deleted_slots_keep_their_ids() {
        let mut arena: Arena<TestId, &str> = Arena::default();
        let a = arena.alloc("a");
        let b = arena.alloc("b");
        assert!(arena.delete(a));
        assert!(!arena.delete(a));
        assert_eq!(arena.len(), 1);
        assert!(arena.get(a).is_none());
        assert_eq!(arena[b], "b");
        let c = arena.alloc("c");
        assert_ne!(c, a);
        assert_eq!(arena.ids().collect::<Vec<_>>(), vec![b, c]);
    }
}
