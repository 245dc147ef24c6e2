use rustc_hash::FxHashMap;

use super::Identifier;

/// Sparse side table keyed by arena handles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdMap<I: Identifier, T> {
    data: FxHashMap<I, T>,
}

impl<I: Identifier, T> Default for IdMap<I, T> {
    fn default() -> Self {
        Self {
            data: FxHashMap::default(),
        }
    }
}

impl<I: Identifier, T> IdMap<I, T> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, id: I) -> Option<&T> {
        self.data.get(&id)
    }

    pub fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.data.get_mut(&id)
    }

    pub fn contains(&self, id: I) -> bool {
        self.data.contains_key(&id)
    }

    pub fn insert(&mut self, id: I, value: T) -> Option<T> {
        self.data.insert(id, value)
    }

    pub fn remove(&mut self, id: I) -> Option<T> {
        self.data.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.data.iter().map(|(k, v)| (*k, v))
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.data.values()
    }
}

impl<I: Identifier, T: Copy> IdMap<I, T> {
    /// Looks `id` up and copies the value out.
    pub fn get_copied(&self, id: I) -> Option<T> {
        self.data.get(&id).copied()
    }
}

impl<I: Identifier, T> std::ops::Index<I> for IdMap<I, T> {
    type Output = T;

    fn index(&self, index: I) -> &Self::Output {
        self.get(index)
            .unwrap_or_else(|| panic!("no entry for {:?}", index))
    }
}

impl<I: Identifier, T> FromIterator<(I, T)> for IdMap<I, T> {
    fn from_iter<It: IntoIterator<Item = (I, T)>>(iter: It) -> Self {
        Self {
            data: iter.into_iter().collect(),
        }
    }
}
