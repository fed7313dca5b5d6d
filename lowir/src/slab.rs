//! Index map using unsigned integer indices to index
//! into vector of T. Pushing new values returns their
//! index. Removing elements is O(1), does not reallocate
//! and it does not change existing indices.

use std::{
    collections::BTreeSet,
    ops::{Index, IndexMut},
};

pub(crate) trait SlabId: Copy + Ord + From<usize> + Into<usize> {}

impl<I: Copy + Ord + From<usize> + Into<usize>> SlabId for I {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Slab<I, T> {
    values: Vec<Option<T>>,
    // Freed slots, the lowest one is reused first
    empty: BTreeSet<I>,
}

impl<I: SlabId, T> Slab<I, T> {
    pub(crate) const fn new() -> Self {
        Self { values: Vec::new(), empty: BTreeSet::new() }
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len() - self.empty.len()
    }

    pub(crate) fn push(&mut self, value: T) -> I {
        if let Some(id) = self.empty.pop_first() {
            self.values[id.into()] = Some(value);
            id
        } else {
            self.values.push(Some(value));
            I::from(self.values.len() - 1)
        }
    }

    pub(crate) fn remove(&mut self, id: I) -> Option<T> {
        let value = self.values.get_mut(id.into())?.take()?;
        self.empty.insert(id);
        Some(value)
    }

    pub(crate) fn get(&self, id: I) -> Option<&T> {
        self.values.get(id.into()).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: I) -> Option<&mut T> {
        self.values.get_mut(id.into()).and_then(Option::as_mut)
    }

    pub(crate) fn contains_key(&self, id: I) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = I> + '_ {
        self.iter().map(|(id, _)| id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (I, &T)> {
        self.values.iter().enumerate().filter_map(|(id, x)| x.as_ref().map(|x| (I::from(id), x)))
    }
}

impl<I: SlabId, T> Index<I> for Slab<I, T> {
    type Output = T;

    #[track_caller]
    fn index(&self, index: I) -> &Self::Output {
        let idx: usize = index.into();
        self.get(index).unwrap_or_else(|| panic!("slab index {idx} is empty"))
    }
}

impl<I: SlabId, T> IndexMut<I> for Slab<I, T> {
    #[track_caller]
    fn index_mut(&mut self, index: I) -> &mut Self::Output {
        let idx: usize = index.into();
        self.get_mut(index).unwrap_or_else(|| panic!("slab index {idx} is empty"))
    }
}
