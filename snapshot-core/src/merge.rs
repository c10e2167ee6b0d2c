//! Concatenation of already materialised result groups.
//!
//! [`MergedEntities`] owns an ordered list of groups and presents them as a
//! single sequence without copying or re-sorting. Iteration can be started
//! any number of times, and a running [`MergedIter`] can be rewound with
//! [`MergedIter::reset`].

use std::iter::FusedIterator;

use crate::entity::Entity;

/// Ordered groups presented as one sequence.
///
/// # Examples
///
/// ```
/// use snapshot_core::MergedEntities;
///
/// let merged = MergedEntities::from_groups(vec![vec![1, 2], vec![], vec![3]]);
/// let mut iter = merged.iter();
/// assert_eq!(iter.by_ref().copied().collect::<Vec<_>>(), vec![1, 2, 3]);
/// iter.reset();
/// assert_eq!(iter.next(), Some(&1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MergedEntities<T> {
    groups: Vec<Vec<T>>,
}

impl<T> Default for MergedEntities<T> {
    fn default() -> Self {
        Self { groups: Vec::new() }
    }
}

impl<T> MergedEntities<T> {
    /// Empty sequence with no groups.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sequence over `groups`, in the given order.
    #[must_use]
    pub const fn from_groups(groups: Vec<Vec<T>>) -> Self {
        Self { groups }
    }

    /// Append a group after the existing ones.
    pub fn push_group(&mut self, group: Vec<T>) {
        self.groups.push(group);
    }

    /// Group at `index`.
    #[must_use]
    pub fn group(&self, index: usize) -> Option<&[T]> {
        self.groups.get(index).map(Vec::as_slice)
    }

    /// Number of groups, including empty ones.
    #[must_use]
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Total number of items across all groups.
    #[must_use]
    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Whether every group is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.groups.iter().all(Vec::is_empty)
    }

    /// Iterate over every item, group by group.
    #[must_use]
    pub fn iter(&self) -> MergedIter<'_, T> {
        MergedIter {
            groups: &self.groups,
            group: 0,
            position: 0,
        }
    }

    /// Flatten into a single vector.
    #[must_use]
    pub fn into_vec(self) -> Vec<T> {
        self.groups.into_iter().flatten().collect()
    }
}

impl MergedEntities<Entity> {
    /// Items ordered by entity kind and then id.
    ///
    /// Groups are left untouched; the returned references borrow from them.
    #[must_use]
    pub fn sorted_by_rank(&self) -> Vec<&Entity> {
        let mut entities: Vec<&Entity> = self.iter().collect();
        entities.sort_by_key(|entity| (entity.kind(), entity.id()));
        entities
    }
}

/// Restartable iterator over [`MergedEntities`].
#[derive(Debug, Clone)]
pub struct MergedIter<'a, T> {
    groups: &'a [Vec<T>],
    group: usize,
    position: usize,
}

impl<T> MergedIter<'_, T> {
    /// Rewind to the first item of the first group.
    pub fn reset(&mut self) {
        self.group = 0;
        self.position = 0;
    }
}

impl<'a, T> Iterator for MergedIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(group) = self.groups.get(self.group) {
            if let Some(item) = group.get(self.position) {
                self.position += 1;
                return Some(item);
            }
            self.group += 1;
            self.position = 0;
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining: usize = self
            .groups
            .iter()
            .skip(self.group)
            .map(Vec::len)
            .sum::<usize>()
            .saturating_sub(self.position);
        (remaining, Some(remaining))
    }
}

impl<T> ExactSizeIterator for MergedIter<'_, T> {}

impl<T> FusedIterator for MergedIter<'_, T> {}

impl<'a, T> IntoIterator for &'a MergedEntities<T> {
    type Item = &'a T;
    type IntoIter = MergedIter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<T> IntoIterator for MergedEntities<T> {
    type Item = T;
    type IntoIter = std::iter::Flatten<std::vec::IntoIter<Vec<T>>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter().flatten()
    }
}
