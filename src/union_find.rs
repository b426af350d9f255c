//! Disjoint-set forest over arbitrary hashable elements.
//!
//! Elements are interned to dense indices so the forest itself is a pair of
//! flat vectors. Union is by size and `find` compresses paths, which keeps
//! the amortized cost per operation close to constant. Member lists are kept
//! at the roots so a whole class can be listed without scanning everything.

use std::collections::HashMap;
use std::hash::Hash;

/// Identifier of a subset, valid until the next `union`
pub type SubsetId = usize;

#[derive(Debug, Clone)]
pub struct DisjointSet<T> {
    indices: HashMap<T, usize>,
    parents: Vec<usize>,
    sizes: Vec<usize>,
    members: Vec<Vec<T>>,
}

impl<T> Default for DisjointSet<T> {
    fn default() -> Self {
        Self {
            indices: HashMap::new(),
            parents: Vec::new(),
            sizes: Vec::new(),
            members: Vec::new(),
        }
    }
}

impl<T: Copy + Eq + Hash> DisjointSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `element` as a singleton subset. Returns false, leaving the
    /// structure untouched, when the element already exists.
    pub fn create_subset(&mut self, element: T) -> bool {
        if self.indices.contains_key(&element) {
            return false;
        }

        let index = self.parents.len();
        self.indices.insert(element, index);
        self.parents.push(index);
        self.sizes.push(1);
        self.members.push(vec![element]);
        true
    }

    pub fn contains(&self, element: &T) -> bool {
        self.indices.contains_key(element)
    }

    /// Number of elements across all subsets
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Canonical subset of `element`, compressing the path to the root
    pub fn find(&mut self, element: &T) -> Option<SubsetId> {
        let start = *self.indices.get(element)?;

        let mut root = start;
        while self.parents[root] != root {
            root = self.parents[root];
        }

        let mut current = start;
        while self.parents[current] != root {
            let next = self.parents[current];
            self.parents[current] = root;
            current = next;
        }

        Some(root)
    }

    /// Root lookup without compression, for shared borrows
    pub fn subset_of(&self, element: &T) -> Option<SubsetId> {
        let mut root = *self.indices.get(element)?;
        while self.parents[root] != root {
            root = self.parents[root];
        }
        Some(root)
    }

    /// Merges the subsets holding `a` and `b`, re-parenting the smaller one.
    /// Returns false if either element is unknown or both already share a subset.
    pub fn union(&mut self, a: &T, b: &T) -> bool {
        let (Some(root_a), Some(root_b)) = (self.find(a), self.find(b)) else {
            return false;
        };
        if root_a == root_b {
            return false;
        }

        let (larger, smaller) = if self.sizes[root_a] >= self.sizes[root_b] {
            (root_a, root_b)
        } else {
            (root_b, root_a)
        };

        self.parents[smaller] = larger;
        self.sizes[larger] += self.sizes[smaller];
        let moved = std::mem::take(&mut self.members[smaller]);
        self.members[larger].extend(moved);
        true
    }

    pub fn same_subset(&mut self, a: &T, b: &T) -> bool {
        match (self.find(a), self.find(b)) {
            (Some(root_a), Some(root_b)) => root_a == root_b,
            _ => false,
        }
    }

    /// Every element sharing a subset with `element`, itself included
    pub fn members_of(&self, element: &T) -> &[T] {
        match self.subset_of(element) {
            Some(root) => &self.members[root],
            None => &[],
        }
    }

    /// Removes an element that is alone in its subset. Returns false if the
    /// element is unknown or has been merged with others.
    pub fn remove_singleton(&mut self, element: &T) -> bool {
        let Some(&index) = self.indices.get(element) else {
            return false;
        };
        if self.parents[index] != index || self.sizes[index] != 1 {
            return false;
        }

        self.indices.remove(element);
        self.members[index].clear();
        self.sizes[index] = 0;
        true
    }

    /// Member lists of every live subset
    pub fn subsets(&self) -> impl Iterator<Item = &[T]> + '_ {
        self.parents
            .iter()
            .enumerate()
            .filter(move |&(index, &parent)| parent == index && !self.members[index].is_empty())
            .map(move |(index, _)| self.members[index].as_slice())
    }

    pub fn subset_count(&self) -> usize {
        self.subsets().count()
    }
}
