//! # Disjoint Set Union (DSU)
//!
//! Array-backed Union-Find over dense record indices, with union by rank
//! and path halving. One instance is owned by a single clustering run and
//! is mutated only by its single writer.

use crate::model::RecordIdx;
use hashbrown::HashMap;

/// Disjoint Set Union over `0..len` record indices.
#[derive(Debug, Clone)]
pub struct RecordDSU {
    parent: Vec<u32>,
    rank: Vec<u8>,
    /// Current number of disjoint sets
    set_count: usize,
    /// Number of successful unions
    merges: usize,
}

impl RecordDSU {
    /// Create a DSU where every index in `0..len` is its own set.
    pub fn new(len: usize) -> Self {
        Self {
            parent: (0..len as u32).collect(),
            rank: vec![0; len],
            set_count: len,
            merges: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.parent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parent.is_empty()
    }

    /// Find the root of an index (path halving).
    #[inline]
    pub fn find(&mut self, idx: RecordIdx) -> RecordIdx {
        let mut current = idx.0;
        loop {
            let parent = self.parent[current as usize];
            if parent == current {
                return RecordIdx(current);
            }
            let grandparent = self.parent[parent as usize];
            self.parent[current as usize] = grandparent;
            current = grandparent;
        }
    }

    /// Root lookup without compression, for read-only access.
    pub fn find_immutable(&self, idx: RecordIdx) -> RecordIdx {
        let mut current = idx.0;
        while self.parent[current as usize] != current {
            current = self.parent[current as usize];
        }
        RecordIdx(current)
    }

    /// Check if two indices are in the same set
    pub fn same_set(&mut self, a: RecordIdx, b: RecordIdx) -> bool {
        self.find(a) == self.find(b)
    }

    /// Merge the sets containing `a` and `b`.
    ///
    /// Returns `true` when two distinct sets were joined.
    pub fn union(&mut self, a: RecordIdx, b: RecordIdx) -> bool {
        let root_a = self.find(a);
        let root_b = self.find(b);
        if root_a == root_b {
            return false;
        }

        let rank_a = self.rank[root_a.index()];
        let rank_b = self.rank[root_b.index()];
        if rank_a < rank_b {
            self.parent[root_a.index()] = root_b.0;
        } else if rank_a > rank_b {
            self.parent[root_b.index()] = root_a.0;
        } else {
            self.parent[root_a.index()] = root_b.0;
            self.rank[root_b.index()] = rank_b.saturating_add(1);
        }
        self.set_count -= 1;
        self.merges += 1;
        true
    }

    /// Current number of disjoint sets.
    pub fn set_count(&self) -> usize {
        self.set_count
    }

    /// Number of unions that joined two sets.
    pub fn merges(&self) -> usize {
        self.merges
    }

    /// Group all indices by root. Members are in ascending index order and
    /// groups are ordered by their smallest member.
    pub fn groups(&mut self) -> Vec<Vec<RecordIdx>> {
        let mut slot_by_root: HashMap<u32, usize> = HashMap::with_capacity(self.set_count);
        let mut groups: Vec<Vec<RecordIdx>> = Vec::with_capacity(self.set_count);

        for i in 0..self.parent.len() as u32 {
            let root = self.find(RecordIdx(i)).0;
            let slot = *slot_by_root.entry(root).or_insert_with(|| {
                groups.push(Vec::new());
                groups.len() - 1
            });
            groups[slot].push(RecordIdx(i));
        }
        groups
    }
}
