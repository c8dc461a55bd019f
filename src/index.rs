//! Bucket index from composite keys to entry positions

use std::collections::HashMap;

use crate::fingerprint::IndexKey;

/// Map from [`IndexKey`] to the positions recorded under it
///
/// Buckets only grow. Positions inside a bucket stay in insertion order,
/// which is what makes the oldest unconsumed entry win on lookup.
#[derive(Debug, Default)]
pub struct BucketIndex {
    buckets: HashMap<IndexKey, Vec<usize>>,
    positions: usize,
}

impl BucketIndex {
    /// Create an empty index
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a position to its key's bucket
    pub fn insert(&mut self, key: IndexKey, position: usize) {
        self.buckets.entry(key).or_default().push(position);
        self.positions += 1;
    }

    /// Positions recorded under a key, oldest first
    #[must_use]
    pub fn lookup(&self, key: &IndexKey) -> &[usize] {
        self.buckets.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    /// Number of distinct buckets
    #[must_use]
    pub fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Total number of indexed positions
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions
    }

    /// Whether nothing has been indexed
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions == 0
    }

    /// Size of every bucket, largest first
    #[must_use]
    pub fn bucket_sizes(&self) -> Vec<usize> {
        let mut sizes: Vec<usize> = self.buckets.values().map(Vec::len).collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }
}
