//! Storage engines - ordered byte partitions behind a trait seam.
//!
//! A [`Backend`] is an opened database; a [`Partition`] is an isolated,
//! ordered keyspace inside it (a "sublevel"). Everything above this module
//! speaks in model types and encodings; everything below speaks bytes.
//!
//! ```text
//! ModelRepository<M>       (typed CRUD, indexes, bulk scans)
//!     ↓
//! Partition                (get / insert / remove / range / batch)
//!     ↓
//! SledBackend | InMemoryBackend
//! ```

mod in_memory;
mod sled_backend;

use std::ops::Bound;
use std::sync::Arc;

use crate::error::Result;

pub use in_memory::InMemoryBackend;
pub use sled_backend::SledBackend;

/// Lazy iterator over `(key, value)` pairs in partition key order.
pub type PartitionIter = Box<dyn Iterator<Item = Result<(Vec<u8>, Vec<u8>)>>>;

/// A single write inside an atomic partition batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEntry {
    Put(Vec<u8>, Vec<u8>),
    Delete(Vec<u8>),
}

/// Key bounds for a range scan, over encoded key bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub lower: Bound<Vec<u8>>,
    pub upper: Bound<Vec<u8>>,
}

impl KeyRange {
    /// The whole partition.
    pub fn all() -> Self {
        KeyRange {
            lower: Bound::Unbounded,
            upper: Bound::Unbounded,
        }
    }

    /// Every key starting with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        let mut end = prefix.to_vec();
        // Smallest key greater than every key with this prefix
        while let Some(last) = end.pop() {
            if last < u8::MAX {
                end.push(last + 1);
                return KeyRange {
                    lower: Bound::Included(prefix.to_vec()),
                    upper: Bound::Excluded(end),
                };
            }
        }
        KeyRange {
            lower: Bound::Included(prefix.to_vec()),
            upper: Bound::Unbounded,
        }
    }

    /// True when no key can satisfy both bounds.
    pub fn is_empty(&self) -> bool {
        match (&self.lower, &self.upper) {
            (Bound::Included(lo), Bound::Included(hi)) => lo > hi,
            (Bound::Included(lo), Bound::Excluded(hi))
            | (Bound::Excluded(lo), Bound::Included(hi))
            | (Bound::Excluded(lo), Bound::Excluded(hi)) => lo >= hi,
            _ => false,
        }
    }

    pub(crate) fn bounds(&self) -> (Bound<Vec<u8>>, Bound<Vec<u8>>) {
        (self.lower.clone(), self.upper.clone())
    }
}

/// An isolated, ordered keyspace.
pub trait Partition: Send + Sync {
    fn name(&self) -> &str;

    /// Point read. Absent keys are `Ok(None)`.
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Point write, last write wins.
    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<()>;

    /// Point delete. Deleting an absent key succeeds.
    fn remove(&self, key: &[u8]) -> Result<()>;

    /// Lazy scan over `range` in key order, or reverse key order.
    fn range(&self, range: KeyRange, reverse: bool) -> PartitionIter;

    /// Apply every entry atomically.
    fn apply_batch(&self, entries: Vec<BatchEntry>) -> Result<()>;

    /// Number of entries in the partition.
    fn len(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    fn flush(&self) -> Result<()>;
}

/// An opened ordered key-value database.
pub trait Backend: Send + Sync {
    /// Human-readable identity, used in logs and `Closed` errors.
    fn name(&self) -> &str;

    /// Open (creating if needed) the partition called `name`.
    fn open_partition(&self, name: &str) -> Result<Arc<dyn Partition>>;

    /// Persist everything written so far.
    fn flush(&self) -> Result<()>;
}

pub(crate) fn empty_iter() -> PartitionIter {
    Box::new(std::iter::empty())
}
