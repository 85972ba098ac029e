//! InMemoryBackend - BTreeMap-backed backend for testing and embedding.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use super::{empty_iter, Backend, BatchEntry, KeyRange, Partition, PartitionIter};
use crate::error::{Result, StoreError};

/// In-memory ordered backend. Nothing survives the process.
///
/// Clone-friendly via Arc: clones share every partition.
#[derive(Clone)]
pub struct InMemoryBackend {
    partitions: Arc<RwLock<HashMap<String, Arc<InMemoryPartition>>>>,
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            partitions: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Backend for InMemoryBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn open_partition(&self, name: &str) -> Result<Arc<dyn Partition>> {
        let mut partitions = self
            .partitions
            .write()
            .map_err(|_| StoreError::LockPoisoned("open partition"))?;

        let partition = partitions
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(InMemoryPartition {
                    name: name.to_string(),
                    entries: RwLock::new(BTreeMap::new()),
                })
            })
            .clone();

        Ok(partition)
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}

struct InMemoryPartition {
    name: String,
    entries: RwLock<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl Partition for InMemoryPartition {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::LockPoisoned("get"))?;
        Ok(entries.get(key).cloned())
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::LockPoisoned("insert"))?;
        entries.insert(key.to_vec(), value);
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::LockPoisoned("remove"))?;
        entries.remove(key);
        Ok(())
    }

    fn range(&self, range: KeyRange, reverse: bool) -> PartitionIter {
        if range.is_empty() {
            return empty_iter();
        }

        let entries = match self.entries.read() {
            Ok(entries) => entries,
            Err(_) => return Box::new(std::iter::once(Err(StoreError::LockPoisoned("range")))),
        };

        // Snapshot the range so the scan does not hold the lock.
        let mut snapshot: Vec<(Vec<u8>, Vec<u8>)> = entries
            .range(range.bounds())
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if reverse {
            snapshot.reverse();
        }

        Box::new(snapshot.into_iter().map(Ok))
    }

    fn apply_batch(&self, batch: Vec<BatchEntry>) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| StoreError::LockPoisoned("apply batch"))?;
        for entry in batch {
            match entry {
                BatchEntry::Put(key, value) => {
                    entries.insert(key, value);
                }
                BatchEntry::Delete(key) => {
                    entries.remove(&key);
                }
            }
        }
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|_| StoreError::LockPoisoned("len"))?;
        Ok(entries.len())
    }

    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
