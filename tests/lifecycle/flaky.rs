//! A backend that fails on demand, for error propagation tests.

use std::sync::Arc;

use level_model::backend::{BatchEntry, KeyRange, PartitionIter};
use level_model::{Backend, InMemoryBackend, Partition, Result, StoreError};

/// Wraps an in-memory backend. Scans fail after `scan_limit` entries and
/// flushes fail when `fail_flush` is set.
pub struct FlakyBackend {
    inner: InMemoryBackend,
    scan_limit: usize,
    fail_flush: bool,
}

impl FlakyBackend {
    pub fn failing_scans_after(scan_limit: usize) -> Self {
        Self {
            inner: InMemoryBackend::new(),
            scan_limit,
            fail_flush: false,
        }
    }

    pub fn failing_flush() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            scan_limit: usize::MAX,
            fail_flush: true,
        }
    }
}

impl Backend for FlakyBackend {
    fn name(&self) -> &str {
        "flaky"
    }

    fn open_partition(&self, name: &str) -> Result<Arc<dyn Partition>> {
        Ok(Arc::new(FlakyPartition {
            inner: self.inner.open_partition(name)?,
            scan_limit: self.scan_limit,
        }))
    }

    fn flush(&self) -> Result<()> {
        if self.fail_flush {
            return Err(StoreError::Storage("flush failed".into()));
        }
        Ok(())
    }
}

struct FlakyPartition {
    inner: Arc<dyn Partition>,
    scan_limit: usize,
}

impl Partition for FlakyPartition {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.inner.get(key)
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.inner.insert(key, value)
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.inner.remove(key)
    }

    fn range(&self, range: KeyRange, reverse: bool) -> PartitionIter {
        let entries = self.inner.range(range, reverse);
        if self.scan_limit == usize::MAX {
            return entries;
        }
        Box::new(
            entries
                .take(self.scan_limit)
                .chain(std::iter::once(Err(StoreError::Storage(
                    "read stream failed".into(),
                )))),
        )
    }

    fn apply_batch(&self, entries: Vec<BatchEntry>) -> Result<()> {
        self.inner.apply_batch(entries)
    }

    fn len(&self) -> Result<usize> {
        self.inner.len()
    }

    fn flush(&self) -> Result<()> {
        self.inner.flush()
    }
}
