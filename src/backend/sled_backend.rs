//! SledBackend - persistent backend on an embedded sled database.
//!
//! Each partition is a sled tree, so partitions share one database file and
//! one page cache but never see each other's keys.

use std::path::Path;
use std::sync::Arc;

use super::{empty_iter, Backend, BatchEntry, KeyRange, Partition, PartitionIter};
use crate::config::StoreConfig;
use crate::error::Result;

/// Persistent backend over a `sled::Db`.
#[derive(Clone)]
pub struct SledBackend {
    db: sled::Db,
    name: String,
}

impl SledBackend {
    /// Open (creating if needed) the database at `path` with default settings.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        Ok(Self {
            db,
            name: path.display().to_string(),
        })
    }

    /// Open a database from a [`StoreConfig`]. Without a path, or with
    /// `temporary` set, the database is removed when the last handle drops.
    pub fn open_with(config: &StoreConfig) -> Result<Self> {
        let mut sled_config = sled::Config::new().temporary(config.temporary);
        if let Some(path) = &config.path {
            sled_config = sled_config.path(path);
        } else {
            sled_config = sled_config.temporary(true);
        }
        if let Some(capacity) = config.cache_capacity {
            sled_config = sled_config.cache_capacity(capacity);
        }
        if config.flush_every_ms.is_some() {
            sled_config = sled_config.flush_every_ms(config.flush_every_ms);
        }

        let db = sled_config.open()?;
        let name = config
            .path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "temporary".to_string());

        Ok(Self { db, name })
    }

    /// Wrap a database the caller already opened.
    pub fn from_db(db: sled::Db, name: impl Into<String>) -> Self {
        Self {
            db,
            name: name.into(),
        }
    }

    /// The underlying sled database.
    pub fn db(&self) -> &sled::Db {
        &self.db
    }
}

impl Backend for SledBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn open_partition(&self, name: &str) -> Result<Arc<dyn Partition>> {
        let tree = self.db.open_tree(name)?;
        Ok(Arc::new(SledPartition {
            name: name.to_string(),
            tree,
        }))
    }

    fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

struct SledPartition {
    name: String,
    tree: sled::Tree,
}

impl Partition for SledPartition {
    fn name(&self) -> &str {
        &self.name
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.tree.get(key)?.map(|value| value.to_vec()))
    }

    fn insert(&self, key: &[u8], value: Vec<u8>) -> Result<()> {
        self.tree.insert(key, value)?;
        Ok(())
    }

    fn remove(&self, key: &[u8]) -> Result<()> {
        self.tree.remove(key)?;
        Ok(())
    }

    fn range(&self, range: KeyRange, reverse: bool) -> PartitionIter {
        if range.is_empty() {
            return empty_iter();
        }

        let iter = self.tree.range::<Vec<u8>, _>(range.bounds());
        let to_owned = |entry: sled::Result<(sled::IVec, sled::IVec)>| -> Result<(Vec<u8>, Vec<u8>)> {
            let (k, v) = entry?;
            Ok((k.to_vec(), v.to_vec()))
        };

        if reverse {
            Box::new(iter.rev().map(to_owned))
        } else {
            Box::new(iter.map(to_owned))
        }
    }

    fn apply_batch(&self, entries: Vec<BatchEntry>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for entry in entries {
            match entry {
                BatchEntry::Put(key, value) => batch.insert(key, value),
                BatchEntry::Delete(key) => batch.remove(key),
            }
        }
        self.tree.apply_batch(batch)?;
        Ok(())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.tree.len())
    }

    fn flush(&self) -> Result<()> {
        self.tree.flush()?;
        Ok(())
    }
}
