//! StoreConfig - how a store handle is opened and which defaults it applies.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::options::{KeyEncoding, ResolvedOptions, ValueEncoding};

/// Configuration for opening a sled-backed store.
///
/// Deserializable from any serde format; every field is optional.
///
/// ```ignore
/// let config: StoreConfig = serde_json::from_str(r#"{
///     "path": "./data/app",
///     "cache_capacity": 67108864,
///     "value_encoding": "json"
/// }"#)?;
/// let level = Level::open_with(config)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database directory. `None` opens a temporary database.
    pub path: Option<PathBuf>,
    /// Remove the database when the last handle drops.
    pub temporary: bool,
    /// Page cache size in bytes.
    pub cache_capacity: Option<u64>,
    /// Background flush interval.
    pub flush_every_ms: Option<u64>,
    /// Default key encoding for every operation.
    pub key_encoding: KeyEncoding,
    /// Default value encoding for every operation.
    pub value_encoding: ValueEncoding,
    /// Flush after every write unless an operation says otherwise.
    pub sync: bool,
}

impl StoreConfig {
    /// Persistent database at `path` with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    /// Throwaway database, removed on drop.
    pub fn temporary() -> Self {
        Self {
            temporary: true,
            ..Self::default()
        }
    }

    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity = Some(bytes);
        self
    }

    pub fn flush_every_ms(mut self, ms: u64) -> Self {
        self.flush_every_ms = Some(ms);
        self
    }

    pub fn key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = encoding;
        self
    }

    pub fn value_encoding(mut self, encoding: ValueEncoding) -> Self {
        self.value_encoding = encoding;
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// The defaults every operation on the opened store is merged over.
    pub fn defaults(&self) -> ResolvedOptions {
        ResolvedOptions {
            key_encoding: self.key_encoding,
            value_encoding: self.value_encoding,
            sync: self.sync,
        }
    }
}
