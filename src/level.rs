//! Level - an opened store handle shared by every model bound to it.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::backend::{Backend, InMemoryBackend, Partition, SledBackend};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
#[cfg(feature = "emitter")]
use crate::events::Events;
use crate::model::IndexSpec;
use crate::options::ResolvedOptions;

struct LevelInner {
    name: String,
    /// Dropped on close so the engine releases its files.
    backend: RwLock<Option<Box<dyn Backend>>>,
    defaults: ResolvedOptions,
    closed: AtomicBool,
    /// Secondary indexes declared per collection.
    indexes: RwLock<HashMap<String, Vec<IndexSpec>>>,
    #[cfg(feature = "emitter")]
    events: Events,
}

/// An opened ordered key-value store.
///
/// Clone-friendly via Arc: clones are the same handle, so closing one closes
/// all of them. Closing drops the backend even while repositories bound to
/// the handle are still alive; a closed sled database can be reopened at the
/// same path. Bind model types with [`ModelsExt::models`](crate::ModelsExt).
#[derive(Clone)]
pub struct Level {
    inner: Arc<LevelInner>,
}

impl fmt::Debug for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Level")
            .field("name", &self.name())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Level {
    /// Open (creating if needed) a sled database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(StoreConfig::new(path.as_ref()))
    }

    /// Open a sled database from a [`StoreConfig`].
    pub fn open_with(config: StoreConfig) -> Result<Self> {
        let backend = SledBackend::open_with(&config)?;
        tracing::debug!(store = backend.name(), "opened store");
        Ok(Self::from_backend(backend, config.defaults()))
    }

    /// A fresh in-memory store with default options.
    pub fn memory() -> Self {
        Self::from_backend(InMemoryBackend::new(), ResolvedOptions::default())
    }

    /// Wrap a backend the caller opened, applying `defaults` to every operation.
    pub fn from_backend(backend: impl Backend + 'static, defaults: ResolvedOptions) -> Self {
        Level {
            inner: Arc::new(LevelInner {
                name: backend.name().to_string(),
                backend: RwLock::new(Some(Box::new(backend))),
                defaults,
                closed: AtomicBool::new(false),
                indexes: RwLock::new(HashMap::new()),
                #[cfg(feature = "emitter")]
                events: Events::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Options every operation is merged over.
    pub fn defaults(&self) -> ResolvedOptions {
        self.inner.defaults
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Persist everything written so far.
    pub fn flush(&self) -> Result<()> {
        self.with_backend(|backend| backend.flush())
    }

    /// Flush and release the backend. Later operations fail with
    /// [`StoreError::Closed`]. Closing twice is a no-op.
    ///
    /// Scans started before the close keep their partition alive until they
    /// are dropped.
    pub fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::debug!(store = self.name(), "closing store");

        let backend = self
            .inner
            .backend
            .write()
            .map_err(|_| StoreError::LockPoisoned("close store"))?
            .take();
        match backend {
            Some(backend) => backend.flush(),
            None => Ok(()),
        }
    }

    fn with_backend<T>(&self, op: impl FnOnce(&dyn Backend) -> Result<T>) -> Result<T> {
        self.ensure_open()?;
        let backend = self
            .inner
            .backend
            .read()
            .map_err(|_| StoreError::LockPoisoned("read backend"))?;
        match backend.as_deref() {
            Some(backend) => op(backend),
            None => Err(StoreError::Closed(self.name().to_string())),
        }
    }

    pub(crate) fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(StoreError::Closed(self.name().to_string()));
        }
        Ok(())
    }

    pub(crate) fn partition(&self, name: &str) -> Result<Arc<dyn Partition>> {
        self.with_backend(|backend| backend.open_partition(name))
    }

    /// Record an index declaration. Returns true when it is new or changes
    /// the uniqueness of an existing one.
    pub(crate) fn declare_index(&self, collection: &str, spec: &IndexSpec) -> Result<bool> {
        let mut indexes = self
            .inner
            .indexes
            .write()
            .map_err(|_| StoreError::LockPoisoned("declare index"))?;
        let declared = indexes.entry(collection.to_string()).or_default();

        match declared.iter_mut().find(|d| d.field == spec.field) {
            Some(existing) if existing.unique == spec.unique => Ok(false),
            Some(existing) => {
                existing.unique = spec.unique;
                Ok(true)
            }
            None => {
                declared.push(spec.clone());
                Ok(true)
            }
        }
    }

    pub(crate) fn undeclare_index(&self, collection: &str, field: &str) -> Result<()> {
        let mut indexes = self
            .inner
            .indexes
            .write()
            .map_err(|_| StoreError::LockPoisoned("undeclare index"))?;
        if let Some(declared) = indexes.get_mut(collection) {
            declared.retain(|d| d.field != field);
        }
        Ok(())
    }

    pub(crate) fn declared_index(&self, collection: &str, field: &str) -> Result<Option<IndexSpec>> {
        Ok(self
            .declared_indexes(collection)?
            .into_iter()
            .find(|d| d.field == field))
    }

    pub(crate) fn declared_indexes(&self, collection: &str) -> Result<Vec<IndexSpec>> {
        let indexes = self
            .inner
            .indexes
            .read()
            .map_err(|_| StoreError::LockPoisoned("read indexes"))?;
        Ok(indexes.get(collection).cloned().unwrap_or_default())
    }

    #[cfg(feature = "emitter")]
    pub(crate) fn events(&self) -> &Events {
        &self.inner.events
    }
}
