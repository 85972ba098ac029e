//! StoreManager - explicit registry of opened store handles for shutdown.

use std::path::Path;
use std::sync::{Mutex, PoisonError};

use crate::config::StoreConfig;
use crate::error::Result;
use crate::level::Level;

/// Outcome of [`StoreManager::close_all`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CloseReport {
    pub closed: usize,
    pub failed: usize,
}

/// Owns the list of store handles an application opened, so they can all be
/// closed at shutdown.
///
/// Opening the same path twice is not detected; sled itself refuses a second
/// open of a locked database.
///
/// ```ignore
/// let manager = StoreManager::new();
/// let level = manager.open("./data/app")?;
/// let users = level.models::<User>()?;
/// // ...
/// manager.close_all();
/// ```
#[derive(Default)]
pub struct StoreManager {
    stores: Mutex<Vec<Level>>,
}

impl StoreManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a sled database at `path` and register it.
    pub fn open(&self, path: impl AsRef<Path>) -> Result<Level> {
        Ok(self.register(Level::open(path)?))
    }

    /// Open a sled database from `config` and register it.
    pub fn open_with(&self, config: StoreConfig) -> Result<Level> {
        Ok(self.register(Level::open_with(config)?))
    }

    /// Register a handle opened elsewhere. Returns it for chaining.
    pub fn register(&self, level: Level) -> Level {
        tracing::debug!(store = level.name(), "registered store");
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(level.clone());
        level
    }

    /// Number of registered handles.
    pub fn len(&self) -> usize {
        self.stores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every registered handle in registration order and empty the
    /// registry. Failures are logged and counted, never retried.
    pub fn close_all(&self) -> CloseReport {
        let stores: Vec<Level> = std::mem::take(
            &mut *self.stores.lock().unwrap_or_else(PoisonError::into_inner),
        );

        let mut report = CloseReport::default();
        for level in stores {
            match level.close() {
                Ok(()) => {
                    tracing::debug!(store = level.name(), "closed store");
                    report.closed += 1;
                }
                Err(err) => {
                    tracing::error!(store = level.name(), error = %err, "failed to close store");
                    report.failed += 1;
                }
            }
        }
        report
    }

    /// Wait for SIGTERM or Ctrl-C, then [`close_all`](Self::close_all).
    #[cfg(feature = "runtime")]
    pub async fn close_on_signal(&self) -> std::io::Result<CloseReport> {
        let signal = wait_for_shutdown_signal().await?;
        tracing::info!(signal, stores = self.len(), "closing stores on shutdown");
        Ok(self.close_all())
    }
}

#[cfg(feature = "runtime")]
async fn wait_for_shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result.map(|_| "SIGINT"),
            _ = sigterm.recv() => Ok("SIGTERM"),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        Ok("SIGINT")
    }
}
