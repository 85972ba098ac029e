//! Lifecycle events for model repositories.
//!
//! Listeners (feature `emitter`) are registered per collection and per
//! [`ModelEvent`]. Each receives a string payload: the saved record as JSON
//! text, the removed key, or the error message.

#[cfg(feature = "emitter")]
use std::sync::Mutex;

#[cfg(feature = "emitter")]
use event_emitter_rs::EventEmitter;

#[cfg(feature = "emitter")]
use crate::error::{Result, StoreError};

/// Events emitted by a [`ModelRepository`](crate::ModelRepository) after the
/// store operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelEvent {
    /// A record was written. Payload: the record as JSON text.
    Save,
    /// A record was deleted. Payload: the primary key.
    Remove,
    /// An operation failed. Payload: the error message.
    Error,
}

impl ModelEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelEvent::Save => "save",
            ModelEvent::Remove => "remove",
            ModelEvent::Error => "error",
        }
    }
}

/// Event hub shared by every repository bound to one store handle.
#[cfg(feature = "emitter")]
pub(crate) struct Events {
    emitter: Mutex<EventEmitter>,
}

#[cfg(feature = "emitter")]
impl Events {
    pub(crate) fn new() -> Self {
        Events {
            emitter: Mutex::new(EventEmitter::new()),
        }
    }

    fn scoped(collection: &str, event: ModelEvent) -> String {
        format!("{}:{}", collection, event.as_str())
    }

    /// Register a listener; returns its id for [`Events::off`].
    pub(crate) fn on<F>(&self, collection: &str, event: ModelEvent, listener: F) -> Result<String>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| StoreError::LockPoisoned("register listener"))?;
        Ok(emitter.on(&Self::scoped(collection, event), listener))
    }

    pub(crate) fn off(&self, listener_id: &str) -> Result<bool> {
        let mut emitter = self
            .emitter
            .lock()
            .map_err(|_| StoreError::LockPoisoned("remove listener"))?;
        Ok(emitter.remove_listener(listener_id).is_some())
    }

    /// Emit and wait for every listener to run.
    pub(crate) fn emit(&self, collection: &str, event: ModelEvent, payload: String) {
        let handles = match self.emitter.lock() {
            Ok(mut emitter) => emitter.emit(&Self::scoped(collection, event), payload),
            Err(_) => {
                tracing::warn!(collection, event = event.as_str(), "event emitter poisoned");
                return;
            }
        };

        for handle in handles {
            if handle.join().is_err() {
                tracing::warn!(collection, event = event.as_str(), "event listener panicked");
            }
        }
    }
}
