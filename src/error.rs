use thiserror::Error;

/// Error type for every store, repository and manager operation.
///
/// Not-found on a point read or delete is never an error: reads return
/// `Ok(None)` and deletes of absent keys succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The storage engine failed (I/O, corruption, engine-level errors).
    #[error("storage error: {0}")]
    Storage(String),

    /// A record or key could not be encoded with the requested encoding.
    #[error("encode error: {0}")]
    Encode(String),

    /// A stored record or key could not be decoded with the requested encoding.
    #[error("decode error: {0}")]
    Decode(String),

    /// The caller used the API in a way it cannot honour.
    #[error("invalid usage: {0}")]
    InvalidUsage(String),

    /// A unique index already maps the value to another primary key.
    #[error("unique index {collection}.{field} already maps {value} to {existing}")]
    UniqueViolation {
        collection: String,
        field: String,
        value: String,
        existing: String,
    },

    /// The store handle was closed.
    #[error("store {0} is closed")]
    Closed(String),

    #[error("store lock poisoned during {0}")]
    LockPoisoned(&'static str),

    /// A blocking task spawned by the async facade panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Task(String),
}

impl StoreError {
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        StoreError::InvalidUsage(message.into())
    }
}

impl From<sled::Error> for StoreError {
    fn from(err: sled::Error) -> Self {
        StoreError::Storage(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
