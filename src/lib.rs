//! Ordered key-value persistence for Plain Old Rust Structs.
//!
//! Bind a model type to an opened store and get `get` / `save` / `remove` /
//! `all` / `remove_all` on its own partition, with optional secondary indexes.

// Lets the derive macro's `level_model::` paths resolve inside this crate.
extern crate self as level_model;

pub mod backend;
mod codec;
mod config;
mod error;
mod events;
mod index;
mod level;
mod manager;
mod model;
#[cfg(feature = "runtime")]
mod nonblocking;
mod options;

pub use backend::{Backend, InMemoryBackend, Partition, SledBackend};
pub use config::StoreConfig;
pub use error::{Result, StoreError};
pub use events::ModelEvent;
pub use level::Level;
pub use manager::{CloseReport, StoreManager};
pub use model::{
    BatchOp, IndexOptions, IndexSpec, Keys, Model, ModelRepository, ModelsExt, Records,
};
#[cfg(feature = "runtime")]
pub use nonblocking::AsyncModelRepository;
pub use options::{KeyEncoding, Options, ReadOptions, ResolvedOptions, ValueEncoding};

pub use level_model_macros::Model;
