//! Models - typed records stored in their own partition of a store.
//!
//! A model type picks a collection name (its partition, or "sublevel") and a
//! primary key. Binding it to a [`Level`](crate::Level) handle yields a
//! [`ModelRepository`] carrying every storage operation for that type.
//!
//! ## Example
//!
//! ```ignore
//! use level_model::{Level, Model, ModelsExt};
//!
//! #[derive(Serialize, Deserialize, Clone, Model)]
//! #[model(collection = "user")]
//! struct User {
//!     pub id: String,
//!     #[model(index, unique)]
//!     pub email: String,
//! }
//!
//! let level = Level::open("./db")?;
//! let users = level.models::<User>()?;
//! users.save(&user)?;
//! let loaded = users.get("1")?;
//! let by_email = users.find_by("email", "matt@matt.com")?;
//! ```

mod model_repository;
mod records;

use std::borrow::Cow;

use serde::{de::DeserializeOwned, Serialize};

/// Trait for types that can be stored as models.
pub trait Model: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// The partition this model type lives in (e.g., "user", "post").
    /// Must be non-empty and must not contain `!`.
    const COLLECTION: &'static str;

    /// Secondary indexes maintained for every repository of this type.
    const INDEXES: &'static [IndexSpec] = &[];

    /// Returns the primary key of this model instance.
    fn id(&self) -> &str;
}

/// A secondary index declaration on one top-level record field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IndexSpec {
    pub field: Cow<'static, str>,
    pub unique: bool,
}

impl IndexSpec {
    pub const fn new(field: &'static str) -> Self {
        IndexSpec {
            field: Cow::Borrowed(field),
            unique: false,
        }
    }

    pub const fn unique(field: &'static str) -> Self {
        IndexSpec {
            field: Cow::Borrowed(field),
            unique: true,
        }
    }

    pub fn named(field: impl Into<String>, options: IndexOptions) -> Self {
        IndexSpec {
            field: Cow::Owned(field.into()),
            unique: options.unique,
        }
    }
}

/// Options for [`ModelRepository::index`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexOptions {
    /// Reject saves that would map one field value to two primary keys.
    pub unique: bool,
}

impl IndexOptions {
    pub fn unique() -> Self {
        IndexOptions { unique: true }
    }
}

/// One operation of a [`ModelRepository::batch`].
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOp<M> {
    Put(M),
    Del(String),
}

pub use model_repository::{ModelRepository, ModelsExt};
pub use records::{Keys, Records};
