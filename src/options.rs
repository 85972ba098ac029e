//! Per-operation options and the defaults they are merged over.

use std::ops::Bound;

use serde::{Deserialize, Serialize};

use crate::backend::KeyRange;
use crate::codec;
use crate::error::Result;

/// How primary keys are turned into stored key bytes.
///
/// `Utf8` stores the key text as-is. `Hex` and `Base64` expect the key to be
/// hex/base64 text and store the decoded bytes; reads give back the same text
/// form. Only `Utf8` and `Hex` keep store order equal to key-text order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyEncoding {
    #[default]
    Utf8,
    Hex,
    Base64,
}

/// How records are turned into stored value bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueEncoding {
    #[default]
    Json,
    Bitcode,
}

/// Caller-supplied options for a single operation. Unset fields fall back to
/// the store defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Options {
    pub key_encoding: Option<KeyEncoding>,
    pub value_encoding: Option<ValueEncoding>,
    /// Flush the partition to disk before the write returns.
    pub sync: Option<bool>,
}

impl Options {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_encoding(mut self, encoding: KeyEncoding) -> Self {
        self.key_encoding = Some(encoding);
        self
    }

    pub fn value_encoding(mut self, encoding: ValueEncoding) -> Self {
        self.value_encoding = Some(encoding);
        self
    }

    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Layer these options over `defaults`. Fields set here win.
    pub fn merge(&self, defaults: &ResolvedOptions) -> ResolvedOptions {
        ResolvedOptions {
            key_encoding: self.key_encoding.unwrap_or(defaults.key_encoding),
            value_encoding: self.value_encoding.unwrap_or(defaults.value_encoding),
            sync: self.sync.unwrap_or(defaults.sync),
        }
    }
}

/// Fully merged options, as seen by the store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolvedOptions {
    pub key_encoding: KeyEncoding,
    pub value_encoding: ValueEncoding,
    pub sync: bool,
}

/// Options for bulk reads (`all`, `keys`, `remove_all`).
///
/// Bounds are keys in their text form; they are encoded with the resolved key
/// encoding. When both the inclusive and the exclusive bound of one side are
/// set, the inclusive bound is used.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadOptions {
    pub options: Options,
    pub gt: Option<String>,
    pub gte: Option<String>,
    pub lt: Option<String>,
    pub lte: Option<String>,
    pub reverse: bool,
    pub limit: Option<usize>,
}

impl ReadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn gt(mut self, key: impl Into<String>) -> Self {
        self.gt = Some(key.into());
        self
    }

    pub fn gte(mut self, key: impl Into<String>) -> Self {
        self.gte = Some(key.into());
        self
    }

    pub fn lt(mut self, key: impl Into<String>) -> Self {
        self.lt = Some(key.into());
        self
    }

    pub fn lte(mut self, key: impl Into<String>) -> Self {
        self.lte = Some(key.into());
        self
    }

    pub fn reverse(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub(crate) fn key_range(&self, encoding: KeyEncoding) -> Result<KeyRange> {
        let lower = match (&self.gte, &self.gt) {
            (Some(key), _) => Bound::Included(codec::encode_key(key, encoding)?),
            (None, Some(key)) => Bound::Excluded(codec::encode_key(key, encoding)?),
            (None, None) => Bound::Unbounded,
        };
        let upper = match (&self.lte, &self.lt) {
            (Some(key), _) => Bound::Included(codec::encode_key(key, encoding)?),
            (None, Some(key)) => Bound::Excluded(codec::encode_key(key, encoding)?),
            (None, None) => Bound::Unbounded,
        };
        Ok(KeyRange { lower, upper })
    }
}

impl From<Options> for ReadOptions {
    fn from(options: Options) -> Self {
        ReadOptions::new().with_options(options)
    }
}
