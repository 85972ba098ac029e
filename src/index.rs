//! Secondary indexes, one partition per indexed field.
//!
//! Entry layout inside `{collection}!index!{field}`:
//!
//! ```text
//! key   = <field value as JSON text> 0x00 <encoded primary key>
//! value = <encoded primary key>
//! ```
//!
//! JSON text never contains a raw 0x00 byte, so the separator is unambiguous
//! and a prefix scan on `<value> 0x00` finds every record with that value.

use std::sync::Arc;

use serde_json::Value;

use crate::backend::{KeyRange, Partition};
use crate::codec;
use crate::error::{Result, StoreError};
use crate::model::IndexSpec;
use crate::options::KeyEncoding;

pub(crate) const PARTITION_SEPARATOR: &str = "!index!";

pub(crate) fn partition_name(collection: &str, field: &str) -> String {
    format!("{}{}{}", collection, PARTITION_SEPARATOR, field)
}

/// JSON text of a top-level field, or `None` when absent or null.
pub(crate) fn field_value(record: &Value, field: &str) -> Option<String> {
    match record.get(field) {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.to_string()),
    }
}

fn value_prefix(value: &str) -> Vec<u8> {
    let mut prefix = Vec::with_capacity(value.len() + 1);
    prefix.extend_from_slice(value.as_bytes());
    prefix.push(0);
    prefix
}

fn entry_key(value: &str, primary: &[u8]) -> Vec<u8> {
    let mut key = value_prefix(value);
    key.extend_from_slice(primary);
    key
}

/// An opened index partition for one field of one collection.
pub(crate) struct Index {
    collection: &'static str,
    spec: IndexSpec,
    partition: Arc<dyn Partition>,
}

impl Index {
    pub(crate) fn new(collection: &'static str, spec: IndexSpec, partition: Arc<dyn Partition>) -> Self {
        Index {
            collection,
            spec,
            partition,
        }
    }

    pub(crate) fn field(&self) -> &str {
        &self.spec.field
    }

    pub(crate) fn is_unique(&self) -> bool {
        self.spec.unique
    }

    /// Encoded primary keys whose field equals `value`, in key order.
    pub(crate) fn lookup(&self, value: &str) -> Result<Vec<Vec<u8>>> {
        self.partition
            .range(KeyRange::prefix(&value_prefix(value)), false)
            .map(|entry| entry.map(|(_, primary)| primary))
            .collect()
    }

    /// Primary keys other than `primary` that a unique index maps `value` to.
    /// Always empty for non-unique indexes.
    pub(crate) fn conflicts(&self, value: &str, primary: &[u8]) -> Result<Vec<Vec<u8>>> {
        if !self.spec.unique {
            return Ok(Vec::new());
        }
        Ok(self
            .lookup(value)?
            .into_iter()
            .filter(|existing| existing.as_slice() != primary)
            .collect())
    }

    /// Fail if a unique index already maps `value` to another primary key.
    pub(crate) fn check_unique(&self, value: &str, primary: &[u8], encoding: KeyEncoding) -> Result<()> {
        match self.conflicts(value, primary)?.first() {
            Some(existing) => Err(self.violation(value, existing, encoding)),
            None => Ok(()),
        }
    }

    /// `UniqueViolation` naming `existing` by its key text.
    pub(crate) fn violation(&self, value: &str, existing: &[u8], encoding: KeyEncoding) -> StoreError {
        let existing = codec::decode_key(existing, encoding)
            .unwrap_or_else(|_| String::from_utf8_lossy(existing).into_owned());
        StoreError::UniqueViolation {
            collection: self.collection.to_string(),
            field: self.spec.field.to_string(),
            value: value.to_string(),
            existing,
        }
    }

    pub(crate) fn insert(&self, value: &str, primary: &[u8]) -> Result<()> {
        self.partition.insert(&entry_key(value, primary), primary.to_vec())
    }

    pub(crate) fn remove(&self, value: &str, primary: &[u8]) -> Result<()> {
        self.partition.remove(&entry_key(value, primary))
    }

    /// Move `primary` from its old field value to its new one.
    pub(crate) fn replace(&self, old: Option<&Value>, new: Option<&Value>, primary: &[u8]) -> Result<()> {
        let old = old.and_then(|record| field_value(record, self.field()));
        let new = new.and_then(|record| field_value(record, self.field()));
        if old == new {
            return Ok(());
        }
        if let Some(old) = &old {
            self.remove(old, primary)?;
        }
        if let Some(new) = &new {
            self.insert(new, primary)?;
        }
        Ok(())
    }

    /// Drop every entry.
    pub(crate) fn clear(&self) -> Result<()> {
        for entry in self.partition.range(KeyRange::all(), false) {
            let (key, _) = entry?;
            self.partition.remove(&key)?;
        }
        Ok(())
    }
}
