//! ModelRepository - Typed accessor for one model type's partition.

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use super::{BatchOp, IndexOptions, IndexSpec, Keys, Model, Records};
use crate::backend::{BatchEntry, KeyRange, Partition, PartitionIter};
use crate::codec;
use crate::error::{Result, StoreError};
use crate::events::ModelEvent;
use crate::index::{self, Index};
use crate::level::Level;
use crate::options::{KeyEncoding, Options, ReadOptions, ResolvedOptions, ValueEncoding};

/// Storage operations for models of type `M`, bound to one store handle.
///
/// Cheap to clone; clones share the handle. The partition is looked up
/// through the handle on every operation, so a repository never keeps a
/// closed store open.
pub struct ModelRepository<M> {
    level: Level,
    _marker: PhantomData<fn() -> M>,
}

impl<M> Clone for ModelRepository<M> {
    fn clone(&self) -> Self {
        Self {
            level: self.level.clone(),
            _marker: PhantomData,
        }
    }
}

impl<M: Model> fmt::Debug for ModelRepository<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelRepository")
            .field("collection", &M::COLLECTION)
            .field("level", &self.level)
            .finish()
    }
}

impl<M: Model> ModelRepository<M> {
    /// Bind `M` to `level`: open its partition and declare `M::INDEXES`.
    pub fn new(level: &Level) -> Result<Self> {
        validate_collection(M::COLLECTION)?;
        level.partition(M::COLLECTION)?;
        let repo = Self {
            level: level.clone(),
            _marker: PhantomData,
        };

        for spec in M::INDEXES {
            repo.declare(spec.clone())?;
        }

        Ok(repo)
    }

    /// The store handle this repository is bound to.
    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn collection(&self) -> &'static str {
        M::COLLECTION
    }

    // ------------------------------------------------------------------
    // Point operations
    // ------------------------------------------------------------------

    /// Get a model by primary key. Absent keys are `Ok(None)`.
    pub fn get(&self, key: &str) -> Result<Option<M>> {
        self.get_with(key, Options::default())
    }

    /// Alias of [`get`](Self::get).
    pub fn find(&self, key: &str) -> Result<Option<M>> {
        self.get(key)
    }

    pub fn get_with(&self, key: &str, options: Options) -> Result<Option<M>> {
        let result = self.get_inner(key, options);
        self.observe(result)
    }

    fn get_inner(&self, key: &str, options: Options) -> Result<Option<M>> {
        self.level.ensure_open()?;
        let opts = self.resolve(&options);
        debug!(collection = M::COLLECTION, key, "get");

        let encoded = codec::encode_key(key, opts.key_encoding)?;
        match self.records()?.get(&encoded)? {
            Some(raw) => {
                let model = codec::decode_value(&raw, opts.value_encoding)?;
                debug!(collection = M::COLLECTION, key, "get hit");
                Ok(Some(model))
            }
            None => {
                debug!(collection = M::COLLECTION, key, "get miss");
                Ok(None)
            }
        }
    }

    /// Write `model` under its primary key, last write wins. Returns the
    /// stored record as JSON.
    pub fn save(&self, model: &M) -> Result<Value> {
        self.save_with(model, Options::default())
    }

    /// Alias of [`save`](Self::save).
    pub fn update(&self, model: &M) -> Result<Value> {
        self.save(model)
    }

    pub fn save_with(&self, model: &M, options: Options) -> Result<Value> {
        let result = self.save_inner(model, options);
        if let Ok(json) = &result {
            self.emit(ModelEvent::Save, || json.to_string());
        }
        self.observe(result)
    }

    fn save_inner(&self, model: &M, options: Options) -> Result<Value> {
        self.level.ensure_open()?;
        let opts = self.resolve(&options);
        let id = model.id();
        if id.is_empty() {
            return Err(StoreError::invalid(format!(
                "cannot save {} without a primary key",
                M::COLLECTION
            )));
        }

        let key = codec::encode_key(id, opts.key_encoding)?;
        let json = serde_json::to_value(model).map_err(|e| StoreError::Encode(e.to_string()))?;
        let bytes = codec::encode_value(model, opts.value_encoding)?;
        debug!(collection = M::COLLECTION, key = id, "put");

        let indexes = self.open_indexes()?;
        if indexes.is_empty() {
            self.records()?.insert(&key, bytes)?;
        } else {
            for index in &indexes {
                if let Some(value) = index::field_value(&json, index.field()) {
                    index.check_unique(&value, &key, opts.key_encoding)?;
                }
            }
            let previous = self.previous_json(&key, opts.value_encoding)?;
            self.records()?.insert(&key, bytes)?;
            for index in &indexes {
                index.replace(previous.as_ref(), Some(&json), &key)?;
            }
        }

        if opts.sync {
            self.records()?.flush()?;
        }
        debug!(collection = M::COLLECTION, key = id, "put done");
        Ok(json)
    }

    /// Delete `model`'s record. Deleting an absent record succeeds.
    pub fn remove(&self, model: &M) -> Result<()> {
        self.remove_key_with(model.id(), Options::default())
    }

    pub fn remove_with(&self, model: &M, options: Options) -> Result<()> {
        self.remove_key_with(model.id(), options)
    }

    /// Delete the record stored under `key`.
    pub fn remove_key(&self, key: &str) -> Result<()> {
        self.remove_key_with(key, Options::default())
    }

    pub fn remove_key_with(&self, key: &str, options: Options) -> Result<()> {
        let result = self.remove_key_inner(key, options);
        if result.is_ok() {
            self.emit(ModelEvent::Remove, || key.to_string());
        }
        self.observe(result)
    }

    fn remove_key_inner(&self, key: &str, options: Options) -> Result<()> {
        self.level.ensure_open()?;
        let opts = self.resolve(&options);
        debug!(collection = M::COLLECTION, key, "del");

        let encoded = codec::encode_key(key, opts.key_encoding)?;
        let indexes = self.open_indexes()?;
        self.delete_encoded(&encoded, &indexes, &opts)?;

        if opts.sync {
            self.records()?.flush()?;
        }
        debug!(collection = M::COLLECTION, key, "del done");
        Ok(())
    }

    fn delete_encoded(&self, key: &[u8], indexes: &[Index], opts: &ResolvedOptions) -> Result<()> {
        if indexes.is_empty() {
            return self.records()?.remove(key);
        }

        let previous = self.previous_json(key, opts.value_encoding)?;
        self.records()?.remove(key)?;
        for index in indexes {
            index.replace(previous.as_ref(), None, key)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Secondary indexes
    // ------------------------------------------------------------------

    /// Declare a secondary index on `field` and back-fill it from the stored
    /// records. Declarations are shared by every repository of `M` on this
    /// handle. Fails with `UniqueViolation` if `unique` is requested and the
    /// stored records already conflict; the index is then not declared.
    pub fn index(&self, field: &str, options: IndexOptions) -> Result<&Self> {
        if field.is_empty() {
            return Err(StoreError::invalid("index field name is empty"));
        }
        self.declare(IndexSpec::named(field, options))?;
        Ok(self)
    }

    fn declare(&self, spec: IndexSpec) -> Result<()> {
        let previous = self.level.declared_index(M::COLLECTION, &spec.field)?;
        if !self.level.declare_index(M::COLLECTION, &spec)? {
            return Ok(());
        }

        debug!(collection = M::COLLECTION, field = %spec.field, unique = spec.unique, "index");
        if let Err(err) = self.rebuild_index(spec.clone()) {
            match previous {
                Some(previous) => {
                    self.level.declare_index(M::COLLECTION, &previous)?;
                    self.rebuild_index(previous)?;
                }
                None => self.level.undeclare_index(M::COLLECTION, &spec.field)?,
            }
            return Err(err);
        }
        Ok(())
    }

    /// Re-create the index partition from the stored records. Unique
    /// conflicts are found before the partition is touched.
    fn rebuild_index(&self, spec: IndexSpec) -> Result<()> {
        let partition = self
            .level
            .partition(&index::partition_name(M::COLLECTION, &spec.field))?;
        let index = Index::new(M::COLLECTION, spec, partition);
        let defaults = self.level.defaults();

        let mut entries = Vec::new();
        for entry in self.records()?.range(KeyRange::all(), false) {
            let (key, raw) = entry?;
            let model: M = codec::decode_value(&raw, defaults.value_encoding)?;
            let json = serde_json::to_value(&model).map_err(|e| StoreError::Encode(e.to_string()))?;
            if let Some(value) = index::field_value(&json, index.field()) {
                entries.push((value, key));
            }
        }

        if index.is_unique() {
            let mut owners: HashMap<&str, &[u8]> = HashMap::new();
            for (value, key) in &entries {
                if let Some(existing) = owners.insert(value.as_str(), key.as_slice()) {
                    return Err(index.violation(value, existing, defaults.key_encoding));
                }
            }
        }

        index.clear()?;
        for (value, key) in &entries {
            index.insert(value, key)?;
        }
        Ok(())
    }

    fn open_indexes(&self) -> Result<Vec<Index>> {
        self.level
            .declared_indexes(M::COLLECTION)?
            .into_iter()
            .map(|spec| {
                let partition = self
                    .level
                    .partition(&index::partition_name(M::COLLECTION, &spec.field))?;
                Ok(Index::new(M::COLLECTION, spec, partition))
            })
            .collect()
    }

    fn index_for(&self, field: &str) -> Result<Index> {
        self.open_indexes()?
            .into_iter()
            .find(|index| index.field() == field)
            .ok_or_else(|| {
                StoreError::invalid(format!(
                    "no index declared on {}.{}",
                    M::COLLECTION,
                    field
                ))
            })
    }

    /// First model (in primary key order) whose indexed `field` equals `value`.
    pub fn find_by<V: Serialize + ?Sized>(&self, field: &str, value: &V) -> Result<Option<M>> {
        let result = self.find_by_inner(field, value, Some(1));
        self.observe(result).map(|mut found| found.pop())
    }

    /// Every model whose indexed `field` equals `value`, in primary key order.
    pub fn find_all_by<V: Serialize + ?Sized>(&self, field: &str, value: &V) -> Result<Vec<M>> {
        let result = self.find_by_inner(field, value, None);
        self.observe(result)
    }

    fn find_by_inner<V: Serialize + ?Sized>(
        &self,
        field: &str,
        value: &V,
        limit: Option<usize>,
    ) -> Result<Vec<M>> {
        self.level.ensure_open()?;
        let index = self.index_for(field)?;
        let value = serde_json::to_string(value).map_err(|e| StoreError::Encode(e.to_string()))?;
        let encoding = self.level.defaults().value_encoding;
        debug!(collection = M::COLLECTION, field, value = %value, "by");

        let mut found = Vec::new();
        for primary in index.lookup(&value)? {
            if limit.is_some_and(|limit| found.len() >= limit) {
                break;
            }
            // Entries can outlive their record when a delete raced a save.
            if let Some(raw) = self.records()?.get(&primary)? {
                found.push(codec::decode_value(&raw, encoding)?);
            }
        }
        Ok(found)
    }

    // ------------------------------------------------------------------
    // Bulk operations
    // ------------------------------------------------------------------

    /// Lazy scan over every model in store key order.
    pub fn all(&self) -> Result<Records<M>> {
        self.all_with(ReadOptions::default())
    }

    pub fn all_with(&self, read: ReadOptions) -> Result<Records<M>> {
        let result = self.scan(&read).map(|(iter, opts)| {
            Records::new(iter, opts.value_encoding, read.limit)
        });
        self.observe(result)
    }

    /// Lazy scan over every primary key in store key order.
    pub fn keys(&self) -> Result<Keys> {
        self.keys_with(ReadOptions::default())
    }

    pub fn keys_with(&self, read: ReadOptions) -> Result<Keys> {
        let result = self
            .scan(&read)
            .map(|(iter, opts)| Keys::new(iter, opts.key_encoding, read.limit));
        self.observe(result)
    }

    fn scan(&self, read: &ReadOptions) -> Result<(PartitionIter, ResolvedOptions)> {
        self.level.ensure_open()?;
        let opts = self.resolve(&read.options);
        let range = read.key_range(opts.key_encoding)?;
        debug!(collection = M::COLLECTION, reverse = read.reverse, limit = ?read.limit, "scan");
        Ok((self.records()?.range(range, read.reverse), opts))
    }

    /// Delete every record in the partition, key by key. Returns how many
    /// records were deleted. Not atomic: the first error stops the sweep and
    /// leaves earlier deletions in place.
    pub fn remove_all(&self) -> Result<usize> {
        self.remove_all_with(ReadOptions::default())
    }

    pub fn remove_all_with(&self, read: ReadOptions) -> Result<usize> {
        let result = self.remove_all_inner(&read);
        self.observe(result)
    }

    fn remove_all_inner(&self, read: &ReadOptions) -> Result<usize> {
        let (iter, opts) = self.scan(read)?;
        let indexes = self.open_indexes()?;
        let mut removed = 0;

        for entry in iter.take(read.limit.unwrap_or(usize::MAX)) {
            let (key, _) = entry?;
            self.delete_encoded(&key, &indexes, &opts)?;
            removed += 1;
            self.emit_removed(&key, opts.key_encoding);
        }

        if opts.sync {
            self.records()?.flush()?;
        }
        debug!(collection = M::COLLECTION, removed, "remove all done");
        Ok(removed)
    }

    /// Apply puts and deletes to the record partition in one atomic batch.
    /// Index partitions are updated afterwards.
    pub fn batch(&self, ops: Vec<BatchOp<M>>) -> Result<()> {
        self.batch_with(ops, Options::default())
    }

    pub fn batch_with(&self, ops: Vec<BatchOp<M>>, options: Options) -> Result<()> {
        let result = self.batch_inner(ops, options);
        self.observe(result)
    }

    fn batch_inner(&self, ops: Vec<BatchOp<M>>, options: Options) -> Result<()> {
        self.level.ensure_open()?;
        let opts = self.resolve(&options);
        let indexes = self.open_indexes()?;
        debug!(collection = M::COLLECTION, ops = ops.len(), "batch");

        // Encode everything up front so a bad op writes nothing.
        let mut entries = Vec::with_capacity(ops.len());
        let mut staged: Vec<(Vec<u8>, Option<Value>)> = Vec::with_capacity(ops.len());
        for op in &ops {
            match op {
                BatchOp::Put(model) => {
                    if model.id().is_empty() {
                        return Err(StoreError::invalid(format!(
                            "cannot batch-put {} without a primary key",
                            M::COLLECTION
                        )));
                    }
                    let key = codec::encode_key(model.id(), opts.key_encoding)?;
                    let json = serde_json::to_value(model)
                        .map_err(|e| StoreError::Encode(e.to_string()))?;
                    entries.push(BatchEntry::Put(
                        key.clone(),
                        codec::encode_value(model, opts.value_encoding)?,
                    ));
                    staged.push((key, Some(json)));
                }
                BatchOp::Del(id) => {
                    let key = codec::encode_key(id, opts.key_encoding)?;
                    entries.push(BatchEntry::Delete(key.clone()));
                    staged.push((key, None));
                }
            }
        }

        // Current record per key as the batch is replayed, starting from the store.
        let mut current: HashMap<Vec<u8>, Option<Value>> = HashMap::new();
        if !indexes.is_empty() {
            for (key, _) in &staged {
                if !current.contains_key(key) {
                    current.insert(key.clone(), self.previous_json(key, opts.value_encoding)?);
                }
            }
            self.check_batch_unique(&indexes, &staged, opts.key_encoding)?;
        }

        self.records()?.apply_batch(entries)?;

        for (key, next) in staged {
            if !indexes.is_empty() {
                let previous = current.get(&key).cloned().flatten();
                for index in &indexes {
                    index.replace(previous.as_ref(), next.as_ref(), &key)?;
                }
                current.insert(key.clone(), next.clone());
            }
            match &next {
                Some(json) => self.emit(ModelEvent::Save, || json.to_string()),
                None => self.emit_removed(&key, opts.key_encoding),
            }
        }

        if opts.sync {
            self.records()?.flush()?;
        }
        Ok(())
    }

    fn check_batch_unique(
        &self,
        indexes: &[Index],
        staged: &[(Vec<u8>, Option<Value>)],
        encoding: KeyEncoding,
    ) -> Result<()> {
        // Final owner of each unique value inside the batch.
        let mut claimed: HashMap<(String, String), Vec<u8>> = HashMap::new();
        for (key, next) in staged {
            let Some(json) = next else {
                continue;
            };
            for index in indexes.iter().filter(|index| index.is_unique()) {
                let Some(value) = index::field_value(json, index.field()) else {
                    continue;
                };
                let slot = (index.field().to_string(), value.clone());
                if let Some(owner) = claimed.get(&slot) {
                    if owner != key {
                        return Err(index.violation(&value, owner, encoding));
                    }
                }
                // Keys deleted or rewritten by this batch do not block.
                for existing in index.conflicts(&value, key)? {
                    if !staged.iter().any(|(k, _)| *k == existing) {
                        return Err(index.violation(&value, &existing, encoding));
                    }
                }
                claimed.insert(slot, key.clone());
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Misc
    // ------------------------------------------------------------------

    /// Number of records in the partition.
    pub fn len(&self) -> Result<usize> {
        self.level.ensure_open()?;
        self.records()?.len()
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Register a listener for `event` on this model type. Returns an id for
    /// [`off`](Self::off).
    #[cfg(feature = "emitter")]
    pub fn on<F>(&self, event: ModelEvent, listener: F) -> Result<String>
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.level.events().on(M::COLLECTION, event, listener)
    }

    #[cfg(feature = "emitter")]
    pub fn off(&self, listener_id: &str) -> Result<bool> {
        self.level.events().off(listener_id)
    }

    fn emit(&self, event: ModelEvent, payload: impl FnOnce() -> String) {
        #[cfg(feature = "emitter")]
        self.level.events().emit(M::COLLECTION, event, payload());
        #[cfg(not(feature = "emitter"))]
        let _ = (event, payload);
    }

    fn emit_removed(&self, key: &[u8], encoding: KeyEncoding) {
        if let Ok(text) = codec::decode_key(key, encoding) {
            self.emit(ModelEvent::Remove, || text);
        }
    }

    fn records(&self) -> Result<Arc<dyn Partition>> {
        self.level.partition(M::COLLECTION)
    }

    fn resolve(&self, options: &Options) -> ResolvedOptions {
        options.merge(&self.level.defaults())
    }

    /// Stored record under `key` as JSON, for index maintenance. Records that
    /// no longer decode are treated as absent.
    fn previous_json(&self, key: &[u8], encoding: ValueEncoding) -> Result<Option<Value>> {
        let Some(raw) = self.records()?.get(key)? else {
            return Ok(None);
        };
        let decoded = codec::decode_value::<M>(&raw, encoding).and_then(|model| {
            serde_json::to_value(&model).map_err(|e| StoreError::Encode(e.to_string()))
        });
        match decoded {
            Ok(json) => Ok(Some(json)),
            Err(err) => {
                warn!(collection = M::COLLECTION, error = %err, "stale record skipped for index cleanup");
                Ok(None)
            }
        }
    }

    /// Pass a result through, emitting `error` events on failure.
    fn observe<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(err) = &result {
            debug!(collection = M::COLLECTION, error = %err, "operation failed");
            self.emit(ModelEvent::Error, || err.to_string());
        }
        result
    }
}

fn validate_collection(collection: &str) -> Result<()> {
    if collection.is_empty() {
        return Err(StoreError::invalid("model collection name is empty"));
    }
    if collection.contains('!') {
        return Err(StoreError::invalid(format!(
            "model collection {:?} contains the reserved character '!'",
            collection
        )));
    }
    Ok(())
}

/// Extension trait binding model types to a store handle.
pub trait ModelsExt {
    /// Bind `M` and return its repository.
    fn models<M: Model>(&self) -> Result<ModelRepository<M>>;
}

impl ModelsExt for Level {
    fn models<M: Model>(&self) -> Result<ModelRepository<M>> {
        ModelRepository::new(self)
    }
}
