//! AsyncModelRepository - runs repository operations on tokio's blocking pool.

use serde::Serialize;
use serde_json::Value;

use crate::error::{Result, StoreError};
use crate::model::{Model, ModelRepository};
use crate::options::{Options, ReadOptions};

/// Async facade over a [`ModelRepository`]. Each call moves the work onto
/// `tokio::task::spawn_blocking`, so the calling task only suspends.
pub struct AsyncModelRepository<M> {
    inner: ModelRepository<M>,
}

impl<M> Clone for AsyncModelRepository<M> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<M: Model> ModelRepository<M> {
    pub fn into_async(self) -> AsyncModelRepository<M> {
        AsyncModelRepository { inner: self }
    }
}

impl<M: Model + 'static> AsyncModelRepository<M> {
    /// The blocking repository underneath.
    pub fn blocking(&self) -> &ModelRepository<M> {
        &self.inner
    }

    async fn run<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(ModelRepository<M>) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let repo = self.inner.clone();
        tokio::task::spawn_blocking(move || op(repo))
            .await
            .map_err(|e| StoreError::Task(e.to_string()))?
    }

    pub async fn get(&self, key: impl Into<String>) -> Result<Option<M>> {
        let key = key.into();
        self.run(move |repo| repo.get(&key)).await
    }

    pub async fn find_by<V>(&self, field: impl Into<String>, value: V) -> Result<Option<M>>
    where
        V: Serialize + Send + 'static,
    {
        let field = field.into();
        self.run(move |repo| repo.find_by(&field, &value)).await
    }

    pub async fn save(&self, model: M) -> Result<Value> {
        self.run(move |repo| repo.save(&model)).await
    }

    pub async fn save_with(&self, model: M, options: Options) -> Result<Value> {
        self.run(move |repo| repo.save_with(&model, options)).await
    }

    pub async fn remove(&self, model: M) -> Result<()> {
        self.run(move |repo| repo.remove(&model)).await
    }

    pub async fn remove_key(&self, key: impl Into<String>) -> Result<()> {
        let key = key.into();
        self.run(move |repo| repo.remove_key(&key)).await
    }

    /// Every model, collected on the blocking pool.
    pub async fn all(&self) -> Result<Vec<M>> {
        self.all_with(ReadOptions::default()).await
    }

    pub async fn all_with(&self, read: ReadOptions) -> Result<Vec<M>> {
        self.run(move |repo| repo.all_with(read)?.collect_all()).await
    }

    pub async fn remove_all(&self) -> Result<usize> {
        self.run(|repo| repo.remove_all()).await
    }
}
