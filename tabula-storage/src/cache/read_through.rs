//! Read-through cache definitions and the table loader contract.
//!
//! A [`ReadThroughCache`] binds a key, a TTL and a [`Loader`] to the process
//! [`CacheManager`]. Definitions register their key when they are built, so
//! `invalidate` always reaches a known slot.

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{RowView, Schema, TabulaResult};

use super::manager::CacheManager;
use crate::backend::TabularBackend;

/// Produces the value behind a cache key on a miss.
#[async_trait]
pub trait Loader<T>: Send + Sync {
    async fn load(&self) -> TabulaResult<T>;
}

/// Maps one data row of a source table into a cached item.
pub trait RowMapper: Send + Sync + 'static {
    type Item: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Columns that must exist in the header; a missing one is a configuration error.
    fn required_columns(&self) -> &[&'static str];

    /// `None` skips the row.
    fn map_row(&self, row: RowView<'_>) -> Option<Self::Item>;
}

/// Loads a whole table and maps each row with a [`RowMapper`].
pub struct TableLoader<M: RowMapper> {
    backend: Arc<dyn TabularBackend>,
    table: String,
    mapper: M,
}

impl<M: RowMapper> TableLoader<M> {
    pub fn new(backend: Arc<dyn TabularBackend>, table: impl Into<String>, mapper: M) -> Self {
        Self {
            backend,
            table: table.into(),
            mapper,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }
}

#[async_trait]
impl<M: RowMapper> Loader<Vec<M::Item>> for TableLoader<M> {
    async fn load(&self) -> TabulaResult<Vec<M::Item>> {
        let handle = self.backend.table(&self.table).await?;
        let rows = handle.all_rows().await?;
        let Some((header, data)) = rows.split_first() else {
            return Ok(Vec::new());
        };

        let schema = Schema::from_header(self.table.as_str(), header);
        let index = schema.require(self.mapper.required_columns())?;

        let items: Vec<M::Item> = data
            .iter()
            .filter_map(|row| self.mapper.map_row(index.view(row)))
            .collect();

        tracing::info!(
            event = "cache.loaded",
            table = %self.table,
            count = items.len(),
            skipped = data.len() - items.len(),
        );
        Ok(items)
    }
}

/// A named get-or-load cache slot.
pub struct ReadThroughCache<T> {
    key: String,
    ttl: Duration,
    manager: Arc<CacheManager>,
    loader: Arc<dyn Loader<T>>,
}

impl<T> ReadThroughCache<T>
where
    T: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Define a cache slot and register its key with the manager.
    pub fn define(
        manager: Arc<CacheManager>,
        key: impl Into<String>,
        ttl: Duration,
        loader: Arc<dyn Loader<T>>,
    ) -> Self {
        let key = key.into();
        manager.register(&key, ttl);
        Self {
            key,
            ttl,
            manager,
            loader,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Cached value, loading it on a miss.
    pub async fn get(&self) -> TabulaResult<Arc<T>> {
        let loader = Arc::clone(&self.loader);
        self.manager
            .get_or_load(&self.key, self.ttl, || async move { loader.load().await })
            .await
    }

    /// Clear this slot in both layers.
    pub async fn invalidate(&self) -> TabulaResult<()> {
        self.manager.invalidate(&self.key).await
    }
}

impl<T> Clone for ReadThroughCache<T> {
    fn clone(&self) -> Self {
        Self {
            key: self.key.clone(),
            ttl: self.ttl,
            manager: Arc::clone(&self.manager),
            loader: Arc::clone(&self.loader),
        }
    }
}
