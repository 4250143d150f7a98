//! Generic CRUD over named tables.
//!
//! Rows are mapped through the table's cached [`Schema`], which is checked
//! against the live header on every call. Reads never lock. Mutations hold
//! the `table:<name>` lock for the whole read-modify-write and touch the
//! backend with exactly one write call, so a failed mutation changes
//! nothing.
//!
//! Read caches are not refreshed by writes unless the integrator registers
//! the dependency with [`TableStore::invalidate_on_write`].

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{CellValue, Lookup, Record, Row, Schema, TabulaError, TabulaResult};

use crate::backend::{TableHandle, TabularBackend};
use crate::cache::{CacheManager, HeaderCache};
use crate::lock::{table_resource, LockGuard, MutualExclusion};

/// CRUD entry point for every table of the backing store.
pub struct TableStore {
    backend: Arc<dyn TabularBackend>,
    headers: HeaderCache,
    caches: Arc<CacheManager>,
    lock: Arc<dyn MutualExclusion>,
    lock_timeout: Duration,
    invalidations: DashMap<String, Vec<String>>,
}

impl TableStore {
    pub fn new(
        backend: Arc<dyn TabularBackend>,
        caches: Arc<CacheManager>,
        lock: Arc<dyn MutualExclusion>,
        lock_timeout: Duration,
        header_ttl: Duration,
    ) -> Self {
        Self {
            headers: HeaderCache::new(Arc::clone(&caches), Arc::clone(&backend), header_ttl),
            backend,
            caches,
            lock,
            lock_timeout,
            invalidations: DashMap::new(),
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    // ========================================================================
    // READS
    // ========================================================================

    /// First record whose `key_column` string-casts equal to `key`.
    pub async fn read(
        &self,
        table: &str,
        key_column: &str,
        key: impl Into<CellValue>,
    ) -> TabulaResult<Lookup<Record>> {
        let key = key.into().as_key_string();
        let (schema, _, rows) = self.load(table).await?;
        let key_idx = schema.key_index(key_column)?;

        Ok(find_row(&rows, key_idx, &key)
            .map(|idx| schema.to_record(&rows[idx]))
            .into())
    }

    /// Every data row as a record. A header-only table yields an empty list.
    pub async fn list(&self, table: &str) -> TabulaResult<Vec<Record>> {
        let (schema, _, rows) = self.load(table).await?;
        Ok(rows
            .iter()
            .skip(1)
            .map(|row| schema.to_record(row))
            .collect())
    }

    // ========================================================================
    // MUTATIONS
    // ========================================================================

    /// Append `records` after the last row. Returns the number written.
    pub async fn create(&self, table: &str, records: &[Record]) -> TabulaResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }

        let result = self.append_locked(table, records).await;
        self.finish(table, "table.write.fail", result, |n| *n > 0)
            .await
    }

    /// Patch the first row matching `key`. `false` when no row matches.
    pub async fn update(
        &self,
        table: &str,
        key_column: &str,
        key: impl Into<CellValue>,
        patch: &Record,
    ) -> TabulaResult<bool> {
        let key = key.into().as_key_string();

        let result = self.update_locked(table, key_column, &key, patch).await;
        self.finish(table, "table.update.fail", result, |updated| *updated)
            .await
    }

    /// Remove the first row matching `key`. `false` when no row matches.
    pub async fn delete(
        &self,
        table: &str,
        key_column: &str,
        key: impl Into<CellValue>,
    ) -> TabulaResult<bool> {
        let key = key.into().as_key_string();

        let result = self.delete_locked(table, key_column, &key).await;
        self.finish(table, "table.delete.fail", result, |deleted| *deleted)
            .await
    }

    // ========================================================================
    // INVALIDATION HOOKS
    // ========================================================================

    /// Invalidate `cache_key` after every successful mutation of `table`.
    pub fn invalidate_on_write(&self, table: &str, cache_key: &str) {
        let mut keys = self.invalidations.entry(table.to_string()).or_default();
        if !keys.iter().any(|k| k == cache_key) {
            keys.push(cache_key.to_string());
        }
    }

    /// Cache keys invalidated after writes to `table`.
    pub fn write_dependents(&self, table: &str) -> Vec<String> {
        self.invalidations
            .get(table)
            .map(|keys| keys.value().clone())
            .unwrap_or_default()
    }

    /// Forget the cached schema of `table` after its header changed.
    pub async fn invalidate_schema(&self, table: &str) -> TabulaResult<()> {
        self.headers.invalidate(table).await
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    async fn append_locked(&self, table: &str, records: &[Record]) -> TabulaResult<usize> {
        let _guard = self.acquire(table).await?;
        let handle = self.backend.table(table).await?;
        let schema = self.headers.schema(table).await?;
        schema.verify(&handle.header_row().await?)?;

        let rows: Vec<Row> = records.iter().map(|r| schema.to_row(r)).collect();
        handle.append_rows(rows).await?;
        Ok(records.len())
    }

    async fn update_locked(
        &self,
        table: &str,
        key_column: &str,
        key: &str,
        patch: &Record,
    ) -> TabulaResult<bool> {
        let _guard = self.acquire(table).await?;
        let (schema, handle, rows) = self.load(table).await?;
        let key_idx = schema.key_index(key_column)?;

        let Some(idx) = find_row(&rows, key_idx, key) else {
            return Ok(false);
        };
        let mut row = rows[idx].clone();
        schema.apply_patch(&mut row, patch);
        handle.set_row(idx + 1, row).await?;
        Ok(true)
    }

    async fn delete_locked(&self, table: &str, key_column: &str, key: &str) -> TabulaResult<bool> {
        let _guard = self.acquire(table).await?;
        let (schema, handle, rows) = self.load(table).await?;
        let key_idx = schema.key_index(key_column)?;

        let Some(idx) = find_row(&rows, key_idx, key) else {
            return Ok(false);
        };
        handle.delete_row(idx + 1).await?;
        Ok(true)
    }

    async fn acquire(&self, table: &str) -> TabulaResult<LockGuard> {
        self.lock
            .try_acquire(&table_resource(table), self.lock_timeout)
            .await
    }

    /// Schema, handle and every row (header at index 0) of a verified table.
    async fn load(
        &self,
        table: &str,
    ) -> TabulaResult<(Arc<Schema>, Arc<dyn TableHandle>, Vec<Row>)> {
        let handle = self.backend.table(table).await?;
        let schema = self.headers.schema(table).await?;
        let rows = handle.all_rows().await?;
        if let Some(header) = rows.first() {
            schema.verify(header)?;
        }
        Ok((schema, handle, rows))
    }

    async fn finish<T>(
        &self,
        table: &str,
        event: &'static str,
        result: TabulaResult<T>,
        changed: impl FnOnce(&T) -> bool,
    ) -> TabulaResult<T> {
        match &result {
            Ok(value) if changed(value) => self.after_write(table).await,
            Ok(_) => {}
            Err(e) => log_failure(event, table, e),
        }
        result
    }

    async fn after_write(&self, table: &str) {
        for key in self.write_dependents(table) {
            if let Err(e) = self.caches.invalidate(&key).await {
                tracing::warn!(event = "cache.invalidate.fail", table, key = %key, error = %e);
            }
        }
    }
}

/// Index into `rows` of the first data row whose key cell matches.
fn find_row(rows: &[Row], key_idx: usize, key: &str) -> Option<usize> {
    rows.iter().enumerate().skip(1).find_map(|(idx, row)| {
        let cell = row.get(key_idx).map(CellValue::as_key_string).unwrap_or_default();
        (cell == key).then_some(idx)
    })
}

fn log_failure(event: &'static str, table: &str, err: &TabulaError) {
    if err.is_retryable() {
        tracing::warn!(event = event, table, error = %err);
    } else {
        tracing::error!(event = event, table, error = %err);
    }
}
