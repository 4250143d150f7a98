//! Backing tabular store abstraction and its in-memory implementation.
//!
//! Tables are addressed the way a spreadsheet addresses them: rows are
//! 1-indexed and row 1 holds the header. Each handle call is atomic on its
//! own; a failed call leaves the table untouched.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tabula_core::{CellValue, Row, StoreError, TabulaResult};

/// Entry point into the backing store.
#[async_trait]
pub trait TabularBackend: Send + Sync {
    /// Resolve a table by name, failing with `TableNotFound` when it does not exist.
    async fn table(&self, name: &str) -> TabulaResult<Arc<dyn TableHandle>>;
}

/// Operations on one named table.
#[async_trait]
pub trait TableHandle: Send + Sync {
    fn name(&self) -> &str;

    /// Row 1. Empty when the table has no header yet.
    async fn header_row(&self) -> TabulaResult<Row>;

    /// Every row, header included at index 0 (sheet row 1).
    async fn all_rows(&self) -> TabulaResult<Vec<Row>>;

    /// Append rows after the last non-empty row.
    async fn append_rows(&self, rows: Vec<Row>) -> TabulaResult<()>;

    /// Overwrite sheet row `index` (1-indexed).
    async fn set_row(&self, index: usize, row: Row) -> TabulaResult<()>;

    /// Remove sheet row `index` (1-indexed); rows below shift up.
    async fn delete_row(&self, index: usize) -> TabulaResult<()>;

    /// Read one cell; `row` is 1-indexed, `column` 0-indexed.
    async fn read_cell(&self, row: usize, column: usize) -> TabulaResult<CellValue>;

    /// Write one cell, growing the table as needed.
    async fn write_cell(&self, row: usize, column: usize, value: CellValue) -> TabulaResult<()>;
}

// ============================================================================
// IN-MEMORY BACKEND
// ============================================================================

/// In-memory tabular store for tests and local runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    tables: Arc<RwLock<HashMap<String, Arc<InMemoryTable>>>>,
}

impl InMemoryBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or replace a table with a header and data rows.
    pub fn insert_table(&self, name: &str, header: Row, rows: Vec<Row>) -> Arc<InMemoryTable> {
        let mut all = Vec::with_capacity(rows.len() + 1);
        all.push(header);
        all.extend(rows);
        let table = Arc::new(InMemoryTable::new(name, all));
        if let Ok(mut tables) = self.tables.write() {
            tables.insert(name.to_string(), Arc::clone(&table));
        }
        table
    }

    /// Builder-style [`insert_table`](Self::insert_table) taking string headers.
    pub fn with_table(self, name: &str, header: &[&str], rows: Vec<Row>) -> Self {
        let header = header.iter().map(|h| CellValue::from(*h)).collect();
        self.insert_table(name, header, rows);
        self
    }

    /// Direct access to a table for test setup and inspection.
    pub fn raw_table(&self, name: &str) -> Option<Arc<InMemoryTable>> {
        self.tables.read().ok()?.get(name).cloned()
    }

    /// Snapshot of every row of a table, header included.
    pub fn snapshot(&self, name: &str) -> Option<Vec<Row>> {
        self.raw_table(name).and_then(|t| t.rows().ok())
    }
}

#[async_trait]
impl TabularBackend for InMemoryBackend {
    async fn table(&self, name: &str) -> TabulaResult<Arc<dyn TableHandle>> {
        let tables = self.tables.read().map_err(|_| StoreError::LockPoisoned)?;
        match tables.get(name) {
            Some(table) => Ok(Arc::clone(table) as Arc<dyn TableHandle>),
            None => Err(StoreError::TableNotFound {
                table: name.to_string(),
            }
            .into()),
        }
    }
}

/// One in-memory table.
///
/// `latency` is awaited before every operation so concurrent callers
/// interleave the way they would against a remote sheet.
#[derive(Debug)]
pub struct InMemoryTable {
    name: String,
    rows: RwLock<Vec<Row>>,
    latency: RwLock<Option<Duration>>,
    reject_writes: AtomicBool,
    full_reads: AtomicUsize,
}

impl InMemoryTable {
    fn new(name: &str, rows: Vec<Row>) -> Self {
        Self {
            name: name.to_string(),
            rows: RwLock::new(rows),
            latency: RwLock::new(None),
            reject_writes: AtomicBool::new(false),
            full_reads: AtomicUsize::new(0),
        }
    }

    /// Delay every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        if let Ok(mut slot) = self.latency.write() {
            *slot = latency;
        }
    }

    /// Make every write fail without touching the rows.
    pub fn set_reject_writes(&self, reject: bool) {
        self.reject_writes.store(reject, Ordering::SeqCst);
    }

    /// Number of `all_rows` calls served so far.
    pub fn full_reads(&self) -> usize {
        self.full_reads.load(Ordering::SeqCst)
    }

    pub fn rows(&self) -> TabulaResult<Vec<Row>> {
        Ok(self
            .rows
            .read()
            .map_err(|_| StoreError::LockPoisoned)?
            .clone())
    }

    async fn pause(&self) {
        let latency = self.latency.read().ok().and_then(|l| *l);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn check_writable(&self) -> TabulaResult<()> {
        if self.reject_writes.load(Ordering::SeqCst) {
            return Err(self.backend_error("writes rejected"));
        }
        Ok(())
    }

    fn backend_error(&self, reason: impl Into<String>) -> tabula_core::TabulaError {
        StoreError::Backend {
            table: self.name.clone(),
            reason: reason.into(),
        }
        .into()
    }

    fn last_non_empty(rows: &[Row]) -> usize {
        rows.iter()
            .rposition(|row| row.iter().any(|c| !c.is_empty()))
            .map_or(0, |i| i + 1)
    }
}

#[async_trait]
impl TableHandle for InMemoryTable {
    fn name(&self) -> &str {
        &self.name
    }

    async fn header_row(&self) -> TabulaResult<Row> {
        self.pause().await;
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(rows.first().cloned().unwrap_or_default())
    }

    async fn all_rows(&self) -> TabulaResult<Vec<Row>> {
        self.pause().await;
        self.full_reads.fetch_add(1, Ordering::SeqCst);
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        let end = Self::last_non_empty(&rows);
        Ok(rows[..end].to_vec())
    }

    async fn append_rows(&self, new_rows: Vec<Row>) -> TabulaResult<()> {
        self.pause().await;
        self.check_writable()?;
        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
        let end = Self::last_non_empty(&rows);
        rows.truncate(end);
        rows.extend(new_rows);
        Ok(())
    }

    async fn set_row(&self, index: usize, row: Row) -> TabulaResult<()> {
        self.pause().await;
        self.check_writable()?;
        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
        match index.checked_sub(1).and_then(|i| rows.get_mut(i)) {
            Some(slot) => {
                *slot = row;
                Ok(())
            }
            None => Err(self.backend_error(format!("row {} out of range", index))),
        }
    }

    async fn delete_row(&self, index: usize) -> TabulaResult<()> {
        self.pause().await;
        self.check_writable()?;
        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
        if index == 0 || index > rows.len() {
            return Err(self.backend_error(format!("row {} out of range", index)));
        }
        rows.remove(index - 1);
        Ok(())
    }

    async fn read_cell(&self, row: usize, column: usize) -> TabulaResult<CellValue> {
        self.pause().await;
        let rows = self.rows.read().map_err(|_| StoreError::LockPoisoned)?;
        Ok(row
            .checked_sub(1)
            .and_then(|r| rows.get(r))
            .and_then(|r| r.get(column))
            .cloned()
            .unwrap_or_default())
    }

    async fn write_cell(&self, row: usize, column: usize, value: CellValue) -> TabulaResult<()> {
        self.pause().await;
        self.check_writable()?;
        let row_idx = row
            .checked_sub(1)
            .ok_or_else(|| self.backend_error("row 0 does not exist"))?;
        let mut rows = self.rows.write().map_err(|_| StoreError::LockPoisoned)?;
        if rows.len() <= row_idx {
            rows.resize(row_idx + 1, Vec::new());
        }
        let target = &mut rows[row_idx];
        if target.len() <= column {
            target.resize(column + 1, CellValue::Empty);
        }
        target[column] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::TabulaError;

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    #[tokio::test]
    async fn test_missing_table_is_not_found() {
        let backend = InMemoryBackend::new();
        let err = backend.table("Ghost").await.err().unwrap();
        assert!(matches!(
            err,
            TabulaError::Store(StoreError::TableNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_rows_are_one_indexed() {
        let backend =
            InMemoryBackend::new().with_table("T", &["ID", "Nome"], vec![row(&["1", "a"]), row(&["2", "b"])]);
        let table = backend.table("T").await.unwrap();

        table.set_row(2, row(&["1", "z"])).await.unwrap();
        table.delete_row(3).await.unwrap();

        let rows = table.all_rows().await.unwrap();
        assert_eq!(rows, vec![row(&["ID", "Nome"]), row(&["1", "z"])]);
        assert!(table.delete_row(0).await.is_err());
        assert!(table.set_row(9, row(&["x"])).await.is_err());
    }

    #[tokio::test]
    async fn test_append_after_last_non_empty_row() {
        let backend = InMemoryBackend::new().with_table("T", &["ID"], vec![row(&["1"]), Vec::new()]);
        let table = backend.table("T").await.unwrap();
        table.append_rows(vec![row(&["2"])]).await.unwrap();
        assert_eq!(
            backend.snapshot("T").unwrap(),
            vec![row(&["ID"]), row(&["1"]), row(&["2"])]
        );
    }

    #[tokio::test]
    async fn test_rejected_writes_leave_rows_untouched() {
        let backend = InMemoryBackend::new().with_table("T", &["ID"], vec![row(&["1"])]);
        backend.raw_table("T").unwrap().set_reject_writes(true);
        let table = backend.table("T").await.unwrap();

        assert!(table.append_rows(vec![row(&["2"])]).await.is_err());
        assert!(table.delete_row(2).await.is_err());
        assert_eq!(backend.snapshot("T").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_write_cell_grows_table() {
        let backend = InMemoryBackend::new().with_table("Config", &["Chave", "Valor"], vec![]);
        let table = backend.table("Config").await.unwrap();
        assert_eq!(table.read_cell(3, 1).await.unwrap(), CellValue::Empty);
        table.write_cell(3, 1, CellValue::Number(4.0)).await.unwrap();
        assert_eq!(table.read_cell(3, 1).await.unwrap(), CellValue::Number(4.0));
    }
}
