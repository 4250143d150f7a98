//! Lock-protected monotonic id generation.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{CellRef, CellValue, ConfigError, StoreError, TabulaResult};

use crate::backend::TabularBackend;
use crate::lock::{table_resource, MutualExclusion};

/// Generates ids from counters stored in fixed cells.
///
/// Each logical counter (`CADASTRO`, `CHECKIN`, ...) maps to one cell. An
/// increment reads the cell and writes `value + 1` while holding the lock of
/// the sheet that holds the cell. That is the same lock `TableStore` takes,
/// so a row rewrite on the sheet cannot restore a stale counter value.
pub struct AtomicCounter {
    backend: Arc<dyn TabularBackend>,
    lock: Arc<dyn MutualExclusion>,
    timeout: Duration,
    counters: HashMap<String, CellRef>,
}

impl AtomicCounter {
    pub fn new(
        backend: Arc<dyn TabularBackend>,
        lock: Arc<dyn MutualExclusion>,
        timeout: Duration,
        counters: HashMap<String, CellRef>,
    ) -> Self {
        Self {
            backend,
            lock,
            timeout,
            counters,
        }
    }

    pub fn cell_for(&self, key: &str) -> TabulaResult<&CellRef> {
        self.counters.get(key).ok_or_else(|| {
            ConfigError::UnknownCounter {
                key: key.to_string(),
            }
            .into()
        })
    }

    /// Increment `key` and return the new value.
    pub async fn generate_id(&self, key: &str) -> TabulaResult<u64> {
        match self.increment(key).await {
            Ok(id) => {
                tracing::info!(event = "atomic.id.generated", key, id);
                Ok(id)
            }
            Err(e) => {
                if e.is_retryable() {
                    tracing::warn!(event = "atomic.id.fail", key, error = %e);
                } else {
                    tracing::error!(event = "atomic.id.fail", key, error = %e);
                }
                Err(e)
            }
        }
    }

    /// Current value without incrementing; takes no lock.
    pub async fn peek(&self, key: &str) -> TabulaResult<u64> {
        let cell = self.cell_for(key)?;
        let handle = self.backend.table(&cell.sheet).await?;
        Ok(counter_value(&handle.read_cell(cell.row, cell.column).await?))
    }

    async fn increment(&self, key: &str) -> TabulaResult<u64> {
        let cell = self.cell_for(key)?;
        let _guard = self
            .lock
            .try_acquire(&table_resource(&cell.sheet), self.timeout)
            .await?;

        let handle = self.backend.table(&cell.sheet).await?;
        let current = counter_value(&handle.read_cell(cell.row, cell.column).await?);
        let next = current.checked_add(1).ok_or_else(|| StoreError::Backend {
            table: cell.sheet.clone(),
            reason: format!("counter {} at {} cannot be incremented past {}", key, cell, current),
        })?;
        handle
            .write_cell(cell.row, cell.column, CellValue::from(next))
            .await?;
        Ok(next)
    }
}

/// Stored counter value; blank or unparsable cells count as zero.
fn counter_value(cell: &CellValue) -> u64 {
    let number = match cell {
        CellValue::Number(n) => Some(*n),
        CellValue::Text(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match number {
        Some(n) if n.is_finite() && n > 0.0 => n.trunc() as u64,
        _ => 0,
    }
}
