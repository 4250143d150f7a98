//! Table schema cache.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{Schema, TabulaResult};

use super::manager::CacheManager;
use super::read_through::{Loader, ReadThroughCache};
use crate::backend::TabularBackend;

struct HeaderLoader {
    backend: Arc<dyn TabularBackend>,
    table: String,
}

#[async_trait]
impl Loader<Schema> for HeaderLoader {
    async fn load(&self) -> TabulaResult<Schema> {
        let handle = self.backend.table(&self.table).await?;
        let header = handle.header_row().await?;
        Ok(Schema::from_header(self.table.as_str(), &header))
    }
}

/// Resolves and caches each table's header as a [`Schema`].
///
/// One cache slot per table, keyed `headers:<table>`, defined the first
/// time the table is touched. Header changes are only picked up after
/// [`HeaderCache::invalidate`] or TTL expiry.
pub struct HeaderCache {
    manager: Arc<CacheManager>,
    backend: Arc<dyn TabularBackend>,
    ttl: Duration,
    slots: DashMap<String, ReadThroughCache<Schema>>,
}

impl HeaderCache {
    pub fn new(manager: Arc<CacheManager>, backend: Arc<dyn TabularBackend>, ttl: Duration) -> Self {
        Self {
            manager,
            backend,
            ttl,
            slots: DashMap::new(),
        }
    }

    pub fn cache_key(table: &str) -> String {
        format!("headers:{}", table)
    }

    /// Cached schema of `table`.
    pub async fn schema(&self, table: &str) -> TabulaResult<Arc<Schema>> {
        self.slot(table).get().await
    }

    /// Drop the cached schema of `table` in both cache layers.
    pub async fn invalidate(&self, table: &str) -> TabulaResult<()> {
        self.slot(table).invalidate().await
    }

    fn slot(&self, table: &str) -> ReadThroughCache<Schema> {
        self.slots
            .entry(table.to_string())
            .or_insert_with(|| {
                let loader = HeaderLoader {
                    backend: Arc::clone(&self.backend),
                    table: table.to_string(),
                };
                ReadThroughCache::define(
                    Arc::clone(&self.manager),
                    Self::cache_key(table),
                    self.ttl,
                    Arc::new(loader),
                )
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{InMemoryBackend, TableHandle};
    use crate::shared_cache::InMemorySharedCache;
    use tabula_core::CellValue;

    fn setup() -> (HeaderCache, InMemoryBackend, Arc<CacheManager>) {
        let backend = InMemoryBackend::new().with_table("Cadastro", &["ID", " Nome "], vec![]);
        let manager = Arc::new(CacheManager::new(Arc::new(InMemorySharedCache::new())));
        let headers = HeaderCache::new(
            Arc::clone(&manager),
            Arc::new(backend.clone()),
            Duration::from_secs(3600),
        );
        (headers, backend, manager)
    }

    #[tokio::test]
    async fn test_schema_is_trimmed_and_registered() {
        let (headers, _, manager) = setup();
        let schema = headers.schema("Cadastro").await.unwrap();
        assert_eq!(schema.columns(), &["ID".to_string(), "Nome".to_string()]);
        assert!(manager.is_registered("headers:Cadastro"));
    }

    #[tokio::test]
    async fn test_header_change_needs_invalidation() {
        let (headers, backend, _) = setup();
        headers.schema("Cadastro").await.unwrap();

        let table = backend.raw_table("Cadastro").unwrap();
        table
            .set_row(1, vec![CellValue::from("ID"), CellValue::from("Email")])
            .await
            .unwrap();
        let stale = headers.schema("Cadastro").await.unwrap();
        assert_eq!(stale.index_of("Nome"), Some(1));

        headers.invalidate("Cadastro").await.unwrap();
        let fresh = headers.schema("Cadastro").await.unwrap();
        assert_eq!(fresh.index_of("Email"), Some(1));
    }

    #[tokio::test]
    async fn test_missing_table_is_not_cached() {
        let (headers, backend, _) = setup();
        assert!(headers.schema("Vendas").await.is_err());

        backend.insert_table("Vendas", vec![CellValue::from("ID")], vec![]);
        assert_eq!(headers.schema("Vendas").await.unwrap().len(), 1);
    }
}
