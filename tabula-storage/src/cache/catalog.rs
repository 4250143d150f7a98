//! Priced item catalog cache.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tabula_core::{
    normalize_text, price_of, trimmed, CacheInstanceConfig, Lookup, RowView, TabulaResult,
};

use super::manager::CacheManager;
use super::read_through::{ReadThroughCache, RowMapper, TableLoader};
use crate::backend::TabularBackend;

pub const CATALOG_CACHE_KEY: &str = "price_catalog";

const COL_ID: &str = "ID";
const COL_NAME: &str = "Nome do Item";
const COL_PRICE: &str = "Preço";
const COL_KIND: &str = "Tipo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub id: String,
    pub name: String,
    pub price: f64,
    /// Lowercased item kind, e.g. `servico` or `produto`.
    pub kind: String,
}

struct CatalogMapper;

impl RowMapper for CatalogMapper {
    type Item = CatalogItem;

    fn required_columns(&self) -> &[&'static str] {
        &[COL_ID, COL_NAME, COL_PRICE, COL_KIND]
    }

    fn map_row(&self, row: RowView<'_>) -> Option<CatalogItem> {
        Some(CatalogItem {
            id: trimmed(row.get(COL_ID)),
            name: trimmed(row.get(COL_NAME)),
            price: price_of(row.get(COL_PRICE)),
            kind: normalize_text(row.get(COL_KIND)),
        })
    }
}

#[derive(Clone)]
pub struct PriceCatalog {
    cache: ReadThroughCache<Vec<CatalogItem>>,
}

impl PriceCatalog {
    pub fn new(
        manager: Arc<CacheManager>,
        backend: Arc<dyn TabularBackend>,
        config: &CacheInstanceConfig,
    ) -> Self {
        let loader = TableLoader::new(backend, config.table.as_str(), CatalogMapper);
        Self {
            cache: ReadThroughCache::define(manager, CATALOG_CACHE_KEY, config.ttl, Arc::new(loader)),
        }
    }

    pub async fn all(&self) -> TabulaResult<Arc<Vec<CatalogItem>>> {
        self.cache.get().await
    }

    pub async fn find_by_id(&self, id: &str) -> TabulaResult<Lookup<CatalogItem>> {
        let wanted = id.trim();
        if wanted.is_empty() {
            return Ok(Lookup::NotFound);
        }
        let items = self.cache.get().await?;
        Ok(items.iter().find(|i| i.id == wanted).cloned().into())
    }

    pub async fn invalidate(&self) -> TabulaResult<()> {
        self.cache.invalidate().await
    }
}
