//! Client directory cache.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tabula_core::{digits, only_digits, trimmed, CacheInstanceConfig, Lookup, RowView, TabulaResult};

use super::manager::CacheManager;
use super::read_through::{ReadThroughCache, RowMapper, TableLoader};
use crate::backend::TabularBackend;

pub const CLIENTS_CACHE_KEY: &str = "client_directory";

const COL_ID: &str = "ID";
const COL_NAME: &str = "Nome Completo";
const COL_DOCUMENT: &str = "CPF/CNPJ";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientEntry {
    pub id: String,
    pub name: String,
    /// Tax document, digits only.
    pub document: String,
}

struct ClientMapper;

impl RowMapper for ClientMapper {
    type Item = ClientEntry;

    fn required_columns(&self) -> &[&'static str] {
        &[COL_ID, COL_NAME, COL_DOCUMENT]
    }

    fn map_row(&self, row: RowView<'_>) -> Option<ClientEntry> {
        Some(ClientEntry {
            id: trimmed(row.get(COL_ID)),
            name: trimmed(row.get(COL_NAME)),
            document: document_digits(row),
        })
    }
}

// Documents typed as plain numbers lose their formatting but not their digits.
fn document_digits(row: RowView<'_>) -> String {
    let cell = row.get(COL_DOCUMENT);
    match cell.as_number() {
        Some(_) => digits(&cell.to_string()),
        None => only_digits(cell),
    }
}

/// Cached id/name/document triples of registered clients.
#[derive(Clone)]
pub struct ClientDirectory {
    cache: ReadThroughCache<Vec<ClientEntry>>,
}

impl ClientDirectory {
    pub fn new(
        manager: Arc<CacheManager>,
        backend: Arc<dyn TabularBackend>,
        config: &CacheInstanceConfig,
    ) -> Self {
        let loader = TableLoader::new(backend, config.table.as_str(), ClientMapper);
        Self {
            cache: ReadThroughCache::define(manager, CLIENTS_CACHE_KEY, config.ttl, Arc::new(loader)),
        }
    }

    pub async fn all(&self) -> TabulaResult<Arc<Vec<ClientEntry>>> {
        self.cache.get().await
    }

    /// First client whose document matches `document` once both are reduced to digits.
    pub async fn find_by_document(&self, document: &str) -> TabulaResult<Lookup<ClientEntry>> {
        let wanted = digits(document);
        if wanted.is_empty() {
            return Ok(Lookup::NotFound);
        }
        let clients = self.cache.get().await?;
        Ok(clients.iter().find(|c| c.document == wanted).cloned().into())
    }

    pub async fn find_by_id(&self, id: &str) -> TabulaResult<Lookup<ClientEntry>> {
        let wanted = id.trim();
        if wanted.is_empty() {
            return Ok(Lookup::NotFound);
        }
        let clients = self.cache.get().await?;
        Ok(clients.iter().find(|c| c.id == wanted).cloned().into())
    }

    pub async fn invalidate(&self) -> TabulaResult<()> {
        self.cache.invalidate().await
    }
}
