//! Postal-code range directory.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tabula_core::{digits, only_digits, trimmed, CacheInstanceConfig, Lookup, RowView, TabulaResult};

use super::manager::CacheManager;
use super::read_through::{ReadThroughCache, RowMapper, TableLoader};
use crate::backend::TabularBackend;

pub const POSTAL_CACHE_KEY: &str = "postal_ranges";

const POSTAL_CODE_LEN: usize = 8;

const COL_MACRO_REGION: &str = "Macrorregião";
const COL_DISTRICT: &str = "Distritos";
const COL_START: &str = "CEP Início";
const COL_END: &str = "CEP Fim";

/// One inclusive postal-code interval and the region it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostalRange {
    pub macro_region: String,
    pub district: String,
    pub start: u32,
    pub end: u32,
}

impl PostalRange {
    pub fn contains(&self, code: u32) -> bool {
        self.start <= code && code <= self.end
    }
}

/// Region resolved for a postal code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub macro_region: String,
    pub district: String,
}

struct PostalRangeMapper;

impl RowMapper for PostalRangeMapper {
    type Item = PostalRange;

    fn required_columns(&self) -> &[&'static str] {
        &[COL_MACRO_REGION, COL_DISTRICT, COL_START, COL_END]
    }

    fn map_row(&self, row: RowView<'_>) -> Option<PostalRange> {
        let start = postal_code(&only_digits(row.get(COL_START)))?;
        let end = postal_code(&only_digits(row.get(COL_END)))?;
        Some(PostalRange {
            macro_region: trimmed(row.get(COL_MACRO_REGION)),
            district: trimmed(row.get(COL_DISTRICT)),
            start,
            end,
        })
    }
}

fn postal_code(digits: &str) -> Option<u32> {
    if digits.len() != POSTAL_CODE_LEN {
        return None;
    }
    digits.parse().ok()
}

/// Cached list of postal-code ranges.
#[derive(Clone)]
pub struct PostalDirectory {
    cache: ReadThroughCache<Vec<PostalRange>>,
}

impl PostalDirectory {
    pub fn new(
        manager: Arc<CacheManager>,
        backend: Arc<dyn TabularBackend>,
        config: &CacheInstanceConfig,
    ) -> Self {
        let loader = TableLoader::new(backend, config.table.as_str(), PostalRangeMapper);
        Self {
            cache: ReadThroughCache::define(manager, POSTAL_CACHE_KEY, config.ttl, Arc::new(loader)),
        }
    }

    pub async fn ranges(&self) -> TabulaResult<Arc<Vec<PostalRange>>> {
        self.cache.get().await
    }

    /// Region containing `code`. Non-digits are ignored; anything that is
    /// not eight digits afterwards is `NotFound` without loading the table.
    pub async fn find_region(&self, code: &str) -> TabulaResult<Lookup<Region>> {
        let Some(target) = postal_code(&digits(code)) else {
            return Ok(Lookup::NotFound);
        };

        let ranges = self.cache.get().await?;
        let region = ranges.iter().find(|r| r.contains(target)).map(|r| Region {
            macro_region: r.macro_region.clone(),
            district: r.district.clone(),
        });
        Ok(region.into())
    }

    pub async fn invalidate(&self) -> TabulaResult<()> {
        self.cache.invalidate().await
    }
}
