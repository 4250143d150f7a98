//! Two-tier read-through caching.
//!
//! - [`CacheManager`]: process-local mirror, shared layer, key registry
//! - [`ReadThroughCache`]: one named get-or-load slot
//! - [`HeaderCache`]: table schemas
//! - Instances: [`PostalDirectory`], [`ClientDirectory`], [`PriceCatalog`]
//!
//! Reads never take a lock. Staleness is bounded by each slot's TTL and by
//! explicit invalidation.

pub mod catalog;
pub mod clients;
pub mod header;
pub mod manager;
pub mod postal;
pub mod read_through;

pub use catalog::{CatalogItem, PriceCatalog, CATALOG_CACHE_KEY};
pub use clients::{ClientDirectory, ClientEntry, CLIENTS_CACHE_KEY};
pub use header::HeaderCache;
pub use manager::{CacheManager, CACHE_NAMESPACE};
pub use postal::{PostalDirectory, PostalRange, Region, POSTAL_CACHE_KEY};
pub use read_through::{Loader, ReadThroughCache, RowMapper, TableLoader};
