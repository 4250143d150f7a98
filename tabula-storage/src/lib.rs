//! Tabula Storage - Table Store, Caches, Counters and Tokens
//!
//! Data access over a spreadsheet-like backing store with no transactions:
//!
//! - [`TableStore`]: header-mapped CRUD, mutations under a bounded-wait lock
//! - [`AtomicCounter`]: gap-free ids from counter cells
//! - [`CacheManager`] + [`ReadThroughCache`]: process mirror over a shared TTL cache
//! - [`TokenService`]: session and one-time tokens gating mutations
//! - [`Tabula`]: the envelope-returning facade over all of the above
//!
//! Collaborators are traits ([`TabularBackend`], [`SharedCache`],
//! [`MutualExclusion`], [`IdGenerator`]) with in-memory implementations for
//! tests and local runs.

pub mod backend;
pub mod cache;
pub mod counter;
pub mod facade;
pub mod lock;
pub mod shared_cache;
pub mod store;
pub mod token;

pub use backend::{InMemoryBackend, InMemoryTable, TableHandle, TabularBackend};
pub use cache::{
    CacheManager, CatalogItem, ClientDirectory, ClientEntry, HeaderCache, Loader, PostalDirectory,
    PostalRange, PriceCatalog, ReadThroughCache, Region, RowMapper, TableLoader,
    CACHE_NAMESPACE, CATALOG_CACHE_KEY, CLIENTS_CACHE_KEY, POSTAL_CACHE_KEY,
};
pub use counter::AtomicCounter;
pub use facade::{Authorization, Tabula};
pub use lock::{table_resource, LockGuard, LockScope, MutualExclusion, StripedLock};
pub use shared_cache::{InMemorySharedCache, SharedCache, DEFAULT_MAX_VALUE_BYTES};
pub use store::TableStore;
pub use token::{
    token_lock_resource, IdGenerator, TokenService, UuidGenerator, TOKEN_LOCK_STRIPES,
    TOKEN_NAMESPACE,
};
