//! Shared TTL key-value cache visible across invocations.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{CacheError, TabulaResult};
use tokio::time::Instant;

/// External string cache with per-entry TTL.
///
/// Expiry is enforced by the cache itself; nothing in this crate sweeps it.
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn get(&self, key: &str) -> TabulaResult<Option<String>>;

    async fn put(&self, key: &str, value: String, ttl: Duration) -> TabulaResult<()>;

    async fn remove(&self, key: &str) -> TabulaResult<()>;

    /// Time left before `key` expires, when the cache can tell.
    async fn remaining_ttl(&self, _key: &str) -> TabulaResult<Option<Duration>> {
        Ok(None)
    }
}

/// Size cap of a single value in hosted script caches.
pub const DEFAULT_MAX_VALUE_BYTES: usize = 100 * 1024;

/// In-memory shared cache with passive expiry.
///
/// Uses tokio's clock so tests can drive expiry with `tokio::time::advance`.
#[derive(Debug, Clone)]
pub struct InMemorySharedCache {
    entries: Arc<DashMap<String, (String, Instant)>>,
    max_value_bytes: usize,
}

impl Default for InMemorySharedCache {
    fn default() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            max_value_bytes: DEFAULT_MAX_VALUE_BYTES,
        }
    }
}

impl InMemorySharedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject values larger than `bytes`, like a hosted cache over quota.
    pub fn with_max_value_bytes(mut self, bytes: usize) -> Self {
        self.max_value_bytes = bytes;
        self
    }

    /// Expiry instant of a live entry.
    pub fn expires_at(&self, key: &str) -> Option<Instant> {
        self.entries
            .get(key)
            .map(|entry| entry.value().1)
            .filter(|expires_at| *expires_at > Instant::now())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.value().1 > now).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SharedCache for InMemorySharedCache {
    async fn get(&self, key: &str) -> TabulaResult<Option<String>> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key)
            .map(|entry| (entry.value().0.clone(), entry.value().1));
        match hit {
            Some((value, expires_at)) if expires_at > now => Ok(Some(value)),
            Some(_) => {
                self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: String, ttl: Duration) -> TabulaResult<()> {
        if value.len() > self.max_value_bytes {
            return Err(CacheError::WriteFailed {
                key: key.to_string(),
                reason: format!(
                    "value of {} bytes exceeds limit of {} bytes",
                    value.len(),
                    self.max_value_bytes
                ),
            }
            .into());
        }
        self.entries
            .insert(key.to_string(), (value, Instant::now() + ttl));
        Ok(())
    }

    async fn remove(&self, key: &str) -> TabulaResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> TabulaResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self.expires_at(key).map(|expires_at| expires_at - now))
    }
}
