//! Cache manager: process-local mirror, shared layer and invalidation registry.
//!
//! One manager is constructed per process and handed by reference to every
//! cache user. It owns the process-local mirror (key → value + expiry) and
//! the registry of keys defined at startup, so invalidation can clear both
//! layers without any module-global state.

use dashmap::DashMap;
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{CacheError, TabulaResult};
use tokio::time::Instant;

use crate::shared_cache::SharedCache;

/// Prefix of cached payloads in the shared layer; tokens use their own.
pub const CACHE_NAMESPACE: &str = "cache:";

struct MirrorSlot {
    value: Arc<dyn Any + Send + Sync>,
    expires_at: Instant,
}

/// Owner of all cache state for one process.
pub struct CacheManager {
    shared: Arc<dyn SharedCache>,
    mirror: DashMap<String, MirrorSlot>,
    registry: DashMap<String, Duration>,
}

impl CacheManager {
    pub fn new(shared: Arc<dyn SharedCache>) -> Self {
        Self {
            shared,
            mirror: DashMap::new(),
            registry: DashMap::new(),
        }
    }

    pub fn shared(&self) -> &Arc<dyn SharedCache> {
        &self.shared
    }

    /// Record a cache key at definition time.
    pub fn register(&self, key: &str, ttl: Duration) {
        self.registry.insert(key.to_string(), ttl);
    }

    pub fn is_registered(&self, key: &str) -> bool {
        self.registry.contains_key(key)
    }

    /// Registered keys, sorted.
    pub fn registered_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.registry.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    /// Number of live mirror slots.
    pub fn mirrored(&self) -> usize {
        let now = Instant::now();
        self.mirror.iter().filter(|s| s.value().expires_at > now).count()
    }

    /// Return the cached value for `key`, loading it on a miss.
    ///
    /// Order: process mirror, then shared layer, then `loader`. A fresh value
    /// is written to the shared layer best-effort; a failed write is logged
    /// and the value is still returned and mirrored. A value taken from the
    /// shared layer is mirrored no longer than the shared entry has left.
    pub async fn get_or_load<T, F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> TabulaResult<Arc<T>>
    where
        T: Serialize + DeserializeOwned + Send + Sync + 'static,
        F: FnOnce() -> Fut,
        Fut: Future<Output = TabulaResult<T>>,
    {
        if let Some(value) = self.mirror_get::<T>(key) {
            return Ok(value);
        }

        let shared_key = shared_key(key);
        match self.shared.get(&shared_key).await {
            Ok(Some(payload)) => match serde_json::from_str::<T>(&payload) {
                Ok(value) => {
                    let remaining = match self.shared.remaining_ttl(&shared_key).await {
                        Ok(Some(left)) => left.min(ttl),
                        Ok(None) => ttl,
                        Err(e) => {
                            tracing::warn!(event = "cache.ttl.fail", key, error = %e);
                            ttl
                        }
                    };
                    let value = Arc::new(value);
                    self.mirror_put(key, Arc::clone(&value), remaining);
                    return Ok(value);
                }
                Err(e) => {
                    tracing::warn!(event = "cache.corrupt", key, error = %e);
                }
            },
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(event = "cache.get.fail", key, error = %e);
            }
        }

        tracing::info!(event = "cache.miss", key, action = "loading");
        let value = loader().await?;

        match serde_json::to_string(&value) {
            Ok(payload) => {
                if let Err(e) = self.shared.put(&shared_key, payload, ttl).await {
                    tracing::error!(event = "cache.put.fail", key, error = %e);
                }
            }
            Err(e) => {
                let err = CacheError::Serialization {
                    key: key.to_string(),
                    reason: e.to_string(),
                };
                tracing::error!(event = "cache.put.fail", key, error = %err);
            }
        }

        let value = Arc::new(value);
        self.mirror_put(key, Arc::clone(&value), ttl);
        Ok(value)
    }

    /// Remove `key` from the shared layer and the mirror.
    ///
    /// Unregistered keys are still removed but logged as a warning.
    pub async fn invalidate(&self, key: &str) -> TabulaResult<()> {
        self.mirror.remove(key);
        let removed = self.shared.remove(&shared_key(key)).await;

        if self.is_registered(key) {
            tracing::info!(event = "cache.invalidate", key);
        } else {
            tracing::warn!(
                event = "cache.invalidate.miss",
                key,
                "Key not registered with the cache manager"
            );
        }
        removed
    }

    /// Drop every process-local slot; the shared layer is untouched.
    pub fn clear_local(&self) {
        self.mirror.clear();
    }

    fn mirror_get<T: Send + Sync + 'static>(&self, key: &str) -> Option<Arc<T>> {
        let now = Instant::now();
        let slot = self.mirror.get(key)?;
        if slot.expires_at <= now {
            drop(slot);
            self.mirror.remove_if(key, |_, s| s.expires_at <= now);
            return None;
        }
        Arc::clone(&slot.value).downcast::<T>().ok()
    }

    fn mirror_put<T: Send + Sync + 'static>(&self, key: &str, value: Arc<T>, ttl: Duration) {
        self.mirror.insert(
            key.to_string(),
            MirrorSlot {
                value,
                expires_at: Instant::now() + ttl,
            },
        );
    }
}

fn shared_key(key: &str) -> String {
    format!("{}{}", CACHE_NAMESPACE, key)
}
