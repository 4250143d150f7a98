//! Bounded-wait mutual exclusion with scoped release.
//!
//! A lock is acquired for a named resource (`table:Cadastro`,
//! `token:7`) and held by a [`LockGuard`]. Dropping the guard
//! releases it, so every exit path of the holder releases the lock,
//! including early returns through `?`.
//!
//! ```text
//! Idle ─── try_acquire() ──→ Locked ─── drop(guard) ──→ Idle
//!            │
//!       wait elapsed → Busy
//! ```
//!
//! Locks are not reentrant: acquiring a resource already held by the same
//! caller waits out the bound and reports `Busy`.

use async_trait::async_trait;
use dashmap::DashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{ConcurrencyError, TabulaResult};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;

/// Process-external mutual exclusion with bounded wait.
#[async_trait]
pub trait MutualExclusion: Send + Sync {
    /// Wait at most `wait` for `resource`; `Busy` when the wait elapses.
    async fn try_acquire(&self, resource: &str, wait: Duration) -> TabulaResult<LockGuard>;
}

/// Proof that a resource is held. Releases on drop.
pub struct LockGuard {
    resource: String,
    acquired_at: Instant,
    _held: Box<dyn Send + Sync>,
}

impl LockGuard {
    /// Wrap whatever keeps the underlying primitive held.
    pub fn new(resource: impl Into<String>, held: Box<dyn Send + Sync>) -> Self {
        Self {
            resource: resource.into(),
            acquired_at: Instant::now(),
            _held: held,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }
}

impl fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockGuard")
            .field("resource", &self.resource)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        tracing::trace!(
            event = "lock.release",
            resource = %self.resource,
            held_ms = self.held_for().as_millis() as u64,
        );
    }
}

/// How finely resources are split into independent locks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockScope {
    /// One lock per resource name.
    #[default]
    PerResource,
    /// Every resource shares a single lock.
    Global,
}

const GLOBAL_STRIPE: &str = "global";

/// Lock resource guarding every write to `table`, counter cells included.
pub fn table_resource(table: &str) -> String {
    format!("table:{}", table)
}

/// Striped lock keyed by resource name.
#[derive(Debug, Clone, Default)]
pub struct StripedLock {
    stripes: Arc<DashMap<String, Arc<Mutex<()>>>>,
    scope: LockScope,
}

impl StripedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single lock shared by every resource.
    pub fn coarse() -> Self {
        Self {
            scope: LockScope::Global,
            ..Self::default()
        }
    }

    pub fn scope(&self) -> LockScope {
        self.scope
    }

    /// Number of distinct stripes created so far.
    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    fn stripe(&self, resource: &str) -> Arc<Mutex<()>> {
        let name = match self.scope {
            LockScope::PerResource => resource,
            LockScope::Global => GLOBAL_STRIPE,
        };
        // The entry guard is dropped before anyone awaits the mutex.
        self.stripes
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl MutualExclusion for StripedLock {
    async fn try_acquire(&self, resource: &str, wait: Duration) -> TabulaResult<LockGuard> {
        let stripe = self.stripe(resource);
        match tokio::time::timeout(wait, stripe.lock_owned()).await {
            Ok(guard) => {
                let held: OwnedMutexGuard<()> = guard;
                Ok(LockGuard::new(resource, Box::new(held)))
            }
            Err(_) => {
                let waited_ms = wait.as_millis() as u64;
                tracing::warn!(event = "lock.busy", resource, waited_ms);
                Err(ConcurrencyError::Busy {
                    resource: resource.to_string(),
                    waited_ms,
                }
                .into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::TabulaError;

    #[tokio::test]
    async fn test_second_acquire_times_out_busy() {
        let lock = StripedLock::new();
        let _held = lock
            .try_acquire("table:T", Duration::from_millis(50))
            .await
            .unwrap();

        let err = lock
            .try_acquire("table:T", Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            TabulaError::Concurrency(ConcurrencyError::Busy { .. })
        ));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_release_on_drop() {
        let lock = StripedLock::new();
        {
            let guard = lock
                .try_acquire("counter:A", Duration::from_millis(50))
                .await
                .unwrap();
            assert_eq!(guard.resource(), "counter:A");
        }
        assert!(lock
            .try_acquire("counter:A", Duration::from_millis(50))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_distinct_resources_do_not_contend() {
        let lock = StripedLock::new();
        let _a = lock
            .try_acquire("table:A", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(lock
            .try_acquire("table:B", Duration::from_millis(10))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_coarse_lock_serializes_everything() {
        let lock = StripedLock::coarse();
        let _a = lock
            .try_acquire("table:A", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(lock
            .try_acquire("counter:B", Duration::from_millis(10))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_waiter_gets_lock_once_released() {
        let lock = StripedLock::new();
        let held = lock
            .try_acquire("table:T", Duration::from_millis(50))
            .await
            .unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.try_acquire("table:T", Duration::from_secs(5))
                    .await
                    .map(|g| g.resource().to_string())
            })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(held);

        assert_eq!(waiter.await.unwrap().unwrap(), "table:T");
    }
}
