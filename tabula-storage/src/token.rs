//! Short-lived tokens gating mutations.
//!
//! Tokens live in the shared cache as `token:<TYPE>-<id> → "1"`:
//!
//! ```text
//! issue ──→ Active ──validate(OneTime)──→ Consumed
//!             │  ↺ validate(Session): TTL reset to the full window
//!             └── TTL elapsed ──→ Expired
//! ```
//!
//! Expiry is left to the shared cache.

use chrono::Utc;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tabula_core::{IssuedToken, TabulaResult, TokenError, TokenType};
use uuid::Uuid;

use crate::lock::MutualExclusion;
use crate::shared_cache::SharedCache;

/// Prefix of token markers in the shared cache.
pub const TOKEN_NAMESPACE: &str = "token:";

const TOKEN_MARKER: &str = "1";

/// Lock stripes shared by all one-time token keys.
pub const TOKEN_LOCK_STRIPES: u64 = 64;

/// Lock resource serializing consumption of the token stored at `key`.
///
/// Keys hash into a fixed set of stripes, so forged tokens cannot grow the
/// lock table.
pub fn token_lock_resource(key: &str) -> String {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    format!("token:{}", hasher.finish() % TOKEN_LOCK_STRIPES)
}

/// Source of collision-resistant token ids.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Random UUIDv4 ids.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Issues and validates session and one-time tokens.
pub struct TokenService {
    shared: Arc<dyn SharedCache>,
    ids: Arc<dyn IdGenerator>,
    lock: Arc<dyn MutualExclusion>,
    lock_timeout: Duration,
    session_ttl: Duration,
    one_time_ttl: Duration,
}

impl TokenService {
    pub fn new(
        shared: Arc<dyn SharedCache>,
        lock: Arc<dyn MutualExclusion>,
        lock_timeout: Duration,
        session_ttl: Duration,
        one_time_ttl: Duration,
    ) -> Self {
        Self {
            shared,
            ids: Arc::new(UuidGenerator),
            lock,
            lock_timeout,
            session_ttl,
            one_time_ttl,
        }
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    pub fn ttl_for(&self, token_type: TokenType) -> Duration {
        match token_type {
            TokenType::Session => self.session_ttl,
            TokenType::OneTime => self.one_time_ttl,
        }
    }

    /// Shared-cache key of a token marker.
    pub fn storage_key(token_type: TokenType, token: &str) -> String {
        format!("{}{}-{}", TOKEN_NAMESPACE, token_type.as_tag(), token)
    }

    /// Issue a fresh token. A failed marker write fails the issue.
    pub async fn issue(&self, token_type: TokenType) -> TabulaResult<IssuedToken> {
        let token = self.ids.generate();
        let ttl = self.ttl_for(token_type);
        self.shared
            .put(
                &Self::storage_key(token_type, &token),
                TOKEN_MARKER.to_string(),
                ttl,
            )
            .await?;

        tracing::info!(
            event = "token.issue",
            token_type = %token_type,
            ttl_secs = ttl.as_secs(),
        );

        let expires_at =
            Utc::now() + chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::zero());
        Ok(IssuedToken {
            token,
            token_type,
            expires_in: ttl.as_secs(),
            expires_at,
        })
    }

    /// [`issue`](Self::issue) with the type given by name (`SESSION`, `CAD`, ...).
    pub async fn issue_named(&self, token_type: &str) -> TabulaResult<IssuedToken> {
        self.issue(TokenType::parse(token_type)?).await
    }

    /// Accept a live token of `token_type`.
    ///
    /// One-time tokens are consumed; session tokens get their full window back.
    pub async fn validate(&self, token: &str, token_type: TokenType) -> TabulaResult<()> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TokenError::MissingToken.into());
        }

        let key = Self::storage_key(token_type, token);
        match token_type {
            TokenType::OneTime => self.consume(&key, token_type).await,
            TokenType::Session => self.extend(&key, token_type).await,
        }
    }

    /// [`validate`](Self::validate) with the type given by name.
    pub async fn validate_named(&self, token: &str, token_type: &str) -> TabulaResult<()> {
        if token.trim().is_empty() {
            return Err(TokenError::MissingToken.into());
        }
        self.validate(token, TokenType::parse(token_type)?).await
    }

    async fn consume(&self, key: &str, token_type: TokenType) -> TabulaResult<()> {
        // Two validations of the same one-time token must not both pass.
        let _guard = self
            .lock
            .try_acquire(&token_lock_resource(key), self.lock_timeout)
            .await?;
        if self.shared.get(key).await?.is_none() {
            return Err(rejected(token_type));
        }
        self.shared.remove(key).await
    }

    async fn extend(&self, key: &str, token_type: TokenType) -> TabulaResult<()> {
        if self.shared.get(key).await?.is_none() {
            return Err(rejected(token_type));
        }
        if let Err(e) = self
            .shared
            .put(key, TOKEN_MARKER.to_string(), self.session_ttl)
            .await
        {
            tracing::warn!(event = "token.extend.fail", error = %e);
        }
        Ok(())
    }
}

fn rejected(token_type: TokenType) -> tabula_core::TabulaError {
    tracing::warn!(event = "token.rejected", token_type = %token_type);
    TokenError::TokenInvalid.into()
}
