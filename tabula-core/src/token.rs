//! Token types and the action → token-type policy.

use crate::error::{TabulaResult, TokenError};
use crate::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Class of a mutation token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TokenType {
    /// Renewable credential for an authenticated back-office session.
    Session,
    /// Single-use credential for a public form submission.
    OneTime,
}

impl TokenType {
    /// Namespace tag used in shared-cache keys.
    pub fn as_tag(&self) -> &'static str {
        match self {
            TokenType::Session => "SESSION",
            TokenType::OneTime => "ONE_TIME",
        }
    }

    /// Parse a caller-supplied type name.
    ///
    /// Accepts the canonical tags plus the short `SYS`/`CAD` aliases used by
    /// older front-ends.
    pub fn parse(raw: &str) -> TabulaResult<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "SESSION" | "SYS" => Ok(TokenType::Session),
            "ONE_TIME" | "ONETIME" | "CAD" => Ok(TokenType::OneTime),
            _ => Err(TokenError::InvalidTokenType {
                given: raw.to_string(),
            }
            .into()),
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

impl FromStr for TokenType {
    type Err = crate::TabulaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// A freshly issued token as returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_type: TokenType,
    /// Validity window in seconds.
    pub expires_in: u64,
    pub expires_at: Timestamp,
}

/// Binds each named mutating action to the token type it must present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPolicy {
    bindings: HashMap<String, TokenType>,
}

impl ActionPolicy {
    /// An empty policy; every action is unknown.
    pub fn empty() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    pub fn bind(mut self, action: impl Into<String>, token_type: TokenType) -> Self {
        self.bindings.insert(action.into(), token_type);
        self
    }

    pub fn token_type_for(&self, action: &str) -> TabulaResult<TokenType> {
        self.bindings.get(action).copied().ok_or_else(|| {
            TokenError::UnknownAction {
                action: action.to_string(),
            }
            .into()
        })
    }
}

impl Default for ActionPolicy {
    /// The public registration form gets one-shot tokens; back-office actions run on sessions.
    fn default() -> Self {
        Self::empty()
            .bind("register_client", TokenType::OneTime)
            .bind("update_client", TokenType::Session)
            .bind("check_in", TokenType::Session)
            .bind("confirm_payment", TokenType::Session)
            .bind("close_tab", TokenType::Session)
            .bind("daily_consumption", TokenType::Session)
            .bind("pause_plan", TokenType::Session)
    }
}
