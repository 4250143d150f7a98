//! Error types for tabula operations

use thiserror::Error;

/// Backing-store and schema errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Table not found: {table}")]
    TableNotFound { table: String },

    #[error("Key column {column} not found in table {table}")]
    MissingKeyColumn { table: String, column: String },

    #[error("Required column {column} not found in table {table}")]
    MissingColumn { table: String, column: String },

    #[error("Schema mismatch on {table}: expected {expected:?}, found {found:?}")]
    SchemaMismatch {
        table: String,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Backend failure on {table}: {reason}")]
    Backend { table: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Mutual-exclusion errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConcurrencyError {
    #[error("Resource {resource} is busy, gave up after {waited_ms}ms")]
    Busy { resource: String, waited_ms: u64 },
}

/// Token issuance and validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    #[error("Invalid token type: {given}")]
    InvalidTokenType { given: String },

    #[error("Token not provided")]
    MissingToken,

    #[error("Token invalid (expired or already used)")]
    TokenInvalid,

    #[error("No token policy bound to action {action}")]
    UnknownAction { action: String },
}

/// Shared-cache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache write failed for {key}: {reason}")]
    WriteFailed { key: String, reason: String },

    #[error("Cache payload for {key} could not be (de)serialized: {reason}")]
    Serialization { key: String, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown counter: {key}")]
    UnknownCounter { key: String },

    #[error("Invalid cell reference: {reference}")]
    InvalidCellRef { reference: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all tabula errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TabulaError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    #[error("Token error: {0}")]
    Token(#[from] TokenError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TabulaError {
    /// Only lock timeouts are worth retrying; everything else fails the same way twice.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TabulaError::Concurrency(ConcurrencyError::Busy { .. }))
    }

    /// Configuration errors abort the request instead of being reported as a negative result.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            TabulaError::Config(_)
                | TabulaError::Store(StoreError::TableNotFound { .. })
                | TabulaError::Store(StoreError::MissingKeyColumn { .. })
                | TabulaError::Store(StoreError::MissingColumn { .. })
                | TabulaError::Store(StoreError::SchemaMismatch { .. })
        )
    }
}

/// Result type alias for tabula operations.
pub type TabulaResult<T> = Result<T, TabulaError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_missing_key_column() {
        let err = StoreError::MissingKeyColumn {
            table: "Cadastro".to_string(),
            column: "ID".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Key column"));
        assert!(msg.contains("Cadastro"));
        assert!(msg.contains("ID"));
    }

    #[test]
    fn test_busy_display_and_retryable() {
        let err = TabulaError::from(ConcurrencyError::Busy {
            resource: "table:Cadastro".to_string(),
            waited_ms: 30000,
        });
        assert!(format!("{}", err).contains("30000ms"));
        assert!(err.is_retryable());
        assert!(!err.is_configuration());
    }

    #[test]
    fn test_configuration_classification() {
        let unknown = TabulaError::from(ConfigError::UnknownCounter {
            key: "NOPE".to_string(),
        });
        assert!(unknown.is_configuration());
        assert!(!unknown.is_retryable());

        let missing = TabulaError::from(StoreError::TableNotFound {
            table: "Ghost".to_string(),
        });
        assert!(missing.is_configuration());

        let token = TabulaError::from(TokenError::TokenInvalid);
        assert!(!token.is_configuration());
        assert!(!token.is_retryable());
    }

    #[test]
    fn test_tabula_error_from_variants() {
        assert!(matches!(
            TabulaError::from(StoreError::LockPoisoned),
            TabulaError::Store(_)
        ));
        assert!(matches!(
            TabulaError::from(TokenError::MissingToken),
            TabulaError::Token(_)
        ));
        assert!(matches!(
            TabulaError::from(CacheError::WriteFailed {
                key: "k".to_string(),
                reason: "full".to_string(),
            }),
            TabulaError::Cache(_)
        ));
    }
}
