//! Result envelope returned across the public boundary.
//!
//! Every public operation answers with either a success envelope carrying a
//! payload or an error envelope carrying a code and a message. Errors never
//! escape as panics or raw error values.

use crate::error::{
    CacheError, ConcurrencyError, ConfigError, StoreError, TabulaError, TabulaResult, TokenError,
};
use serde::{Deserialize, Serialize};

// ============================================================================
// ERROR CODE ENUM
// ============================================================================

/// Error codes carried by error envelopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration (abort the request)
    NotFoundTable,
    MissingKeyColumn,
    MissingColumn,
    SchemaMismatch,
    UnknownCounter,
    InvalidConfig,

    // Concurrency (caller may retry)
    Busy,

    // Tokens
    InvalidTokenType,
    MissingToken,
    TokenInvalid,
    UnknownAction,

    // Infrastructure
    CacheWriteFailure,
    StorageFailure,
}

impl ErrorCode {
    pub fn retryable(&self) -> bool {
        matches!(self, ErrorCode::Busy)
    }
}

impl From<&TabulaError> for ErrorCode {
    fn from(err: &TabulaError) -> Self {
        match err {
            TabulaError::Store(e) => match e {
                StoreError::TableNotFound { .. } => ErrorCode::NotFoundTable,
                StoreError::MissingKeyColumn { .. } => ErrorCode::MissingKeyColumn,
                StoreError::MissingColumn { .. } => ErrorCode::MissingColumn,
                StoreError::SchemaMismatch { .. } => ErrorCode::SchemaMismatch,
                StoreError::Backend { .. } | StoreError::LockPoisoned => ErrorCode::StorageFailure,
            },
            TabulaError::Concurrency(ConcurrencyError::Busy { .. }) => ErrorCode::Busy,
            TabulaError::Token(e) => match e {
                TokenError::InvalidTokenType { .. } => ErrorCode::InvalidTokenType,
                TokenError::MissingToken => ErrorCode::MissingToken,
                TokenError::TokenInvalid => ErrorCode::TokenInvalid,
                TokenError::UnknownAction { .. } => ErrorCode::UnknownAction,
            },
            TabulaError::Cache(e) => match e {
                CacheError::WriteFailed { .. } | CacheError::Serialization { .. } => {
                    ErrorCode::CacheWriteFailure
                }
            },
            TabulaError::Config(e) => match e {
                ConfigError::UnknownCounter { .. } => ErrorCode::UnknownCounter,
                ConfigError::InvalidCellRef { .. } | ConfigError::InvalidValue { .. } => {
                    ErrorCode::InvalidConfig
                }
            },
        }
    }
}

// ============================================================================
// ENVELOPE
// ============================================================================

/// Error half of an envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

/// Success or error, serialized as `{"ok": true, "data": ..}` / `{"ok": false, "error": ..}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Envelope<T> {
    Success { ok: SuccessMarker, data: T },
    Failure { ok: FailureMarker, error: ErrorBody },
}

/// Serializes as `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SuccessMarker;

/// Serializes as `false`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FailureMarker;

macro_rules! bool_marker {
    ($ty:ident, $value:expr) => {
        impl Serialize for $ty {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_bool($value)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = bool::deserialize(deserializer)?;
                if raw == $value {
                    Ok($ty)
                } else {
                    Err(serde::de::Error::custom(concat!(
                        "expected ok = ",
                        stringify!($value)
                    )))
                }
            }
        }
    };
}

bool_marker!(SuccessMarker, true);
bool_marker!(FailureMarker, false);

impl<T> Envelope<T> {
    pub fn success(data: T) -> Self {
        Envelope::Success {
            ok: SuccessMarker,
            data,
        }
    }

    pub fn failure(err: &TabulaError) -> Self {
        let code = ErrorCode::from(err);
        Envelope::Failure {
            ok: FailureMarker,
            error: ErrorBody {
                code,
                message: err.to_string(),
                retryable: code.retryable(),
            },
        }
    }

    /// Wrap a result, logging failures with the operation name before they cross the boundary.
    pub fn from_result(operation: &str, result: TabulaResult<T>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => {
                let code = ErrorCode::from(&err);
                if err.is_configuration() {
                    tracing::error!(event = "operation.fail", operation, ?code, error = %err);
                } else {
                    tracing::warn!(event = "operation.fail", operation, ?code, error = %err);
                }
                Self::failure(&err)
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Envelope::Success { .. })
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            Envelope::Success { data, .. } => Some(data),
            Envelope::Failure { .. } => None,
        }
    }

    pub fn into_data(self) -> Option<T> {
        match self {
            Envelope::Success { data, .. } => Some(data),
            Envelope::Failure { .. } => None,
        }
    }

    pub fn error(&self) -> Option<&ErrorBody> {
        match self {
            Envelope::Success { .. } => None,
            Envelope::Failure { error, .. } => Some(error),
        }
    }

    pub fn error_code(&self) -> Option<ErrorCode> {
        self.error().map(|e| e.code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_shape() {
        let env = Envelope::success(3u32);
        assert_eq!(
            serde_json::to_value(&env).unwrap(),
            serde_json::json!({"ok": true, "data": 3})
        );
        assert!(env.is_success());
        assert_eq!(env.into_data(), Some(3));
    }

    #[test]
    fn test_failure_shape() {
        let err = TabulaError::from(ConcurrencyError::Busy {
            resource: "table:Cadastro".to_string(),
            waited_ms: 10,
        });
        let env: Envelope<u32> = Envelope::from_result("create", Err(err));
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["ok"], serde_json::json!(false));
        assert_eq!(json["error"]["code"], serde_json::json!("BUSY"));
        assert_eq!(json["error"]["retryable"], serde_json::json!(true));
        assert_eq!(env.error_code(), Some(ErrorCode::Busy));
    }

    #[test]
    fn test_envelope_deserializes_both_halves() {
        let ok: Envelope<u32> = serde_json::from_value(serde_json::json!({"ok": true, "data": 1})).unwrap();
        assert!(ok.is_success());

        let failed: Envelope<u32> = serde_json::from_value(serde_json::json!({
            "ok": false,
            "error": {"code": "TOKEN_INVALID", "message": "gone", "retryable": false}
        }))
        .unwrap();
        assert_eq!(failed.error_code(), Some(ErrorCode::TokenInvalid));
    }

    #[test]
    fn test_error_code_mapping() {
        let cases = [
            (
                TabulaError::from(StoreError::TableNotFound { table: "X".into() }),
                ErrorCode::NotFoundTable,
            ),
            (
                TabulaError::from(ConfigError::UnknownCounter { key: "X".into() }),
                ErrorCode::UnknownCounter,
            ),
            (TabulaError::from(TokenError::MissingToken), ErrorCode::MissingToken),
            (
                TabulaError::from(CacheError::WriteFailed {
                    key: "k".into(),
                    reason: "r".into(),
                }),
                ErrorCode::CacheWriteFailure,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(ErrorCode::from(&err), code);
        }
    }
}
