//! Tabula Core - Shared Types
//!
//! Pure data structures used by every other crate: cell values and records,
//! schema descriptors, token types, the error hierarchy, the result envelope
//! and configuration. No I/O lives here.

pub mod config;
pub mod envelope;
pub mod error;
pub mod schema;
pub mod text;
pub mod token;
pub mod value;

use chrono::{DateTime, Utc};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use config::{CacheInstanceConfig, CellRef, TabulaConfig};
pub use envelope::{Envelope, ErrorBody, ErrorCode};
pub use error::{
    CacheError, ConcurrencyError, ConfigError, StoreError, TabulaError, TabulaResult, TokenError,
};
pub use schema::{ColumnIndex, RowView, Schema};
pub use text::{
    digits, format_date_for_sheet, normalize_date, normalize_text, only_digits,
    parse_locale_price, price_of, trimmed, SHEET_DATE_FORMAT,
};
pub use token::{ActionPolicy, IssuedToken, TokenType};
pub use value::{record, CellValue, Lookup, Record, Row};
