//! Runtime configuration.
//!
//! Configuration is loaded from environment variables with defaults that
//! match the spreadsheet the layer was first deployed against.

use crate::error::{ConfigError, TabulaResult};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

// ============================================================================
// CELL REFERENCES
// ============================================================================

/// A single cell in A1 notation, qualified by sheet: `Config!B3`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub sheet: String,
    /// Zero-based column index.
    pub column: usize,
    /// One-based row number, as shown in the sheet.
    pub row: usize,
}

impl CellRef {
    pub fn parse(reference: &str) -> TabulaResult<Self> {
        let invalid = || ConfigError::InvalidCellRef {
            reference: reference.to_string(),
        };

        let (sheet, cell) = reference.trim().split_once('!').ok_or_else(invalid)?;
        if sheet.is_empty() {
            return Err(invalid().into());
        }

        let split = cell
            .find(|c: char| c.is_ascii_digit())
            .ok_or_else(invalid)?;
        let (letters, digits) = cell.split_at(split);
        if letters.is_empty() || !letters.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(invalid().into());
        }

        let column = letters
            .bytes()
            .try_fold(0usize, |acc, b| {
                acc.checked_mul(26)?
                    .checked_add(usize::from(b.to_ascii_uppercase() - b'A') + 1)
            })
            .ok_or_else(invalid)?
            - 1;
        let row: usize = digits.parse().map_err(|_| invalid())?;
        if row == 0 {
            return Err(invalid().into());
        }

        Ok(Self {
            sheet: sheet.to_string(),
            column,
            row,
        })
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut letters = Vec::new();
        let mut n = self.column + 1;
        while n > 0 {
            let rem = (n - 1) % 26;
            letters.push((b'A' + rem as u8) as char);
            n = (n - 1) / 26;
        }
        let column: String = letters.iter().rev().collect();
        write!(f, "{}!{}{}", self.sheet, column, self.row)
    }
}

// ============================================================================
// CACHE INSTANCES
// ============================================================================

/// Source table and TTL of one read-through cache instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInstanceConfig {
    pub table: String,
    pub ttl: Duration,
}

impl CacheInstanceConfig {
    pub fn new(table: impl Into<String>, ttl: Duration) -> Self {
        Self {
            table: table.into(),
            ttl,
        }
    }
}

// ============================================================================
// TABULA CONFIGURATION
// ============================================================================

/// Configuration for locks, caches, tokens and counters.
#[derive(Debug, Clone)]
pub struct TabulaConfig {
    /// Bounded wait for table mutations.
    pub store_lock_timeout: Duration,
    /// Bounded wait for counter increments; always shorter than the store wait.
    pub counter_lock_timeout: Duration,

    /// How long resolved table headers stay cached.
    pub header_ttl: Duration,

    pub session_token_ttl: Duration,
    pub one_time_token_ttl: Duration,

    pub postal_ranges: CacheInstanceConfig,
    pub clients: CacheInstanceConfig,
    pub catalog: CacheInstanceConfig,

    /// Logical counter key → fixed cell.
    pub counters: HashMap<String, CellRef>,
}

/// Counters provisioned on the `Config` sheet at deployment.
const DEFAULT_COUNTERS: &[(&str, &str)] = &[
    ("CADASTRO", "Config!B3"),
    ("CHECKIN", "Config!B4"),
    ("DIARIAS", "Config!B5"),
    ("PAUSAS", "Config!B6"),
    ("COMANDA", "Config!B7"),
    ("VENDAS_SERV", "Config!B8"),
    ("VENDAS_PROD", "Config!B9"),
];

impl Default for TabulaConfig {
    fn default() -> Self {
        let counters = DEFAULT_COUNTERS
            .iter()
            .filter_map(|(key, cell)| CellRef::parse(cell).ok().map(|c| (key.to_string(), c)))
            .collect();

        Self {
            store_lock_timeout: Duration::from_secs(30),
            counter_lock_timeout: Duration::from_secs(10),
            header_ttl: Duration::from_secs(3600), // 1 hour
            session_token_ttl: Duration::from_secs(1800), // 30 minutes
            one_time_token_ttl: Duration::from_secs(300), // 5 minutes
            postal_ranges: CacheInstanceConfig::new("CEP", Duration::from_secs(86400)),
            clients: CacheInstanceConfig::new("Cadastro", Duration::from_secs(1800)),
            catalog: CacheInstanceConfig::new("Tabelas_de_Precos", Duration::from_secs(43200)),
            counters,
        }
    }
}

impl TabulaConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create TabulaConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TABULA_STORE_LOCK_TIMEOUT_MS` (default: 30000)
    /// - `TABULA_COUNTER_LOCK_TIMEOUT_MS` (default: 10000)
    /// - `TABULA_HEADER_TTL_SECS` (default: 3600)
    /// - `TABULA_SESSION_TOKEN_TTL_SECS` (default: 1800)
    /// - `TABULA_ONE_TIME_TOKEN_TTL_SECS` (default: 300)
    /// - `TABULA_POSTAL_TABLE` / `TABULA_POSTAL_TTL_SECS` (default: CEP / 86400)
    /// - `TABULA_CLIENTS_TABLE` / `TABULA_CLIENTS_TTL_SECS` (default: Cadastro / 1800)
    /// - `TABULA_CATALOG_TABLE` / `TABULA_CATALOG_TTL_SECS` (default: Tabelas_de_Precos / 43200)
    /// - `TABULA_COUNTERS`: `KEY=Sheet!B3,OTHER=Sheet!B4`, replaces the default map
    pub fn from_env() -> TabulaResult<Self> {
        let defaults = Self::default();

        let counters = match std::env::var("TABULA_COUNTERS") {
            Ok(raw) if !raw.trim().is_empty() => parse_counter_map(&raw)?,
            _ => defaults.counters,
        };

        let config = Self {
            store_lock_timeout: env_millis("TABULA_STORE_LOCK_TIMEOUT_MS")
                .unwrap_or(defaults.store_lock_timeout),
            counter_lock_timeout: env_millis("TABULA_COUNTER_LOCK_TIMEOUT_MS")
                .unwrap_or(defaults.counter_lock_timeout),
            header_ttl: env_secs("TABULA_HEADER_TTL_SECS").unwrap_or(defaults.header_ttl),
            session_token_ttl: env_secs("TABULA_SESSION_TOKEN_TTL_SECS")
                .unwrap_or(defaults.session_token_ttl),
            one_time_token_ttl: env_secs("TABULA_ONE_TIME_TOKEN_TTL_SECS")
                .unwrap_or(defaults.one_time_token_ttl),
            postal_ranges: env_instance("TABULA_POSTAL", defaults.postal_ranges),
            clients: env_instance("TABULA_CLIENTS", defaults.clients),
            catalog: env_instance("TABULA_CATALOG", defaults.catalog),
            counters,
        };

        Ok(config.normalized())
    }

    /// Keep the counter wait strictly below the store wait.
    pub fn normalized(mut self) -> Self {
        if self.counter_lock_timeout >= self.store_lock_timeout {
            let clamped = self.store_lock_timeout / 3;
            tracing::warn!(
                counter_ms = self.counter_lock_timeout.as_millis() as u64,
                store_ms = self.store_lock_timeout.as_millis() as u64,
                clamped_ms = clamped.as_millis() as u64,
                "Counter lock timeout must be shorter than the store lock timeout; clamping"
            );
            self.counter_lock_timeout = clamped;
        }
        self
    }

    /// Set both lock waits.
    pub fn with_lock_timeouts(mut self, store: Duration, counter: Duration) -> Self {
        self.store_lock_timeout = store;
        self.counter_lock_timeout = counter;
        self.normalized()
    }

    /// Register or replace a counter.
    pub fn with_counter(mut self, key: impl Into<String>, cell: CellRef) -> Self {
        self.counters.insert(key.into(), cell);
        self
    }
}

fn parse_counter_map(raw: &str) -> TabulaResult<HashMap<String, CellRef>> {
    let mut counters = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (key, cell) = entry.split_once('=').ok_or_else(|| ConfigError::InvalidValue {
            field: "TABULA_COUNTERS".to_string(),
            value: entry.to_string(),
            reason: "expected KEY=Sheet!Cell".to_string(),
        })?;
        counters.insert(key.trim().to_string(), CellRef::parse(cell)?);
    }
    Ok(counters)
}

fn env_millis(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_millis)
}

fn env_secs(name: &str) -> Option<Duration> {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
}

fn env_instance(prefix: &str, default: CacheInstanceConfig) -> CacheInstanceConfig {
    let table = std::env::var(format!("{}_TABLE", prefix))
        .ok()
        .filter(|t| !t.trim().is_empty())
        .unwrap_or(default.table);
    let ttl = env_secs(&format!("{}_TTL_SECS", prefix)).unwrap_or(default.ttl);
    CacheInstanceConfig { table, ttl }
}
