//! Tabula Test Utilities
//!
//! Shared test infrastructure for the tabula workspace:
//! - Proptest generators for cells, records, postal codes and prices
//! - Seeded in-memory tables mirroring a production workbook
//! - Collaborator doubles (busy locks, unwritable caches, counting loaders)
//! - Custom assertions over `TabulaResult` and `Envelope`

pub use tabula_core::{
    record, CellRef, CellValue, ConcurrencyError, ConfigError, Envelope, ErrorCode, Lookup,
    Record, Row, StoreError, TabulaConfig, TabulaError, TabulaResult, Timestamp, TokenError,
    TokenType,
};
pub use tabula_storage::{
    InMemoryBackend, InMemorySharedCache, LockGuard, Loader, MutualExclusion, SharedCache,
    StripedLock, Tabula,
};

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tabula_core::CacheError;
use tabula_storage::IdGenerator;

/// Install a test-writer subscriber filtered by `RUST_LOG` (default `warn`).
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    use tracing_subscriber::EnvFilter;

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

// ============================================================================
// COLLABORATOR DOUBLES
// ============================================================================

/// A lock that is always held by someone else.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysBusyLock;

#[async_trait]
impl MutualExclusion for AlwaysBusyLock {
    async fn try_acquire(&self, resource: &str, wait: Duration) -> TabulaResult<LockGuard> {
        Err(ConcurrencyError::Busy {
            resource: resource.to_string(),
            waited_ms: wait.as_millis() as u64,
        }
        .into())
    }
}

/// Real lock whose callers arrive late, widening race windows.
#[derive(Debug, Clone)]
pub struct DelayedLock {
    inner: StripedLock,
    delay: Duration,
    acquisitions: Arc<AtomicUsize>,
}

impl DelayedLock {
    pub fn new(delay: Duration) -> Self {
        Self {
            inner: StripedLock::new(),
            delay,
            acquisitions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MutualExclusion for DelayedLock {
    async fn try_acquire(&self, resource: &str, wait: Duration) -> TabulaResult<LockGuard> {
        tokio::time::sleep(self.delay).await;
        let guard = self.inner.try_acquire(resource, wait).await?;
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        Ok(guard)
    }
}

/// Shared cache that serves reads but rejects every write.
#[derive(Debug, Clone, Default)]
pub struct UnwritableSharedCache {
    inner: InMemorySharedCache,
}

impl UnwritableSharedCache {
    pub fn new(inner: InMemorySharedCache) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl SharedCache for UnwritableSharedCache {
    async fn get(&self, key: &str) -> TabulaResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, _value: String, _ttl: Duration) -> TabulaResult<()> {
        Err(CacheError::WriteFailed {
            key: key.to_string(),
            reason: "quota exceeded".to_string(),
        }
        .into())
    }

    async fn remove(&self, key: &str) -> TabulaResult<()> {
        self.inner.remove(key).await
    }

    async fn remaining_ttl(&self, key: &str) -> TabulaResult<Option<Duration>> {
        self.inner.remaining_ttl(key).await
    }
}

/// Loader returning a fixed value and counting its calls.
#[derive(Debug)]
pub struct CountingLoader<T> {
    value: T,
    calls: AtomicUsize,
}

impl<T> CountingLoader<T> {
    pub fn new(value: T) -> Self {
        Self {
            value,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> Loader<T> for CountingLoader<T> {
    async fn load(&self) -> TabulaResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.value.clone())
    }
}

/// Predictable token ids: `tok-1`, `tok-2`, ...
#[derive(Debug, Default)]
pub struct SequentialIds {
    next: AtomicUsize,
}

impl IdGenerator for SequentialIds {
    fn generate(&self) -> String {
        format!("tok-{}", self.next.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for tabula values.

    use super::*;
    use proptest::prelude::*;

    /// Any storable cell value; numbers are finite.
    pub fn arb_cell_value() -> impl Strategy<Value = CellValue> {
        prop_oneof![
            Just(CellValue::Empty),
            any::<bool>().prop_map(CellValue::Bool),
            (-1_000_000i64..1_000_000).prop_map(CellValue::from),
            arb_timestamp().prop_map(CellValue::Date),
            "[A-Za-z0-9 @.-]{0,16}".prop_map(CellValue::Text),
        ]
    }

    /// Whole-second UTC instants between 1970 and 2096.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (0i64..4_000_000_000).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
        })
    }

    /// Column names outside any real header.
    pub fn arb_unknown_column() -> impl Strategy<Value = String> {
        "[a-z]{3,8}".prop_map(|s| format!("x_{}", s))
    }

    /// A record over `columns`, each value a non-empty text cell.
    pub fn arb_record(columns: &'static [&'static str]) -> impl Strategy<Value = Record> {
        prop::collection::vec("[A-Za-z0-9]{1,12}", columns.len()).prop_map(move |values| {
            columns
                .iter()
                .zip(values)
                .map(|(c, v)| (c.to_string(), CellValue::Text(v)))
                .collect()
        })
    }

    /// Eight-digit postal code, optionally formatted `#####-###`.
    pub fn arb_postal_code() -> impl Strategy<Value = String> {
        (0u32..100_000_000, any::<bool>()).prop_map(|(code, dashed)| {
            let raw = format!("{:08}", code);
            if dashed {
                format!("{}-{}", &raw[..5], &raw[5..])
            } else {
                raw
            }
        })
    }

    /// A price in cents with its pt-BR rendering (`R$ 1.234,56`).
    pub fn arb_locale_price() -> impl Strategy<Value = (u64, String)> {
        (0u64..100_000_000).prop_map(|cents| (cents, format_brl(cents)))
    }

    /// Number of sequential calls worth testing.
    pub fn arb_call_count() -> impl Strategy<Value = usize> {
        1usize..12
    }

    fn format_brl(cents: u64) -> String {
        let reais = (cents / 100).to_string();
        let mut grouped = String::new();
        for (i, ch) in reais.chars().enumerate() {
            if i > 0 && (reais.len() - i) % 3 == 0 {
                grouped.push('.');
            }
            grouped.push(ch);
        }
        format!("R$ {},{:02}", grouped, cents % 100)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Seeded tables shaped like the production workbook.

    use super::*;

    pub const CLIENT_COLUMNS: &[&str] = &["ID", "Nome Completo", "CPF/CNPJ", "Telefone", "Email"];

    fn row(cells: &[&str]) -> Row {
        cells.iter().map(|c| CellValue::from(*c)).collect()
    }

    /// Postal ranges `00000000-00099999 → A/X` and `00100000-00199999 → B/Y`.
    pub fn postal_rows() -> Vec<Row> {
        vec![
            row(&["A", "X", "00000000", "00099999"]),
            row(&["B", "Y", "00100000", "00199999"]),
        ]
    }

    pub fn client_rows() -> Vec<Row> {
        vec![
            row(&["1", "Ana Souza", "123.456.789-01", "11 90000-0001", "ana@example.com"]),
            row(&["2", "Bruno Lima", "12.345.678/0001-90", "11 90000-0002", "bruno@example.com"]),
        ]
    }

    pub fn catalog_rows() -> Vec<Row> {
        vec![
            row(&["S1", "Diária", "R$ 1.234,56", "Servico"]),
            row(&["P1", "Ração", "R$ 89,90", "Produto"]),
            row(&["P2", "Brinde", "sob consulta", "Produto"]),
        ]
    }

    /// Backend with `CEP`, `Cadastro`, `Tabelas_de_Precos` and an empty `Config` sheet.
    pub fn seeded_backend() -> InMemoryBackend {
        InMemoryBackend::new()
            .with_table(
                "CEP",
                &["Macrorregião", "Distritos", "CEP Início", "CEP Fim"],
                postal_rows(),
            )
            .with_table("Cadastro", CLIENT_COLUMNS, client_rows())
            .with_table(
                "Tabelas_de_Precos",
                &["ID", "Nome do Item", "Preço", "Tipo"],
                catalog_rows(),
            )
            .with_table("Config", &["Chave", "Valor"], vec![])
    }

    /// Default config with short lock waits so contention tests finish fast.
    pub fn fast_config() -> TabulaConfig {
        TabulaConfig::default()
            .with_lock_timeouts(Duration::from_millis(600), Duration::from_millis(200))
    }

    /// A facade over `backend` with fresh in-memory cache and lock.
    pub fn tabula(backend: &InMemoryBackend) -> Tabula {
        Tabula::new(
            fast_config(),
            Arc::new(backend.clone()),
            Arc::new(InMemorySharedCache::new()),
            Arc::new(StripedLock::new()),
        )
        .with_id_generator(Arc::new(SequentialIds::default()))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over results and envelopes.

    use super::*;

    #[track_caller]
    pub fn assert_busy<T: std::fmt::Debug>(result: &TabulaResult<T>) {
        match result {
            Err(TabulaError::Concurrency(ConcurrencyError::Busy { .. })) => {}
            other => panic!("Expected Busy, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &TabulaResult<T>) {
        match result {
            Err(e) if e.is_configuration() => {}
            other => panic!("Expected configuration error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_token_invalid<T: std::fmt::Debug>(result: &TabulaResult<T>) {
        match result {
            Err(TabulaError::Token(TokenError::TokenInvalid)) => {}
            other => panic!("Expected TokenInvalid, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(result: &TabulaResult<Lookup<T>>) {
        match result {
            Ok(Lookup::NotFound) => {}
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    /// Assert that an envelope failed with `code`.
    #[track_caller]
    pub fn assert_envelope_code<T>(envelope: &Envelope<T>, code: ErrorCode) {
        assert_eq!(
            envelope.error_code(),
            Some(code),
            "Expected error envelope with {:?}",
            code
        );
    }

    /// Assert that `ids` are consecutive and strictly increasing.
    #[track_caller]
    pub fn assert_gap_free(ids: &[u64]) {
        for pair in ids.windows(2) {
            assert_eq!(pair[1], pair[0] + 1, "ids not consecutive: {:?}", ids);
        }
    }
}
