//! Property-Based Tests for Table Store CRUD
//!
//! **Property: Schema-mapped, all-or-nothing mutations**
//!
//! - create then read returns exactly the schema's columns; unknown fields
//!   are dropped and missing ones read back empty
//! - update of an absent key returns false and leaves the table unchanged
//! - delete then read returns NotFound
//! - a busy lock fails the mutation without touching the table

use proptest::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tabula_storage::{CacheManager, MutualExclusion, SharedCache, StripedLock, TableStore};
use tabula_test_utils::{
    assertions::{assert_busy, assert_config_error, assert_not_found},
    fixtures::{self, CLIENT_COLUMNS},
    generators, init_test_tracing, record, AlwaysBusyLock, CellValue, InMemoryBackend,
    InMemorySharedCache, Lookup, Record, UnwritableSharedCache,
};
use tabula_core::normalize_date;
use tokio::runtime::Runtime;

// ============================================================================
// TEST CONFIGURATION
// ============================================================================

fn test_runtime() -> Result<Runtime, TestCaseError> {
    Runtime::new().map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

fn store_with(
    backend: &InMemoryBackend,
    shared: Arc<dyn SharedCache>,
    lock: Arc<dyn MutualExclusion>,
) -> TableStore {
    TableStore::new(
        Arc::new(backend.clone()),
        Arc::new(CacheManager::new(shared)),
        lock,
        Duration::from_millis(200),
        Duration::from_secs(3600),
    )
}

fn store(backend: &InMemoryBackend) -> TableStore {
    store_with(
        backend,
        Arc::new(InMemorySharedCache::new()),
        Arc::new(StripedLock::new()),
    )
}

/// A client record with a fresh id plus fields no header knows about.
fn new_client_strategy() -> impl Strategy<Value = (Record, Record)> {
    (
        generators::arb_record(CLIENT_COLUMNS),
        prop::collection::btree_map(generators::arb_unknown_column(), "[a-z]{1,6}", 0..4),
        1u32..1_000_000,
    )
        .prop_map(|(mut known, extra, id)| {
            known.insert("ID".to_string(), CellValue::from(format!("N{}", id)));
            let mut submitted = known.clone();
            submitted.extend(extra.into_iter().map(|(k, v)| (k, CellValue::Text(v))));
            (known, submitted)
        })
}

// ============================================================================
// PROPERTIES
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(50))]

    /// create then read returns only schema-recognized fields.
    #[test]
    fn prop_create_then_read_drops_unknown_fields(
        (known, submitted) in new_client_strategy(),
        omit_email in any::<bool>(),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let backend = fixtures::seeded_backend();
            let store = store(&backend);

            let mut submitted = submitted;
            let mut expected = known.clone();
            if omit_email {
                submitted.remove("Email");
                expected.insert("Email".to_string(), CellValue::from(""));
            }

            let written = store.create("Cadastro", &[submitted]).await?;
            prop_assert_eq!(written, 1);

            let id = known["ID"].clone();
            let found = store.read("Cadastro", "ID", id).await?;
            prop_assert_eq!(found, Lookup::Found(expected));
            Ok(())
        })?;
    }

    /// update of an absent key is false and changes nothing.
    #[test]
    fn prop_update_missing_key_is_noop(
        missing in "[A-Z]{3}[0-9]{1,4}",
        patch in generators::arb_record(CLIENT_COLUMNS),
    ) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let backend = fixtures::seeded_backend();
            let store = store(&backend);
            let before = backend.snapshot("Cadastro");

            let updated = store.update("Cadastro", "ID", missing.as_str(), &patch).await?;
            prop_assert!(!updated);
            prop_assert_eq!(backend.snapshot("Cadastro"), before);
            Ok(())
        })?;
    }

    /// delete then read is NotFound; other rows survive.
    #[test]
    fn prop_delete_then_read_not_found((known, submitted) in new_client_strategy()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let backend = fixtures::seeded_backend();
            let store = store(&backend);
            store.create("Cadastro", &[submitted]).await?;

            let id = known["ID"].clone();
            prop_assert!(store.delete("Cadastro", "ID", id.clone()).await?);
            prop_assert_eq!(store.read("Cadastro", "ID", id.clone()).await?, Lookup::NotFound);
            prop_assert!(!store.delete("Cadastro", "ID", id).await?);
            prop_assert_eq!(store.list("Cadastro").await?.len(), 2);
            Ok(())
        })?;
    }

    /// Date cells written through the store read back as the same instant.
    #[test]
    fn prop_date_cells_roundtrip(when in generators::arb_timestamp()) {
        let rt = test_runtime()?;
        rt.block_on(async {
            let backend = InMemoryBackend::new()
                .with_table("Checkins", &["ID", "Entrada"], vec![]);
            let store = store(&backend);

            let checkin = record([
                ("ID", CellValue::from("C1")),
                ("Entrada", CellValue::Date(when)),
            ]);
            store.create("Checkins", &[checkin]).await?;
            let found = store.read("Checkins", "ID", "C1").await?;
            let row = found.found().ok_or_else(|| TestCaseError::fail("row missing"))?;
            prop_assert_eq!(row.get("Entrada"), Some(&CellValue::Date(when)));
            Ok(())
        })?;
    }

    /// update touches only the patched, recognized columns of one row.
    #[test]
    fn prop_update_patches_one_row(email in "[a-z]{1,8}@example\\.org") {
        let rt = test_runtime()?;
        rt.block_on(async {
            let backend = fixtures::seeded_backend();
            let store = store(&backend);
            let before = store.list("Cadastro").await?;

            let patch = record([("Email", email.as_str()), ("Senha", "secret")]);
            prop_assert!(store.update("Cadastro", "ID", 2i64, &patch).await?);

            let after = store.list("Cadastro").await?;
            prop_assert_eq!(&after[0], &before[0]);
            prop_assert_eq!(after[1].get("Email"), Some(&CellValue::from(email.as_str())));
            prop_assert_eq!(after[1].get("Nome Completo"), before[1].get("Nome Completo"));
            prop_assert!(!after[1].contains_key("Senha"));
            Ok(())
        })?;
    }
}

// ============================================================================
// EDGE CASES
// ============================================================================

#[tokio::test]
async fn test_busy_lock_leaves_table_untouched() {
    init_test_tracing();
    let backend = fixtures::seeded_backend();
    let store = store_with(
        &backend,
        Arc::new(InMemorySharedCache::new()),
        Arc::new(AlwaysBusyLock),
    );
    let before = backend.snapshot("Cadastro");

    assert_busy(&store.create("Cadastro", &[record([("ID", "9")])]).await);
    assert_busy(&store.update("Cadastro", "ID", "1", &record([("Email", "x")])).await);
    assert_busy(&store.delete("Cadastro", "ID", "1").await);
    assert_eq!(backend.snapshot("Cadastro"), before);

    // Reads take no lock.
    assert_eq!(store.list("Cadastro").await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_text_dates_normalize_before_write() {
    let backend = InMemoryBackend::new().with_table("Diarias", &["ID", "Data"], vec![]);
    let store = store(&backend);

    let typed = normalize_date(&CellValue::from("09/03/2024"));
    store
        .create("Diarias", &[record([("ID", CellValue::from("D1")), ("Data", typed)])])
        .await
        .unwrap();

    let row = store.read("Diarias", "ID", "D1").await.unwrap().found().unwrap();
    assert_eq!(row["Data"].to_string(), "09/03/2024 00:00:00");
    assert!(row["Data"].as_date().is_some());
}

#[tokio::test]
async fn test_empty_create_takes_no_lock() {
    let backend = fixtures::seeded_backend();
    let store = store_with(
        &backend,
        Arc::new(InMemorySharedCache::new()),
        Arc::new(AlwaysBusyLock),
    );
    assert_eq!(store.create("Cadastro", &[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_configuration_errors() {
    let backend = fixtures::seeded_backend();
    let store = store(&backend);

    assert_config_error(&store.list("Estoque").await);
    assert_config_error(&store.read("Cadastro", "Codigo", "1").await);
    assert_config_error(&store.delete("Cadastro", "Codigo", "1").await);
}

#[tokio::test]
async fn test_key_match_is_string_cast_first_match() {
    let backend = InMemoryBackend::new().with_table(
        "Comandas",
        &["Numero", "Status"],
        vec![
            vec![CellValue::Number(7.0), CellValue::from("aberta")],
            vec![CellValue::from("7"), CellValue::from("fechada")],
        ],
    );
    let store = store(&backend);

    let found = store.read("Comandas", "Numero", "7").await.unwrap();
    let record = found.found().unwrap();
    assert_eq!(record["Status"], CellValue::from("aberta"));

    assert_not_found(&store.read("Comandas", "Numero", "7.5").await);
}

#[tokio::test]
async fn test_failed_write_changes_nothing_and_releases_lock() {
    let backend = fixtures::seeded_backend();
    let store = store(&backend);
    let table = backend.raw_table("Cadastro").unwrap();
    let before = backend.snapshot("Cadastro");

    table.set_reject_writes(true);
    assert!(store
        .update("Cadastro", "ID", "1", &record([("Email", "new@x.com")]))
        .await
        .is_err());
    assert_eq!(backend.snapshot("Cadastro"), before);

    table.set_reject_writes(false);
    assert!(store
        .update("Cadastro", "ID", "1", &record([("Email", "new@x.com")]))
        .await
        .unwrap());
}

#[tokio::test]
async fn test_shared_cache_outage_does_not_block_crud() {
    let backend = fixtures::seeded_backend();
    let store = store_with(
        &backend,
        Arc::new(UnwritableSharedCache::default()),
        Arc::new(StripedLock::new()),
    );

    assert_eq!(
        store
            .create("Cadastro", &[record([("ID", "3"), ("Nome Completo", "Caio")])])
            .await
            .unwrap(),
        1
    );
    assert!(store.read("Cadastro", "ID", "3").await.unwrap().is_found());
}
