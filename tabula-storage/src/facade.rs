//! Envelope-returning entry point.
//!
//! [`Tabula`] wires the store, caches, counters and tokens together from a
//! [`TabulaConfig`] and three collaborators. Every public method answers
//! with an [`Envelope`]; failures are logged once here and never escape as
//! raw errors.
//!
//! Mutations require an [`Authorization`], which only [`Tabula::authorize`]
//! can produce: the caller names the action, and the action's bound token
//! type decides which token is accepted.

use serde::Serialize;
use std::sync::Arc;
use tabula_core::{
    ActionPolicy, CellValue, Envelope, IssuedToken, Lookup, Record, TabulaConfig, TabulaResult,
    TokenType,
};

use crate::backend::TabularBackend;
use crate::cache::{
    CacheManager, CatalogItem, ClientDirectory, ClientEntry, PostalDirectory, PriceCatalog, Region,
};
use crate::counter::AtomicCounter;
use crate::lock::MutualExclusion;
use crate::shared_cache::SharedCache;
use crate::store::TableStore;
use crate::token::{IdGenerator, TokenService};

/// Proof that a token was accepted for a named action.
#[derive(Debug, Serialize)]
pub struct Authorization {
    action: String,
    token_type: TokenType,
}

impl Authorization {
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn token_type(&self) -> TokenType {
        self.token_type
    }
}

pub struct Tabula {
    config: TabulaConfig,
    caches: Arc<CacheManager>,
    store: TableStore,
    counter: AtomicCounter,
    tokens: TokenService,
    policy: ActionPolicy,
    postal: PostalDirectory,
    clients: ClientDirectory,
    catalog: PriceCatalog,
}

impl Tabula {
    pub fn new(
        config: TabulaConfig,
        backend: Arc<dyn TabularBackend>,
        shared: Arc<dyn SharedCache>,
        lock: Arc<dyn MutualExclusion>,
    ) -> Self {
        let config = config.normalized();
        let caches = Arc::new(CacheManager::new(Arc::clone(&shared)));

        let store = TableStore::new(
            Arc::clone(&backend),
            Arc::clone(&caches),
            Arc::clone(&lock),
            config.store_lock_timeout,
            config.header_ttl,
        );
        let counter = AtomicCounter::new(
            Arc::clone(&backend),
            Arc::clone(&lock),
            config.counter_lock_timeout,
            config.counters.clone(),
        );
        let tokens = TokenService::new(
            shared,
            lock,
            config.counter_lock_timeout,
            config.session_token_ttl,
            config.one_time_token_ttl,
        );

        let postal =
            PostalDirectory::new(Arc::clone(&caches), Arc::clone(&backend), &config.postal_ranges);
        let clients = ClientDirectory::new(Arc::clone(&caches), Arc::clone(&backend), &config.clients);
        let catalog = PriceCatalog::new(Arc::clone(&caches), backend, &config.catalog);

        tracing::debug!(
            registered = ?caches.registered_keys(),
            counters = config.counters.len(),
            "Tabula initialized"
        );

        Self {
            config,
            caches,
            store,
            counter,
            tokens,
            policy: ActionPolicy::default(),
            postal,
            clients,
            catalog,
        }
    }

    pub fn with_policy(mut self, policy: ActionPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.tokens = self.tokens.with_id_generator(ids);
        self
    }

    pub fn config(&self) -> &TabulaConfig {
        &self.config
    }

    pub fn caches(&self) -> &Arc<CacheManager> {
        &self.caches
    }

    pub fn store(&self) -> &TableStore {
        &self.store
    }

    // ========================================================================
    // TOKENS
    // ========================================================================

    pub async fn issue_token(&self, token_type: &str) -> Envelope<IssuedToken> {
        Envelope::from_result("issue_token", self.tokens.issue_named(token_type).await)
    }

    pub async fn validate_token(&self, token: &str, token_type: &str) -> Envelope<()> {
        Envelope::from_result(
            "validate_token",
            self.tokens.validate_named(token, token_type).await,
        )
    }

    /// Validate `token` against the type bound to `action`.
    pub async fn authorize(&self, action: &str, token: &str) -> Envelope<Authorization> {
        Envelope::from_result("authorize", self.try_authorize(action, token).await)
    }

    async fn try_authorize(&self, action: &str, token: &str) -> TabulaResult<Authorization> {
        let token_type = self.policy.token_type_for(action)?;
        self.tokens.validate(token, token_type).await?;
        Ok(Authorization {
            action: action.to_string(),
            token_type,
        })
    }

    // ========================================================================
    // TABLES
    // ========================================================================

    pub async fn create(
        &self,
        _auth: &Authorization,
        table: &str,
        records: &[Record],
    ) -> Envelope<usize> {
        Envelope::from_result("create", self.store.create(table, records).await)
    }

    pub async fn read(
        &self,
        table: &str,
        key_column: &str,
        key: impl Into<CellValue>,
    ) -> Envelope<Lookup<Record>> {
        Envelope::from_result("read", self.store.read(table, key_column, key).await)
    }

    pub async fn list(&self, table: &str) -> Envelope<Vec<Record>> {
        Envelope::from_result("list", self.store.list(table).await)
    }

    pub async fn update(
        &self,
        _auth: &Authorization,
        table: &str,
        key_column: &str,
        key: impl Into<CellValue>,
        patch: &Record,
    ) -> Envelope<bool> {
        Envelope::from_result(
            "update",
            self.store.update(table, key_column, key, patch).await,
        )
    }

    pub async fn delete(
        &self,
        _auth: &Authorization,
        table: &str,
        key_column: &str,
        key: impl Into<CellValue>,
    ) -> Envelope<bool> {
        Envelope::from_result("delete", self.store.delete(table, key_column, key).await)
    }

    pub async fn generate_id(&self, _auth: &Authorization, counter: &str) -> Envelope<u64> {
        Envelope::from_result("generate_id", self.counter.generate_id(counter).await)
    }

    // ========================================================================
    // CACHED LOOKUPS
    // ========================================================================

    pub async fn find_region(&self, postal_code: &str) -> Envelope<Lookup<Region>> {
        Envelope::from_result("find_region", self.postal.find_region(postal_code).await)
    }

    pub async fn clients(&self) -> Envelope<Vec<ClientEntry>> {
        let result = self.clients.all().await.map(|c| c.as_ref().clone());
        Envelope::from_result("clients", result)
    }

    pub async fn find_client_by_document(&self, document: &str) -> Envelope<Lookup<ClientEntry>> {
        Envelope::from_result(
            "find_client_by_document",
            self.clients.find_by_document(document).await,
        )
    }

    pub async fn find_client_by_id(&self, id: &str) -> Envelope<Lookup<ClientEntry>> {
        Envelope::from_result("find_client_by_id", self.clients.find_by_id(id).await)
    }

    pub async fn catalog(&self) -> Envelope<Vec<CatalogItem>> {
        let result = self.catalog.all().await.map(|c| c.as_ref().clone());
        Envelope::from_result("catalog", result)
    }

    pub async fn find_item(&self, id: &str) -> Envelope<Lookup<CatalogItem>> {
        Envelope::from_result("find_item", self.catalog.find_by_id(id).await)
    }

    // ========================================================================
    // INVALIDATION
    // ========================================================================

    pub async fn invalidate_cache(&self, key: &str) -> Envelope<()> {
        Envelope::from_result("invalidate_cache", self.caches.invalidate(key).await)
    }

    pub async fn invalidate_schema(&self, table: &str) -> Envelope<()> {
        Envelope::from_result("invalidate_schema", self.store.invalidate_schema(table).await)
    }

    /// Invalidate `cache_key` after every successful mutation of `table`.
    pub fn invalidate_on_write(&self, table: &str, cache_key: &str) {
        self.store.invalidate_on_write(table, cache_key);
    }

    /// Drop the process-local mirror at the end of a request.
    pub fn end_invocation(&self) {
        self.caches.clear_local();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::cache::CLIENTS_CACHE_KEY;
    use crate::lock::StripedLock;
    use crate::shared_cache::InMemorySharedCache;
    use tabula_core::{record, ErrorCode};

    fn tabula() -> (Tabula, InMemoryBackend) {
        let backend = InMemoryBackend::new()
            .with_table(
                "Cadastro",
                &["ID", "Nome Completo", "CPF/CNPJ"],
                vec![vec![
                    CellValue::from("1"),
                    CellValue::from("Ana"),
                    CellValue::from("111.222.333-44"),
                ]],
            )
            .with_table("Config", &["Chave", "Valor"], vec![]);
        let tabula = Tabula::new(
            TabulaConfig::default(),
            Arc::new(backend.clone()),
            Arc::new(InMemorySharedCache::new()),
            Arc::new(StripedLock::new()),
        );
        (tabula, backend)
    }

    async fn authorize(tabula: &Tabula, action: &str, token_type: &str) -> Authorization {
        let issued = tabula.issue_token(token_type).await.into_data().unwrap();
        tabula.authorize(action, &issued.token).await.into_data().unwrap()
    }

    #[tokio::test]
    async fn test_issue_token_envelope_shape() {
        let (tabula, _) = tabula();
        let json = serde_json::to_value(tabula.issue_token("SYS").await).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["data"]["token_type"], "SESSION");
        assert_eq!(json["data"]["expires_in"], 1800);

        let json = serde_json::to_value(tabula.issue_token("ADMIN").await).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["error"]["code"], "INVALID_TOKEN_TYPE");
    }

    #[tokio::test]
    async fn test_authorize_uses_bound_token_type() {
        let (tabula, _) = tabula();
        let session = tabula.issue_token("SESSION").await.into_data().unwrap();

        let wrong = tabula.authorize("register_client", &session.token).await;
        assert_eq!(wrong.error_code(), Some(ErrorCode::TokenInvalid));

        let unknown = tabula.authorize("drop_tables", &session.token).await;
        assert_eq!(unknown.error_code(), Some(ErrorCode::UnknownAction));

        let ok = tabula.authorize("check_in", &session.token).await;
        assert_eq!(ok.data().map(|a| a.token_type()), Some(TokenType::Session));
    }

    #[tokio::test]
    async fn test_authorized_mutations() {
        let (tabula, backend) = tabula();
        let auth = authorize(&tabula, "register_client", "ONE_TIME").await;
        assert_eq!(auth.action(), "register_client");

        let id = tabula.generate_id(&auth, "CADASTRO").await.into_data().unwrap();
        assert_eq!(id, 1);

        let created = tabula
            .create(
                &auth,
                "Cadastro",
                &[record([("ID", "2"), ("Nome Completo", "Bia")])],
            )
            .await;
        assert_eq!(created.into_data(), Some(1));
        assert_eq!(backend.snapshot("Cadastro").unwrap().len(), 3);

        let missing = tabula.generate_id(&auth, "NOPE").await;
        assert_eq!(missing.error_code(), Some(ErrorCode::UnknownCounter));
    }

    #[tokio::test]
    async fn test_cache_is_stale_until_hooked() {
        let (tabula, _) = tabula();
        let auth = authorize(&tabula, "update_client", "SESSION").await;
        assert_eq!(tabula.clients().await.into_data().unwrap().len(), 1);

        tabula
            .create(&auth, "Cadastro", &[record([("ID", "2")])])
            .await;
        assert_eq!(tabula.clients().await.into_data().unwrap().len(), 1);

        tabula.invalidate_on_write("Cadastro", CLIENTS_CACHE_KEY);
        tabula
            .create(&auth, "Cadastro", &[record([("ID", "3")])])
            .await;
        assert_eq!(tabula.clients().await.into_data().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_read_failures_become_envelopes() {
        let (tabula, _) = tabula();
        let env = tabula.read("Vendas", "ID", "1").await;
        assert_eq!(env.error_code(), Some(ErrorCode::NotFoundTable));

        let env = tabula.find_client_by_document("11122233344").await;
        assert!(env.into_data().unwrap().is_found());
    }
}
