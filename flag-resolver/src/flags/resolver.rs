use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::json;
use tokio::sync::{Mutex, OnceCell};

use crate::{
    api::errors::FlagError,
    definitions::{DefinitionCatalog, FlagDefinition, FlagGroup},
    flags::{
        flag_merge::{clear_override_flags, merge_flags, merge_scope_flags, merge_with_defaults},
        flag_models::{
            FlagStore, PartialFlagStore, PartialFlagValue, ResolvedFlag, ScopeOverrideRecord,
            ScopeType, FEATURE_FLAGS_SETTINGS_KEY,
        },
    },
    logging::{FlagLogger, TracingLogger},
    metrics_consts::{
        inc, GLOBAL_LOADS_COUNTER, OVERRIDES_CLEARED_COUNTER, SCOPE_LOADS_COUNTER,
        UNKNOWN_KEYS_ADMITTED_COUNTER, WRITES_COUNTER,
    },
    persistence::{FlagPersistence, PersistenceError},
};

#[derive(Debug, Clone, Default)]
struct ResolverState {
    flags: FlagStore,
    user_override_id: Option<String>,
    company_override_id: Option<String>,
}

enum ScopeFetch {
    Found(PartialFlagStore),
    Missing,
    Failed,
}

/// Resolves flags through catalog defaults, the global snapshot and at most one active
/// scope, where a user scope always wins over a company scope.
///
/// Construct one per process and share it by reference. Mutations are serialized and
/// follow persist-then-apply: memory only changes once the write has been stored.
/// Readers never wait on persistence.
pub struct FlagResolver {
    catalog: Arc<DefinitionCatalog>,
    persistence: Arc<dyn FlagPersistence + Send + Sync>,
    logger: Arc<dyn FlagLogger>,
    settings_key: String,
    state: RwLock<ResolverState>,
    write_lock: Mutex<()>,
    initialized: OnceCell<()>,
}

impl FlagResolver {
    pub fn new(
        catalog: Arc<DefinitionCatalog>,
        persistence: Arc<dyn FlagPersistence + Send + Sync>,
    ) -> Self {
        let state = ResolverState {
            flags: catalog.defaults(),
            ..Default::default()
        };

        Self {
            catalog,
            persistence,
            logger: Arc::new(TracingLogger),
            settings_key: FEATURE_FLAGS_SETTINGS_KEY.to_string(),
            state: RwLock::new(state),
            write_lock: Mutex::new(()),
            initialized: OnceCell::new(),
        }
    }

    pub fn with_logger(mut self, logger: Arc<dyn FlagLogger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_settings_key(mut self, settings_key: impl Into<String>) -> Self {
        self.settings_key = settings_key.into();
        self
    }

    pub fn catalog(&self) -> &DefinitionCatalog {
        &self.catalog
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.initialized()
    }

    /// The scope currently applied to the store, user first.
    pub fn active_scope(&self) -> Option<(ScopeType, String)> {
        let state = self.read_state();
        match (&state.user_override_id, &state.company_override_id) {
            (Some(user_id), _) => Some((ScopeType::User, user_id.clone())),
            (None, Some(company_id)) => Some((ScopeType::Company, company_id.clone())),
            (None, None) => None,
        }
    }

    pub fn get_feature_flags(&self) -> FlagStore {
        self.read_state().flags.clone()
    }

    pub fn get_feature_flag(&self, key: &str) -> Option<ResolvedFlag> {
        self.read_state().flags.get(key).copied()
    }

    pub fn is_enabled(&self, key: &str) -> bool {
        self.get_feature_flag(key).is_some_and(|flag| flag.enabled)
    }

    /// A disabled flag is never visible, whatever its stored `visible` field says.
    pub fn is_visible(&self, key: &str) -> bool {
        self.get_feature_flag(key)
            .is_some_and(|flag| flag.enabled && flag.visible)
    }

    pub fn get_all_definitions(&self) -> &[FlagDefinition] {
        self.catalog.get_all_definitions()
    }

    pub fn get_grouped_definitions(&self) -> Vec<FlagGroup> {
        self.catalog.get_grouped_definitions()
    }

    /// Loads the global snapshot once. Concurrent callers share the same load, and
    /// later calls return the current store without touching persistence.
    pub async fn load_feature_flags(&self) -> FlagStore {
        self.initialized
            .get_or_init(|| self.load_global_snapshot())
            .await;
        self.get_feature_flags()
    }

    async fn load_global_snapshot(&self) {
        let _guard = self.write_lock.lock().await;
        let metadata = json!({ "key": self.settings_key });

        let row = match self.persistence.load_global(&self.settings_key).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                self.logger
                    .log_warn("no persisted feature flags, using defaults", &metadata);
                inc(GLOBAL_LOADS_COUNTER, &outcome_labels("missing"), 1);
                return;
            }
            Err(e) => {
                self.logger.log_warn(
                    "failed to load feature flags, using defaults",
                    &json!({ "key": self.settings_key, "error": e.to_string() }),
                );
                inc(GLOBAL_LOADS_COUNTER, &outcome_labels("read_failed"), 1);
                return;
            }
        };

        let persisted = match row.decode() {
            Ok(persisted) => persisted,
            Err(e) => {
                self.logger.log_error(
                    "failed to decode persisted feature flags, using defaults",
                    &json!({ "key": self.settings_key, "error": e.to_string() }),
                );
                inc(GLOBAL_LOADS_COUNTER, &outcome_labels("decode_failed"), 1);
                return;
            }
        };

        let mut state = self.snapshot();
        state.flags = merge_with_defaults(&self.catalog, &persisted);
        self.commit(state);

        self.warn_unknown_keys(&persisted, "global");
        inc(GLOBAL_LOADS_COUNTER, &outcome_labels("loaded"), 1);
        self.logger.log_info(
            "loaded feature flags",
            &json!({ "key": self.settings_key, "flags": persisted.len() }),
        );
    }

    pub async fn load_user_overrides(&self, user_id: &str) {
        if user_id.is_empty() {
            return;
        }
        let _guard = self.write_lock.lock().await;

        let overrides = match self.fetch_scope(user_id, ScopeType::User).await {
            ScopeFetch::Found(overrides) => overrides,
            ScopeFetch::Missing => PartialFlagStore::new(),
            ScopeFetch::Failed => return,
        };

        self.apply_scope(ScopeType::User, user_id, &overrides);
    }

    /// Skipped entirely while a user override is active.
    pub async fn load_company_overrides(&self, company_id: &str) {
        if company_id.is_empty() {
            return;
        }
        let _guard = self.write_lock.lock().await;

        let user_override_id = self.read_state().user_override_id.clone();
        if let Some(user_id) = user_override_id {
            self.logger.log_info(
                "user override active, skipping company overrides",
                &json!({ "company_id": company_id, "user_id": user_id }),
            );
            return;
        }

        let overrides = match self.fetch_scope(company_id, ScopeType::Company).await {
            ScopeFetch::Found(overrides) => overrides,
            ScopeFetch::Missing => PartialFlagStore::new(),
            ScopeFetch::Failed => return,
        };

        self.apply_scope(ScopeType::Company, company_id, &overrides);
    }

    /// Stores the user record, then applies it over whatever is active.
    pub async fn save_user_override(
        &self,
        user_id: &str,
        overrides: PartialFlagStore,
    ) -> Result<(), FlagError> {
        if user_id.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;

        let record = ScopeOverrideRecord::new(user_id, ScopeType::User, overrides);
        self.persist_scope(&record).await?;

        self.apply_scope(ScopeType::User, user_id, &record.flags);
        Ok(())
    }

    /// Stores the company record. It only reaches the store when no user override is
    /// active; otherwise it waits in persistence until overrides are cleared and the
    /// company scope is loaded again.
    pub async fn save_company_override(
        &self,
        company_id: &str,
        overrides: PartialFlagStore,
    ) -> Result<(), FlagError> {
        if company_id.is_empty() {
            return Ok(());
        }
        let _guard = self.write_lock.lock().await;

        let record = ScopeOverrideRecord::new(company_id, ScopeType::Company, overrides);
        self.persist_scope(&record).await?;

        let user_override_id = self.read_state().user_override_id.clone();
        if let Some(user_id) = user_override_id {
            self.logger.log_info(
                "company override saved but not applied, user override active",
                &json!({ "company_id": company_id, "user_id": user_id }),
            );
            return Ok(());
        }

        self.apply_scope(ScopeType::Company, company_id, &record.flags);
        Ok(())
    }

    /// Resets every overridden flag to its catalog default and forgets the active scopes.
    /// Persisted scope records are left as they are.
    pub async fn clear_overrides(&self) {
        let _guard = self.write_lock.lock().await;

        let mut state = self.snapshot();
        if state.user_override_id.is_none() && state.company_override_id.is_none() {
            return;
        }

        let cleared = state.flags.values().filter(|f| f.is_override).count();
        let metadata = json!({
            "user_id": state.user_override_id,
            "company_id": state.company_override_id,
            "flags": cleared,
        });

        state.flags = clear_override_flags(&self.catalog, &state.flags);
        state.user_override_id = None;
        state.company_override_id = None;
        self.commit(state);

        inc(OVERRIDES_CLEARED_COUNTER, &[], cleared as u64);
        self.logger.log_info("cleared overrides", &metadata);
    }

    /// Local only, nothing is persisted until a later save.
    pub async fn set_feature_flag(&self, key: &str, value: PartialFlagValue) {
        let _guard = self.write_lock.lock().await;

        let partial = PartialFlagStore::from([(key.to_owned(), value)]);
        let mut state = self.snapshot();
        state.flags = merge_flags(&state.flags, &partial);
        self.commit(state);

        self.warn_unknown_keys(&partial, "local");
    }

    /// Merges `flags` into the store and persists the whole result as the global snapshot.
    pub async fn save_feature_flags(&self, flags: PartialFlagStore) -> Result<(), FlagError> {
        let _guard = self.write_lock.lock().await;

        let mut state = self.snapshot();
        state.flags = merge_flags(&state.flags, &flags);
        self.persist_global(&state.flags, "save_feature_flags")
            .await?;
        self.commit(state);

        self.warn_unknown_keys(&flags, "global");
        Ok(())
    }

    /// Replaces the store with catalog defaults and persists them as the new global
    /// snapshot.
    pub async fn reset_to_defaults(&self) -> Result<(), FlagError> {
        let _guard = self.write_lock.lock().await;

        let state = ResolverState {
            flags: self.catalog.defaults(),
            ..Default::default()
        };
        self.persist_global(&state.flags, "reset_to_defaults")
            .await?;
        self.commit(state);

        self.logger.log_info(
            "reset feature flags to defaults",
            &json!({ "key": self.settings_key }),
        );
        Ok(())
    }

    async fn fetch_scope(&self, scope_id: &str, scope_type: ScopeType) -> ScopeFetch {
        let labels = |outcome: &str| {
            vec![
                ("scope".to_string(), scope_type.to_string()),
                ("outcome".to_string(), outcome.to_string()),
            ]
        };

        match self.persistence.load_scope(scope_id, scope_type).await {
            Ok(None) => {
                inc(SCOPE_LOADS_COUNTER, &labels("missing"), 1);
                ScopeFetch::Missing
            }
            Ok(Some(row)) => match ScopeOverrideRecord::try_from(row) {
                Ok(record) => {
                    inc(SCOPE_LOADS_COUNTER, &labels("loaded"), 1);
                    ScopeFetch::Found(record.flags)
                }
                Err(e) => {
                    self.logger.log_error(
                        "failed to decode scope overrides",
                        &json!({
                            "scope": scope_type,
                            "scope_id": scope_id,
                            "error": e.to_string(),
                        }),
                    );
                    inc(SCOPE_LOADS_COUNTER, &labels("decode_failed"), 1);
                    ScopeFetch::Failed
                }
            },
            Err(e) => {
                self.logger.log_warn(
                    "failed to load scope overrides",
                    &json!({
                        "scope": scope_type,
                        "scope_id": scope_id,
                        "error": e.to_string(),
                    }),
                );
                inc(SCOPE_LOADS_COUNTER, &labels("read_failed"), 1);
                ScopeFetch::Failed
            }
        }
    }

    // Callers must hold the write lock.
    fn apply_scope(&self, scope_type: ScopeType, scope_id: &str, overrides: &PartialFlagStore) {
        let mut state = self.snapshot();
        state.flags = merge_scope_flags(&state.flags, overrides);
        match scope_type {
            ScopeType::User => state.user_override_id = Some(scope_id.to_owned()),
            ScopeType::Company => state.company_override_id = Some(scope_id.to_owned()),
        }
        self.commit(state);

        self.warn_unknown_keys(overrides, scope_type.as_str());
        self.logger.log_info(
            "applied scope overrides",
            &json!({
                "scope": scope_type,
                "scope_id": scope_id,
                "flags": overrides.len(),
            }),
        );
    }

    async fn persist_scope(&self, record: &ScopeOverrideRecord) -> Result<(), FlagError> {
        let operation = match record.scope_type {
            ScopeType::User => "save_user_override",
            ScopeType::Company => "save_company_override",
        };

        match self.persistence.upsert_scope(record).await {
            Ok(()) => {
                inc(WRITES_COUNTER, &write_labels(operation, "ok"), 1);
                Ok(())
            }
            Err(e) => {
                self.logger.log_error(
                    "failed to save scope overrides",
                    &json!({
                        "scope": record.scope_type,
                        "scope_id": record.scope_id,
                        "error": e.to_string(),
                    }),
                );
                inc(WRITES_COUNTER, &write_labels(operation, "failed"), 1);
                Err(e.into())
            }
        }
    }

    async fn persist_global(&self, flags: &FlagStore, operation: &str) -> Result<(), FlagError> {
        let result = match serde_json::to_value(flags) {
            Ok(value) => self.persistence.save_global(&self.settings_key, value).await,
            Err(e) => Err(PersistenceError::from(e)),
        };

        match result {
            Ok(()) => {
                inc(WRITES_COUNTER, &write_labels(operation, "ok"), 1);
                Ok(())
            }
            Err(e) => {
                self.logger.log_error(
                    "failed to save feature flags",
                    &json!({ "key": self.settings_key, "error": e.to_string() }),
                );
                inc(WRITES_COUNTER, &write_labels(operation, "failed"), 1);
                Err(e.into())
            }
        }
    }

    fn warn_unknown_keys(&self, partial: &PartialFlagStore, source: &str) {
        let unknown = self.catalog.unknown_keys(partial.keys());
        if unknown.is_empty() {
            return;
        }

        inc(
            UNKNOWN_KEYS_ADMITTED_COUNTER,
            &[("source".to_string(), source.to_string())],
            unknown.len() as u64,
        );
        self.logger.log_warn(
            "admitted flags with no definition",
            &json!({ "source": source, "keys": unknown }),
        );
    }

    fn read_state(&self) -> RwLockReadGuard<'_, ResolverState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, ResolverState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self) -> ResolverState {
        self.read_state().clone()
    }

    fn commit(&self, state: ResolverState) {
        *self.write_state() = state;
    }
}

fn outcome_labels(outcome: &str) -> Vec<(String, String)> {
    vec![("outcome".to_string(), outcome.to_string())]
}

fn write_labels(operation: &str, outcome: &str) -> Vec<(String, String)> {
    vec![
        ("operation".to_string(), operation.to_string()),
        ("outcome".to_string(), outcome.to_string()),
    ]
}
