use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;

use crate::flags::flag_models::{
    GlobalSettingsRow, ScopeOverrideRecord, ScopeOverrideRow, ScopeType,
};

use super::{FlagPersistence, PersistenceError};

#[derive(Default)]
struct MemoryTables {
    settings: HashMap<String, GlobalSettingsRow>,
    scopes: HashMap<(String, ScopeType), ScopeOverrideRow>,
}

/// Process-local persistence. Clones share the same underlying tables, so a clone
/// handed to a second resolver behaves like a restart against the same database.
///
/// Rows are kept as JSON, the same shape the Postgres tables hold.
#[derive(Clone, Default)]
pub struct MemoryPersistence {
    tables: Arc<Mutex<MemoryTables>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTables> {
        match self.tables.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Stores a raw global value, bypassing encoding.
    pub fn insert_raw_global(&self, key: &str, value: serde_json::Value) {
        self.lock().settings.insert(
            key.to_owned(),
            GlobalSettingsRow {
                key: key.to_owned(),
                value,
                updated_at: Utc::now(),
            },
        );
    }

    /// Stores a raw scope row, bypassing encoding.
    pub fn insert_raw_scope(&self, scope_id: &str, scope_type: ScopeType, flags: serde_json::Value) {
        self.lock().scopes.insert(
            (scope_id.to_owned(), scope_type),
            ScopeOverrideRow {
                scope_id: scope_id.to_owned(),
                scope_type: scope_type.to_string(),
                flags,
                updated_at: Utc::now(),
            },
        );
    }

    pub fn global_value(&self, key: &str) -> Option<serde_json::Value> {
        self.lock().settings.get(key).map(|row| row.value.clone())
    }

    pub fn scope_flags(&self, scope_id: &str, scope_type: ScopeType) -> Option<serde_json::Value> {
        self.lock()
            .scopes
            .get(&(scope_id.to_owned(), scope_type))
            .map(|row| row.flags.clone())
    }
}

#[async_trait]
impl FlagPersistence for MemoryPersistence {
    async fn load_global(&self, key: &str) -> Result<Option<GlobalSettingsRow>, PersistenceError> {
        Ok(self.lock().settings.get(key).cloned())
    }

    async fn save_global(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), PersistenceError> {
        self.insert_raw_global(key, value);
        Ok(())
    }

    async fn load_scope(
        &self,
        scope_id: &str,
        scope_type: ScopeType,
    ) -> Result<Option<ScopeOverrideRow>, PersistenceError> {
        Ok(self
            .lock()
            .scopes
            .get(&(scope_id.to_owned(), scope_type))
            .cloned())
    }

    async fn upsert_scope(&self, record: &ScopeOverrideRecord) -> Result<(), PersistenceError> {
        let row = ScopeOverrideRow {
            scope_id: record.scope_id.clone(),
            scope_type: record.scope_type.to_string(),
            flags: serde_json::to_value(&record.flags)?,
            updated_at: record.updated_at,
        };
        self.lock()
            .scopes
            .insert((record.scope_id.clone(), record.scope_type), row);
        Ok(())
    }
}
