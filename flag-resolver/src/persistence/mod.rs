pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use thiserror::Error;

use crate::flags::flag_models::{
    GlobalSettingsRow, ScopeOverrideRecord, ScopeOverrideRow, ScopeType,
};

pub use memory::MemoryPersistence;
pub use postgres::PostgresPersistence;

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("failed to encode or decode flags: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0} is not a valid scope type")]
    InvalidScopeType(String),
    #[error("persistence unavailable: {0}")]
    Unavailable(String),
}

/// Storage for the global flag snapshot and the per-scope override records.
///
/// Reads hand back raw rows; decoding is left to the caller so a corrupt value can be
/// told apart from an unreachable store.
#[async_trait]
pub trait FlagPersistence {
    async fn load_global(&self, key: &str) -> Result<Option<GlobalSettingsRow>, PersistenceError>;

    /// Upserts the snapshot stored under `key`.
    async fn save_global(&self, key: &str, value: serde_json::Value)
        -> Result<(), PersistenceError>;

    async fn load_scope(
        &self,
        scope_id: &str,
        scope_type: ScopeType,
    ) -> Result<Option<ScopeOverrideRow>, PersistenceError>;

    /// Inserts or replaces the whole record for `(scope_id, scope_type)`.
    async fn upsert_scope(&self, record: &ScopeOverrideRecord) -> Result<(), PersistenceError>;
}
