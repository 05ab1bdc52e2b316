use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::flags::flag_models::{
    GlobalSettingsRow, ScopeOverrideRecord, ScopeOverrideRow, ScopeType,
};

use super::{FlagPersistence, PersistenceError};

/// Flag persistence backed by two PostgreSQL tables, see `migrations/`.
#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PgPool,
}

impl PostgresPersistence {
    pub async fn new(
        url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self, PersistenceError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FlagPersistence for PostgresPersistence {
    async fn load_global(&self, key: &str) -> Result<Option<GlobalSettingsRow>, PersistenceError> {
        let row = sqlx::query_as::<_, GlobalSettingsRow>(
            r#"
SELECT key, value, updated_at
FROM feature_flag_settings
WHERE key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn save_global(
        &self,
        key: &str,
        value: serde_json::Value,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
INSERT INTO feature_flag_settings (key, value, updated_at)
VALUES ($1, $2, NOW())
ON CONFLICT (key) DO UPDATE
SET value = EXCLUDED.value, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_scope(
        &self,
        scope_id: &str,
        scope_type: ScopeType,
    ) -> Result<Option<ScopeOverrideRow>, PersistenceError> {
        let row = sqlx::query_as::<_, ScopeOverrideRow>(
            r#"
SELECT scope_id, scope_type, flags, updated_at
FROM feature_flag_scope_overrides
WHERE scope_id = $1 AND scope_type = $2
            "#,
        )
        .bind(scope_id)
        .bind(scope_type.as_str())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn upsert_scope(&self, record: &ScopeOverrideRecord) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
INSERT INTO feature_flag_scope_overrides (scope_id, scope_type, flags, updated_at)
VALUES ($1, $2, $3, $4)
ON CONFLICT (scope_id, scope_type) DO UPDATE
SET flags = EXCLUDED.flags, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(&record.scope_id)
        .bind(record.scope_type.as_str())
        .bind(sqlx::types::Json(&record.flags))
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
