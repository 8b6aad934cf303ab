//! Postgres-backed refresh-token storage.
//!
//! The token lives in one row of `tokens(name TEXT PRIMARY KEY, value TEXT)`.
//! The pool connects lazily, so commands that never finalize never touch the
//! database.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};

use archive_upload_core::contract::CredentialStore;
use archive_upload_core::error::ShareError;

use crate::load_config::DatabaseSection;

pub struct PgTokenStore {
    pool: PgPool,
    key: String,
}

impl PgTokenStore {
    pub fn connect_lazy(db: &DatabaseSection, password: &str) -> Self {
        let options = PgConnectOptions::new()
            .host(&db.host)
            .port(db.port)
            .username(&db.user)
            .password(password)
            .database(&db.name);
        let pool = PgPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options);
        tracing::info!(host = %db.host, database = %db.name, key = %db.token_key, "Token store configured");
        Self {
            pool,
            key: db.token_key.clone(),
        }
    }
}

#[async_trait]
impl CredentialStore for PgTokenStore {
    async fn load_refresh_token(&self) -> Result<String, ShareError> {
        sqlx::query_scalar::<_, String>("SELECT value FROM tokens WHERE name = $1")
            .bind(&self.key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ShareError::Store(format!("load refresh token: {e}")))?
            .ok_or_else(|| ShareError::Store(format!("no token row named {:?}", self.key)))
    }

    async fn save_refresh_token(&self, token: &str) -> Result<(), ShareError> {
        let result = sqlx::query("UPDATE tokens SET value = $1 WHERE name = $2")
            .bind(token)
            .bind(&self.key)
            .execute(&self.pool)
            .await
            .map_err(|e| ShareError::Store(format!("save refresh token: {e}")))?;
        if result.rows_affected() != 1 {
            return Err(ShareError::Store(format!(
                "token row {:?} disappeared before update",
                self.key
            )));
        }
        Ok(())
    }
}
