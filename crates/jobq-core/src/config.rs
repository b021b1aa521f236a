//! Operator-tunable settings stored in the `config` table.
//!
//! Workers read these per job execution, so an update takes effect on the
//! next attempt without a restart.

use crate::QueueError;
use crate::store::SqliteStore;

fn default_for(key: &str) -> Option<&'static str> {
    match key {
        "max_retries" => Some("3"),
        "backoff_base" => Some("2"),
        _ => None,
    }
}

impl SqliteStore {
    /// Stored value, falling back to the built-in default, else `None`.
    pub async fn config_get(&self, key: &str) -> Result<Option<String>, QueueError> {
        let stored: Option<String> = sqlx::query_scalar("SELECT value FROM config WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(stored.or_else(|| default_for(key).map(str::to_string)))
    }

    /// Integer view of a setting; absent or unparsable values read as 0.
    pub async fn config_get_int(&self, key: &str) -> Result<i64, QueueError> {
        let value = self.config_get(key).await?;
        Ok(value.and_then(|v| v.trim().parse().ok()).unwrap_or(0))
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<(), QueueError> {
        sqlx::query(
            r#"
            INSERT INTO config (key, value) VALUES (?1, ?2)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value
            "#,
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
