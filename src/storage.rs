//! SQLite storage layer for clipsight.
//!
//! One [`Storage`] type backs two concerns:
//!
//! - the cache ([`CacheBackend`]): keyed values with an absolute expiry,
//!   bounded lists for snapshot history and windowed counters
//! - the credential store ([`CredentialStore`]): per-user platform API keys
//!
//! Expiry is stored as Unix milliseconds and checked on read, so expired rows
//! are invisible before [`Storage::purge_expired`] physically removes them.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::cache::{CacheBackend, WindowCount};
use crate::credentials::{CredentialStore, StoredCredential};
use crate::platform::Platform;

/// Database connection pool wrapper.
#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

fn expiry_after(ttl: Duration) -> i64 {
    now_millis().saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
}

impl Storage {
    /// Create a new storage instance and initialize the schema.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite:clipsight.db?mode=rwc" or "sqlite::memory:")
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let storage = Self { pool };
        storage.initialize_schema().await?;

        Ok(storage)
    }

    /// Create the database schema if it doesn't exist.
    async fn initialize_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_list_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                list_key TEXT NOT NULL,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_cache_list_items_key_id
            ON cache_list_items(list_key, id)
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS cache_list_expiry (
                list_key TEXT PRIMARY KEY,
                expires_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS user_api_keys (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id TEXT NOT NULL,
                platform TEXT NOT NULL,
                api_key TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                last_used_at INTEGER,
                created_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Lookups are always by user and platform
        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_user_api_keys_user_platform
            ON user_api_keys(user_id, platform)
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Physically remove expired cache rows.
    ///
    /// # Returns
    ///
    /// Number of rows removed across values and lists.
    pub async fn purge_expired(&self) -> anyhow::Result<u64> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let entries = sqlx::query("DELETE FROM cache_entries WHERE expires_at <= ?")
            .bind(now)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let items = sqlx::query(
            r#"
            DELETE FROM cache_list_items
            WHERE list_key IN (
                SELECT list_key FROM cache_list_expiry WHERE expires_at <= ?
            )
            "#,
        )
        .bind(now)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM cache_list_expiry WHERE expires_at <= ?")
            .bind(now)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(entries + items)
    }

    /// Store a user's API key for a platform. New keys are active.
    ///
    /// # Returns
    ///
    /// The id of the new credential row.
    pub async fn insert_credential(
        &self,
        user_id: &str,
        platform: Platform,
        api_key: &str,
    ) -> anyhow::Result<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO user_api_keys (user_id, platform, api_key, is_active, created_at)
            VALUES (?, ?, ?, 1, ?)
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str().to_lowercase())
        .bind(api_key)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Activate or deactivate a stored credential.
    ///
    /// # Returns
    ///
    /// Whether a credential with this id exists.
    pub async fn set_credential_active(&self, id: i64, active: bool) -> anyhow::Result<bool> {
        let result = sqlx::query("UPDATE user_api_keys SET is_active = ? WHERE id = ?")
            .bind(active)
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// When a credential was last used for a fetch, if ever.
    pub async fn last_used_at(&self, id: i64) -> anyhow::Result<Option<DateTime<Utc>>> {
        let row = sqlx::query("SELECT last_used_at FROM user_api_keys WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let millis: Option<i64> = row.and_then(|r| r.get("last_used_at"));
        Ok(millis.and_then(DateTime::from_timestamp_millis))
    }
}

#[async_trait]
impl CacheBackend for Storage {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM cache_entries WHERE key = ? AND expires_at > ?")
            .bind(key)
            .bind(now_millis())
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| r.get("value")))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(expiry_after(ttl))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> anyhow::Result<bool> {
        let mut tx = self.pool.begin().await?;

        let entries = sqlx::query("DELETE FROM cache_entries WHERE key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        let items = sqlx::query("DELETE FROM cache_list_items WHERE list_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM cache_list_expiry WHERE list_key = ?")
            .bind(key)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(entries + items > 0)
    }

    async fn push_front(
        &self,
        key: &str,
        value: &str,
        max_len: usize,
        ttl: Duration,
    ) -> anyhow::Result<()> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        // An expired list starts over rather than being extended
        sqlx::query(
            r#"
            DELETE FROM cache_list_items
            WHERE list_key = ?
              AND EXISTS (
                SELECT 1 FROM cache_list_expiry
                WHERE list_key = ? AND expires_at <= ?
              )
            "#,
        )
        .bind(key)
        .bind(key)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        sqlx::query("INSERT INTO cache_list_items (list_key, value) VALUES (?, ?)")
            .bind(key)
            .bind(value)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            DELETE FROM cache_list_items
            WHERE list_key = ?
              AND id NOT IN (
                SELECT id FROM cache_list_items
                WHERE list_key = ?
                ORDER BY id DESC
                LIMIT ?
              )
            "#,
        )
        .bind(key)
        .bind(key)
        .bind(i64::try_from(max_len).unwrap_or(i64::MAX))
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO cache_list_expiry (list_key, expires_at)
            VALUES (?, ?)
            ON CONFLICT(list_key) DO UPDATE SET expires_at = excluded.expires_at
            "#,
        )
        .bind(key)
        .bind(expiry_after(ttl))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(())
    }

    async fn range(&self, key: &str, count: usize) -> anyhow::Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT i.value
            FROM cache_list_items i
            JOIN cache_list_expiry e ON e.list_key = i.list_key
            WHERE i.list_key = ? AND e.expires_at > ?
            ORDER BY i.id DESC
            LIMIT ?
            "#,
        )
        .bind(key)
        .bind(now_millis())
        .bind(i64::try_from(count).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|r| r.get("value")).collect())
    }

    async fn increment(&self, key: &str, window: Duration) -> anyhow::Result<WindowCount> {
        let now = now_millis();

        // SET expressions see the row as it was before the update
        let row = sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, expires_at)
            VALUES (?, '1', ?)
            ON CONFLICT(key) DO UPDATE SET
                value = CASE
                    WHEN expires_at > ? THEN CAST(CAST(value AS INTEGER) + 1 AS TEXT)
                    ELSE '1'
                END,
                expires_at = CASE
                    WHEN expires_at > ? THEN expires_at
                    ELSE excluded.expires_at
                END
            RETURNING value, expires_at
            "#,
        )
        .bind(key)
        .bind(expiry_after(window))
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await?;

        let value: String = row.get("value");
        let expires_at: i64 = row.get("expires_at");
        let remaining = u64::try_from(expires_at.saturating_sub(now)).unwrap_or(0);

        Ok(WindowCount {
            count: value.parse()?,
            resets_in: Duration::from_millis(remaining),
        })
    }

    async fn purge_expired(&self) -> anyhow::Result<u64> {
        Storage::purge_expired(self).await
    }
}

#[async_trait]
impl CredentialStore for Storage {
    async fn find_active(
        &self,
        user_id: &str,
        platform: Platform,
    ) -> anyhow::Result<Option<StoredCredential>> {
        let row = sqlx::query(
            r#"
            SELECT id, api_key
            FROM user_api_keys
            WHERE user_id = ? AND platform = ? AND is_active = 1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(user_id)
        .bind(platform.as_str().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| StoredCredential {
            id: r.get("id"),
            api_key: r.get("api_key"),
        }))
    }

    async fn mark_used(&self, id: i64) -> anyhow::Result<()> {
        sqlx::query("UPDATE user_api_keys SET last_used_at = ? WHERE id = ?")
            .bind(now_millis())
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
