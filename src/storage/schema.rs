use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use std::str::FromStr;
use std::time::Duration;

use super::types::StoreError;

// ============================================================================
// Database
// ============================================================================

/// Handle to the SQLite store backing users, feeds and posts.
///
/// Cloning is cheap (the pool is reference counted). `Database` implements
/// both [`FeedStore`](super::FeedStore) and [`PostStore`](super::PostStore).
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Open a database by file path (`":memory:"` for an in-memory store) and
    /// bootstrap the tables.
    pub async fn open(path: &str) -> Result<Self, StoreError> {
        Self::connect(&format!("sqlite:{}?mode=rwc", path)).await
    }

    /// Open a database from a `sqlite:` connection URL.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        // busy_timeout=5000: wait up to 5 seconds for another writer (e.g. a
        // second aggregator process) before returning SQLITE_BUSY.
        let options = SqliteConnectOptions::from_str(url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .pragma("busy_timeout", "5000");
        // An in-memory database lives and dies with its connections; one
        // connection keeps every query on the same data.
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.ensure_schema()
            .await
            .map_err(|e| StoreError::Schema(e.to_string()))?;
        tracing::debug!(url = %redact_url(url), "Database ready");
        Ok(db)
    }

    /// Create tables and indexes that do not exist yet.
    ///
    /// Statements run in one transaction and are idempotent, so reopening an
    /// existing database is a no-op.
    async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id BLOB PRIMARY KEY,
                name TEXT UNIQUE NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS feeds (
                id BLOB PRIMARY KEY,
                name TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                user_id BLOB NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                last_fetched_at TEXT
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS posts (
                id BLOB PRIMARY KEY,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                title TEXT NOT NULL,
                url TEXT UNIQUE NOT NULL,
                description TEXT,
                published_at TEXT NOT NULL,
                feed_id BLOB NOT NULL REFERENCES feeds(id) ON DELETE CASCADE
            )
        "#,
        )
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_feeds_last_fetched ON feeds(last_fetched_at)",
        )
        .execute(&mut *tx)
        .await?;
        sqlx::query("CREATE INDEX IF NOT EXISTS idx_posts_feed ON posts(feed_id)")
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_posts_published ON posts(published_at DESC)",
        )
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }
}

/// Strip query parameters (which may carry credentials) before logging a URL.
fn redact_url(url: &str) -> &str {
    url.split_once('?').map_or(url, |(base, _)| base)
}
