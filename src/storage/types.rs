use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Error Types
// ============================================================================

/// Store-level failures other than the expected duplicate-post outcome.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A uniqueness constraint other than post URL was violated
    #[error("Already exists: {0}")]
    Conflict(String),

    /// The row an update targeted does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Table bootstrap failed
    #[error("Database schema setup failed: {0}")]
    Schema(String),

    /// Generic database error (connectivity, constraint, I/O)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map a sqlx error, turning unique violations into [`StoreError::Conflict`].
    pub(crate) fn from_sqlx(err: sqlx::Error, what: impl Into<String>) -> Self {
        if is_unique_violation(&err) {
            return StoreError::Conflict(what.into());
        }
        StoreError::Database(err)
    }
}

/// Outcome of a rejected [`create_post`](super::PostStore::create_post) call.
#[derive(Debug, Error)]
pub enum PostInsertError {
    /// A post with this URL was ingested before. Expected, not a failure.
    #[error("Post already ingested: {url}")]
    DuplicateUrl { url: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .is_some_and(|db_err| db_err.is_unique_violation())
}

// ============================================================================
// Data Structures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered RSS source.
///
/// `last_fetched_at` is written only by the ingestion cycle; `None` means the
/// feed has never been selected.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Feed {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    #[sqlx(rename = "user_id")]
    pub owner_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_fetched_at: Option<DateTime<Utc>>,
}

/// Feed listing row joined with the owner's name
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FeedWithOwner {
    #[sqlx(flatten)]
    pub feed: Feed,
    pub owner_name: String,
}

/// A single ingested feed item.
///
/// `url` is globally unique; that constraint is what makes re-ingesting a
/// feed idempotent.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct Post {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub title: String,
    pub url: String,
    pub description: Option<String>,
    pub published_at: DateTime<Utc>,
    pub feed_id: Uuid,
}
