use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{Feed, Post, PostInsertError, StoreError};

/// Feed bookkeeping consumed by the ingestion cycle.
#[async_trait]
pub trait FeedStore: Send + Sync {
    /// The feed with the oldest (or no) `last_fetched_at`, or `None` when no
    /// feeds are registered.
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError>;

    /// Set `last_fetched_at` of the feed to `at`.
    async fn mark_fetched(&self, feed_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// Post persistence consumed by the ingestion cycle.
#[async_trait]
pub trait PostStore: Send + Sync {
    /// Persist a post. A post whose URL is already stored yields
    /// [`PostInsertError::DuplicateUrl`].
    async fn create_post(&self, post: &Post) -> Result<Post, PostInsertError>;
}

#[async_trait]
impl FeedStore for Database {
    async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        Database::next_feed_to_fetch(self).await
    }

    async fn mark_fetched(&self, feed_id: Uuid, at: DateTime<Utc>) -> Result<(), StoreError> {
        self.mark_feed_fetched(feed_id, at).await
    }
}

#[async_trait]
impl PostStore for Database {
    async fn create_post(&self, post: &Post) -> Result<Post, PostInsertError> {
        self.insert_post(post).await
    }
}
