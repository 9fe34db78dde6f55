use uuid::Uuid;

use super::schema::Database;
use super::types::{is_unique_violation, Post, PostInsertError, StoreError};

const POST_COLUMNS: &str =
    "id, created_at, updated_at, title, url, description, published_at, feed_id";

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post, relying on `UNIQUE(url)` for deduplication.
    ///
    /// No existence check is made beforehand, so two writers racing on the
    /// same URL still produce a single row; the loser gets
    /// [`PostInsertError::DuplicateUrl`].
    pub async fn insert_post(&self, post: &Post) -> Result<Post, PostInsertError> {
        sqlx::query_as::<_, Post>(&format!(
            r#"
            INSERT INTO posts ({POST_COLUMNS})
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING {POST_COLUMNS}
        "#
        ))
        .bind(post.id)
        .bind(post.created_at)
        .bind(post.updated_at)
        .bind(&post.title)
        .bind(&post.url)
        .bind(&post.description)
        .bind(post.published_at)
        .bind(post.feed_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                PostInsertError::DuplicateUrl {
                    url: post.url.clone(),
                }
            } else {
                PostInsertError::Store(StoreError::Database(e))
            }
        })
    }

    /// Posts of one feed, newest publication first
    pub async fn posts_for_feed(&self, feed_id: Uuid) -> Result<Vec<Post>, StoreError> {
        let posts = sqlx::query_as::<_, Post>(&format!(
            r#"
            SELECT {POST_COLUMNS}
            FROM posts
            WHERE feed_id = ?
            ORDER BY published_at DESC, created_at DESC
        "#
        ))
        .bind(feed_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(posts)
    }

    pub async fn count_posts(&self) -> Result<i64, StoreError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
