use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{Feed, FeedWithOwner, StoreError};

const FEED_COLUMNS: &str =
    "id, name, url, user_id, created_at, updated_at, last_fetched_at";

impl Database {
    // ========================================================================
    // Feed Operations
    // ========================================================================

    /// Register a feed owned by `owner`. URLs are unique across all feeds.
    pub async fn create_feed(
        &self,
        name: &str,
        url: &str,
        owner: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Feed, StoreError> {
        sqlx::query_as::<_, Feed>(&format!(
            r#"
            INSERT INTO feeds (id, name, url, user_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING {FEED_COLUMNS}
        "#
        ))
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(url)
        .bind(owner)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, format!("feed '{}'", url)))
    }

    pub async fn get_feed(&self, feed_id: Uuid) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            "SELECT {FEED_COLUMNS} FROM feeds WHERE id = ?"
        ))
        .bind(feed_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// All feeds with the name of the user who added them, ordered by feed name
    pub async fn list_feeds(&self) -> Result<Vec<FeedWithOwner>, StoreError> {
        let feeds = sqlx::query_as::<_, FeedWithOwner>(
            r#"
            SELECT f.id, f.name, f.url, f.user_id, f.created_at, f.updated_at,
                   f.last_fetched_at, u.name AS owner_name
            FROM feeds f
            JOIN users u ON u.id = f.user_id
            ORDER BY f.name, f.created_at
        "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(feeds)
    }

    /// The stalest feed: never-fetched feeds first, then oldest
    /// `last_fetched_at`. Ties fall back to creation order.
    pub async fn next_feed_to_fetch(&self) -> Result<Option<Feed>, StoreError> {
        let feed = sqlx::query_as::<_, Feed>(&format!(
            r#"
            SELECT {FEED_COLUMNS}
            FROM feeds
            ORDER BY last_fetched_at ASC NULLS FIRST, created_at ASC, id ASC
            LIMIT 1
        "#
        ))
        .fetch_optional(&self.pool)
        .await?;
        Ok(feed)
    }

    /// Stamp a feed as fetched at `at`.
    pub async fn mark_feed_fetched(
        &self,
        feed_id: Uuid,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE feeds SET last_fetched_at = ?, updated_at = ? WHERE id = ?")
                .bind(at)
                .bind(at)
                .bind(feed_id)
                .execute(&self.pool)
                .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("feed {}", feed_id)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    async fn test_db() -> (Database, Uuid) {
        let db = Database::open(":memory:").await.unwrap();
        let user = db.create_user("owner", Utc::now()).await.unwrap();
        (db, user.id)
    }

    #[tokio::test]
    async fn test_create_feed_starts_unfetched() {
        let (db, owner) = test_db().await;
        let now = Utc::now();

        let feed = db
            .create_feed("Example", "https://example.com/rss", owner, now)
            .await
            .unwrap();
        assert_eq!(feed.name, "Example");
        assert_eq!(feed.owner_user_id, owner);
        assert_eq!(feed.created_at, now);
        assert!(feed.last_fetched_at.is_none());

        assert_eq!(db.get_feed(feed.id).await.unwrap(), Some(feed));
    }

    #[tokio::test]
    async fn test_duplicate_feed_url_is_conflict() {
        let (db, owner) = test_db().await;
        db.create_feed("A", "https://example.com/rss", owner, Utc::now())
            .await
            .unwrap();

        let err = db
            .create_feed("B", "https://example.com/rss", owner, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_feed_requires_existing_owner() {
        let (db, _) = test_db().await;
        let err = db
            .create_feed("A", "https://example.com/rss", Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Database(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_list_feeds_includes_owner_name() {
        let (db, owner) = test_db().await;
        db.create_feed("Zeta", "https://z.example.com/rss", owner, Utc::now())
            .await
            .unwrap();
        db.create_feed("Alpha", "https://a.example.com/rss", owner, Utc::now())
            .await
            .unwrap();

        let feeds = db.list_feeds().await.unwrap();
        assert_eq!(feeds.len(), 2);
        assert_eq!(feeds[0].feed.name, "Alpha");
        assert_eq!(feeds[1].feed.name, "Zeta");
        assert!(feeds.iter().all(|f| f.owner_name == "owner"));
    }

    #[tokio::test]
    async fn test_next_feed_empty_store() {
        let (db, _) = test_db().await;
        assert!(db.next_feed_to_fetch().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_next_feed_prefers_never_fetched() {
        let (db, owner) = test_db().await;
        let now = Utc::now();

        let older = db
            .create_feed("B", "https://b.example.com/rss", owner, now - Duration::hours(2))
            .await
            .unwrap();
        db.mark_feed_fetched(older.id, now - Duration::hours(1))
            .await
            .unwrap();
        let fresh = db
            .create_feed("A", "https://a.example.com/rss", owner, now)
            .await
            .unwrap();

        let next = db.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, fresh.id);

        db.mark_feed_fetched(fresh.id, now).await.unwrap();
        let next = db.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, older.id);
    }

    #[tokio::test]
    async fn test_next_feed_ties_use_creation_order() {
        let (db, owner) = test_db().await;
        let now = Utc::now();

        let first = db
            .create_feed("First", "https://1.example.com/rss", owner, now - Duration::minutes(5))
            .await
            .unwrap();
        db.create_feed("Second", "https://2.example.com/rss", owner, now)
            .await
            .unwrap();

        let next = db.next_feed_to_fetch().await.unwrap().unwrap();
        assert_eq!(next.id, first.id);
    }

    #[tokio::test]
    async fn test_mark_fetched_updates_timestamps() {
        let (db, owner) = test_db().await;
        let created = Utc::now() - Duration::days(1);
        let feed = db
            .create_feed("A", "https://a.example.com/rss", owner, created)
            .await
            .unwrap();

        let at = Utc::now();
        db.mark_feed_fetched(feed.id, at).await.unwrap();

        let feed = db.get_feed(feed.id).await.unwrap().unwrap();
        assert_eq!(feed.last_fetched_at, Some(at));
        assert_eq!(feed.updated_at, at);
        assert_eq!(feed.created_at, created);
    }

    #[tokio::test]
    async fn test_mark_fetched_unknown_feed() {
        let (db, _) = test_db().await;
        let err = db
            .mark_feed_fetched(Uuid::new_v4(), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)), "got {:?}", err);
    }
}
