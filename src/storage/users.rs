use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::schema::Database;
use super::types::{StoreError, User};

impl Database {
    // ========================================================================
    // User Operations
    // ========================================================================

    /// Register a new user. Names are unique.
    pub async fn create_user(&self, name: &str, now: DateTime<Utc>) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, name, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            RETURNING id, name, created_at, updated_at
        "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StoreError::from_sqlx(e, format!("user '{}'", name)))
    }

    pub async fn get_user_by_name(&self, name: &str) -> Result<Option<User>, StoreError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    /// All users ordered by name
    pub async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let users = sqlx::query_as::<_, User>(
            "SELECT id, name, created_at, updated_at FROM users ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(users)
    }

    /// Delete every user. Feeds and posts go with them (ON DELETE CASCADE).
    ///
    /// Returns the number of users removed.
    pub async fn reset_users(&self) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM users").execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}
