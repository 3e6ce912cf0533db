//! Friendship Repository Implementation

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::user_repository::{escape_like, UserRow};
use crate::domain::{ordered_pair, FriendshipRepository, User};
use crate::shared::error::AppError;

#[derive(Clone)]
pub struct PgFriendshipRepository {
    pool: PgPool,
}

impl PgFriendshipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FriendshipRepository for PgFriendshipRepository {
    async fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool, AppError> {
        let (user1, user2) = ordered_pair(a, b);
        let exists: (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM friendships WHERE user1_id = $1 AND user2_id = $2)",
        )
        .bind(user1)
        .bind(user2)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists.0)
    }

    async fn find_friends(&self, user_id: Uuid) -> Result<Vec<User>, AppError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username, u.email, u.phone, u.password_hash, u.display_name,
                   u.avatar_url, u.about, u.is_active, u.last_seen_at, u.auth_provider,
                   u.provider_id, u.email_verified, u.created_at, u.updated_at
            FROM friendships f
            JOIN users u
              ON u.id = CASE WHEN f.user1_id = $1 THEN f.user2_id ELSE f.user1_id END
            WHERE f.user1_id = $1 OR f.user2_id = $1
            ORDER BY u.username
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_user()).collect())
    }

    async fn search_friends(&self, user_id: Uuid, query: String) -> Result<Vec<User>, AppError> {
        let pattern = format!("%{}%", escape_like(&query));

        let rows = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT u.id, u.username, u.email, u.phone, u.password_hash, u.display_name,
                   u.avatar_url, u.about, u.is_active, u.last_seen_at, u.auth_provider,
                   u.provider_id, u.email_verified, u.created_at, u.updated_at
            FROM friendships f
            JOIN users u
              ON u.id = CASE WHEN f.user1_id = $1 THEN f.user2_id ELSE f.user1_id END
            WHERE (f.user1_id = $1 OR f.user2_id = $1)
              AND (u.username ILIKE $2 OR u.display_name ILIKE $2)
            ORDER BY u.username
            "#,
        )
        .bind(user_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_user()).collect())
    }

    async fn count(&self, user_id: Uuid) -> Result<i64, AppError> {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM friendships WHERE user1_id = $1 OR user2_id = $1")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(count.0)
    }

    async fn delete(&self, a: Uuid, b: Uuid) -> Result<bool, AppError> {
        let (user1, user2) = ordered_pair(a, b);
        let result = sqlx::query("DELETE FROM friendships WHERE user1_id = $1 AND user2_id = $2")
            .bind(user1)
            .bind(user2)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
