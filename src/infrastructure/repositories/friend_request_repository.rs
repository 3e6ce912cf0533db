//! Friend Request Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{FriendRequest, FriendRequestRepository, Friendship, RequestStatus};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct FriendRequestRow {
    id: Uuid,
    sender_id: Uuid,
    receiver_id: Uuid,
    status: String,
    message: Option<String>,
    created_at: DateTime<Utc>,
    responded_at: Option<DateTime<Utc>>,
}

impl FriendRequestRow {
    fn into_request(self) -> FriendRequest {
        FriendRequest {
            id: self.id,
            sender_id: self.sender_id,
            receiver_id: self.receiver_id,
            status: RequestStatus::from_str(&self.status).unwrap_or_default(),
            message: self.message,
            created_at: self.created_at,
            responded_at: self.responded_at,
        }
    }
}

#[derive(Clone)]
pub struct PgFriendRequestRepository {
    pool: PgPool,
}

impl PgFriendRequestRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl FriendRequestRepository for PgFriendRequestRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FriendRequest>, AppError> {
        let row = sqlx::query_as::<_, FriendRequestRow>(
            r#"
            SELECT id, sender_id, receiver_id, status, message, created_at, responded_at
            FROM friend_requests
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_request()))
    }

    async fn find_pending_between(&self, a: Uuid, b: Uuid) -> Result<Option<FriendRequest>, AppError> {
        let row = sqlx::query_as::<_, FriendRequestRow>(
            r#"
            SELECT id, sender_id, receiver_id, status, message, created_at, responded_at
            FROM friend_requests
            WHERE LEAST(sender_id, receiver_id) = LEAST($1::UUID, $2::UUID)
              AND GREATEST(sender_id, receiver_id) = GREATEST($1::UUID, $2::UUID)
              AND status = 'pending'
            "#,
        )
        .bind(a)
        .bind(b)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_request()))
    }

    async fn create(&self, request: &FriendRequest) -> Result<FriendRequest, AppError> {
        // A closed request for the same pair is re-opened in place; a pending
        // one makes the upsert return nothing.
        let row = sqlx::query_as::<_, FriendRequestRow>(
            r#"
            INSERT INTO friend_requests (id, sender_id, receiver_id, status, message, created_at)
            VALUES ($1, $2, $3, 'pending', $4, $5)
            ON CONFLICT ((LEAST(sender_id, receiver_id)), (GREATEST(sender_id, receiver_id)))
            DO UPDATE SET sender_id = EXCLUDED.sender_id,
                          receiver_id = EXCLUDED.receiver_id,
                          status = 'pending',
                          message = EXCLUDED.message,
                          created_at = EXCLUDED.created_at,
                          responded_at = NULL
            WHERE friend_requests.status <> 'pending'
            RETURNING id, sender_id, receiver_id, status, message, created_at, responded_at
            "#,
        )
        .bind(request.id)
        .bind(request.sender_id)
        .bind(request.receiver_id)
        .bind(&request.message)
        .bind(request.created_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Conflict("A pending friend request already exists".into()))?;

        Ok(row.into_request())
    }

    async fn list_sent(&self, user_id: Uuid) -> Result<Vec<FriendRequest>, AppError> {
        let rows = sqlx::query_as::<_, FriendRequestRow>(
            r#"
            SELECT id, sender_id, receiver_id, status, message, created_at, responded_at
            FROM friend_requests
            WHERE sender_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_request()).collect())
    }

    async fn list_received(&self, user_id: Uuid) -> Result<Vec<FriendRequest>, AppError> {
        let rows = sqlx::query_as::<_, FriendRequestRow>(
            r#"
            SELECT id, sender_id, receiver_id, status, message, created_at, responded_at
            FROM friend_requests
            WHERE receiver_id = $1 AND status = 'pending'
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_request()).collect())
    }

    async fn accept(&self, id: Uuid) -> Result<(FriendRequest, Friendship), AppError> {
        let mut tx = self.pool.begin().await?;

        let request = sqlx::query_as::<_, FriendRequestRow>(
            r#"
            UPDATE friend_requests
            SET status = 'accepted', responded_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING id, sender_id, receiver_id, status, message, created_at, responded_at
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::Conflict("Friend request is no longer pending".into()))?
        .into_request();

        let friendship = Friendship::new(request.sender_id, request.receiver_id);
        sqlx::query(
            r#"
            INSERT INTO friendships (id, user1_id, user2_id, created_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(friendship.id)
        .bind(friendship.user1_id)
        .bind(friendship.user2_id)
        .bind(friendship.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| AppError::from_unique(e, "Users are already friends"))?;

        tx.commit().await?;
        Ok((request, friendship))
    }

    async fn close(&self, id: Uuid, status: RequestStatus) -> Result<FriendRequest, AppError> {
        let row = sqlx::query_as::<_, FriendRequestRow>(
            r#"
            UPDATE friend_requests
            SET status = $2, responded_at = NOW()
            WHERE id = $1 AND status = 'pending'
            RETURNING id, sender_id, receiver_id, status, message, created_at, responded_at
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Conflict("Friend request is no longer pending".into()))?;

        Ok(row.into_request())
    }

    async fn count_pending_received(&self, user_id: Uuid) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM friend_requests WHERE receiver_id = $1 AND status = 'pending'",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}
