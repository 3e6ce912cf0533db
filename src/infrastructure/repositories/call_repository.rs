//! Call Repository Implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domain::{Call, CallParticipant, CallRepository, CallStatus, CallType};
use crate::shared::error::AppError;
use crate::shared::pagination::PageRequest;

#[derive(Debug, sqlx::FromRow)]
struct CallRow {
    id: Uuid,
    conversation_id: Uuid,
    initiator_id: Uuid,
    #[sqlx(rename = "type")]
    call_type: String,
    status: String,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl CallRow {
    fn into_call(self) -> Call {
        Call {
            id: self.id,
            conversation_id: self.conversation_id,
            initiator_id: self.initiator_id,
            call_type: CallType::from_str(&self.call_type).unwrap_or_default(),
            status: CallStatus::from_str(&self.status).unwrap_or(CallStatus::Failed),
            started_at: self.started_at,
            ended_at: self.ended_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ParticipantRow {
    call_id: Uuid,
    user_id: Uuid,
    joined_at: DateTime<Utc>,
    left_at: Option<DateTime<Utc>>,
    rtc_session_id: Option<String>,
}

impl ParticipantRow {
    fn into_participant(self) -> CallParticipant {
        CallParticipant {
            call_id: self.call_id,
            user_id: self.user_id,
            joined_at: self.joined_at,
            left_at: self.left_at,
            rtc_session_id: self.rtc_session_id,
        }
    }
}

#[derive(Clone)]
pub struct PgCallRepository {
    pool: PgPool,
}

impl PgCallRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CallRepository for PgCallRepository {
    async fn create(&self, call: &Call) -> Result<Call, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, CallRow>(
            r#"
            INSERT INTO calls (id, conversation_id, initiator_id, type, status, started_at,
                               ended_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, conversation_id, initiator_id, type, status, started_at, ended_at,
                      created_at
            "#,
        )
        .bind(call.id)
        .bind(call.conversation_id)
        .bind(call.initiator_id)
        .bind(call.call_type.as_str())
        .bind(call.status.as_str())
        .bind(call.started_at)
        .bind(call.ended_at)
        .bind(call.created_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::from_unique(e, "There is already an active call in this conversation"))?;

        sqlx::query(
            "INSERT INTO call_participants (call_id, user_id, joined_at) VALUES ($1, $2, $3)",
        )
        .bind(call.id)
        .bind(call.initiator_id)
        .bind(call.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into_call())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Call>, AppError> {
        let row = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT id, conversation_id, initiator_id, type, status, started_at, ended_at, created_at
            FROM calls
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_call()))
    }

    async fn find_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Call>, AppError> {
        let rows = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT id, conversation_id, initiator_id, type, status, started_at, ended_at, created_at
            FROM calls
            WHERE conversation_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_call()).collect())
    }

    async fn find_active_by_conversation(&self, conversation_id: Uuid) -> Result<Vec<Call>, AppError> {
        let rows = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT id, conversation_id, initiator_id, type, status, started_at, ended_at, created_at
            FROM calls
            WHERE conversation_id = $1 AND status IN ('ringing', 'ongoing')
            ORDER BY created_at DESC
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_call()).collect())
    }

    async fn find_by_initiator(&self, user_id: Uuid) -> Result<Vec<Call>, AppError> {
        let rows = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT id, conversation_id, initiator_id, type, status, started_at, ended_at, created_at
            FROM calls
            WHERE initiator_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_call()).collect())
    }

    async fn find_active_by_initiator(&self, user_id: Uuid) -> Result<Vec<Call>, AppError> {
        let rows = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT id, conversation_id, initiator_id, type, status, started_at, ended_at, created_at
            FROM calls
            WHERE initiator_id = $1 AND status IN ('ringing', 'ongoing')
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_call()).collect())
    }

    async fn history(&self, user_id: Uuid, page: PageRequest) -> Result<(Vec<Call>, i64), AppError> {
        let total: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM calls c
            WHERE c.initiator_id = $1
               OR EXISTS (SELECT 1 FROM call_participants p WHERE p.call_id = c.id AND p.user_id = $1)
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query_as::<_, CallRow>(
            r#"
            SELECT c.id, c.conversation_id, c.initiator_id, c.type, c.status, c.started_at,
                   c.ended_at, c.created_at
            FROM calls c
            WHERE c.initiator_id = $1
               OR EXISTS (SELECT 1 FROM call_participants p WHERE p.call_id = c.id AND p.user_id = $1)
            ORDER BY c.created_at DESC
            LIMIT $2 OFFSET $3
            "#,
        )
        .bind(user_id)
        .bind(page.limit())
        .bind(page.offset())
        .fetch_all(&self.pool)
        .await?;

        Ok((rows.into_iter().map(|r| r.into_call()).collect(), total.0))
    }

    async fn save_status(&self, call: &Call, expected: CallStatus) -> Result<Call, AppError> {
        let row = sqlx::query_as::<_, CallRow>(
            r#"
            UPDATE calls
            SET status = $2, started_at = $3, ended_at = $4
            WHERE id = $1 AND status = $5
            RETURNING id, conversation_id, initiator_id, type, status, started_at, ended_at,
                      created_at
            "#,
        )
        .bind(call.id)
        .bind(call.status.as_str())
        .bind(call.started_at)
        .bind(call.ended_at)
        .bind(expected.as_str())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::Conflict("Call status changed concurrently".into()))?;

        Ok(row.into_call())
    }

    async fn expire_ringing(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Call>, AppError> {
        let rows = sqlx::query_as::<_, CallRow>(
            r#"
            UPDATE calls
            SET status = 'missed', ended_at = $2
            WHERE status = 'ringing' AND created_at < $1
            RETURNING id, conversation_id, initiator_id, type, status, started_at, ended_at,
                      created_at
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_call()).collect())
    }

    async fn expire_ongoing(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Call>, AppError> {
        let rows = sqlx::query_as::<_, CallRow>(
            r#"
            UPDATE calls
            SET status = 'ended', ended_at = $2
            WHERE status = 'ongoing' AND COALESCE(started_at, created_at) < $1
            RETURNING id, conversation_id, initiator_id, type, status, started_at, ended_at,
                      created_at
            "#,
        )
        .bind(cutoff)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_call()).collect())
    }

    async fn add_participant(
        &self,
        call_id: Uuid,
        user_id: Uuid,
        rtc_session_id: Option<String>,
    ) -> Result<CallParticipant, AppError> {
        let row = sqlx::query_as::<_, ParticipantRow>(
            r#"
            INSERT INTO call_participants (call_id, user_id, joined_at, rtc_session_id)
            VALUES ($1, $2, NOW(), $3)
            ON CONFLICT (call_id, user_id)
            DO UPDATE SET joined_at = NOW(), left_at = NULL,
                          rtc_session_id = COALESCE(EXCLUDED.rtc_session_id, call_participants.rtc_session_id)
            RETURNING call_id, user_id, joined_at, left_at, rtc_session_id
            "#,
        )
        .bind(call_id)
        .bind(user_id)
        .bind(rtc_session_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into_participant())
    }

    async fn leave_participant(
        &self,
        call_id: Uuid,
        user_id: Uuid,
        left_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE call_participants SET left_at = $3
            WHERE call_id = $1 AND user_id = $2 AND left_at IS NULL
            "#,
        )
        .bind(call_id)
        .bind(user_id)
        .bind(left_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn participants(&self, call_id: Uuid) -> Result<Vec<CallParticipant>, AppError> {
        let rows = sqlx::query_as::<_, ParticipantRow>(
            r#"
            SELECT call_id, user_id, joined_at, left_at, rtc_session_id
            FROM call_participants
            WHERE call_id = $1
            ORDER BY joined_at
            "#,
        )
        .bind(call_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_participant()).collect())
    }
}
