//! Message Repository Implementation
//!
//! Messages, attachments and read receipts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::user_repository::escape_like;
use crate::domain::{Message, MessageAttachment, MessageRead, MessageRepository, MessageType};
use crate::shared::error::AppError;
use crate::shared::pagination::{PageRequest, SortDirection};

/// PostgreSQL message repository implementation.
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    sender_id: Uuid,
    #[sqlx(rename = "type")]
    message_type: String,
    content: Option<String>,
    metadata: Option<serde_json::Value>,
    reply_to_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    edited_at: Option<DateTime<Utc>>,
    deleted_at: Option<DateTime<Utc>>,
}

impl MessageRow {
    fn into_message(self) -> Message {
        Message {
            id: self.id,
            conversation_id: self.conversation_id,
            sender_id: self.sender_id,
            message_type: MessageType::from_str(&self.message_type).unwrap_or_default(),
            content: self.content,
            metadata: self.metadata,
            reply_to_id: self.reply_to_id,
            created_at: self.created_at,
            edited_at: self.edited_at,
            deleted_at: self.deleted_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AttachmentRow {
    id: Uuid,
    message_id: Uuid,
    url: String,
    mime_type: Option<String>,
    bytes: Option<i64>,
    width: Option<i32>,
    height: Option<i32>,
    duration_ms: Option<i32>,
    sha256: Option<String>,
}

impl AttachmentRow {
    fn into_attachment(self) -> MessageAttachment {
        MessageAttachment {
            id: self.id,
            message_id: self.message_id,
            url: self.url,
            mime_type: self.mime_type,
            bytes: self.bytes,
            width: self.width,
            height: self.height,
            duration_ms: self.duration_ms,
            sha256: self.sha256,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct ReadRow {
    message_id: Uuid,
    user_id: Uuid,
    read_at: DateTime<Utc>,
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create(
        &self,
        message: &Message,
        attachments: &[MessageAttachment],
    ) -> Result<Message, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (id, conversation_id, sender_id, type, content, metadata,
                                  reply_to_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, conversation_id, sender_id, type, content, metadata, reply_to_id,
                      created_at, edited_at, deleted_at
            "#,
        )
        .bind(message.id)
        .bind(message.conversation_id)
        .bind(message.sender_id)
        .bind(message.message_type.as_str())
        .bind(&message.content)
        .bind(&message.metadata)
        .bind(message.reply_to_id)
        .bind(message.created_at)
        .fetch_one(&mut *tx)
        .await?;

        for attachment in attachments {
            sqlx::query(
                r#"
                INSERT INTO message_attachments (id, message_id, url, mime_type, bytes, width,
                                                 height, duration_ms, sha256)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                "#,
            )
            .bind(attachment.id)
            .bind(message.id)
            .bind(&attachment.url)
            .bind(&attachment.mime_type)
            .bind(attachment.bytes)
            .bind(attachment.width)
            .bind(attachment.height)
            .bind(attachment.duration_ms)
            .bind(&attachment.sha256)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("UPDATE conversations SET updated_at = $2 WHERE id = $1")
            .bind(message.conversation_id)
            .bind(message.created_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into_message())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_id, type, content, metadata, reply_to_id,
                   created_at, edited_at, deleted_at
            FROM messages
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_message()))
    }

    async fn list_by_conversation(
        &self,
        conversation_id: Uuid,
        page: PageRequest,
        direction: SortDirection,
    ) -> Result<(Vec<Message>, i64), AppError> {
        let total: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE conversation_id = $1 AND deleted_at IS NULL",
        )
        .bind(conversation_id)
        .fetch_one(&self.pool)
        .await?;

        let sql = format!(
            r#"
            SELECT id, conversation_id, sender_id, type, content, metadata, reply_to_id,
                   created_at, edited_at, deleted_at
            FROM messages
            WHERE conversation_id = $1 AND deleted_at IS NULL
            ORDER BY created_at {dir}, id {dir}
            LIMIT $2 OFFSET $3
            "#,
            dir = direction.as_sql()
        );

        let rows = sqlx::query_as::<_, MessageRow>(&sql)
            .bind(conversation_id)
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok((rows.into_iter().map(|r| r.into_message()).collect(), total.0))
    }

    async fn list_after(
        &self,
        conversation_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_id, type, content, metadata, reply_to_id,
                   created_at, edited_at, deleted_at
            FROM messages
            WHERE conversation_id = $1 AND deleted_at IS NULL AND created_at > $2
            ORDER BY created_at, id
            "#,
        )
        .bind(conversation_id)
        .bind(after)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    async fn latest_in_conversation(&self, conversation_id: Uuid) -> Result<Option<Message>, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_id, type, content, metadata, reply_to_id,
                   created_at, edited_at, deleted_at
            FROM messages
            WHERE conversation_id = $1 AND deleted_at IS NULL
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_message()))
    }

    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Message, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            UPDATE messages
            SET content = $2, edited_at = $3
            WHERE id = $1 AND deleted_at IS NULL
            RETURNING id, conversation_id, sender_id, type, content, metadata, reply_to_id,
                      created_at, edited_at, deleted_at
            "#,
        )
        .bind(id)
        .bind(content)
        .bind(edited_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;

        Ok(row.into_message())
    }

    async fn soft_delete(&self, id: Uuid, deleted_at: DateTime<Utc>) -> Result<Message, AppError> {
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            UPDATE messages
            SET deleted_at = COALESCE(deleted_at, $2)
            WHERE id = $1
            RETURNING id, conversation_id, sender_id, type, content, metadata, reply_to_id,
                      created_at, edited_at, deleted_at
            "#,
        )
        .bind(id)
        .bind(deleted_at)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Message not found".into()))?;

        Ok(row.into_message())
    }

    async fn mark_read(
        &self,
        message: &Message,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO message_reads (message_id, user_id, read_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (message_id, user_id) DO NOTHING
            "#,
        )
        .bind(message.id)
        .bind(user_id)
        .bind(read_at)
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            tx.commit().await?;
            return Ok(false);
        }

        // Only move the pointer forward.
        sqlx::query(
            r#"
            UPDATE conversation_members m
            SET last_read_message_id = $3
            WHERE m.conversation_id = $1
              AND m.user_id = $2
              AND (m.last_read_message_id IS NULL
                   OR NOT EXISTS (
                       SELECT 1 FROM messages prev
                       WHERE prev.id = m.last_read_message_id AND prev.created_at > $4
                   ))
            "#,
        )
        .bind(message.conversation_id)
        .bind(user_id)
        .bind(message.id)
        .bind(message.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn reads(&self, message_id: Uuid) -> Result<Vec<MessageRead>, AppError> {
        let rows = sqlx::query_as::<_, ReadRow>(
            "SELECT message_id, user_id, read_at FROM message_reads WHERE message_id = $1 ORDER BY read_at",
        )
        .bind(message_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| MessageRead {
                message_id: r.message_id,
                user_id: r.user_id,
                read_at: r.read_at,
            })
            .collect())
    }

    async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64, AppError> {
        let count: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*)
            FROM messages msg
            JOIN conversation_members m
              ON m.conversation_id = msg.conversation_id AND m.user_id = $2
            LEFT JOIN messages last_read ON last_read.id = m.last_read_message_id
            WHERE msg.conversation_id = $1
              AND msg.deleted_at IS NULL
              AND msg.sender_id <> $2
              AND (last_read.id IS NULL OR msg.created_at > last_read.created_at)
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }

    async fn search(&self, conversation_id: Uuid, query: String) -> Result<Vec<Message>, AppError> {
        let pattern = format!("%{}%", escape_like(&query));

        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT id, conversation_id, sender_id, type, content, metadata, reply_to_id,
                   created_at, edited_at, deleted_at
            FROM messages
            WHERE conversation_id = $1 AND deleted_at IS NULL AND content ILIKE $2
            ORDER BY created_at DESC
            LIMIT 100
            "#,
        )
        .bind(conversation_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }

    async fn attachments_for(&self, message_ids: &[Uuid]) -> Result<Vec<MessageAttachment>, AppError> {
        if message_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, AttachmentRow>(
            r#"
            SELECT id, message_id, url, mime_type, bytes, width, height, duration_ms, sha256
            FROM message_attachments
            WHERE message_id = ANY($1)
            ORDER BY message_id, id
            "#,
        )
        .bind(message_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_attachment()).collect())
    }
}
