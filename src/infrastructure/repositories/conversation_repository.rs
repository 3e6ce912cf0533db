//! Conversation Repository Implementation
//!
//! Conversations, their members and the direct-pair mapping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use super::user_repository::escape_like;
use crate::domain::{
    ordered_pair, Conversation, ConversationMember, ConversationRepository, ConversationType,
    DirectConversation, MemberProfile, MemberRole,
};
use crate::shared::error::AppError;

#[derive(Debug, sqlx::FromRow)]
struct ConversationRow {
    id: Uuid,
    #[sqlx(rename = "type")]
    conversation_type: String,
    title: Option<String>,
    avatar_url: Option<String>,
    created_by: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationRow {
    fn into_conversation(self) -> Conversation {
        Conversation {
            id: self.id,
            conversation_type: ConversationType::from_str(&self.conversation_type)
                .unwrap_or(ConversationType::Group),
            title: self.title,
            avatar_url: self.avatar_url,
            created_by: self.created_by,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberRow {
    conversation_id: Uuid,
    user_id: Uuid,
    role: String,
    joined_at: DateTime<Utc>,
    muted_until: Option<DateTime<Utc>>,
    last_read_message_id: Option<Uuid>,
}

impl MemberRow {
    fn into_member(self) -> ConversationMember {
        ConversationMember {
            conversation_id: self.conversation_id,
            user_id: self.user_id,
            role: MemberRole::from_str(&self.role).unwrap_or_default(),
            joined_at: self.joined_at,
            muted_until: self.muted_until,
            last_read_message_id: self.last_read_message_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct MemberProfileRow {
    user_id: Uuid,
    username: String,
    display_name: Option<String>,
    avatar_url: Option<String>,
    last_seen_at: Option<DateTime<Utc>>,
    role: String,
    joined_at: DateTime<Utc>,
    muted_until: Option<DateTime<Utc>>,
    last_read_message_id: Option<Uuid>,
}

impl MemberProfileRow {
    fn into_profile(self) -> MemberProfile {
        MemberProfile {
            user_id: self.user_id,
            username: self.username,
            display_name: self.display_name,
            avatar_url: self.avatar_url,
            last_seen_at: self.last_seen_at,
            role: MemberRole::from_str(&self.role).unwrap_or_default(),
            joined_at: self.joined_at,
            muted_until: self.muted_until,
            last_read_message_id: self.last_read_message_id,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct DirectRow {
    conversation_id: Uuid,
    user1_id: Uuid,
    user2_id: Uuid,
    created_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct PgConversationRepository {
    pool: PgPool,
}

impl PgConversationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn create(
        &self,
        conversation: &Conversation,
        members: &[ConversationMember],
    ) -> Result<Conversation, AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            INSERT INTO conversations (id, type, title, avatar_url, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id, type, title, avatar_url, created_by, created_at, updated_at
            "#,
        )
        .bind(conversation.id)
        .bind(conversation.conversation_type.as_str())
        .bind(&conversation.title)
        .bind(&conversation.avatar_url)
        .bind(conversation.created_by)
        .bind(conversation.created_at)
        .bind(conversation.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        for member in members {
            sqlx::query(
                r#"
                INSERT INTO conversation_members (conversation_id, user_id, role, joined_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(conversation.id)
            .bind(member.user_id)
            .bind(member.role.as_str())
            .bind(member.joined_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_unique(e, "Duplicate conversation member"))?;
        }

        if conversation.is_direct() {
            let [a, b] = members else {
                return Err(AppError::BadRequest(
                    "Direct conversations need exactly two members".into(),
                ));
            };
            let (user1, user2) = ordered_pair(a.user_id, b.user_id);
            sqlx::query(
                r#"
                INSERT INTO direct_conversations (conversation_id, user1_id, user2_id, created_at)
                VALUES ($1, $2, $3, $4)
                "#,
            )
            .bind(conversation.id)
            .bind(user1)
            .bind(user2)
            .bind(conversation.created_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::from_unique(e, "Direct conversation already exists"))?;
        }

        tx.commit().await?;
        Ok(row.into_conversation())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>, AppError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT id, type, title, avatar_url, created_by, created_at, updated_at
            FROM conversations
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_conversation()))
    }

    async fn find_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>, AppError> {
        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT c.id, c.type, c.title, c.avatar_url, c.created_by, c.created_at, c.updated_at
            FROM conversations c
            JOIN conversation_members m ON m.conversation_id = c.id
            WHERE m.user_id = $1
            ORDER BY c.updated_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_conversation()).collect())
    }

    async fn find_direct_between(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>, AppError> {
        let (user1, user2) = ordered_pair(a, b);
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT c.id, c.type, c.title, c.avatar_url, c.created_by, c.created_at, c.updated_at
            FROM conversations c
            JOIN direct_conversations d ON d.conversation_id = c.id
            WHERE d.user1_id = $1 AND d.user2_id = $2
            "#,
        )
        .bind(user1)
        .bind(user2)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_conversation()))
    }

    async fn find_direct_pair(&self, conversation_id: Uuid) -> Result<Option<DirectConversation>, AppError> {
        let row = sqlx::query_as::<_, DirectRow>(
            r#"
            SELECT conversation_id, user1_id, user2_id, created_at
            FROM direct_conversations
            WHERE conversation_id = $1
            "#,
        )
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| DirectConversation {
            conversation_id: r.conversation_id,
            user1_id: r.user1_id,
            user2_id: r.user2_id,
            created_at: r.created_at,
        }))
    }

    async fn update(&self, conversation: &Conversation) -> Result<Conversation, AppError> {
        let row = sqlx::query_as::<_, ConversationRow>(
            r#"
            UPDATE conversations
            SET title = $2, avatar_url = $3, updated_at = NOW()
            WHERE id = $1
            RETURNING id, type, title, avatar_url, created_by, created_at, updated_at
            "#,
        )
        .bind(conversation.id)
        .bind(&conversation.title)
        .bind(&conversation.avatar_url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound("Conversation not found".into()))?;

        Ok(row.into_conversation())
    }

    async fn delete(&self, id: Uuid) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM conversations WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("Conversation not found".into()));
        }

        Ok(())
    }

    async fn search_for_user(&self, user_id: Uuid, query: String) -> Result<Vec<Conversation>, AppError> {
        let pattern = format!("%{}%", escape_like(&query));

        let rows = sqlx::query_as::<_, ConversationRow>(
            r#"
            SELECT c.id, c.type, c.title, c.avatar_url, c.created_by, c.created_at, c.updated_at
            FROM conversations c
            JOIN conversation_members m ON m.conversation_id = c.id
            WHERE m.user_id = $1 AND c.title ILIKE $2
            ORDER BY c.updated_at DESC
            "#,
        )
        .bind(user_id)
        .bind(pattern)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_conversation()).collect())
    }

    async fn find_member(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ConversationMember>, AppError> {
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            SELECT conversation_id, user_id, role, joined_at, muted_until, last_read_message_id
            FROM conversation_members
            WHERE conversation_id = $1 AND user_id = $2
            "#,
        )
        .bind(conversation_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_member()))
    }

    async fn list_members(&self, conversation_id: Uuid) -> Result<Vec<MemberProfile>, AppError> {
        let rows = sqlx::query_as::<_, MemberProfileRow>(
            r#"
            SELECT m.user_id, u.username, u.display_name, u.avatar_url, u.last_seen_at,
                   m.role, m.joined_at, m.muted_until, m.last_read_message_id
            FROM conversation_members m
            JOIN users u ON u.id = m.user_id
            WHERE m.conversation_id = $1
            ORDER BY m.joined_at
            "#,
        )
        .bind(conversation_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_profile()).collect())
    }

    async fn add_member(&self, member: &ConversationMember) -> Result<ConversationMember, AppError> {
        let row = sqlx::query_as::<_, MemberRow>(
            r#"
            INSERT INTO conversation_members (conversation_id, user_id, role, joined_at)
            VALUES ($1, $2, $3, $4)
            RETURNING conversation_id, user_id, role, joined_at, muted_until, last_read_message_id
            "#,
        )
        .bind(member.conversation_id)
        .bind(member.user_id)
        .bind(member.role.as_str())
        .bind(member.joined_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::from_unique(e, "User is already a member"))?;

        Ok(row.into_member())
    }

    async fn remove_member(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool, AppError> {
        let result =
            sqlx::query("DELETE FROM conversation_members WHERE conversation_id = $1 AND user_id = $2")
                .bind(conversation_id)
                .bind(user_id)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_member_role(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE conversation_members SET role = $3 WHERE conversation_id = $1 AND user_id = $2",
        )
        .bind(conversation_id)
        .bind(user_id)
        .bind(role.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn leave(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        successor: Option<Uuid>,
    ) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        let removed =
            sqlx::query("DELETE FROM conversation_members WHERE conversation_id = $1 AND user_id = $2")
                .bind(conversation_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;

        if removed.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(AppError::NotFound("Not a member of this conversation".into()));
        }

        if let Some(successor) = successor {
            sqlx::query(
                "UPDATE conversation_members SET role = 'owner' WHERE conversation_id = $1 AND user_id = $2",
            )
            .bind(conversation_id)
            .bind(successor)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn conversation_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as("SELECT conversation_id FROM conversation_members WHERE user_id = $1")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}
