//! Message entity and repository trait.
//!
//! Maps to the `messages`, `message_attachments` and `message_reads` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::attachment::MessageAttachment;
use crate::shared::error::AppError;
use crate::shared::pagination::{PageRequest, SortDirection};

/// Maximum message content length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    #[default]
    Text,
    Image,
    File,
    Call,
    System,
}

impl MessageType {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(Self::Text),
            "image" => Some(Self::Image),
            "file" => Some(Self::File),
            "call" => Some(Self::Call),
            "system" => Some(Self::System),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::File => "file",
            Self::Call => "call",
            Self::System => "system",
        }
    }

    /// Types a client may send directly.
    pub fn is_user_sendable(&self) -> bool {
        matches!(self, Self::Text | Self::Image | Self::File)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a message in a conversation.
///
/// Maps to the `messages` table:
/// - id: UUID PRIMARY KEY
/// - conversation_id: UUID NOT NULL REFERENCES conversations(id) ON DELETE CASCADE
/// - sender_id: UUID NOT NULL REFERENCES users(id)
/// - type: VARCHAR(20) NOT NULL DEFAULT 'text'
/// - content: TEXT NULL
/// - metadata: JSONB NULL
/// - reply_to_id: UUID NULL REFERENCES messages(id)
/// - created_at: TIMESTAMPTZ NOT NULL
/// - edited_at / deleted_at: TIMESTAMPTZ NULL
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    pub message_type: MessageType,

    /// Text body (may be absent for attachment-only messages)
    pub content: Option<String>,

    /// Free-form client metadata
    pub metadata: Option<serde_json::Value>,

    /// Message this one replies to
    pub reply_to_id: Option<Uuid>,

    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,

    /// Soft-delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(conversation_id: Uuid, sender_id: Uuid, message_type: MessageType) -> Self {
        Self {
            id: Uuid::now_v7(),
            conversation_id,
            sender_id,
            message_type,
            content: None,
            metadata: None,
            reply_to_id: None,
            created_at: Utc::now(),
            edited_at: None,
            deleted_at: None,
        }
    }

    pub fn is_edited(&self) -> bool {
        self.edited_at.is_some()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Maps to the `message_reads` table (PK message_id, user_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MessageRead {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

/// Repository trait for Message data access operations.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Insert a message with its attachments and bump the conversation's
    /// `updated_at`, all in one transaction.
    async fn create(
        &self,
        message: &Message,
        attachments: &[MessageAttachment],
    ) -> Result<Message, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>, AppError>;

    /// One page of non-deleted messages and the total count.
    async fn list_by_conversation(
        &self,
        conversation_id: Uuid,
        page: PageRequest,
        direction: SortDirection,
    ) -> Result<(Vec<Message>, i64), AppError>;

    /// Non-deleted messages created strictly after `after`, oldest first.
    async fn list_after(
        &self,
        conversation_id: Uuid,
        after: DateTime<Utc>,
    ) -> Result<Vec<Message>, AppError>;

    /// Newest non-deleted message of a conversation.
    async fn latest_in_conversation(&self, conversation_id: Uuid) -> Result<Option<Message>, AppError>;

    async fn update_content(
        &self,
        id: Uuid,
        content: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<Message, AppError>;

    async fn soft_delete(&self, id: Uuid, deleted_at: DateTime<Utc>) -> Result<Message, AppError>;

    /// Record a read receipt and advance the member's last-read pointer.
    /// Returns `true` only when the receipt did not exist before.
    async fn mark_read(
        &self,
        message: &Message,
        user_id: Uuid,
        read_at: DateTime<Utc>,
    ) -> Result<bool, AppError>;

    async fn reads(&self, message_id: Uuid) -> Result<Vec<MessageRead>, AppError>;

    /// Messages after the member's last-read message, excluding their own and
    /// deleted ones.
    async fn unread_count(&self, conversation_id: Uuid, user_id: Uuid) -> Result<i64, AppError>;

    /// Case-insensitive content search, newest first.
    async fn search(&self, conversation_id: Uuid, query: String) -> Result<Vec<Message>, AppError>;

    async fn attachments_for(&self, message_ids: &[Uuid]) -> Result<Vec<MessageAttachment>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_type_from_str() {
        assert_eq!(MessageType::from_str("TEXT"), Some(MessageType::Text));
        assert_eq!(MessageType::from_str("image"), Some(MessageType::Image));
        assert_eq!(MessageType::from_str("call"), Some(MessageType::Call));
        assert_eq!(MessageType::from_str("sticker"), None);
    }

    #[test]
    fn test_user_sendable_types() {
        assert!(MessageType::Text.is_user_sendable());
        assert!(MessageType::File.is_user_sendable());
        assert!(!MessageType::System.is_user_sendable());
        assert!(!MessageType::Call.is_user_sendable());
    }

    #[test]
    fn test_new_message_flags() {
        let mut message = Message::new(Uuid::now_v7(), Uuid::now_v7(), MessageType::Text);
        assert!(!message.is_edited());
        assert!(!message.is_deleted());
        message.edited_at = Some(Utc::now());
        message.deleted_at = Some(Utc::now());
        assert!(message.is_edited());
        assert!(message.is_deleted());
    }

    #[test]
    fn test_message_type_serializes_lowercase() {
        let json = serde_json::to_string(&MessageType::System).unwrap();
        assert_eq!(json, "\"system\"");
    }
}
