//! Conversation entity and repository trait.
//!
//! Maps to the `conversations`, `conversation_members` and
//! `direct_conversations` tables.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::member::{ConversationMember, MemberProfile, MemberRole};
use crate::shared::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationType {
    Direct,
    Group,
}

impl ConversationType {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Some(Self::Direct),
            "group" => Some(Self::Group),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Direct => "direct",
            Self::Group => "group",
        }
    }
}

impl std::fmt::Display for ConversationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps to the `conversations` table:
/// - id: UUID PRIMARY KEY
/// - type: VARCHAR(20) NOT NULL ('direct' | 'group')
/// - title: VARCHAR(255) NULL
/// - avatar_url: TEXT NULL
/// - created_by: UUID NOT NULL REFERENCES users(id)
/// - created_at / updated_at: TIMESTAMPTZ NOT NULL
///
/// `updated_at` is bumped whenever a message is sent so conversation lists
/// can be ordered by activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conversation {
    pub id: Uuid,
    pub conversation_type: ConversationType,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(
        conversation_type: ConversationType,
        created_by: Uuid,
        title: Option<String>,
        avatar_url: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            conversation_type,
            title,
            avatar_url,
            created_by,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.conversation_type == ConversationType::Direct
    }
}

/// Maps to the `direct_conversations` table. One row per unordered pair,
/// stored with `user1_id < user2_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectConversation {
    pub conversation_id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl DirectConversation {
    pub fn other(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

/// Repository for conversations and their membership.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Insert a conversation with its initial members in one transaction.
    /// Direct conversations also get their `direct_conversations` row, and a
    /// second direct conversation for the same pair yields `Conflict`.
    async fn create(
        &self,
        conversation: &Conversation,
        members: &[ConversationMember],
    ) -> Result<Conversation, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Conversation>, AppError>;

    /// Conversations `user_id` belongs to, most recently active first.
    async fn find_for_user(&self, user_id: Uuid) -> Result<Vec<Conversation>, AppError>;

    async fn find_direct_between(&self, a: Uuid, b: Uuid) -> Result<Option<Conversation>, AppError>;

    async fn find_direct_pair(&self, conversation_id: Uuid) -> Result<Option<DirectConversation>, AppError>;

    /// Persist title and avatar.
    async fn update(&self, conversation: &Conversation) -> Result<Conversation, AppError>;

    /// Delete a conversation with its members, messages and calls.
    async fn delete(&self, id: Uuid) -> Result<(), AppError>;

    /// Conversations of `user_id` whose title contains `query` (case-insensitive).
    async fn search_for_user(&self, user_id: Uuid, query: String) -> Result<Vec<Conversation>, AppError>;

    async fn find_member(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Option<ConversationMember>, AppError>;

    /// Members in join order, with profile data.
    async fn list_members(&self, conversation_id: Uuid) -> Result<Vec<MemberProfile>, AppError>;

    /// `Conflict` if the user is already a member.
    async fn add_member(&self, member: &ConversationMember) -> Result<ConversationMember, AppError>;

    /// Returns whether a row was removed.
    async fn remove_member(&self, conversation_id: Uuid, user_id: Uuid) -> Result<bool, AppError>;

    async fn update_member_role(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        role: MemberRole,
    ) -> Result<bool, AppError>;

    /// Remove `user_id` and, if given, promote `successor` to owner in the
    /// same transaction.
    async fn leave(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
        successor: Option<Uuid>,
    ) -> Result<(), AppError>;

    /// Ids of every conversation `user_id` belongs to.
    async fn conversation_ids_for_user(&self, user_id: Uuid) -> Result<Vec<Uuid>, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversation_type_from_str() {
        assert_eq!(ConversationType::from_str("DIRECT"), Some(ConversationType::Direct));
        assert_eq!(ConversationType::from_str("group"), Some(ConversationType::Group));
        assert_eq!(ConversationType::from_str("channel"), None);
    }

    #[test]
    fn test_conversation_new() {
        let creator = Uuid::now_v7();
        let conversation = Conversation::new(ConversationType::Group, creator, Some("Team".into()), None);
        assert!(!conversation.is_direct());
        assert_eq!(conversation.created_by, creator);
        assert_eq!(conversation.created_at, conversation.updated_at);
    }

    #[test]
    fn test_direct_other() {
        let a = Uuid::now_v7();
        let b = Uuid::now_v7();
        let direct = DirectConversation {
            conversation_id: Uuid::now_v7(),
            user1_id: a,
            user2_id: b,
            created_at: Utc::now(),
        };
        assert_eq!(direct.other(a), Some(b));
        assert_eq!(direct.other(b), Some(a));
        assert_eq!(direct.other(Uuid::now_v7()), None);
    }
}
