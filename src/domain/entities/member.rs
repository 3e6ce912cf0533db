//! Conversation member entity.
//!
//! Maps to the `conversation_members` table. Member persistence is part of
//! [`ConversationRepository`](super::conversation::ConversationRepository)
//! since members are always created together with their conversation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Role of a member inside a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Owner,
    Admin,
    #[default]
    Member,
}

impl MemberRole {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Owner => "owner",
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }

    /// Owners and admins manage the conversation.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

impl std::fmt::Display for MemberRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Represents a user's membership in a conversation.
///
/// Maps to the `conversation_members` table:
/// - conversation_id: UUID NOT NULL REFERENCES conversations(id) (composite PK)
/// - user_id: UUID NOT NULL REFERENCES users(id) (composite PK)
/// - role: VARCHAR(20) NOT NULL DEFAULT 'member'
/// - joined_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// - muted_until: TIMESTAMPTZ NULL
/// - last_read_message_id: UUID NULL
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMember {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub muted_until: Option<DateTime<Utc>>,
    /// Newest message this member has read
    pub last_read_message_id: Option<Uuid>,
}

impl ConversationMember {
    pub fn new(conversation_id: Uuid, user_id: Uuid, role: MemberRole) -> Self {
        Self {
            conversation_id,
            user_id,
            role,
            joined_at: Utc::now(),
            muted_until: None,
            last_read_message_id: None,
        }
    }

    pub fn is_muted(&self, now: DateTime<Utc>) -> bool {
        self.muted_until.map(|until| until > now).unwrap_or(false)
    }
}

/// A member joined with the public parts of their user profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberProfile {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub muted_until: Option<DateTime<Utc>>,
    pub last_read_message_id: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_member_role_from_str() {
        assert_eq!(MemberRole::from_str("OWNER"), Some(MemberRole::Owner));
        assert_eq!(MemberRole::from_str("admin"), Some(MemberRole::Admin));
        assert_eq!(MemberRole::from_str("Member"), Some(MemberRole::Member));
        assert_eq!(MemberRole::from_str("moderator"), None);
    }

    #[test]
    fn test_member_role_is_admin() {
        assert!(MemberRole::Owner.is_admin());
        assert!(MemberRole::Admin.is_admin());
        assert!(!MemberRole::Member.is_admin());
    }

    #[test]
    fn test_member_muted() {
        let now = Utc::now();
        let mut member = ConversationMember::new(Uuid::now_v7(), Uuid::now_v7(), MemberRole::Member);
        assert!(!member.is_muted(now));
        member.muted_until = Some(now + Duration::minutes(5));
        assert!(member.is_muted(now));
        member.muted_until = Some(now - Duration::minutes(5));
        assert!(!member.is_muted(now));
    }
}
