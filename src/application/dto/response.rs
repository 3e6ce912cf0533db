//! Response DTOs
//!
//! Data structures for API response bodies and realtime payloads.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::domain::{
    AuthProvider, Call, CallParticipant, CallStatus, CallType, Conversation, ConversationType,
    FriendRequest, MemberProfile, MemberRole, Message, MessageAttachment, MessageRead, MessageType,
    RequestStatus, User,
};

/// Authentication tokens
#[derive(Debug, Clone, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: i64,
    pub token_type: String,
}

/// Signup/login/OAuth response (user and tokens)
#[derive(Debug, Clone, Serialize)]
pub struct AuthResponse {
    pub user: UserDto,
    #[serde(flatten)]
    pub tokens: TokenResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailAvailabilityResponse {
    pub available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CountResponse {
    pub count: i64,
}

/// Full user profile. Private fields are only filled for the owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDto {
    pub id: Uuid,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub about: Option<String>,
    pub auth_provider: AuthProvider,
    pub email_verified: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl UserDto {
    pub fn from_user(user: User, include_private: bool) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: include_private.then_some(user.email),
            phone: if include_private { user.phone } else { None },
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            about: user.about,
            auth_provider: user.auth_provider,
            email_verified: user.email_verified,
            last_seen_at: user.last_seen_at,
            created_at: user.created_at,
        }
    }
}

/// Compact user card used in friend lists and search results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserSummaryDto {
    pub id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub online: bool,
}

impl UserSummaryDto {
    pub fn from_user(user: User, online: bool) -> Self {
        Self {
            id: user.id,
            username: user.username,
            display_name: user.display_name,
            avatar_url: user.avatar_url,
            last_seen_at: user.last_seen_at,
            online,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PresenceDto {
    pub user_id: Uuid,
    pub online: bool,
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FriendRequestDto {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: RequestStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sender: Option<UserSummaryDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receiver: Option<UserSummaryDto>,
}

impl From<FriendRequest> for FriendRequestDto {
    fn from(request: FriendRequest) -> Self {
        Self {
            id: request.id,
            sender_id: request.sender_id,
            receiver_id: request.receiver_id,
            status: request.status,
            message: request.message,
            created_at: request.created_at,
            responded_at: request.responded_at,
            sender: None,
            receiver: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MemberDto {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: MemberRole,
    pub joined_at: DateTime<Utc>,
    pub muted_until: Option<DateTime<Utc>>,
    pub last_read_message_id: Option<Uuid>,
    pub last_seen_at: Option<DateTime<Utc>>,
    pub online: bool,
}

impl MemberDto {
    pub fn from_profile(profile: MemberProfile, online: bool) -> Self {
        Self {
            user_id: profile.user_id,
            username: profile.username,
            display_name: profile.display_name,
            avatar_url: profile.avatar_url,
            role: profile.role,
            joined_at: profile.joined_at,
            muted_until: profile.muted_until,
            last_read_message_id: profile.last_read_message_id,
            last_seen_at: profile.last_seen_at,
            online,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationDto {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,
    pub title: Option<String>,
    pub avatar_url: Option<String>,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub members: Vec<MemberDto>,
    pub last_message: Option<MessageDto>,
    pub unread_count: i64,
}

impl ConversationDto {
    pub fn new(conversation: Conversation, members: Vec<MemberDto>) -> Self {
        Self {
            id: conversation.id,
            conversation_type: conversation.conversation_type,
            title: conversation.title,
            avatar_url: conversation.avatar_url,
            created_by: conversation.created_by,
            created_at: conversation.created_at,
            updated_at: conversation.updated_at,
            members,
            last_message: None,
            unread_count: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentDto {
    pub id: Uuid,
    pub url: String,
    pub mime_type: Option<String>,
    pub bytes: Option<i64>,
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub duration_ms: Option<i32>,
    pub sha256: Option<String>,
}

impl From<MessageAttachment> for AttachmentDto {
    fn from(attachment: MessageAttachment) -> Self {
        Self {
            id: attachment.id,
            url: attachment.url,
            mime_type: attachment.mime_type,
            bytes: attachment.bytes,
            width: attachment.width,
            height: attachment.height,
            duration_ms: attachment.duration_ms,
            sha256: attachment.sha256,
        }
    }
}

/// A message as seen by clients. Deleted messages keep their id and
/// timestamps but lose content, metadata and attachments.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MessageDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub sender_id: Uuid,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    pub content: Option<String>,
    pub metadata: Option<serde_json::Value>,
    pub reply_to_id: Option<Uuid>,
    pub attachments: Vec<AttachmentDto>,
    pub created_at: DateTime<Utc>,
    pub edited_at: Option<DateTime<Utc>>,
    pub deleted: bool,
}

impl MessageDto {
    pub fn new(message: Message, attachments: Vec<MessageAttachment>) -> Self {
        let deleted = message.is_deleted();
        Self {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            message_type: message.message_type,
            content: if deleted { None } else { message.content },
            metadata: if deleted { None } else { message.metadata },
            reply_to_id: message.reply_to_id,
            attachments: if deleted {
                Vec::new()
            } else {
                attachments.into_iter().map(AttachmentDto::from).collect()
            },
            created_at: message.created_at,
            edited_at: message.edited_at,
            deleted,
        }
    }
}

impl From<Message> for MessageDto {
    fn from(message: Message) -> Self {
        Self::new(message, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReadReceiptDto {
    pub conversation_id: Uuid,
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub read_at: DateTime<Utc>,
}

impl ReadReceiptDto {
    pub fn new(conversation_id: Uuid, read: MessageRead) -> Self {
        Self {
            conversation_id,
            message_id: read.message_id,
            user_id: read.user_id,
            read_at: read.read_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallDto {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub conversation_title: Option<String>,
    pub initiator_id: Uuid,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub status: CallStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: Option<i64>,
}

impl CallDto {
    pub fn new(call: Call, conversation_title: Option<String>, now: DateTime<Utc>) -> Self {
        let duration_seconds = call.duration_secs(now);
        Self {
            id: call.id,
            conversation_id: call.conversation_id,
            conversation_title,
            initiator_id: call.initiator_id,
            call_type: call.call_type,
            status: call.status,
            started_at: call.started_at,
            ended_at: call.ended_at,
            created_at: call.created_at,
            duration_seconds,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallParticipantDto {
    pub call_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: DateTime<Utc>,
    pub left_at: Option<DateTime<Utc>>,
    pub rtc_session_id: Option<String>,
    pub active: bool,
}

impl From<CallParticipant> for CallParticipantDto {
    fn from(participant: CallParticipant) -> Self {
        Self {
            active: participant.left_at.is_none(),
            call_id: participant.call_id,
            user_id: participant.user_id,
            joined_at: participant.joined_at,
            left_at: participant.left_at,
            rtc_session_id: participant.rtc_session_id,
        }
    }
}

/// Result of an on-demand call sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanupReport {
    pub missed: usize,
    pub ended: usize,
}
