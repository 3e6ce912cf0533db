//! Request DTOs
//!
//! Data structures for API request bodies and query strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::{
    CallStatus, CallType, ConversationType, MemberRole, MessageType, MAX_ATTACHMENTS_PER_MESSAGE,
    MAX_ATTACHMENT_SIZE,
};
use crate::shared::pagination::SortDirection;

// =============================================================================
// Auth
// =============================================================================

/// Signup request
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3-50 characters"))]
    pub username: String,

    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 8, max = 128, message = "Password must be 8-128 characters"))]
    pub password: String,

    #[validate(length(max = 100, message = "Display name must be at most 100 characters"))]
    pub display_name: Option<String>,
}

/// Login request
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CheckEmailRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

/// Refresh or logout request
#[derive(Debug, Deserialize, Validate)]
pub struct RefreshTokenRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

/// Signed identity assertion from the OAuth exchange component
#[derive(Debug, Deserialize, Validate)]
pub struct OAuthLoginRequest {
    #[validate(length(min = 1, message = "Assertion is required"))]
    pub assertion: String,
}

// =============================================================================
// Users
// =============================================================================

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateProfileRequest {
    #[validate(length(max = 100, message = "Display name must be at most 100 characters"))]
    pub display_name: Option<String>,

    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,

    #[validate(length(max = 500, message = "About must be at most 500 characters"))]
    pub about: Option<String>,

    #[validate(length(max = 32, message = "Phone must be at most 32 characters"))]
    pub phone: Option<String>,
}

/// `?q=` search parameter
#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

// =============================================================================
// Friends
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct SendFriendRequestRequest {
    pub receiver_id: Uuid,

    #[validate(length(max = 500, message = "Message must be at most 500 characters"))]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FriendRequestAction {
    Accept,
    Decline,
}

#[derive(Debug, Deserialize)]
pub struct RespondFriendRequestRequest {
    pub request_id: Uuid,
    pub action: FriendRequestAction,
}

// =============================================================================
// Conversations
// =============================================================================

#[derive(Debug, Deserialize, Validate)]
pub struct CreateConversationRequest {
    #[serde(rename = "type")]
    pub conversation_type: ConversationType,

    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: Option<String>,

    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,

    #[serde(default)]
    #[validate(length(max = 256, message = "Too many members"))]
    pub member_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct DirectConversationRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateConversationRequest {
    #[validate(length(min = 1, max = 100, message = "Title must be 1-100 characters"))]
    pub title: Option<String>,

    #[validate(url(message = "Invalid avatar URL"))]
    pub avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMemberRoleRequest {
    pub role: MemberRole,
}

// =============================================================================
// Messages
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AttachmentRequest {
    #[validate(url(message = "Invalid attachment URL"))]
    pub url: String,

    pub mime_type: Option<String>,

    #[validate(range(min = 0, max = MAX_ATTACHMENT_SIZE, message = "Attachment is too large"))]
    pub bytes: Option<i64>,

    #[validate(range(min = 0))]
    pub width: Option<i32>,

    #[validate(range(min = 0))]
    pub height: Option<i32>,

    #[validate(range(min = 0))]
    pub duration_ms: Option<i32>,

    #[validate(length(equal = 64, message = "sha256 must be 64 hex characters"))]
    pub sha256: Option<String>,
}

/// Message payload shared by `POST /messages` and `/app/conversation/{id}/send`.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct MessageBody {
    #[serde(rename = "type", default)]
    pub message_type: MessageType,

    #[validate(length(max = 4000, message = "Content must be at most 4000 characters"))]
    pub content: Option<String>,

    pub metadata: Option<serde_json::Value>,

    pub reply_to_id: Option<Uuid>,

    #[serde(default)]
    #[validate(length(max = MAX_ATTACHMENTS_PER_MESSAGE, message = "Too many attachments"), nested)]
    pub attachments: Vec<AttachmentRequest>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SendMessageRequest {
    pub conversation_id: Uuid,

    #[serde(flatten)]
    #[validate(nested)]
    pub body: MessageBody,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EditMessageRequest {
    #[validate(length(min = 1, max = 4000, message = "Content must be 1-4000 characters"))]
    pub content: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct MessageListQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
    pub sort_dir: Option<SortDirection>,
}

#[derive(Debug, Deserialize)]
pub struct MessagesAfterQuery {
    pub after: DateTime<Utc>,
}

// =============================================================================
// Calls
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateCallRequest {
    pub conversation_id: Uuid,

    #[serde(rename = "type", default)]
    pub call_type: CallType,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCallStatusRequest {
    pub status: CallStatus,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct JoinCallRequest {
    #[validate(length(max = 128, message = "Session id must be at most 128 characters"))]
    pub rtc_session_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<i64>,
    pub size: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_validation() {
        let request = SignupRequest {
            username: "ab".into(),
            email: "not-an-email".into(),
            password: "short".into(),
            display_name: None,
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[test]
    fn test_send_message_flattens_body() {
        let conversation_id = Uuid::now_v7();
        let json = serde_json::json!({
            "conversation_id": conversation_id,
            "type": "text",
            "content": "hello"
        });
        let request: SendMessageRequest = serde_json::from_value(json).unwrap();
        assert_eq!(request.conversation_id, conversation_id);
        assert_eq!(request.body.message_type, MessageType::Text);
        assert_eq!(request.body.content.as_deref(), Some("hello"));
        assert!(request.body.attachments.is_empty());
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_attachment_size_limit() {
        let body = MessageBody {
            content: Some("file".into()),
            attachments: vec![AttachmentRequest {
                url: "https://cdn.example.com/a.bin".into(),
                mime_type: None,
                bytes: Some(MAX_ATTACHMENT_SIZE + 1),
                width: None,
                height: None,
                duration_ms: None,
                sha256: None,
            }],
            ..Default::default()
        };
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_attachment_count_limit() {
        let attachment = AttachmentRequest {
            url: "https://cdn.example.com/photo.png".into(),
            mime_type: Some("image/png".into()),
            bytes: Some(1024),
            width: None,
            height: None,
            duration_ms: None,
            sha256: None,
        };
        let mut body = MessageBody {
            message_type: MessageType::Image,
            attachments: vec![attachment; MAX_ATTACHMENTS_PER_MESSAGE as usize],
            ..Default::default()
        };
        assert!(body.validate().is_ok());

        body.attachments.push(body.attachments[0].clone());
        assert!(body.validate().is_err());
    }

    #[test]
    fn test_friend_request_action_parsing() {
        let request: RespondFriendRequestRequest = serde_json::from_value(serde_json::json!({
            "request_id": Uuid::nil(),
            "action": "decline"
        }))
        .unwrap();
        assert_eq!(request.action, FriendRequestAction::Decline);
    }
}
