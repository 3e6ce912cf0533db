//! Realtime Events
//!
//! Services publish changes through the [`RealtimeBroker`] seam; the STOMP
//! gateway implements it. Topic destinations fan out to every subscriber,
//! user queues reach every session of one user.

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::application::dto::response::{
    CallDto, ConversationDto, FriendRequestDto, MessageDto, ReadReceiptDto,
};

/// Outbound side of the realtime channel.
#[cfg_attr(test, mockall::automock)]
pub trait RealtimeBroker: Send + Sync {
    /// Deliver to every subscriber of a `/topic/...` destination.
    fn publish_to_topic(&self, destination: &str, payload: &Value);

    /// Deliver to every session of `user_id` subscribed to `/user{queue}`.
    fn publish_to_user(&self, user_id: Uuid, queue: &str, payload: &Value);

    /// Whether the user has at least one live session on this instance.
    fn is_online(&self, user_id: Uuid) -> bool;

    /// Stop delivering a conversation's topics to a user who lost membership.
    fn revoke_conversation(&self, user_id: Uuid, conversation_id: Uuid);
}

/// Destination names shared by services and the gateway.
pub mod destinations {
    use uuid::Uuid;

    pub const TOPIC_PREFIX: &str = "/topic/";
    pub const USER_PREFIX: &str = "/user";
    pub const APP_PREFIX: &str = "/app";

    pub const QUEUE_CONVERSATIONS: &str = "/queue/conversations";
    pub const QUEUE_FRIEND_REQUESTS: &str = "/queue/friend-requests";
    pub const QUEUE_CALL_EVENTS: &str = "/queue/call-events";
    pub const QUEUE_ERRORS: &str = "/queue/errors";
    pub const QUEUE_JOINED: &str = "/queue/joined";

    pub fn conversation(id: Uuid) -> String {
        format!("/topic/conversation/{}", id)
    }

    pub fn conversation_typing(id: Uuid) -> String {
        format!("/topic/conversation/{}/typing", id)
    }

    pub fn conversation_read(id: Uuid) -> String {
        format!("/topic/conversation/{}/read", id)
    }

    pub fn conversation_presence(id: Uuid) -> String {
        format!("/topic/conversation/{}/presence", id)
    }
}

/// Events published on conversation topics and user queues.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum RealtimeEvent {
    MessageCreated(MessageDto),
    MessageUpdated(MessageDto),
    MessageDeleted(MessageDto),
    ConversationCreated(ConversationDto),
    ConversationUpdated(ConversationDto),
    ConversationDeleted { conversation_id: Uuid },
    MemberAdded { conversation_id: Uuid, user_id: Uuid },
    MemberRemoved { conversation_id: Uuid, user_id: Uuid },
    MemberRoleChanged { conversation_id: Uuid, user_id: Uuid, role: String },
    MemberLeft { conversation_id: Uuid, user_id: Uuid, new_owner_id: Option<Uuid> },
    FriendRequestReceived(FriendRequestDto),
    FriendRequestAnswered(FriendRequestDto),
    FriendRequestCanceled(FriendRequestDto),
    CallCreated(CallDto),
    CallUpdated(CallDto),
}

/// Payload of `/topic/conversation/{id}/typing`.
#[derive(Debug, Clone, Serialize)]
pub struct TypingEvent {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub is_typing: bool,
    pub timestamp: i64,
}

/// Payload of `/topic/conversation/{id}/presence`.
#[derive(Debug, Clone, Serialize)]
pub struct PresenceEvent {
    pub conversation_id: Uuid,
    pub user_id: Uuid,
    pub online: bool,
    pub timestamp: i64,
}

fn to_value<T: Serialize>(payload: &T) -> Option<Value> {
    match serde_json::to_value(payload) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::error!(error = %e, "Failed to serialize realtime payload");
            None
        }
    }
}

/// Serialize and publish to a topic.
pub fn emit_topic<T: Serialize>(broker: &dyn RealtimeBroker, destination: &str, payload: &T) {
    if let Some(value) = to_value(payload) {
        broker.publish_to_topic(destination, &value);
    }
}

/// Serialize and publish to one user's queue.
pub fn emit_user<T: Serialize>(broker: &dyn RealtimeBroker, user_id: Uuid, queue: &str, payload: &T) {
    if let Some(value) = to_value(payload) {
        broker.publish_to_user(user_id, queue, &value);
    }
}

/// Read receipts go out as-is on the read topic.
pub fn emit_read_receipt(broker: &dyn RealtimeBroker, receipt: &ReadReceiptDto) {
    emit_topic(
        broker,
        &destinations::conversation_read(receipt.conversation_id),
        receipt,
    );
}
