//! # Domain Entities
//!
//! Core domain entities of the chat and call server. All entities map
//! directly to their corresponding database tables.
//!
//! ## Core Entities
//!
//! - **User**: Account with local or external identity and profile
//! - **Conversation**: Direct (1:1) or group chat with members
//! - **Message**: Text or media message, with attachments and read receipts
//! - **Call**: Audio/video call placed in a conversation
//!
//! ## Social Graph
//!
//! - **FriendRequest**: Pending edge between two users
//! - **Friendship**: Accepted, symmetric edge
//!
//! ## Supporting Entities
//!
//! - **RefreshToken**: Hashed refresh tokens for access token renewal
//!
//! ## Repository Traits
//!
//! Each aggregate has a repository trait implemented in the infrastructure
//! layer.

mod attachment;
mod call;
mod conversation;
mod friend_request;
mod friendship;
mod member;
mod message;
mod refresh_token;
mod user;

pub use user::{AuthProvider, User, UserRepository};

pub use refresh_token::{RefreshToken, RefreshTokenRepository};

pub use friendship::{ordered_pair, Friendship, FriendshipRepository};
pub use friend_request::{FriendRequest, FriendRequestRepository, RequestStatus};

pub use conversation::{Conversation, ConversationRepository, ConversationType, DirectConversation};
pub use member::{ConversationMember, MemberProfile, MemberRole};

pub use attachment::{MessageAttachment, MAX_ATTACHMENTS_PER_MESSAGE, MAX_ATTACHMENT_SIZE};
pub use message::{Message, MessageRead, MessageRepository, MessageType, MAX_MESSAGE_LENGTH};

pub use call::{Call, CallParticipant, CallRepository, CallStatus, CallType};

#[cfg(test)]
pub use call::MockCallRepository;
#[cfg(test)]
pub use conversation::MockConversationRepository;
#[cfg(test)]
pub use friend_request::MockFriendRequestRepository;
#[cfg(test)]
pub use friendship::MockFriendshipRepository;
#[cfg(test)]
pub use message::MockMessageRepository;
#[cfg(test)]
pub use refresh_token::MockRefreshTokenRepository;
#[cfg(test)]
pub use user::MockUserRepository;
