//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **AuthService**: Signup, login, OAuth, JWT and refresh token rotation
//! - **UserService**: Profile management and presence
//! - **FriendRequestService**: Sending and answering friend requests
//! - **FriendService**: Friend lists and user discovery
//! - **ConversationService**: Direct and group conversations, members, roles
//! - **MessageService**: Messages, attachments and read receipts
//! - **CallService**: Call lifecycle, participants and expiry sweep

pub mod auth_service;
pub mod call_service;
pub mod conversation_service;
pub mod friend_request_service;
pub mod friend_service;
pub mod membership;
pub mod message_service;
pub mod user_service;

// Re-export auth service types
pub use auth_service::{hash_refresh_token, AuthError, AuthService, AuthServiceImpl, Claims, TokenVerifier};

// Re-export user service types
pub use user_service::{UserError, UserService, UserServiceImpl};

// Re-export social graph service types
pub use friend_request_service::{FriendRequestError, FriendRequestService, FriendRequestServiceImpl};
pub use friend_service::{FriendError, FriendService, FriendServiceImpl};

// Re-export conversation and message service types
pub use conversation_service::{ConversationError, ConversationService, ConversationServiceImpl};
pub use membership::MembershipError;
pub use message_service::{MessageError, MessageService, MessageServiceImpl};

// Re-export call service types
pub use call_service::{CallError, CallService, CallServiceImpl};
