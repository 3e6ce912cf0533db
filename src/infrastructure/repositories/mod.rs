//! Repository Implementations
//!
//! PostgreSQL implementations of the repository traits defined in the domain
//! layer. Each repository handles data access for one aggregate.
//!
//! ## Available Repositories
//!
//! - **PgUserRepository** - User accounts and external identities
//! - **PgRefreshTokenRepository** - Hashed refresh tokens and rotation
//! - **PgFriendRequestRepository** - Friend requests (one row per user pair)
//! - **PgFriendshipRepository** - Accepted friendships
//! - **PgConversationRepository** - Conversations, members, direct pairs
//! - **PgMessageRepository** - Messages, attachments, read receipts
//! - **PgCallRepository** - Calls and call participants
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use crate::infrastructure::repositories::{PgUserRepository, PgConversationRepository};
//!
//! async fn setup_repositories(pool: PgPool) {
//!     let user_repo = PgUserRepository::new(pool.clone());
//!     let conversation_repo = PgConversationRepository::new(pool.clone());
//! }
//! ```

pub mod call_repository;
pub mod conversation_repository;
pub mod friend_request_repository;
pub mod friendship_repository;
pub mod message_repository;
pub mod refresh_token_repository;
pub mod user_repository;

pub use call_repository::PgCallRepository;
pub use conversation_repository::PgConversationRepository;
pub use friend_request_repository::PgFriendRequestRepository;
pub use friendship_repository::PgFriendshipRepository;
pub use message_repository::PgMessageRepository;
pub use refresh_token_repository::PgRefreshTokenRepository;
pub use user_repository::PgUserRepository;
