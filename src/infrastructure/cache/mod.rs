//! Cache Module
//!
//! Redis connection management and the short-lived realtime state kept there:
//! typing indicators and cross-instance presence markers.
//!
//! # Example
//!
//! ```rust,ignore
//! use chat_call_server::infrastructure::cache::{create_redis_client, TypingCacheService};
//!
//! let conn = create_redis_client(&settings.redis).await?;
//! let typing = TypingCacheService::new(conn, settings.presence.typing_ttl_secs);
//! typing.set_typing(conversation_id, user_id).await?;
//! ```

mod presence_cache;
mod typing_cache;

pub use presence_cache::PresenceCacheService;
pub use typing_cache::TypingCacheService;

use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{info, instrument};

use crate::config::RedisSettings;

/// Creates a Redis connection manager with automatic reconnection.
#[instrument(skip(settings), fields(url = %settings.url))]
pub async fn create_redis_client(
    settings: &RedisSettings,
) -> Result<ConnectionManager, redis::RedisError> {
    info!("Connecting to Redis...");
    let client = Client::open(settings.url.as_str())?;
    let manager = ConnectionManager::new(client).await?;
    info!("Redis connection established");
    Ok(manager)
}

/// Cache key helpers.
pub mod keys {
    /// Prefix for online markers (e.g., "presence:user_id")
    pub const USER_PRESENCE: &str = "presence:";

    /// Prefix for typing indicators (e.g., "conversation:typing:conversation_id:user_id")
    pub const CONVERSATION_TYPING: &str = "conversation:typing:";

    #[inline]
    pub fn presence(user_id: impl std::fmt::Display) -> String {
        format!("{}{}", USER_PRESENCE, user_id)
    }

    #[inline]
    pub fn typing(conversation_id: impl std::fmt::Display, user_id: impl std::fmt::Display) -> String {
        format!("{}{}:{}", CONVERSATION_TYPING, conversation_id, user_id)
    }

    /// Set of users typing in a conversation
    #[inline]
    pub fn typing_set(conversation_id: impl std::fmt::Display) -> String {
        format!("{}{}:users", CONVERSATION_TYPING, conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::keys;

    #[test]
    fn test_key_layout() {
        assert_eq!(keys::presence("u1"), "presence:u1");
        assert_eq!(keys::typing("c1", "u1"), "conversation:typing:c1:u1");
        assert_eq!(keys::typing_set("c1"), "conversation:typing:c1:users");
    }
}
