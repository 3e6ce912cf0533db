//! Typing Indicator Cache
//!
//! Redis-based typing indicators per conversation. Each indicator is a key
//! with a short TTL, indexed by a per-conversation set.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::keys;
use crate::shared::error::AppError;

/// Typing indicator cache service
#[derive(Clone)]
pub struct TypingCacheService {
    redis: ConnectionManager,
    typing_ttl: u64,
}

impl TypingCacheService {
    pub fn new(redis: ConnectionManager, typing_ttl: u64) -> Self {
        Self { redis, typing_ttl }
    }

    /// Mark a user as typing in a conversation
    pub async fn set_typing(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        let key = keys::typing(conversation_id, user_id);
        let set_key = keys::typing_set(conversation_id);
        let timestamp = chrono::Utc::now().timestamp_millis();

        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(&key, timestamp, self.typing_ttl).await?;
        conn.sadd::<_, _, ()>(&set_key, user_id.to_string()).await?;
        conn.expire::<_, ()>(&set_key, self.typing_ttl as i64).await?;

        Ok(())
    }

    pub async fn clear_typing(&self, conversation_id: Uuid, user_id: Uuid) -> Result<(), AppError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(keys::typing(conversation_id, user_id)).await?;
        conn.srem::<_, _, ()>(keys::typing_set(conversation_id), user_id.to_string())
            .await?;

        Ok(())
    }

    /// Users whose typing indicator has not expired yet
    pub async fn typing_users(&self, conversation_id: Uuid) -> Result<Vec<Uuid>, AppError> {
        let set_key = keys::typing_set(conversation_id);

        let mut conn = self.redis.clone();
        let members: Vec<String> = conn.smembers(&set_key).await?;

        let mut active = Vec::with_capacity(members.len());
        for member in members {
            let Ok(user_id) = Uuid::parse_str(&member) else {
                conn.srem::<_, _, ()>(&set_key, &member).await?;
                continue;
            };
            let alive: bool = conn.exists(keys::typing(conversation_id, user_id)).await?;
            if alive {
                active.push(user_id);
            } else {
                conn.srem::<_, _, ()>(&set_key, &member).await?;
            }
        }

        Ok(active)
    }
}
