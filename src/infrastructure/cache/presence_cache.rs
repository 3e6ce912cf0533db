//! Presence Cache
//!
//! Online markers shared between server instances. A marker is refreshed on
//! every heart-beat and expires on its own if an instance dies.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use uuid::Uuid;

use super::keys;
use crate::shared::error::AppError;

/// Default lifetime of an online marker, in seconds
const PRESENCE_TTL: u64 = 90;

#[derive(Clone)]
pub struct PresenceCacheService {
    redis: ConnectionManager,
    presence_ttl: u64,
}

impl PresenceCacheService {
    pub fn new(redis: ConnectionManager) -> Self {
        Self {
            redis,
            presence_ttl: PRESENCE_TTL,
        }
    }

    /// Mark the user online (or refresh the marker)
    pub async fn set_online(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut conn = self.redis.clone();
        conn.set_ex::<_, _, ()>(
            keys::presence(user_id),
            chrono::Utc::now().timestamp_millis(),
            self.presence_ttl,
        )
        .await?;
        Ok(())
    }

    pub async fn set_offline(&self, user_id: Uuid) -> Result<(), AppError> {
        let mut conn = self.redis.clone();
        conn.del::<_, ()>(keys::presence(user_id)).await?;
        Ok(())
    }

    pub async fn is_online(&self, user_id: Uuid) -> Result<bool, AppError> {
        let mut conn = self.redis.clone();
        Ok(conn.exists(keys::presence(user_id)).await?)
    }
}
