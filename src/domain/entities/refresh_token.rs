//! Refresh token entity and repository trait.
//!
//! Maps to the `refresh_tokens` table. Only the SHA-256 hash of the opaque
//! token handed to the client is stored.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::shared::error::AppError;

/// Maps to the `refresh_tokens` table:
/// - id: UUID PRIMARY KEY
/// - user_id: UUID NOT NULL REFERENCES users(id) ON DELETE CASCADE
/// - token_hash: VARCHAR(64) NOT NULL UNIQUE
/// - expires_at: TIMESTAMPTZ NOT NULL
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// - revoked: BOOLEAN NOT NULL DEFAULT FALSE
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub revoked: bool,
}

impl RefreshToken {
    pub fn new(user_id: Uuid, token_hash: String, lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            user_id,
            token_hash,
            expires_at: now + lifetime,
            created_at: now,
            revoked: false,
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }

    /// Not revoked and not expired.
    pub fn is_usable(&self) -> bool {
        !self.revoked && !self.is_expired()
    }
}

/// Repository trait for refresh token persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn create(&self, token: &RefreshToken) -> Result<RefreshToken, AppError>;

    async fn find_by_hash(&self, token_hash: &str) -> Result<Option<RefreshToken>, AppError>;

    /// Atomically consume `old_id` and store `replacement`.
    ///
    /// Fails with `Unauthorized` when the old token was already consumed or
    /// revoked, which is how reuse of a rotated token is detected.
    async fn rotate(&self, old_id: Uuid, replacement: &RefreshToken) -> Result<RefreshToken, AppError>;

    /// Revoke a token by hash. Returns whether a live token was revoked.
    async fn revoke_by_hash(&self, token_hash: &str) -> Result<bool, AppError>;

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, AppError>;

    /// Remove expired and revoked tokens. Returns the number removed.
    async fn delete_expired(&self) -> Result<u64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_token_is_usable() {
        let token = RefreshToken::new(Uuid::now_v7(), "abc".into(), Duration::days(7));
        assert!(token.is_usable());
        assert!(token.expires_at > token.created_at);
    }

    #[test]
    fn test_revoked_token_not_usable() {
        let mut token = RefreshToken::new(Uuid::now_v7(), "abc".into(), Duration::days(7));
        token.revoked = true;
        assert!(!token.is_usable());
    }

    #[test]
    fn test_expired_token_not_usable() {
        let token = RefreshToken::new(Uuid::now_v7(), "abc".into(), Duration::seconds(-1));
        assert!(token.is_expired());
        assert!(!token.is_usable());
    }
}
