//! Friend request entity and repository trait.
//!
//! Maps to the `friend_requests` table. At most one row exists per unordered
//! user pair; a closed request is re-opened when either user asks again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::friendship::Friendship;
use crate::shared::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Accepted,
    Declined,
    Canceled,
}

impl RequestStatus {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(Self::Pending),
            "accepted" => Some(Self::Accepted),
            "declined" | "rejected" => Some(Self::Declined),
            "canceled" | "cancelled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Declined => "declined",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps to the `friend_requests` table:
/// - id: UUID PRIMARY KEY
/// - sender_id / receiver_id: UUID NOT NULL REFERENCES users(id)
/// - status: VARCHAR(20) NOT NULL DEFAULT 'pending'
/// - message: TEXT NULL
/// - created_at: TIMESTAMPTZ NOT NULL
/// - responded_at: TIMESTAMPTZ NULL
/// - UNIQUE (LEAST(sender_id, receiver_id), GREATEST(sender_id, receiver_id))
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FriendRequest {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub receiver_id: Uuid,
    pub status: RequestStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl FriendRequest {
    pub fn new(sender_id: Uuid, receiver_id: Uuid, message: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            sender_id,
            receiver_id,
            status: RequestStatus::Pending,
            message,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FriendRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<FriendRequest>, AppError>;

    /// Pending request between two users in either direction.
    async fn find_pending_between(&self, a: Uuid, b: Uuid) -> Result<Option<FriendRequest>, AppError>;

    /// Store a new pending request, re-opening a closed one for the same pair.
    /// Fails with `Conflict` if a pending request already exists.
    async fn create(&self, request: &FriendRequest) -> Result<FriendRequest, AppError>;

    /// Pending requests sent by `user_id`, newest first.
    async fn list_sent(&self, user_id: Uuid) -> Result<Vec<FriendRequest>, AppError>;

    /// Pending requests received by `user_id`, newest first.
    async fn list_received(&self, user_id: Uuid) -> Result<Vec<FriendRequest>, AppError>;

    /// Mark a pending request accepted and create the friendship in one
    /// transaction. `Conflict` if the request is no longer pending or the users
    /// are already friends.
    async fn accept(&self, id: Uuid) -> Result<(FriendRequest, Friendship), AppError>;

    /// Close a pending request with `status`. `Conflict` if it is not pending.
    async fn close(&self, id: Uuid, status: RequestStatus) -> Result<FriendRequest, AppError>;

    async fn count_pending_received(&self, user_id: Uuid) -> Result<i64, AppError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_status_from_str() {
        assert_eq!(RequestStatus::from_str("PENDING"), Some(RequestStatus::Pending));
        assert_eq!(RequestStatus::from_str("accepted"), Some(RequestStatus::Accepted));
        assert_eq!(RequestStatus::from_str("rejected"), Some(RequestStatus::Declined));
        assert_eq!(RequestStatus::from_str("cancelled"), Some(RequestStatus::Canceled));
        assert_eq!(RequestStatus::from_str("maybe"), None);
    }

    #[test]
    fn test_request_status_display() {
        assert_eq!(RequestStatus::Declined.to_string(), "declined");
    }

    #[test]
    fn test_new_request_is_pending() {
        let request = FriendRequest::new(Uuid::now_v7(), Uuid::now_v7(), Some("hi".into()));
        assert!(request.is_pending());
        assert!(request.responded_at.is_none());
    }
}
