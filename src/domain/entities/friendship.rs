//! Friendship entity and repository trait.
//!
//! Maps to the `friendships` table. Each pair is stored once with
//! `user1_id < user2_id`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::user::User;
use crate::shared::error::AppError;

/// Order two user ids so an unordered pair has one canonical form.
pub fn ordered_pair(a: Uuid, b: Uuid) -> (Uuid, Uuid) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Friendship {
    pub id: Uuid,
    pub user1_id: Uuid,
    pub user2_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl Friendship {
    pub fn new(a: Uuid, b: Uuid) -> Self {
        let (user1_id, user2_id) = ordered_pair(a, b);
        Self {
            id: Uuid::now_v7(),
            user1_id,
            user2_id,
            created_at: Utc::now(),
        }
    }

    pub fn involves(&self, user_id: Uuid) -> bool {
        self.user1_id == user_id || self.user2_id == user_id
    }

    /// The other side of the friendship, if `user_id` is part of it.
    pub fn other(&self, user_id: Uuid) -> Option<Uuid> {
        if self.user1_id == user_id {
            Some(self.user2_id)
        } else if self.user2_id == user_id {
            Some(self.user1_id)
        } else {
            None
        }
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FriendshipRepository: Send + Sync {
    async fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool, AppError>;

    /// Friends of `user_id`, ordered by username.
    async fn find_friends(&self, user_id: Uuid) -> Result<Vec<User>, AppError>;

    /// Friends whose username or display name contains `query`.
    async fn search_friends(&self, user_id: Uuid, query: String) -> Result<Vec<User>, AppError>;

    async fn count(&self, user_id: Uuid) -> Result<i64, AppError>;

    /// Remove the friendship between two users. Returns whether one existed.
    async fn delete(&self, a: Uuid, b: Uuid) -> Result<bool, AppError>;
}
