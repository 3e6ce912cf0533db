//! Friend Service
//!
//! Friend lists, friend search and discovery of new users.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::dto::response::UserSummaryDto;
use crate::application::events::RealtimeBroker;
use crate::domain::{FriendshipRepository, User, UserRepository};
use crate::shared::error::AppError;
use crate::shared::validation::normalize_query;

/// Maximum number of users returned by user discovery
pub const USER_SEARCH_LIMIT: i64 = 20;

#[async_trait]
pub trait FriendService: Send + Sync {
    async fn list(&self, user_id: Uuid) -> Result<Vec<UserSummaryDto>, FriendError>;

    /// Friends whose username or display name contains `query`
    async fn search(&self, user_id: Uuid, query: Option<String>) -> Result<Vec<UserSummaryDto>, FriendError>;

    async fn count(&self, user_id: Uuid) -> Result<i64, FriendError>;

    async fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool, FriendError>;

    /// Remove a friendship; a missing friendship is not an error
    async fn remove(&self, user_id: Uuid, friend_id: Uuid) -> Result<(), FriendError>;

    /// Users who are neither the caller nor already friends
    async fn search_users(&self, user_id: Uuid, query: Option<String>) -> Result<Vec<UserSummaryDto>, FriendError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FriendError {
    #[error("Cannot unfriend yourself")]
    SelfReference,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<FriendError> for AppError {
    fn from(err: FriendError) -> Self {
        match err {
            FriendError::SelfReference => AppError::BadRequest(err.to_string()),
            FriendError::Store(e) => e,
        }
    }
}

pub struct FriendServiceImpl<F, U>
where
    F: FriendshipRepository,
    U: UserRepository,
{
    friendship_repo: Arc<F>,
    user_repo: Arc<U>,
    broker: Arc<dyn RealtimeBroker>,
}

impl<F, U> FriendServiceImpl<F, U>
where
    F: FriendshipRepository,
    U: UserRepository,
{
    pub fn new(friendship_repo: Arc<F>, user_repo: Arc<U>, broker: Arc<dyn RealtimeBroker>) -> Self {
        Self {
            friendship_repo,
            user_repo,
            broker,
        }
    }

    fn summaries(&self, users: Vec<User>) -> Vec<UserSummaryDto> {
        users
            .into_iter()
            .map(|u| {
                let online = self.broker.is_online(u.id);
                UserSummaryDto::from_user(u, online)
            })
            .collect()
    }
}

#[async_trait]
impl<F, U> FriendService for FriendServiceImpl<F, U>
where
    F: FriendshipRepository + 'static,
    U: UserRepository + 'static,
{
    async fn list(&self, user_id: Uuid) -> Result<Vec<UserSummaryDto>, FriendError> {
        let friends = self.friendship_repo.find_friends(user_id).await?;
        Ok(self.summaries(friends))
    }

    async fn search(&self, user_id: Uuid, query: Option<String>) -> Result<Vec<UserSummaryDto>, FriendError> {
        let friends = match normalize_query(query.as_deref()) {
            Some(q) => self.friendship_repo.search_friends(user_id, q).await?,
            None => self.friendship_repo.find_friends(user_id).await?,
        };
        Ok(self.summaries(friends))
    }

    async fn count(&self, user_id: Uuid) -> Result<i64, FriendError> {
        Ok(self.friendship_repo.count(user_id).await?)
    }

    async fn are_friends(&self, a: Uuid, b: Uuid) -> Result<bool, FriendError> {
        if a == b {
            return Ok(false);
        }
        Ok(self.friendship_repo.are_friends(a, b).await?)
    }

    async fn remove(&self, user_id: Uuid, friend_id: Uuid) -> Result<(), FriendError> {
        if user_id == friend_id {
            return Err(FriendError::SelfReference);
        }
        if self.friendship_repo.delete(user_id, friend_id).await? {
            tracing::info!(user_id = %user_id, friend_id = %friend_id, "Friendship removed");
        }
        Ok(())
    }

    async fn search_users(&self, user_id: Uuid, query: Option<String>) -> Result<Vec<UserSummaryDto>, FriendError> {
        let users = self
            .user_repo
            .search_non_friends(user_id, normalize_query(query.as_deref()), USER_SEARCH_LIMIT)
            .await?;
        Ok(self.summaries(users))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::MockRealtimeBroker;
    use crate::domain::{MockFriendshipRepository, MockUserRepository};
    use mockall::predicate::*;

    fn broker() -> Arc<MockRealtimeBroker> {
        let mut broker = MockRealtimeBroker::new();
        broker.expect_is_online().return_const(false);
        Arc::new(broker)
    }

    #[tokio::test]
    async fn test_blank_search_lists_all_friends() {
        let mut friendships = MockFriendshipRepository::new();
        friendships
            .expect_find_friends()
            .times(1)
            .returning(|_| Ok(vec![User::default(), User::default()]));
        friendships.expect_search_friends().never();

        let svc = FriendServiceImpl::new(Arc::new(friendships), Arc::new(MockUserRepository::new()), broker());
        let found = svc.search(Uuid::now_v7(), Some("   ".into())).await.unwrap();
        assert_eq!(found.len(), 2);
    }

    #[tokio::test]
    async fn test_search_users_is_limited() {
        let user_id = Uuid::now_v7();
        let mut users = MockUserRepository::new();
        users
            .expect_search_non_friends()
            .with(eq(user_id), eq(Some("ann".to_string())), eq(USER_SEARCH_LIMIT))
            .times(1)
            .returning(|_, _, _| Ok(Vec::new()));

        let svc = FriendServiceImpl::new(Arc::new(MockFriendshipRepository::new()), Arc::new(users), broker());
        let found = svc.search_users(user_id, Some(" ann ".into())).await.unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let mut friendships = MockFriendshipRepository::new();
        friendships.expect_delete().returning(|_, _| Ok(false));

        let svc = FriendServiceImpl::new(Arc::new(friendships), Arc::new(MockUserRepository::new()), broker());
        assert!(svc.remove(Uuid::now_v7(), Uuid::now_v7()).await.is_ok());
    }

    #[tokio::test]
    async fn test_self_is_never_a_friend() {
        let svc = FriendServiceImpl::new(
            Arc::new(MockFriendshipRepository::new()),
            Arc::new(MockUserRepository::new()),
            broker(),
        );
        let id = Uuid::now_v7();
        assert!(!svc.are_friends(id, id).await.unwrap());
    }
}
