//! Friend Request Service
//!
//! Sending, answering and canceling friend requests. Accepting a request
//! creates the friendship in the same transaction.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::application::dto::request::FriendRequestAction;
use crate::application::dto::response::{FriendRequestDto, UserSummaryDto};
use crate::application::events::{destinations, emit_user, RealtimeBroker, RealtimeEvent};
use crate::domain::{
    FriendRequest, FriendRequestRepository, FriendshipRepository, RequestStatus, UserRepository,
};
use crate::shared::error::AppError;

#[async_trait]
pub trait FriendRequestService: Send + Sync {
    async fn send(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        message: Option<String>,
    ) -> Result<FriendRequestDto, FriendRequestError>;

    /// Pending requests sent by the user, newest first
    async fn list_sent(&self, user_id: Uuid) -> Result<Vec<FriendRequestDto>, FriendRequestError>;

    /// Pending requests addressed to the user, newest first
    async fn list_received(&self, user_id: Uuid) -> Result<Vec<FriendRequestDto>, FriendRequestError>;

    async fn respond(
        &self,
        user_id: Uuid,
        request_id: Uuid,
        action: FriendRequestAction,
    ) -> Result<FriendRequestDto, FriendRequestError>;

    async fn cancel(&self, user_id: Uuid, request_id: Uuid) -> Result<FriendRequestDto, FriendRequestError>;

    async fn count_pending(&self, user_id: Uuid) -> Result<i64, FriendRequestError>;

    /// Whether `sender_id` has a pending request to `receiver_id`
    async fn has_pending(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<bool, FriendRequestError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FriendRequestError {
    #[error("Friend request not found")]
    NotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Cannot send a friend request to yourself")]
    SelfRequest,

    #[error("Users are already friends")]
    AlreadyFriends,

    #[error("A pending friend request already exists")]
    PendingExists,

    #[error("Only the receiver can respond to this request")]
    NotReceiver,

    #[error("Only the sender can cancel this request")]
    NotSender,

    #[error("Friend request is no longer pending")]
    NotPending,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<FriendRequestError> for AppError {
    fn from(err: FriendRequestError) -> Self {
        match err {
            FriendRequestError::NotFound | FriendRequestError::UserNotFound => {
                AppError::NotFound(err.to_string())
            }
            FriendRequestError::SelfRequest => AppError::BadRequest(err.to_string()),
            FriendRequestError::AlreadyFriends
            | FriendRequestError::PendingExists
            | FriendRequestError::NotPending => AppError::Conflict(err.to_string()),
            FriendRequestError::NotReceiver | FriendRequestError::NotSender => {
                AppError::Forbidden(err.to_string())
            }
            FriendRequestError::Store(e) => e,
        }
    }
}

pub struct FriendRequestServiceImpl<R, F, U>
where
    R: FriendRequestRepository,
    F: FriendshipRepository,
    U: UserRepository,
{
    request_repo: Arc<R>,
    friendship_repo: Arc<F>,
    user_repo: Arc<U>,
    broker: Arc<dyn RealtimeBroker>,
}

impl<R, F, U> FriendRequestServiceImpl<R, F, U>
where
    R: FriendRequestRepository,
    F: FriendshipRepository,
    U: UserRepository,
{
    pub fn new(
        request_repo: Arc<R>,
        friendship_repo: Arc<F>,
        user_repo: Arc<U>,
        broker: Arc<dyn RealtimeBroker>,
    ) -> Self {
        Self {
            request_repo,
            friendship_repo,
            user_repo,
            broker,
        }
    }

    /// Attach sender and receiver cards to each request
    async fn with_profiles(
        &self,
        requests: Vec<FriendRequest>,
    ) -> Result<Vec<FriendRequestDto>, FriendRequestError> {
        let mut ids: Vec<Uuid> = requests
            .iter()
            .flat_map(|r| [r.sender_id, r.receiver_id])
            .collect();
        ids.sort_unstable();
        ids.dedup();

        let profiles: HashMap<Uuid, UserSummaryDto> = self
            .user_repo
            .find_by_ids(&ids)
            .await?
            .into_iter()
            .map(|u| {
                let online = self.broker.is_online(u.id);
                (u.id, UserSummaryDto::from_user(u, online))
            })
            .collect();

        Ok(requests
            .into_iter()
            .map(|r| {
                let sender = profiles.get(&r.sender_id).cloned();
                let receiver = profiles.get(&r.receiver_id).cloned();
                FriendRequestDto {
                    sender,
                    receiver,
                    ..FriendRequestDto::from(r)
                }
            })
            .collect())
    }

    async fn load(&self, request_id: Uuid) -> Result<FriendRequest, FriendRequestError> {
        self.request_repo
            .find_by_id(request_id)
            .await?
            .ok_or(FriendRequestError::NotFound)
    }

    async fn single(&self, request: FriendRequest) -> Result<FriendRequestDto, FriendRequestError> {
        let mut dtos = self.with_profiles(vec![request.clone()]).await?;
        Ok(dtos.pop().unwrap_or_else(|| FriendRequestDto::from(request)))
    }
}

#[async_trait]
impl<R, F, U> FriendRequestService for FriendRequestServiceImpl<R, F, U>
where
    R: FriendRequestRepository + 'static,
    F: FriendshipRepository + 'static,
    U: UserRepository + 'static,
{
    async fn send(
        &self,
        sender_id: Uuid,
        receiver_id: Uuid,
        message: Option<String>,
    ) -> Result<FriendRequestDto, FriendRequestError> {
        if sender_id == receiver_id {
            return Err(FriendRequestError::SelfRequest);
        }
        self.user_repo
            .find_by_id(receiver_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(FriendRequestError::UserNotFound)?;

        if self.friendship_repo.are_friends(sender_id, receiver_id).await? {
            return Err(FriendRequestError::AlreadyFriends);
        }
        if self
            .request_repo
            .find_pending_between(sender_id, receiver_id)
            .await?
            .is_some()
        {
            return Err(FriendRequestError::PendingExists);
        }

        let message = message
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty());
        let created = self
            .request_repo
            .create(&FriendRequest::new(sender_id, receiver_id, message))
            .await
            .map_err(|e| match e {
                AppError::Conflict(_) => FriendRequestError::PendingExists,
                other => FriendRequestError::Store(other),
            })?;

        let dto = self.single(created).await?;
        emit_user(
            self.broker.as_ref(),
            receiver_id,
            destinations::QUEUE_FRIEND_REQUESTS,
            &RealtimeEvent::FriendRequestReceived(dto.clone()),
        );
        tracing::debug!(request_id = %dto.id, sender_id = %sender_id, receiver_id = %receiver_id, "Friend request sent");
        Ok(dto)
    }

    async fn list_sent(&self, user_id: Uuid) -> Result<Vec<FriendRequestDto>, FriendRequestError> {
        let requests = self.request_repo.list_sent(user_id).await?;
        self.with_profiles(requests).await
    }

    async fn list_received(&self, user_id: Uuid) -> Result<Vec<FriendRequestDto>, FriendRequestError> {
        let requests = self.request_repo.list_received(user_id).await?;
        self.with_profiles(requests).await
    }

    async fn respond(
        &self,
        user_id: Uuid,
        request_id: Uuid,
        action: FriendRequestAction,
    ) -> Result<FriendRequestDto, FriendRequestError> {
        let request = self.load(request_id).await?;
        if request.receiver_id != user_id {
            return Err(FriendRequestError::NotReceiver);
        }
        if !request.is_pending() {
            return Err(FriendRequestError::NotPending);
        }

        let answered = match action {
            FriendRequestAction::Accept => {
                if self
                    .friendship_repo
                    .are_friends(request.sender_id, request.receiver_id)
                    .await?
                {
                    return Err(FriendRequestError::AlreadyFriends);
                }
                let (accepted, friendship) =
                    self.request_repo.accept(request_id).await.map_err(|e| match e {
                        AppError::Conflict(_) => FriendRequestError::AlreadyFriends,
                        other => FriendRequestError::Store(other),
                    })?;
                tracing::info!(friendship_id = %friendship.id, "Friend request accepted");
                accepted
            }
            FriendRequestAction::Decline => {
                self.request_repo
                    .close(request_id, RequestStatus::Declined)
                    .await?
            }
        };

        let dto = self.single(answered).await?;
        emit_user(
            self.broker.as_ref(),
            dto.sender_id,
            destinations::QUEUE_FRIEND_REQUESTS,
            &RealtimeEvent::FriendRequestAnswered(dto.clone()),
        );
        Ok(dto)
    }

    async fn cancel(&self, user_id: Uuid, request_id: Uuid) -> Result<FriendRequestDto, FriendRequestError> {
        let request = self.load(request_id).await?;
        if request.sender_id != user_id {
            return Err(FriendRequestError::NotSender);
        }
        if !request.is_pending() {
            return Err(FriendRequestError::NotPending);
        }

        let canceled = self
            .request_repo
            .close(request_id, RequestStatus::Canceled)
            .await?;
        let dto = FriendRequestDto::from(canceled);
        emit_user(
            self.broker.as_ref(),
            dto.receiver_id,
            destinations::QUEUE_FRIEND_REQUESTS,
            &RealtimeEvent::FriendRequestCanceled(dto.clone()),
        );
        Ok(dto)
    }

    async fn count_pending(&self, user_id: Uuid) -> Result<i64, FriendRequestError> {
        Ok(self.request_repo.count_pending_received(user_id).await?)
    }

    async fn has_pending(&self, sender_id: Uuid, receiver_id: Uuid) -> Result<bool, FriendRequestError> {
        Ok(self
            .request_repo
            .find_pending_between(sender_id, receiver_id)
            .await?
            .is_some_and(|r| r.sender_id == sender_id))
    }
}
