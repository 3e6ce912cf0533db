//! User Service
//!
//! Profile lookup and editing, plus presence.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use uuid::Uuid;

use crate::application::dto::request::UpdateProfileRequest;
use crate::application::dto::response::{PresenceDto, UserDto};
use crate::application::events::RealtimeBroker;
use crate::domain::UserRepository;
use crate::shared::error::AppError;

/// User service trait
#[async_trait]
pub trait UserService: Send + Sync {
    /// Profile of the caller, including private fields
    async fn get_me(&self, user_id: Uuid) -> Result<UserDto, UserError>;

    /// Public profile of another user
    async fn get_user(&self, user_id: Uuid) -> Result<UserDto, UserError>;

    async fn update_me(&self, user_id: Uuid, update: UpdateProfileRequest) -> Result<UserDto, UserError>;

    /// Online flag (live session on this instance) and last-seen instant
    async fn presence(&self, user_id: Uuid) -> Result<PresenceDto, UserError>;

    /// Store `last_seen_at = now`
    async fn touch_last_seen(&self, user_id: Uuid) -> Result<(), UserError>;
}

/// User service errors
#[derive(Debug, thiserror::Error)]
pub enum UserError {
    #[error("User not found")]
    NotFound,

    #[error(transparent)]
    Store(#[from] AppError),
}

impl From<UserError> for AppError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => AppError::NotFound(err.to_string()),
            UserError::Store(e) => e,
        }
    }
}

/// Empty strings clear optional profile fields
fn blank_to_none(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// UserService implementation
pub struct UserServiceImpl<U>
where
    U: UserRepository,
{
    user_repo: Arc<U>,
    broker: Arc<dyn RealtimeBroker>,
}

impl<U> UserServiceImpl<U>
where
    U: UserRepository,
{
    pub fn new(user_repo: Arc<U>, broker: Arc<dyn RealtimeBroker>) -> Self {
        Self { user_repo, broker }
    }
}

#[async_trait]
impl<U> UserService for UserServiceImpl<U>
where
    U: UserRepository + 'static,
{
    async fn get_me(&self, user_id: Uuid) -> Result<UserDto, UserError> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound)?;
        Ok(UserDto::from_user(user, true))
    }

    async fn get_user(&self, user_id: Uuid) -> Result<UserDto, UserError> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .filter(|u| u.is_active)
            .ok_or(UserError::NotFound)?;
        Ok(UserDto::from_user(user, false))
    }

    async fn update_me(&self, user_id: Uuid, update: UpdateProfileRequest) -> Result<UserDto, UserError> {
        let mut user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound)?;

        if let Some(display_name) = update.display_name {
            user.display_name = blank_to_none(display_name);
        }
        if let Some(avatar_url) = update.avatar_url {
            user.avatar_url = blank_to_none(avatar_url);
        }
        if let Some(about) = update.about {
            user.about = blank_to_none(about);
        }
        if let Some(phone) = update.phone {
            user.phone = blank_to_none(phone);
        }
        user.updated_at = Utc::now();

        let updated = self.user_repo.update_profile(&user).await?;
        tracing::debug!(user_id = %user_id, "Profile updated");
        Ok(UserDto::from_user(updated, true))
    }

    async fn presence(&self, user_id: Uuid) -> Result<PresenceDto, UserError> {
        let user = self
            .user_repo
            .find_by_id(user_id)
            .await?
            .ok_or(UserError::NotFound)?;
        Ok(PresenceDto {
            user_id,
            online: self.broker.is_online(user_id),
            last_seen_at: user.last_seen_at,
        })
    }

    async fn touch_last_seen(&self, user_id: Uuid) -> Result<(), UserError> {
        self.user_repo.touch_last_seen(user_id, Utc::now()).await?;
        Ok(())
    }
}
