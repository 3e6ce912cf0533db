//! User Handlers

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::application::dto::request::UpdateProfileRequest;
use crate::application::dto::response::{PresenceDto, UserDto};
use crate::application::services::UserService;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validate_body;
use crate::startup::AppState;

/// Get current user
pub async fn get_me(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<UserDto>, AppError> {
    let user = state.user_service().get_me(auth.user_id).await?;
    Ok(Json(user))
}

/// Update current user
pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<UpdateProfileRequest>,
) -> Result<Json<UserDto>, AppError> {
    validate_body(&body)?;
    let user = state.user_service().update_me(auth.user_id, body).await?;
    Ok(Json(user))
}

/// Get user by ID (public profile)
pub async fn get_user(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<UserDto>, AppError> {
    let user = state.user_service().get_user(user_id).await?;
    Ok(Json(user))
}

/// Online flag and last-seen time. A local session or a live Redis marker
/// from another instance both count as online.
pub async fn get_presence(
    State(state): State<AppState>,
    _auth: AuthUser,
    Path(user_id): Path<Uuid>,
) -> Result<Json<PresenceDto>, AppError> {
    let mut presence = state.user_service().presence(user_id).await?;

    if !presence.online {
        if let Some(cache) = state.presence_cache() {
            match cache.is_online(user_id).await {
                Ok(online) => presence.online = online,
                Err(e) => tracing::warn!(user_id = %user_id, error = %e, "Presence lookup failed"),
            }
        }
    }

    Ok(Json(presence))
}
