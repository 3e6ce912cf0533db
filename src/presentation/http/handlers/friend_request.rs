//! Friend Request Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::application::dto::request::{RespondFriendRequestRequest, SendFriendRequestRequest};
use crate::application::dto::response::{CountResponse, FriendRequestDto};
use crate::application::services::FriendRequestService;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validate_body;
use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct PendingResponse {
    pub pending: bool,
}

/// Send a friend request
pub async fn send(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendFriendRequestRequest>,
) -> Result<(StatusCode, Json<FriendRequestDto>), AppError> {
    validate_body(&body)?;
    let request = state
        .friend_request_service()
        .send(auth.user_id, body.receiver_id, body.message)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

pub async fn list_sent(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<FriendRequestDto>>, AppError> {
    Ok(Json(state.friend_request_service().list_sent(auth.user_id).await?))
}

pub async fn list_received(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<FriendRequestDto>>, AppError> {
    Ok(Json(state.friend_request_service().list_received(auth.user_id).await?))
}

/// Number of pending requests received
pub async fn count_pending(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.friend_request_service().count_pending(auth.user_id).await?;
    Ok(Json(CountResponse { count }))
}

/// Whether the caller has a pending request to `receiver_id`
pub async fn check_pending(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(receiver_id): Path<Uuid>,
) -> Result<Json<PendingResponse>, AppError> {
    let pending = state
        .friend_request_service()
        .has_pending(auth.user_id, receiver_id)
        .await?;
    Ok(Json(PendingResponse { pending }))
}

/// Accept or decline a received request
pub async fn respond(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<RespondFriendRequestRequest>,
) -> Result<Json<FriendRequestDto>, AppError> {
    let request = state
        .friend_request_service()
        .respond(auth.user_id, body.request_id, body.action)
        .await?;
    Ok(Json(request))
}

/// Cancel a sent request
pub async fn cancel(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(request_id): Path<Uuid>,
) -> Result<Json<FriendRequestDto>, AppError> {
    let request = state
        .friend_request_service()
        .cancel(auth.user_id, request_id)
        .await?;
    Ok(Json(request))
}
