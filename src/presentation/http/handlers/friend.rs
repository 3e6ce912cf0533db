//! Friend Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::application::dto::request::SearchQuery;
use crate::application::dto::response::{CountResponse, UserSummaryDto};
use crate::application::services::FriendService;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct FriendshipResponse {
    pub friends: bool,
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<UserSummaryDto>>, AppError> {
    Ok(Json(state.friend_service().list(auth.user_id).await?))
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserSummaryDto>>, AppError> {
    Ok(Json(state.friend_service().search(auth.user_id, query.q).await?))
}

pub async fn count(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<CountResponse>, AppError> {
    let count = state.friend_service().count(auth.user_id).await?;
    Ok(Json(CountResponse { count }))
}

pub async fn check(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(other_id): Path<Uuid>,
) -> Result<Json<FriendshipResponse>, AppError> {
    let friends = state.friend_service().are_friends(auth.user_id, other_id).await?;
    Ok(Json(FriendshipResponse { friends }))
}

/// Users the caller could send a friend request to
pub async fn search_users(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<UserSummaryDto>>, AppError> {
    Ok(Json(state.friend_service().search_users(auth.user_id, query.q).await?))
}

pub async fn remove(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(friend_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.friend_service().remove(auth.user_id, friend_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
