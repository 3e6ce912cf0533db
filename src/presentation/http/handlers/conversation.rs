//! Conversation Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use uuid::Uuid;

use crate::application::dto::request::{
    AddMemberRequest, CreateConversationRequest, DirectConversationRequest, SearchQuery,
    UpdateConversationRequest, UpdateMemberRoleRequest,
};
use crate::application::dto::response::ConversationDto;
use crate::application::services::{ConversationService, MembershipError};
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::validation::validate_body;
use crate::startup::AppState;

#[derive(Debug, Serialize)]
pub struct TypingUsersResponse {
    pub conversation_id: Uuid,
    pub user_ids: Vec<Uuid>,
}

/// Create a direct or group conversation
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateConversationRequest>,
) -> Result<(StatusCode, Json<ConversationDto>), AppError> {
    validate_body(&body)?;
    let conversation = state.conversation_service().create(auth.user_id, body).await?;
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Existing direct conversation with a friend, or a new one
pub async fn direct(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<DirectConversationRequest>,
) -> Result<Json<ConversationDto>, AppError> {
    let conversation = state
        .conversation_service()
        .get_or_create_direct(auth.user_id, body.user_id)
        .await?;
    Ok(Json(conversation))
}

pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<ConversationDto>>, AppError> {
    Ok(Json(state.conversation_service().list(auth.user_id).await?))
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<ConversationDto>>, AppError> {
    Ok(Json(state.conversation_service().search(auth.user_id, query.q).await?))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<ConversationDto>, AppError> {
    Ok(Json(state.conversation_service().get(auth.user_id, conversation_id).await?))
}

pub async fn update(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<UpdateConversationRequest>,
) -> Result<Json<ConversationDto>, AppError> {
    validate_body(&body)?;
    let conversation = state
        .conversation_service()
        .update(auth.user_id, conversation_id, body)
        .await?;
    Ok(Json(conversation))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.conversation_service().delete(auth.user_id, conversation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
    Json(body): Json<AddMemberRequest>,
) -> Result<Json<ConversationDto>, AppError> {
    let conversation = state
        .conversation_service()
        .add_member(auth.user_id, conversation_id, body.user_id)
        .await?;
    Ok(Json(conversation))
}

pub async fn remove_member(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((conversation_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state
        .conversation_service()
        .remove_member(auth.user_id, conversation_id, member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_member_role(
    State(state): State<AppState>,
    auth: AuthUser,
    Path((conversation_id, member_id)): Path<(Uuid, Uuid)>,
    Json(body): Json<UpdateMemberRoleRequest>,
) -> Result<Json<ConversationDto>, AppError> {
    let conversation = state
        .conversation_service()
        .update_member_role(auth.user_id, conversation_id, member_id, body.role)
        .await?;
    Ok(Json(conversation))
}

pub async fn leave(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.conversation_service().leave(auth.user_id, conversation_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Users currently typing in the conversation
pub async fn typing(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<TypingUsersResponse>, AppError> {
    if !state
        .conversation_service()
        .is_member(auth.user_id, conversation_id)
        .await?
    {
        return Err(MembershipError::NotMember.into());
    }

    let user_ids = state
        .typing_cache()?
        .typing_users(conversation_id)
        .await?
        .into_iter()
        .filter(|id| *id != auth.user_id)
        .collect();

    Ok(Json(TypingUsersResponse {
        conversation_id,
        user_ids,
    }))
}
