//! Message Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::application::dto::request::{
    EditMessageRequest, MessageListQuery, MessagesAfterQuery, SearchQuery, SendMessageRequest,
};
use crate::application::dto::response::{CountResponse, MessageDto, ReadReceiptDto};
use crate::application::services::message_service::DEFAULT_MESSAGE_PAGE_SIZE;
use crate::application::services::MessageService;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};
use crate::shared::validation::validate_body;
use crate::startup::AppState;

/// Send a message to a conversation
pub async fn send(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<SendMessageRequest>,
) -> Result<(StatusCode, Json<MessageDto>), AppError> {
    validate_body(&body)?;
    let message = state
        .message_service()
        .send(auth.user_id, body.conversation_id, body.body)
        .await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Paged history, oldest first unless `sort_dir=desc`
pub async fn list(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageListQuery>,
) -> Result<Json<Page<MessageDto>>, AppError> {
    let page = PageRequest::new(query.page, query.size, DEFAULT_MESSAGE_PAGE_SIZE);
    let messages = state
        .message_service()
        .list(auth.user_id, conversation_id, page, query.sort_dir.unwrap_or_default())
        .await?;
    Ok(Json(messages))
}

pub async fn list_after(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessagesAfterQuery>,
) -> Result<Json<Vec<MessageDto>>, AppError> {
    let messages = state
        .message_service()
        .list_after(auth.user_id, conversation_id, query.after)
        .await?;
    Ok(Json(messages))
}

pub async fn unread_count(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<CountResponse>, AppError> {
    let count = state
        .message_service()
        .unread_count(auth.user_id, conversation_id)
        .await?;
    Ok(Json(CountResponse { count }))
}

pub async fn search(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<Vec<MessageDto>>, AppError> {
    let messages = state
        .message_service()
        .search(auth.user_id, conversation_id, query.q)
        .await?;
    Ok(Json(messages))
}

/// Mark the latest message of the conversation read
pub async fn mark_conversation_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state
        .message_service()
        .mark_conversation_read(auth.user_id, conversation_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<Json<MessageDto>, AppError> {
    Ok(Json(state.message_service().get(auth.user_id, message_id).await?))
}

pub async fn edit(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
    Json(body): Json<EditMessageRequest>,
) -> Result<Json<MessageDto>, AppError> {
    validate_body(&body)?;
    let message = state
        .message_service()
        .edit(auth.user_id, message_id, body.content)
        .await?;
    Ok(Json(message))
}

pub async fn delete(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.message_service().delete(auth.user_id, message_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_read(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<Json<ReadReceiptDto>, AppError> {
    Ok(Json(state.message_service().mark_read(auth.user_id, message_id).await?))
}

pub async fn reads(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(message_id): Path<Uuid>,
) -> Result<Json<Vec<ReadReceiptDto>>, AppError> {
    Ok(Json(state.message_service().reads(auth.user_id, message_id).await?))
}
