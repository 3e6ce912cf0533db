//! Call Handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::application::dto::request::{
    CreateCallRequest, JoinCallRequest, PageQuery, UpdateCallStatusRequest,
};
use crate::application::dto::response::{CallDto, CallParticipantDto, CleanupReport};
use crate::application::services::call_service::DEFAULT_CALL_PAGE_SIZE;
use crate::application::services::CallService;
use crate::infrastructure::metrics;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::shared::pagination::{Page, PageRequest};
use crate::shared::validation::validate_body;
use crate::startup::AppState;

/// Start a call in a conversation
pub async fn create(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(body): Json<CreateCallRequest>,
) -> Result<(StatusCode, Json<CallDto>), AppError> {
    let call = state
        .call_service()
        .create(auth.user_id, body.conversation_id, body.call_type)
        .await?;
    Ok((StatusCode::CREATED, Json(call)))
}

pub async fn get(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(call_id): Path<Uuid>,
) -> Result<Json<CallDto>, AppError> {
    Ok(Json(state.call_service().get(auth.user_id, call_id).await?))
}

pub async fn update_status(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(call_id): Path<Uuid>,
    Json(body): Json<UpdateCallStatusRequest>,
) -> Result<Json<CallDto>, AppError> {
    let call = state
        .call_service()
        .update_status(auth.user_id, call_id, body.status)
        .await?;
    Ok(Json(call))
}

pub async fn end(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(call_id): Path<Uuid>,
) -> Result<Json<CallDto>, AppError> {
    Ok(Json(state.call_service().end(auth.user_id, call_id).await?))
}

/// Join a call; the body is optional
pub async fn join(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(call_id): Path<Uuid>,
    body: Option<Json<JoinCallRequest>>,
) -> Result<Json<CallParticipantDto>, AppError> {
    let Json(body) = body.unwrap_or_default();
    validate_body(&body)?;
    let participant = state
        .call_service()
        .join(auth.user_id, call_id, body.rtc_session_id)
        .await?;
    Ok(Json(participant))
}

pub async fn leave(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(call_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.call_service().leave(auth.user_id, call_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn participants(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(call_id): Path<Uuid>,
) -> Result<Json<Vec<CallParticipantDto>>, AppError> {
    Ok(Json(state.call_service().participants(auth.user_id, call_id).await?))
}

pub async fn list_by_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<CallDto>>, AppError> {
    let calls = state
        .call_service()
        .list_by_conversation(auth.user_id, conversation_id)
        .await?;
    Ok(Json(calls))
}

pub async fn list_active_by_conversation(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(conversation_id): Path<Uuid>,
) -> Result<Json<Vec<CallDto>>, AppError> {
    let calls = state
        .call_service()
        .list_active_by_conversation(auth.user_id, conversation_id)
        .await?;
    Ok(Json(calls))
}

pub async fn list_by_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<CallDto>>, AppError> {
    Ok(Json(state.call_service().list_by_user(auth.user_id).await?))
}

pub async fn list_active_by_user(
    State(state): State<AppState>,
    auth: AuthUser,
) -> Result<Json<Vec<CallDto>>, AppError> {
    Ok(Json(state.call_service().list_active_by_user(auth.user_id).await?))
}

pub async fn history(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<PageQuery>,
) -> Result<Json<Page<CallDto>>, AppError> {
    let page = PageRequest::new(query.page, query.size, DEFAULT_CALL_PAGE_SIZE);
    Ok(Json(state.call_service().history(auth.user_id, page).await?))
}

/// Run the expiry sweep now
pub async fn cleanup(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> Result<Json<CleanupReport>, AppError> {
    let report = state.call_service().cleanup_expired().await?;
    metrics::record_swept_calls("missed", report.missed);
    metrics::record_swept_calls("ended", report.ended);
    Ok(Json(report))
}
