//! Authentication Handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};

use crate::application::dto::request::{
    CheckEmailRequest, LoginRequest, OAuthLoginRequest, RefreshTokenRequest, SignupRequest,
};
use crate::application::dto::response::{
    AuthResponse, EmailAvailabilityResponse, TokenResponse, UserDto,
};
use crate::application::services::{AuthError, AuthService};
use crate::domain::AuthProvider;
use crate::shared::error::AppError;
use crate::shared::validation::validate_body;
use crate::startup::AppState;

/// Register a new local account
pub async fn signup(
    State(state): State<AppState>,
    Json(body): Json<SignupRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AppError> {
    validate_body(&body)?;

    let (user, tokens) = state
        .auth_service()
        .signup(&body.username, &body.email, &body.password, body.display_name)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserDto::from_user(user, true),
            tokens,
        }),
    ))
}

/// Login with email and password
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    validate_body(&body)?;

    let (user, tokens) = state
        .auth_service()
        .login(&body.email, &body.password)
        .await?;

    Ok(Json(AuthResponse {
        user: UserDto::from_user(user, true),
        tokens,
    }))
}

pub async fn check_email(
    State(state): State<AppState>,
    Json(body): Json<CheckEmailRequest>,
) -> Result<Json<EmailAvailabilityResponse>, AppError> {
    validate_body(&body)?;

    let available = state.auth_service().check_email(&body.email).await?;
    Ok(Json(EmailAvailabilityResponse { available }))
}

/// Rotate a refresh token into a new token pair
pub async fn refresh(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    validate_body(&body)?;

    let tokens = state.auth_service().refresh(&body.refresh_token).await?;
    Ok(Json(tokens))
}

/// Revoke a refresh token
pub async fn logout(
    State(state): State<AppState>,
    Json(body): Json<RefreshTokenRequest>,
) -> Result<StatusCode, AppError> {
    state.auth_service().logout(&body.refresh_token).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Sign in with a provider assertion
pub async fn oauth_login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Json(body): Json<OAuthLoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    validate_body(&body)?;

    let provider = AuthProvider::from_str(&provider)
        .filter(AuthProvider::is_external)
        .ok_or(AuthError::UnsupportedProvider(provider))?;

    let (user, tokens) = state
        .auth_service()
        .oauth_login(provider, &body.assertion)
        .await?;

    Ok(Json(AuthResponse {
        user: UserDto::from_user(user, true),
        tokens,
    }))
}
