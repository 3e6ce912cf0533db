//! Custom Extractors
//!
//! Axum extractors for authentication and request parsing.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::{
    headers::{authorization::Bearer, Authorization},
    TypedHeader,
};

use crate::application::services::TokenVerifier;
use crate::presentation::middleware::auth::authenticate;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;

/// Reuses the user placed by `auth_middleware`, otherwise verifies the
/// bearer token itself.
impl<S> FromRequestParts<S> for AuthUser
where
    TokenVerifier: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(user) = parts.extensions.get::<AuthUser>() {
            return Ok(*user);
        }

        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized("Missing authorization header".into()))?;

        let verifier = TokenVerifier::from_ref(state);
        let user = authenticate(&verifier, bearer.token())?;
        parts.extensions.insert(user);
        Ok(user)
    }
}
