//! Authentication Middleware
//!
//! Bearer token validation for protected routes.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::application::services::{AuthError, TokenVerifier};
use crate::shared::error::AppError;

/// Authenticated user extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: Uuid,
}

/// Extract the token from an `Authorization: Bearer <token>` value
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify a bearer token, mapping failures to 401
pub fn authenticate(verifier: &TokenVerifier, token: &str) -> Result<AuthUser, AppError> {
    verifier
        .verify(token)
        .map(|user_id| AuthUser { user_id })
        .map_err(|e| match e {
            AuthError::TokenExpired => AppError::Unauthorized("Token expired".into()),
            _ => AppError::Unauthorized("Invalid token".into()),
        })
}

/// Authentication middleware that validates JWT tokens
pub async fn auth_middleware(
    State(verifier): State<TokenVerifier>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    let token = bearer_token(auth_header)
        .ok_or_else(|| AppError::Unauthorized("Invalid authorization header format".into()))?;

    let user = authenticate(&verifier, token)?;
    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("Bearer abc", Some("abc") ; "standard")]
    #[test_case("bearer abc", Some("abc") ; "lowercase scheme")]
    #[test_case("Bearer ", None ; "empty token")]
    #[test_case("Basic abc", None ; "other scheme")]
    fn test_bearer_token(header: &str, expected: Option<&str>) {
        assert_eq!(bearer_token(header), expected);
    }

    #[test]
    fn test_garbage_token_is_unauthorized() {
        let verifier = TokenVerifier::new("test-secret-key-that-is-at-least-32-characters");
        let err = authenticate(&verifier, "not-a-jwt").unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }
}
