//! Authentication API Tests

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use serde_json::json;
use uuid::Uuid;

use crate::common::{access_token, expired_token, json_body, unique_email, unique_username, TestApp};

#[tokio::test]
async fn test_signup_with_invalid_email_fails() {
    let app = TestApp::new();
    let body = json!({
        "username": unique_username(),
        "email": "not-an-email",
        "password": "ValidPassword123!"
    });

    let (status, body) = json_body(app.post_json("/api/v1/auth/signup", &body).await).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "email");
}

#[tokio::test]
async fn test_signup_with_short_password_fails() {
    let app = TestApp::new();
    let body = json!({
        "username": unique_username(),
        "email": unique_email(),
        "password": "short"
    });

    let (status, body) = json_body(app.post_json("/api/v1/auth/signup", &body).await).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "password");
}

#[tokio::test]
async fn test_login_with_malformed_json_is_rejected() {
    let app = TestApp::new();

    let response = app
        .post_json("/api/v1/auth/login", &json!({ "email": 42 }))
        .await;

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_oauth_provider_is_rejected() {
    let app = TestApp::new();

    let (status, _) = json_body(
        app.post_json("/api/v1/auth/oauth2/github", &json!({ "assertion": "token" }))
            .await,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_oauth_without_assertion_secret_is_rejected() {
    let app = TestApp::new();

    let (status, _) = json_body(
        app.post_json("/api/v1/auth/oauth2/google", &json!({ "assertion": "token" }))
            .await,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_protected_route_requires_token() {
    let app = TestApp::new();

    let (status, body) = json_body(app.get("/api/v1/users/me").await).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn test_garbage_token_is_rejected() {
    let app = TestApp::new();

    let response = app.get_auth("/api/v1/friends", "not-a-jwt").await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let app = TestApp::new();
    let token = expired_token(Uuid::now_v7());

    let response = app.get_auth("/api/v1/conversations", &token).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_signed_with_other_secret_is_rejected() {
    let app = TestApp::new();
    let claims = json!({
        "sub": Uuid::now_v7().to_string(),
        "exp": chrono::Utc::now().timestamp() + 600,
        "iat": chrono::Utc::now().timestamp(),
        "jti": Uuid::new_v4().to_string(),
    });
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"another-secret-key-with-at-least-32-chars"),
    )
    .unwrap();

    let response = app.get_auth("/api/v1/calls/user", &token).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

/// A valid token passes the middleware; the body is rejected before storage
#[tokio::test]
async fn test_valid_token_reaches_handler() {
    let app = TestApp::new();
    let token = access_token(Uuid::now_v7());
    let body = json!({ "type": "group", "title": "", "member_ids": [] });

    let (status, body) = json_body(
        app.post_json_auth("/api/v1/conversations", &body, &token)
            .await,
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"][0]["field"], "title");
}
