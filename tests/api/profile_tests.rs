//! Profile and Friend Request Validation Tests

use axum::http::{header, HeaderValue, StatusCode};
use fake::faker::internet::en::{FreeEmail, Username};
use fake::faker::lorem::en::Paragraph;
use fake::Fake;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::common::{access_token, TestApp};

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

#[tokio::test]
async fn test_update_profile_with_invalid_avatar_url_fails() {
    let server = TestApp::new().server();
    let token = access_token(Uuid::now_v7());

    let response = server
        .patch("/api/v1/users/me")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({
            "display_name": Username().fake::<String>(),
            "avatar_url": "not a url"
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let body: Value = response.json();
    assert_eq!(body["errors"][0]["field"], "avatar_url");
}

#[tokio::test]
async fn test_friend_request_message_too_long_fails() {
    let server = TestApp::new().server();
    let token = access_token(Uuid::now_v7());
    let message: String = Paragraph(200..300).fake();

    let response = server
        .post("/api/v1/friend-requests")
        .add_header(header::AUTHORIZATION, bearer(&token))
        .json(&json!({
            "receiver_id": Uuid::now_v7(),
            "message": message
        }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_check_email_rejects_malformed_address() {
    let server = TestApp::new().server();
    let email: String = FreeEmail().fake();

    let response = server
        .post("/api/v1/auth/check-email")
        .json(&json!({ "email": email.replace('@', "") }))
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_friend_routes_require_token() {
    let server = TestApp::new().server();

    let response = server.get("/api/v1/friend-requests/received").await;

    assert_eq!(response.status_code(), StatusCode::UNAUTHORIZED);
}
