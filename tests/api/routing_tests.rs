//! Routing Tests
//!
//! Path shapes and extractor rejections that resolve before any storage
//! access.

use axum::http::StatusCode;
use pretty_assertions::assert_eq;
use test_case::test_case;
use uuid::Uuid;

use crate::common::{access_token, TestApp};

#[test_case("/api/v1/calls/not-a-uuid" ; "call id")]
#[test_case("/api/v1/messages/not-a-uuid" ; "message id")]
#[test_case("/api/v1/conversations/not-a-uuid" ; "conversation id")]
#[test_case("/api/v1/users/not-a-uuid/presence" ; "user id")]
#[tokio::test]
async fn test_malformed_ids_are_rejected(uri: &str) {
    let app = TestApp::new();
    let token = access_token(Uuid::now_v7());

    let response = app.get_auth(uri, &token).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_route_is_not_found() {
    let app = TestApp::new();

    let response = app.get("/api/v1/unknown").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_websocket_endpoint_requires_upgrade() {
    let app = TestApp::new();

    let response = app.get("/ws").await;

    assert!(response.status().is_client_error());
}
