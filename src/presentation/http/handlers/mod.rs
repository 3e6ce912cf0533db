//! HTTP Handlers
//!
//! Request handlers for all HTTP endpoints.

pub mod auth;
pub mod call;
pub mod conversation;
pub mod friend;
pub mod friend_request;
pub mod health;
pub mod message;
pub mod user;
