//! Route Configuration
//!
//! Configures all HTTP routes for the API.

use axum::{
    extract::State,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use tower_http::compression::CompressionLayer;

use super::handlers;
use crate::infrastructure::metrics;
use crate::presentation::middleware::{auth_middleware, track_metrics};
use crate::presentation::websocket::ws_handler;
use crate::startup::AppState;

/// Create the main API router
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .nest("/api/v1", api_routes(state.clone()))
        // STOMP endpoint; the CONNECT frame carries the token
        .route("/ws", get(ws_handler))
        // Health check endpoints
        .route("/health", get(handlers::health::health_check))
        .route("/health/live", get(handlers::health::liveness))
        .route("/health/ready", get(handlers::health::readiness))
        // Prometheus metrics endpoint
        .route("/metrics", get(metrics_handler))
        .route_layer(middleware::from_fn(track_metrics))
        .layer(CompressionLayer::new())
        .with_state(state)
}

/// Prometheus metrics endpoint handler
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    let size = state.db.size();
    let idle = state.db.num_idle() as u32;
    metrics::update_db_pool_stats(
        idle,
        size.saturating_sub(idle),
        state.settings.database.max_connections,
    );

    (
        [(
            axum::http::header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        metrics::gather_metrics(),
    )
}

/// API v1 routes
fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        // Public routes
        .nest("/auth", auth_routes())
        // Protected routes (require authentication)
        .nest("/users", user_routes(state.clone()))
        .nest("/friend-requests", friend_request_routes(state.clone()))
        .nest("/friends", friend_routes(state.clone()))
        .nest("/conversations", conversation_routes(state.clone()))
        .nest("/messages", message_routes(state.clone()))
        .nest("/calls", call_routes(state))
}

/// Authentication routes (public)
fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/signup", post(handlers::auth::signup))
        .route("/login", post(handlers::auth::login))
        .route("/check-email", post(handlers::auth::check_email))
        .route("/refresh", post(handlers::auth::refresh))
        .route("/logout", post(handlers::auth::logout))
        .route("/oauth2/{provider}", post(handlers::auth::oauth_login))
}

fn user_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/me",
            get(handlers::user::get_me).patch(handlers::user::update_me),
        )
        .route("/{user_id}", get(handlers::user::get_user))
        .route("/{user_id}/presence", get(handlers::user::get_presence))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn friend_request_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::friend_request::send))
        .route("/sent", get(handlers::friend_request::list_sent))
        .route("/received", get(handlers::friend_request::list_received))
        .route("/count", get(handlers::friend_request::count_pending))
        .route("/check/{receiver_id}", get(handlers::friend_request::check_pending))
        .route("/respond", post(handlers::friend_request::respond))
        .route("/{request_id}", delete(handlers::friend_request::cancel))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn friend_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::friend::list))
        .route("/search", get(handlers::friend::search))
        .route("/count", get(handlers::friend::count))
        .route("/check/{user_id}", get(handlers::friend::check))
        .route("/search-users", get(handlers::friend::search_users))
        .route("/{friend_id}", delete(handlers::friend::remove))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn conversation_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(handlers::conversation::create).get(handlers::conversation::list),
        )
        .route("/search", get(handlers::conversation::search))
        .route("/direct", post(handlers::conversation::direct))
        .route(
            "/{conversation_id}",
            get(handlers::conversation::get)
                .put(handlers::conversation::update)
                .delete(handlers::conversation::delete),
        )
        .route(
            "/{conversation_id}/members",
            post(handlers::conversation::add_member),
        )
        .route(
            "/{conversation_id}/members/{member_id}",
            delete(handlers::conversation::remove_member),
        )
        .route(
            "/{conversation_id}/members/{member_id}/role",
            put(handlers::conversation::update_member_role),
        )
        .route("/{conversation_id}/leave", post(handlers::conversation::leave))
        .route("/{conversation_id}/typing", get(handlers::conversation::typing))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn message_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::message::send))
        .route(
            "/conversation/{conversation_id}",
            get(handlers::message::list),
        )
        .route(
            "/conversation/{conversation_id}/after",
            get(handlers::message::list_after),
        )
        .route(
            "/conversation/{conversation_id}/unread-count",
            get(handlers::message::unread_count),
        )
        .route(
            "/conversation/{conversation_id}/search",
            get(handlers::message::search),
        )
        .route(
            "/conversation/{conversation_id}/read",
            post(handlers::message::mark_conversation_read),
        )
        .route(
            "/{message_id}",
            get(handlers::message::get)
                .put(handlers::message::edit)
                .delete(handlers::message::delete),
        )
        .route("/{message_id}/read", post(handlers::message::mark_read))
        .route("/{message_id}/reads", get(handlers::message::reads))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}

fn call_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::call::create))
        .route("/user", get(handlers::call::list_by_user))
        .route("/active/user", get(handlers::call::list_active_by_user))
        .route("/history", get(handlers::call::history))
        .route("/cleanup", post(handlers::call::cleanup))
        .route(
            "/conversation/{conversation_id}",
            get(handlers::call::list_by_conversation),
        )
        .route(
            "/active/conversation/{conversation_id}",
            get(handlers::call::list_active_by_conversation),
        )
        .route("/{call_id}", get(handlers::call::get))
        .route("/{call_id}/status", put(handlers::call::update_status))
        .route("/{call_id}/end", put(handlers::call::end))
        .route("/{call_id}/join", post(handlers::call::join))
        .route("/{call_id}/leave", post(handlers::call::leave))
        .route("/{call_id}/participants", get(handlers::call::participants))
        .route_layer(middleware::from_fn_with_state(state, auth_middleware))
}
