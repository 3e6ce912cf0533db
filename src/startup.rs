//! Application Startup
//!
//! Application state, service wiring, background sweeps and server
//! initialization.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::FromRef;
use axum::Router;
use redis::aio::ConnectionManager;
use sqlx::PgPool;
use tokio::net::TcpListener;

use crate::application::events::RealtimeBroker;
use crate::application::services::{
    AuthService, AuthServiceImpl, CallService, CallServiceImpl, ConversationServiceImpl,
    FriendRequestServiceImpl, FriendServiceImpl, MessageServiceImpl, TokenVerifier,
    UserServiceImpl,
};
use crate::config::Settings;
use crate::infrastructure::cache::{self, PresenceCacheService, TypingCacheService};
use crate::infrastructure::database;
use crate::infrastructure::metrics;
use crate::infrastructure::repositories::{
    PgCallRepository, PgConversationRepository, PgFriendRequestRepository, PgFriendshipRepository,
    PgMessageRepository, PgRefreshTokenRepository, PgUserRepository,
};
use crate::presentation::http::{handlers, routes};
use crate::presentation::middleware::{cors, logging};
use crate::presentation::websocket::Gateway;
use crate::shared::error::AppError;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    /// Absent only when the router is built without Redis (router tests)
    pub redis: Option<ConnectionManager>,
    pub gateway: Arc<Gateway>,
    pub settings: Arc<Settings>,
    pub verifier: TokenVerifier,
}

impl FromRef<AppState> for TokenVerifier {
    fn from_ref(state: &AppState) -> Self {
        state.verifier.clone()
    }
}

pub type AppAuthService = AuthServiceImpl<PgUserRepository, PgRefreshTokenRepository>;
pub type AppUserService = UserServiceImpl<PgUserRepository>;
pub type AppFriendRequestService =
    FriendRequestServiceImpl<PgFriendRequestRepository, PgFriendshipRepository, PgUserRepository>;
pub type AppFriendService = FriendServiceImpl<PgFriendshipRepository, PgUserRepository>;
pub type AppConversationService = ConversationServiceImpl<
    PgConversationRepository,
    PgFriendshipRepository,
    PgUserRepository,
    PgMessageRepository,
>;
pub type AppMessageService =
    MessageServiceImpl<PgMessageRepository, PgConversationRepository, PgFriendshipRepository>;
pub type AppCallService = CallServiceImpl<PgCallRepository, PgConversationRepository>;

impl AppState {
    pub fn new(db: PgPool, redis: Option<ConnectionManager>, settings: Settings) -> Self {
        let gateway = Arc::new(Gateway::new(settings.websocket.heartbeat_interval_ms));
        let verifier = TokenVerifier::new(&settings.jwt.secret);
        Self {
            db,
            redis,
            gateway,
            settings: Arc::new(settings),
            verifier,
        }
    }

    pub fn broker(&self) -> Arc<dyn RealtimeBroker> {
        self.gateway.clone()
    }

    pub fn auth_service(&self) -> AppAuthService {
        AuthServiceImpl::new(
            Arc::new(PgUserRepository::new(self.db.clone())),
            Arc::new(PgRefreshTokenRepository::new(self.db.clone())),
            self.settings.jwt.clone(),
            self.settings.oauth.clone(),
        )
    }

    pub fn user_service(&self) -> AppUserService {
        UserServiceImpl::new(Arc::new(PgUserRepository::new(self.db.clone())), self.broker())
    }

    pub fn friend_request_service(&self) -> AppFriendRequestService {
        FriendRequestServiceImpl::new(
            Arc::new(PgFriendRequestRepository::new(self.db.clone())),
            Arc::new(PgFriendshipRepository::new(self.db.clone())),
            Arc::new(PgUserRepository::new(self.db.clone())),
            self.broker(),
        )
    }

    pub fn friend_service(&self) -> AppFriendService {
        FriendServiceImpl::new(
            Arc::new(PgFriendshipRepository::new(self.db.clone())),
            Arc::new(PgUserRepository::new(self.db.clone())),
            self.broker(),
        )
    }

    pub fn conversation_service(&self) -> AppConversationService {
        ConversationServiceImpl::new(
            Arc::new(PgConversationRepository::new(self.db.clone())),
            Arc::new(PgFriendshipRepository::new(self.db.clone())),
            Arc::new(PgUserRepository::new(self.db.clone())),
            Arc::new(PgMessageRepository::new(self.db.clone())),
            self.broker(),
        )
    }

    pub fn message_service(&self) -> AppMessageService {
        MessageServiceImpl::new(
            Arc::new(PgMessageRepository::new(self.db.clone())),
            Arc::new(PgConversationRepository::new(self.db.clone())),
            Arc::new(PgFriendshipRepository::new(self.db.clone())),
            self.broker(),
        )
    }

    pub fn call_service(&self) -> AppCallService {
        CallServiceImpl::new(
            Arc::new(PgCallRepository::new(self.db.clone())),
            Arc::new(PgConversationRepository::new(self.db.clone())),
            self.broker(),
            self.settings.calls.clone(),
        )
    }

    pub fn typing_cache(&self) -> Result<TypingCacheService, AppError> {
        let redis = self
            .redis
            .clone()
            .ok_or_else(|| AppError::Internal("Redis is not configured".into()))?;
        Ok(TypingCacheService::new(redis, self.settings.presence.typing_ttl_secs))
    }

    pub fn presence_cache(&self) -> Option<PresenceCacheService> {
        self.redis.clone().map(PresenceCacheService::new)
    }
}

/// Application instance
pub struct Application {
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application from settings
    pub async fn build(settings: Settings) -> Result<Self> {
        handlers::health::init_server_start();

        let db = database::create_pool(&settings.database)
            .await
            .context("Failed to connect to PostgreSQL")?;
        tracing::info!("Database connection pool created");

        if settings.database.run_migrations {
            database::run_migrations(&db)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations applied");
        }

        let redis = cache::create_redis_client(&settings.redis)
            .await
            .context("Failed to connect to Redis")?;

        let addr = settings.server_addr();
        let state = AppState::new(db, Some(redis), settings);

        let router = routes::create_router(state.clone())
            .layer(logging::create_trace_layer())
            .layer(cors::create_cors_layer(&state.settings.cors));

        spawn_call_sweep(state.clone());
        spawn_token_sweep(state.clone());

        let listener = TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        tracing::info!("Listening on {}", addr);

        Ok(Self { listener, router })
    }

    /// Run the server until stopped
    pub async fn run_until_stopped(self) -> Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await?;
        Ok(())
    }

    /// Get the bound address
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Close calls left ringing or ongoing for too long
fn spawn_call_sweep(state: AppState) {
    let period = state.settings.calls.sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match state.call_service().cleanup_expired().await {
                Ok(report) => {
                    metrics::record_swept_calls("missed", report.missed);
                    metrics::record_swept_calls("ended", report.ended);
                }
                Err(e) => tracing::warn!(error = %e, "Call sweep failed"),
            }
        }
    });
}

/// Delete expired and revoked refresh tokens
fn spawn_token_sweep(state: AppState) {
    let period = state.settings.jwt.token_sweep_interval();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            match state.auth_service().purge_expired_tokens().await {
                Ok(0) => {}
                Ok(purged) => tracing::info!(purged, "Refresh tokens purged"),
                Err(e) => tracing::warn!(error = %e, "Refresh token sweep failed"),
            }
        }
    });
}
