//! Application settings and configuration structures.

use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

/// Root configuration structure containing all application settings.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Server configuration (host, port)
    pub server: ServerSettings,

    /// Database configuration (PostgreSQL)
    pub database: DatabaseSettings,

    /// Redis configuration (presence and typing caches)
    pub redis: RedisSettings,

    /// JWT and refresh token settings
    pub jwt: JwtSettings,

    /// CORS configuration
    pub cors: CorsSettings,

    /// STOMP WebSocket configuration
    pub websocket: WebSocketSettings,

    /// Call lifecycle timers
    pub calls: CallSettings,

    /// Presence and typing indicator settings
    pub presence: PresenceSettings,

    /// OAuth2 identity assertion settings
    #[serde(default)]
    pub oauth: OAuthSettings,

    /// Current environment (development, staging, production)
    pub environment: String,
}

/// Server binding configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Host address to bind to (e.g., "0.0.0.0")
    pub host: String,

    /// Port number to listen on
    pub port: u16,
}

/// PostgreSQL database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    /// Database connection URL
    pub url: String,

    /// Maximum number of connections in the pool
    pub max_connections: u32,

    /// Minimum number of connections to maintain
    pub min_connections: u32,

    /// Connection acquire timeout in seconds
    pub acquire_timeout: u64,

    /// Apply the bundled schema on startup
    pub run_migrations: bool,
}

/// Redis configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RedisSettings {
    /// Redis connection URL
    pub url: String,
}

/// JWT authentication configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtSettings {
    /// Secret key for signing tokens
    pub secret: String,

    /// Access token expiry in minutes
    pub access_token_expiry_minutes: i64,

    /// Refresh token expiry in days
    pub refresh_token_expiry_days: i64,

    /// How often expired and revoked refresh tokens are purged, in seconds
    pub token_sweep_interval_secs: u64,
}

/// CORS configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CorsSettings {
    /// Allowed origins (comma-separated in env)
    pub allowed_origins: Vec<String>,
}

/// WebSocket configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct WebSocketSettings {
    /// Maximum message size in bytes (default: 64KB)
    pub max_message_size: usize,

    /// Maximum frame size in bytes (default: 16KB)
    pub max_frame_size: usize,

    /// Heart-beat interval advertised in CONNECTED, in milliseconds
    pub heartbeat_interval_ms: u64,

    /// Time allowed between upgrade and a valid CONNECT frame, in seconds
    pub connect_timeout_secs: u64,
}

/// Call lifecycle configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CallSettings {
    /// Interval of the stale call sweep, in seconds
    pub sweep_interval_secs: u64,

    /// Ringing calls older than this become missed
    pub ringing_timeout_secs: i64,

    /// Ongoing calls older than this are ended by the sweep
    pub ongoing_timeout_secs: i64,

    /// An ongoing call older than this is ended when a new call is started
    pub stale_ongoing_takeover_secs: i64,
}

/// Presence configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceSettings {
    /// Lifetime of a typing indicator, in seconds
    pub typing_ttl_secs: u64,
}

/// OAuth2 assertion configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OAuthSettings {
    /// Shared secret used to verify identity assertions. OAuth login is
    /// disabled when unset.
    pub assertion_secret: Option<String>,
}

/// Minimum required length for JWT secret (256 bits = 32 bytes)
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

impl Settings {
    /// Load settings from environment variables and configuration files.
    ///
    /// The loading order is:
    /// 1. config/default.toml (base configuration)
    /// 2. config/{RUN_ENV}.toml (environment-specific overrides)
    /// 3. Environment variables (highest priority)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if configuration cannot be loaded or parsed,
    /// or if a secret is too short.
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let environment = std::env::var("RUN_ENV").unwrap_or_else(|_| "development".into());

        let settings: Self = Self::defaults(&environment)?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", environment)).required(false))
            // APP__SERVER__PORT=3000 -> server.port = 3000
            .add_source(
                Environment::default()
                    .prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("server.host", std::env::var("SERVER_HOST").ok())?
            .set_override_option("server.port", std::env::var("SERVER_PORT").ok())?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("redis.url", std::env::var("REDIS_URL").ok())?
            .set_override_option("jwt.secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "oauth.assertion_secret",
                std::env::var("OAUTH_ASSERTION_SECRET").ok(),
            )?
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn defaults(
        environment: &str,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("environment", environment)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?
            .set_default("database.max_connections", 10)?
            .set_default("database.min_connections", 2)?
            .set_default("database.acquire_timeout", 30)?
            .set_default("database.run_migrations", true)?
            .set_default("redis.url", "redis://127.0.0.1:6379")?
            .set_default("jwt.access_token_expiry_minutes", 15)?
            .set_default("jwt.refresh_token_expiry_days", 7)?
            .set_default("jwt.token_sweep_interval_secs", 3600)?
            .set_default("cors.allowed_origins", vec!["http://localhost:3000"])?
            .set_default("websocket.max_message_size", 65536_i64)?
            .set_default("websocket.max_frame_size", 16384_i64)?
            .set_default("websocket.heartbeat_interval_ms", 10000_i64)?
            .set_default("websocket.connect_timeout_secs", 30_i64)?
            .set_default("calls.sweep_interval_secs", 30)?
            .set_default("calls.ringing_timeout_secs", 60)?
            .set_default("calls.ongoing_timeout_secs", 1800)?
            .set_default("calls.stale_ongoing_takeover_secs", 300)?
            .set_default("presence.typing_ttl_secs", 5)
    }

    /// Reject configurations that would run insecurely or not at all.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt.secret.len() < MIN_JWT_SECRET_LENGTH {
            return Err(ConfigError::Message(format!(
                "JWT secret must be at least {} characters. Current length: {}",
                MIN_JWT_SECRET_LENGTH,
                self.jwt.secret.len()
            )));
        }
        if let Some(secret) = &self.oauth.assertion_secret {
            if secret.len() < MIN_JWT_SECRET_LENGTH {
                return Err(ConfigError::Message(format!(
                    "OAuth assertion secret must be at least {} characters",
                    MIN_JWT_SECRET_LENGTH
                )));
            }
        }
        if self.calls.sweep_interval_secs == 0 || self.jwt.token_sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "sweep intervals must be greater than zero".into(),
            ));
        }
        if self.websocket.heartbeat_interval_ms == 0 {
            return Err(ConfigError::Message(
                "websocket.heartbeat_interval_ms must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Get the full server address as a string.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// Whether the server runs in production mode.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl CallSettings {
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl JwtSettings {
    pub fn token_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.token_sweep_interval_secs)
    }
}

#[cfg(test)]
pub(crate) fn test_settings() -> Settings {
    Settings {
        server: ServerSettings {
            host: "127.0.0.1".into(),
            port: 0,
        },
        database: DatabaseSettings {
            url: "postgres://localhost/chat_test".into(),
            max_connections: 1,
            min_connections: 0,
            acquire_timeout: 1,
            run_migrations: false,
        },
        redis: RedisSettings {
            url: "redis://127.0.0.1:6379".into(),
        },
        jwt: JwtSettings {
            secret: "test-secret-key-that-is-at-least-32-characters".into(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
            token_sweep_interval_secs: 3600,
        },
        cors: CorsSettings {
            allowed_origins: vec!["http://localhost:3000".into()],
        },
        websocket: WebSocketSettings {
            max_message_size: 65536,
            max_frame_size: 16384,
            heartbeat_interval_ms: 10000,
            connect_timeout_secs: 30,
        },
        calls: CallSettings {
            sweep_interval_secs: 30,
            ringing_timeout_secs: 60,
            ongoing_timeout_secs: 1800,
            stale_ongoing_takeover_secs: 300,
        },
        presence: PresenceSettings { typing_ttl_secs: 5 },
        oauth: OAuthSettings {
            assertion_secret: None,
        },
        environment: "test".into(),
    }
}
