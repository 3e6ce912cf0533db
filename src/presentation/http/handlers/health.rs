//! Health Check Handlers
//!
//! # Endpoints
//! - `GET /health` - Basic health check
//! - `GET /health/live` - Liveness probe (is the process serving?)
//! - `GET /health/ready` - Readiness probe (are PostgreSQL and Redis reachable?)

use std::time::{Duration, Instant};

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::startup::AppState;

static SERVER_START: Lazy<Instant> = Lazy::new(Instant::now);
static SERVER_START_TIME: Lazy<DateTime<Utc>> = Lazy::new(Utc::now);

/// Dependency checks give up after this long
const CHECK_TIMEOUT: Duration = Duration::from_secs(2);

/// Pin the start time (call during startup)
pub fn init_server_start() {
    Lazy::force(&SERVER_START);
    Lazy::force(&SERVER_START_TIME);
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub status: HealthStatus,
    pub version: &'static str,
    pub uptime_seconds: u64,
    pub started_at: String,
    pub checks: HealthChecks,
}

#[derive(Debug, Serialize)]
pub struct HealthChecks {
    pub database: ServiceHealth,
    pub redis: ServiceHealth,
    pub websocket: GatewayHealth,
}

#[derive(Debug, Serialize)]
pub struct ServiceHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ServiceHealth {
    fn up(latency: Duration, degraded_after: Duration) -> Self {
        Self {
            status: if latency < degraded_after {
                HealthStatus::Healthy
            } else {
                HealthStatus::Degraded
            },
            latency_ms: Some(latency.as_millis() as u64),
            message: None,
        }
    }

    fn down(message: String) -> Self {
        Self {
            status: HealthStatus::Unhealthy,
            latency_ms: None,
            message: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GatewayHealth {
    pub active_sessions: usize,
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Serialize)]
pub struct LivenessResponse {
    pub status: &'static str,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub async fn liveness() -> Json<LivenessResponse> {
    Json(LivenessResponse { status: "alive" })
}

/// 200 while the database is reachable, 503 otherwise. Redis trouble only
/// degrades the status.
pub async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let database = check_database(&state).await;
    let redis = check_redis(&state).await;
    let status = overall_status(&database, &redis);

    let response = ReadinessResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_seconds: SERVER_START.elapsed().as_secs(),
        started_at: SERVER_START_TIME.to_rfc3339(),
        checks: HealthChecks {
            database,
            redis,
            websocket: GatewayHealth {
                active_sessions: state.gateway.session_count(),
            },
        },
    };

    let code = match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (code, Json(response))
}

async fn check_database(state: &AppState) -> ServiceHealth {
    let start = Instant::now();
    let ping = sqlx::query("SELECT 1").execute(&state.db);
    match tokio::time::timeout(CHECK_TIMEOUT, ping).await {
        Ok(Ok(_)) => ServiceHealth::up(start.elapsed(), Duration::from_millis(100)),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Database health check failed");
            ServiceHealth::down("Database connection failed".into())
        }
        Err(_) => ServiceHealth::down("Database check timed out".into()),
    }
}

async fn check_redis(state: &AppState) -> ServiceHealth {
    let Some(mut conn) = state.redis.clone() else {
        return ServiceHealth::down("Redis is not configured".into());
    };

    let start = Instant::now();
    let cmd = redis::cmd("PING");
    let ping = cmd.query_async::<String>(&mut conn);
    match tokio::time::timeout(CHECK_TIMEOUT, ping).await {
        Ok(Ok(_)) => ServiceHealth::up(start.elapsed(), Duration::from_millis(50)),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "Redis health check failed");
            ServiceHealth::down("Redis connection failed".into())
        }
        Err(_) => ServiceHealth::down("Redis check timed out".into()),
    }
}

fn overall_status(database: &ServiceHealth, redis: &ServiceHealth) -> HealthStatus {
    if database.status == HealthStatus::Unhealthy {
        return HealthStatus::Unhealthy;
    }
    if database.status == HealthStatus::Degraded || redis.status != HealthStatus::Healthy {
        return HealthStatus::Degraded;
    }
    HealthStatus::Healthy
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn service(status: HealthStatus) -> ServiceHealth {
        ServiceHealth {
            status,
            latency_ms: None,
            message: None,
        }
    }

    #[test]
    fn test_health_status_serialization() {
        let json = serde_json::to_string(&HealthStatus::Degraded).unwrap();
        assert_eq!(json, "\"degraded\"");
    }

    #[test_case(HealthStatus::Healthy, HealthStatus::Healthy, HealthStatus::Healthy ; "all up")]
    #[test_case(HealthStatus::Healthy, HealthStatus::Unhealthy, HealthStatus::Degraded ; "redis down")]
    #[test_case(HealthStatus::Degraded, HealthStatus::Healthy, HealthStatus::Degraded ; "slow database")]
    #[test_case(HealthStatus::Unhealthy, HealthStatus::Healthy, HealthStatus::Unhealthy ; "database down")]
    fn test_overall_status(database: HealthStatus, redis: HealthStatus, expected: HealthStatus) {
        assert_eq!(overall_status(&service(database), &service(redis)), expected);
    }

    #[test]
    fn test_slow_dependency_is_degraded() {
        let health = ServiceHealth::up(Duration::from_millis(150), Duration::from_millis(100));
        assert_eq!(health.status, HealthStatus::Degraded);
        assert_eq!(health.latency_ms, Some(150));
    }
}
