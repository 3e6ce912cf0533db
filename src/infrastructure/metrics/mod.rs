//! Prometheus Metrics Module
//!
//! # Metrics Collected
//! - HTTP request counts by method, path, and status
//! - HTTP request latency histograms
//! - Active STOMP sessions
//! - Inbound STOMP frames by command
//! - Relayed call signaling frames by type
//! - Calls closed by the stale-call sweep
//! - Database pool statistics

use once_cell::sync::Lazy;
use prometheus::{
    Encoder, GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};

const NAMESPACE: &str = "chat_call_server";

/// Global metrics registry
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// HTTP request counter - tracks total requests by method, path, and status code
pub static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("http_requests_total", "Total number of HTTP requests").namespace(NAMESPACE),
        &["method", "path", "status"],
    )
    .expect("valid metric definition")
});

/// HTTP request latency histogram - tracks request duration in seconds
pub static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let buckets = vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0];
    HistogramVec::new(
        HistogramOpts::new("http_request_duration_seconds", "HTTP request latency in seconds")
            .namespace(NAMESPACE)
            .buckets(buckets),
        &["method", "path"],
    )
    .expect("valid metric definition")
});

/// Authenticated STOMP sessions on this instance
pub static STOMP_SESSIONS_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::with_opts(
        Opts::new("stomp_sessions_active", "Number of authenticated STOMP sessions")
            .namespace(NAMESPACE),
    )
    .expect("valid metric definition")
});

/// Frames received from clients, by STOMP command
pub static STOMP_FRAMES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("stomp_frames_total", "Inbound STOMP frames").namespace(NAMESPACE),
        &["command"],
    )
    .expect("valid metric definition")
});

/// Call signaling frames relayed, by signal type and outcome
pub static SIGNALS_RELAYED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("signals_relayed_total", "Call signaling frames relayed").namespace(NAMESPACE),
        &["type", "outcome"],
    )
    .expect("valid metric definition")
});

/// Calls closed by the sweep, by resulting status
pub static CALLS_SWEPT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("calls_swept_total", "Stale calls closed by the sweep").namespace(NAMESPACE),
        &["status"],
    )
    .expect("valid metric definition")
});

/// Database connection pool stats
pub static DB_POOL_CONNECTIONS: Lazy<GaugeVec> = Lazy::new(|| {
    GaugeVec::new(
        Opts::new("db_pool_connections", "Database connection pool statistics").namespace(NAMESPACE),
        &["state"], // "idle", "active", "max"
    )
    .expect("valid metric definition")
});

/// Register all metrics with the registry
fn register_metrics(registry: &Registry) {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(HTTP_REQUESTS_TOTAL.clone()),
        Box::new(HTTP_REQUEST_DURATION_SECONDS.clone()),
        Box::new(STOMP_SESSIONS_ACTIVE.clone()),
        Box::new(STOMP_FRAMES_TOTAL.clone()),
        Box::new(SIGNALS_RELAYED_TOTAL.clone()),
        Box::new(CALLS_SWEPT_TOTAL.clone()),
        Box::new(DB_POOL_CONNECTIONS.clone()),
    ];
    for collector in collectors {
        if let Err(e) = registry.register(collector) {
            tracing::error!(error = %e, "Failed to register metric");
        }
    }
}

/// Collect and encode all metrics as Prometheus text format
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!(error = %e, "Failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Helper to record HTTP request metrics
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status.to_string()])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path])
        .observe(duration_secs);
}

pub fn set_stomp_sessions(count: usize) {
    STOMP_SESSIONS_ACTIVE.set(count as i64);
}

pub fn record_stomp_frame(command: &str) {
    STOMP_FRAMES_TOTAL.with_label_values(&[command]).inc();
}

pub fn record_signal(kind: &str, outcome: &str) {
    SIGNALS_RELAYED_TOTAL.with_label_values(&[kind, outcome]).inc();
}

pub fn record_swept_calls(status: &str, count: usize) {
    CALLS_SWEPT_TOTAL
        .with_label_values(&[status])
        .inc_by(count as u64);
}

/// Helper to update database pool stats
pub fn update_db_pool_stats(idle: u32, active: u32, max: u32) {
    DB_POOL_CONNECTIONS.with_label_values(&["idle"]).set(idle as f64);
    DB_POOL_CONNECTIONS.with_label_values(&["active"]).set(active as f64);
    DB_POOL_CONNECTIONS.with_label_values(&["max"]).set(max as f64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gather_metrics() {
        record_stomp_frame("CONNECT");
        let metrics = gather_metrics();
        assert!(metrics.contains("chat_call_server_stomp_frames_total"));
    }

    #[test]
    fn test_record_http_request() {
        record_http_request("GET", "/health", 200, 0.001);
        let metrics = gather_metrics();
        assert!(metrics.contains("http_requests_total"));
    }

    #[test]
    fn test_record_signal_and_sweep() {
        record_signal("offer", "delivered");
        record_swept_calls("missed", 2);
        let metrics = gather_metrics();
        assert!(metrics.contains("signals_relayed_total"));
        assert!(metrics.contains("calls_swept_total"));
    }
}
