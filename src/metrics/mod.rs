//! Prometheus metrics for the coordination plane, exposed over the admin
//! HTTP surface (`/metrics`) — not the RPC transport.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use lazy_static::lazy_static;
use prometheus::{CounterVec, Encoder, Opts, Registry, TextEncoder};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref REGISTRY_REFRESH_TOTAL: CounterVec = {
        let c = CounterVec::new(
            Opts::new("registry_refresh_total", "Refresh calls handled, by group and outcome"),
            &["group", "outcome"],
        ).unwrap();
        REGISTRY.register(Box::new(c.clone())).unwrap();
        c
    };

    pub static ref REGISTRY_EVICTIONS_TOTAL: CounterVec = {
        let c = CounterVec::new(
            Opts::new("registry_evictions_total", "Instances evicted by the liveness monitor, by group"),
            &["group"],
        ).unwrap();
        REGISTRY.register(Box::new(c.clone())).unwrap();
        c
    };

    pub static ref REGISTRY_LOCK_BUSY_TOTAL: CounterVec = {
        let c = CounterVec::new(
            Opts::new("registry_lock_busy_total", "Lock acquisitions exhausted after the retry envelope, by group"),
            &["group"],
        ).unwrap();
        REGISTRY.register(Box::new(c.clone())).unwrap();
        c
    };

    pub static ref REGISTRY_NOTIFY_TOTAL: CounterVec = {
        let c = CounterVec::new(
            Opts::new("registry_notify_total", "Outbound notify attempts, by outcome"),
            &["outcome"],
        ).unwrap();
        REGISTRY.register(Box::new(c.clone())).unwrap();
        c
    };

    pub static ref REGISTRY_DEPENDENCY_ALERTS_TOTAL: prometheus::Counter = {
        let c = prometheus::Counter::new("registry_dependency_alerts_total", "Dependency-coverage alerts raised").unwrap();
        REGISTRY.register(Box::new(c.clone())).unwrap();
        c
    };

    pub static ref REGISTRY_CHANGE_QUEUE_DEPTH: prometheus::Gauge = {
        let g = prometheus::Gauge::new("registry_change_queue_depth", "Pending items in the change-propagation queue").unwrap();
        REGISTRY.register(Box::new(g.clone())).unwrap();
        g
    };

    pub static ref REGISTRY_ALERT_QUEUE_DEPTH: prometheus::Gauge = {
        let g = prometheus::Gauge::new("registry_alert_queue_depth", "Pending items in the status-alert queue").unwrap();
        REGISTRY.register(Box::new(g.clone())).unwrap();
        g
    };
}

async fn metrics_handler() -> impl IntoResponse {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        tracing::error!(error = %e, "failed to encode metrics");
        return (StatusCode::INTERNAL_SERVER_ERROR, "failed to encode metrics".to_string()).into_response();
    }
    (StatusCode::OK, buffer).into_response()
}

async fn healthz_handler() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub fn admin_router() -> Router {
    Router::new().route("/metrics", get(metrics_handler)).route("/healthz", get(healthz_handler))
}
