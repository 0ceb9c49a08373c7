// HTTP + WebSocket routes

mod http;
mod ws;

pub use ws::{TelemetryPush, forward_telemetry};

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::activity::ActivityFeed;
use crate::audit_repo::SqliteAuditLog;
use crate::error_reporting::{ErrorReporter, HttpErrorTransport};
use crate::telemetry::TelemetryStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TelemetryStore>,
    pub feed: Arc<ActivityFeed<SqliteAuditLog>>,
    pub reporter: Arc<ErrorReporter<HttpErrorTransport>>,
    /// Fed by `forward_telemetry`; one message per visible state change.
    pub telemetry_tx: broadcast::Sender<TelemetryPush>,
    pub ws_connections: Arc<AtomicUsize>,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { "Hello from opsdash!" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/telemetry", get(http::telemetry_handler)) // GET /api/telemetry
        .route("/api/health", get(http::health_handler)) // GET /api/health
        .route(
            "/api/alerts",
            get(http::alerts_handler).delete(http::clear_alerts_handler),
        ) // GET, DELETE /api/alerts
        .route("/api/alerts/{id}/ack", post(http::ack_alert_handler)) // POST /api/alerts/{id}/ack
        .route("/api/activity", get(http::activity_feed_handler)) // GET /api/activity
        .route("/api/activity/search", get(http::activity_search_handler)) // GET /api/activity/search
        .route("/api/activity/stats", get(http::activity_stats_handler)) // GET /api/activity/stats
        .route("/api/activity/{id}", get(http::activity_by_id_handler)) // GET /api/activity/{id}
        .route("/api/errors", post(http::report_error_handler)) // POST /api/errors
        .route("/ws/telemetry", get(ws::ws_telemetry)) // WS /ws/telemetry
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
