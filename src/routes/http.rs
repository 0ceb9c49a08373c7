// HTTP handlers: version, telemetry, alerts, activity feed, error intake

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::activity::{ActivityError, ActivityFilter, Cursor, FeedOptions};
use crate::error_reporting::ErrorReport;
use crate::version::{NAME, VERSION};

const DEFAULT_PAGE_SIZE: usize = 50;

impl IntoResponse for ActivityError {
    fn into_response(self) -> Response {
        match self {
            ActivityError::InvalidCursor(cursor) => {
                (StatusCode::BAD_REQUEST, format!("invalid cursor: {cursor}")).into_response()
            }
            ActivityError::Store(e) => {
                tracing::warn!(error = %e, operation = "activity", "audit log query failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "audit log unavailable").into_response()
            }
        }
    }
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/telemetry: the whole store state.
pub(super) async fn telemetry_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.snapshot())
}

pub(super) async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.snapshot().services_health.clone())
}

pub(super) async fn alerts_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.snapshot().alerts.clone())
}

pub(super) async fn ack_alert_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.store.acknowledge_alert(&id) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ClearAlertsQuery {
    service: Option<String>,
}

pub(super) async fn clear_alerts_handler(
    State(state): State<AppState>,
    Query(q): Query<ClearAlertsQuery>,
) -> impl IntoResponse {
    let removed = state.store.clear_alerts(q.service.as_deref());
    Json(serde_json::json!({ "removed": removed }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct FeedQuery {
    limit: Option<usize>,
    offset: Option<usize>,
    cursor: Option<String>,
    action: Option<String>,
    resource_type: Option<String>,
    actor_id: Option<String>,
}

pub(super) async fn activity_feed_handler(
    State(state): State<AppState>,
    Query(q): Query<FeedQuery>,
) -> Result<impl IntoResponse, ActivityError> {
    let options = FeedOptions {
        limit: q.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        offset: q.offset,
        cursor: q.cursor.map(Cursor::from),
        filter: ActivityFilter {
            action: q.action,
            resource_type: q.resource_type,
            actor_id: q.actor_id,
        },
    };
    Ok(Json(state.feed.get_activity_feed(&options).await?))
}

#[derive(Debug, Deserialize)]
pub(super) struct SearchQuery {
    #[serde(default)]
    q: String,
}

pub(super) async fn activity_search_handler(
    State(state): State<AppState>,
    Query(q): Query<SearchQuery>,
) -> Result<impl IntoResponse, ActivityError> {
    Ok(Json(state.feed.search_activity(&q.q).await?))
}

pub(super) async fn activity_stats_handler(
    State(state): State<AppState>,
) -> Result<impl IntoResponse, ActivityError> {
    Ok(Json(state.feed.get_activity_stats().await?))
}

pub(super) async fn activity_by_id_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ActivityError> {
    Ok(match state.feed.get_activity_by_id(&id).await? {
        Some(activity) => Json(activity).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    })
}

/// POST /api/errors: accepted even when rate limited or undeliverable.
pub(super) async fn report_error_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(mut report): Json<ErrorReport>,
) -> StatusCode {
    if report.user_agent.is_none() {
        report.user_agent = headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
    }
    state.reporter.report_error(report).await;
    StatusCode::ACCEPTED
}
