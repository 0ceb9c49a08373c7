// WebSocket telemetry stream and the store subscription that feeds it

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use bytes::Bytes;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::broadcast;
use tokio::time::{Duration, timeout};

use super::AppState;
use crate::models::{Alert, ContainerInfo, ServiceHealth, SystemMetrics};
use crate::telemetry::{ConnectionState, SubscriptionId, TelemetryState, TelemetryStore};

pub(super) const WS_PING_INTERVAL: Duration = Duration::from_secs(30);
pub(super) const WS_SEND_TIMEOUT: Duration = Duration::from_secs(10);

/// The slices pushed to dashboard clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryPush {
    pub system: Option<Arc<SystemMetrics>>,
    pub containers: Arc<Vec<ContainerInfo>>,
    pub services_health: Arc<Vec<ServiceHealth>>,
    pub alerts: Arc<Vec<Alert>>,
    pub connection: ConnectionState,
}

impl TelemetryPush {
    pub fn from_state(state: &TelemetryState) -> Self {
        Self {
            system: state.system.clone(),
            containers: state.containers.clone(),
            services_health: state.services_health.clone(),
            alerts: state.alerts.clone(),
            connection: state.connection.clone(),
        }
    }

    /// Slice identity: a slice counts as changed only when it was replaced.
    fn same_slices(a: &Self, b: &Self) -> bool {
        let system = match (&a.system, &b.system) {
            (Some(x), Some(y)) => Arc::ptr_eq(x, y),
            (None, None) => true,
            _ => false,
        };
        system
            && Arc::ptr_eq(&a.containers, &b.containers)
            && Arc::ptr_eq(&a.services_health, &b.services_health)
            && Arc::ptr_eq(&a.alerts, &b.alerts)
            && a.connection == b.connection
    }
}

/// Subscribes to the store and forwards every visible change to `tx`.
pub fn forward_telemetry(
    store: &TelemetryStore,
    tx: broadcast::Sender<TelemetryPush>,
) -> SubscriptionId {
    store.subscribe_with(
        TelemetryPush::from_state,
        TelemetryPush::same_slices,
        move |next: &TelemetryPush, _prev: &TelemetryPush| {
            // No receivers just means no dashboard is open.
            let _ = tx.send(next.clone());
        },
    )
}

/// Decrements ws connection count on drop (connect = +1, drop = -1).
struct WsConnectionGuard(Arc<AtomicUsize>);

impl Drop for WsConnectionGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, std::sync::atomic::Ordering::Relaxed);
    }
}

pub(super) async fn ws_telemetry(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let tx = state.telemetry_tx.clone();
    let conn_count = state.ws_connections.clone();
    let initial = TelemetryPush::from_state(&state.store.snapshot());
    ws.on_upgrade(move |socket| async move {
        let mut rx = tx.subscribe();
        if let Err(e) = stream_telemetry(socket, &mut rx, conn_count, initial).await {
            tracing::info!("Telemetry stream error: {}", e);
        }
    })
}

async fn stream_telemetry(
    mut socket: WebSocket,
    rx: &mut broadcast::Receiver<TelemetryPush>,
    conn_count: Arc<AtomicUsize>,
    initial: TelemetryPush,
) -> anyhow::Result<()> {
    conn_count.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let _guard = WsConnectionGuard(conn_count);
    tracing::info!("Client connected to telemetry stream");

    let json = serde_json::to_string(&initial)?;
    let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
    if r.is_err() || r.unwrap_or(Ok(())).is_err() {
        return Ok(());
    }

    let mut ping_interval =
        tokio::time::interval_at(tokio::time::Instant::now() + WS_PING_INTERVAL, WS_PING_INTERVAL);
    ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(push) => {
                        let json = serde_json::to_string(&push)?;
                        let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Text(json.into()))).await;
                        if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket /ws/telemetry client lagged, skipped {} messages", n);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            _ = ping_interval.tick() => {
                let r = timeout(WS_SEND_TIMEOUT, socket.send(Message::Ping(Bytes::new()))).await;
                if r.is_err() || r.unwrap_or(Ok(())).is_err() {
                    break;
                }
            }
        }
    }
    Ok(())
}
