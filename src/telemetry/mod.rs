// Central telemetry store: latest infrastructure snapshot, derived health, bounded alerts.
//
// Single writer. Every mutation builds the next TelemetryState from the current one, swaps
// the Arc under the state lock, then notifies subscribers outside of it. Readers holding an
// older Arc keep a consistent (if stale) view.

pub mod health;
pub mod ingest;
mod state;
mod subscription;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};

use crate::models::{
    Alert, AlertSeverity, ContainerInfo, NewAlert, ServiceMetrics, SystemMetrics,
};

pub use ingest::{IngestReport, Slice};
pub use state::{ConnectionState, Connectivity, TelemetryState};
pub use subscription::SubscriptionId;

/// Alerts kept in the store; older ones are dropped first.
pub const MAX_ALERTS: usize = 100;

/// Service name used for alerts about the metrics connection itself.
pub const SYSTEM_SERVICE: &str = "system";

/// Narrow setter for one top-level metrics family.
#[derive(Debug, Clone)]
pub enum SliceUpdate {
    System(SystemMetrics),
    /// Replaces the container list and recomputes service health.
    Containers(Vec<ContainerInfo>),
    /// Replaces the whole per-service map.
    Services(BTreeMap<String, ServiceMetrics>),
    /// Replaces one entry of the per-service map.
    Service(String, ServiceMetrics),
    Aggregate(serde_json::Map<String, serde_json::Value>),
}

pub struct TelemetryStore {
    container_prefix: String,
    state: Mutex<Arc<TelemetryState>>,
    subscribers: subscription::Subscribers,
}

impl Default for TelemetryStore {
    fn default() -> Self {
        Self::new("")
    }
}

impl TelemetryStore {
    /// `container_prefix` is stripped from container names to get service names
    /// (e.g. "proj_" turns "proj_postgres" into "postgres").
    pub fn new(container_prefix: impl Into<String>) -> Self {
        Self {
            container_prefix: container_prefix.into(),
            state: Mutex::new(Arc::new(TelemetryState::default())),
            subscribers: subscription::Subscribers::default(),
        }
    }

    pub fn container_prefix(&self) -> &str {
        &self.container_prefix
    }

    fn lock_state(&self) -> MutexGuard<'_, Arc<TelemetryState>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Consistent view of the whole state.
    pub fn snapshot(&self) -> Arc<TelemetryState> {
        self.lock_state().clone()
    }

    /// Applies `f` to a copy of the current state and publishes the result.
    /// Slices are Arcs, so the copy is shallow; `f` must replace, not mutate, shared slices.
    fn mutate<R>(&self, f: impl FnOnce(&mut TelemetryState) -> R) -> R {
        let out = {
            let mut guard = self.lock_state();
            let mut next = TelemetryState::clone(&guard);
            let out = f(&mut next);
            *guard = Arc::new(next);
            out
        };
        self.subscribers.publish(|| self.snapshot());
        out
    }

    /// Applies one push event from the metrics channel. Never fails: malformed slices are
    /// reported and skipped, absent slices leave the previous value in place. A payload that
    /// is not a JSON object changes nothing and notifies nobody.
    pub fn ingest(&self, raw: &serde_json::Value) -> IngestReport {
        let mut report = IngestReport::default();
        let Some(parsed) = ingest::parse_payload(raw, &mut report) else {
            return report;
        };
        let received_at = Utc::now();

        let prefix = self.container_prefix.as_str();
        let applied = self.mutate(|state| {
            let mut applied = Vec::new();
            let checked_at = parsed.last_update.unwrap_or(received_at);
            if let Some(system) = parsed.system {
                state.system = Some(Arc::new(system));
                applied.push(Slice::System);
            }
            if let Some(containers) = parsed.containers {
                replace_containers(state, containers, prefix, checked_at);
                applied.push(Slice::Containers);
            }
            if let Some(services) = parsed.services {
                state.services = Arc::new(services);
                applied.push(Slice::Services);
            }
            if let Some(aggregate) = parsed.aggregate {
                state.aggregate = Some(Arc::new(aggregate));
                applied.push(Slice::Aggregate);
            }
            if let Some(error) = parsed.error {
                apply_connection(state, false, Some(error), received_at);
                applied.push(Slice::Connection);
            }
            state.last_update = Some(checked_at);
            applied.push(Slice::LastUpdate);
            applied
        });
        report.applied = applied;

        tracing::debug!(
            operation = "ingest",
            applied = report.applied.len(),
            rejected = report.rejected.len(),
            "metrics payload applied"
        );
        report
    }

    /// Replaces one slice. Only container updates touch derived health.
    pub fn update_slice(&self, update: SliceUpdate) {
        let prefix = self.container_prefix.as_str();
        let now = Utc::now();
        self.mutate(|state| {
            match update {
                SliceUpdate::System(system) => state.system = Some(Arc::new(system)),
                SliceUpdate::Containers(containers) => {
                    replace_containers(state, containers, prefix, now)
                }
                SliceUpdate::Services(services) => state.services = Arc::new(services),
                SliceUpdate::Service(name, metrics) => {
                    let mut services = BTreeMap::clone(&state.services);
                    services.insert(name, metrics);
                    state.services = Arc::new(services);
                }
                SliceUpdate::Aggregate(aggregate) => state.aggregate = Some(Arc::new(aggregate)),
            }
            state.last_update = Some(now);
        });
    }

    /// Registers `callback(new, previous)`, invoked only when `selector`'s output changes
    /// (compared with `PartialEq`).
    pub fn subscribe<T, S, C>(&self, selector: S, callback: C) -> SubscriptionId
    where
        T: PartialEq + Send + 'static,
        S: Fn(&TelemetryState) -> T + Send + 'static,
        C: FnMut(&T, &T) + Send + 'static,
    {
        self.subscribe_with(selector, |a: &T, b: &T| a == b, callback)
    }

    /// Like `subscribe` with caller-chosen equality, e.g. `Arc::ptr_eq` on a slice.
    pub fn subscribe_with<T, S, E, C>(&self, selector: S, equals: E, callback: C) -> SubscriptionId
    where
        T: Send + 'static,
        S: Fn(&TelemetryState) -> T + Send + 'static,
        E: Fn(&T, &T) -> bool + Send + 'static,
        C: FnMut(&T, &T) + Send + 'static,
    {
        let current = self.snapshot();
        self.subscribers.add(&current, selector, equals, callback)
    }

    /// Returns false if the subscription was unknown or already removed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.subscribers.remove(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Assigns id and timestamp and prepends the alert, keeping at most MAX_ALERTS.
    pub fn add_alert(&self, alert: NewAlert) -> Alert {
        let now = Utc::now();
        self.mutate(|state| push_alert(state, alert, now))
    }

    /// Marks the alert acknowledged. Returns false when no alert has this id.
    pub fn acknowledge_alert(&self, id: &str) -> bool {
        {
            let state = self.snapshot();
            match state.alerts.iter().find(|a| a.id == id) {
                None => return false,
                Some(a) if a.acknowledged => return true,
                Some(_) => {}
            }
        }
        self.mutate(|state| {
            let mut found = false;
            let alerts: Vec<Alert> = state
                .alerts
                .iter()
                .map(|a| {
                    if a.id == id {
                        found = true;
                        Alert {
                            acknowledged: true,
                            ..a.clone()
                        }
                    } else {
                        a.clone()
                    }
                })
                .collect();
            state.alerts = Arc::new(alerts);
            found
        })
    }

    /// Removes every alert, or only those for `service`. Returns how many were removed.
    pub fn clear_alerts(&self, service: Option<&str>) -> usize {
        self.mutate(|state| {
            let before = state.alerts.len();
            let kept: Vec<Alert> = match service {
                None => Vec::new(),
                Some(service) => state
                    .alerts
                    .iter()
                    .filter(|a| a.service != service)
                    .cloned()
                    .collect(),
            };
            state.alerts = Arc::new(kept);
            before - state.alerts.len()
        })
    }

    /// Records connectivity. Entering the disconnected state with an error raises a
    /// critical "system" alert; staying disconnected does not raise another.
    pub fn set_connection_state(&self, connected: bool, error: Option<&str>) -> Option<Alert> {
        let now = Utc::now();
        let error = error.map(str::to_string);
        self.mutate(|state| apply_connection(state, connected, error, now))
    }

    pub fn alerts_for(&self, service: &str) -> Vec<Alert> {
        self.snapshot()
            .alerts
            .iter()
            .filter(|a| a.service == service)
            .cloned()
            .collect()
    }

    pub fn unacknowledged_alert_count(&self) -> usize {
        self.snapshot().unacknowledged_alerts().count()
    }

    /// Back to the initial empty state. Subscriptions stay registered.
    pub fn reset(&self) {
        self.mutate(|state| *state = TelemetryState::default());
        tracing::debug!(operation = "reset", "telemetry store reset");
    }
}

fn replace_containers(
    state: &mut TelemetryState,
    containers: Vec<ContainerInfo>,
    prefix: &str,
    checked_at: DateTime<Utc>,
) {
    let health = health::derive_services_health(&containers, prefix, checked_at);
    state.containers = Arc::new(containers);
    state.services_health = Arc::new(health);
}

fn push_alert(state: &mut TelemetryState, alert: NewAlert, now: DateTime<Utc>) -> Alert {
    let alert = Alert {
        id: uuid::Uuid::new_v4().to_string(),
        severity: alert.severity,
        service: alert.service,
        message: alert.message,
        created_at: now,
        acknowledged: false,
    };
    let mut alerts = Vec::with_capacity((state.alerts.len() + 1).min(MAX_ALERTS));
    alerts.push(alert.clone());
    alerts.extend(state.alerts.iter().take(MAX_ALERTS - 1).cloned());
    state.alerts = Arc::new(alerts);
    tracing::debug!(
        operation = "add_alert",
        service = %alert.service,
        severity = ?alert.severity,
        "alert added"
    );
    alert
}

fn apply_connection(
    state: &mut TelemetryState,
    connected: bool,
    error: Option<String>,
    now: DateTime<Utc>,
) -> Option<Alert> {
    let was_disconnected = state.connection.status == Connectivity::Disconnected;
    state.connection = ConnectionState {
        status: if connected {
            Connectivity::Connected
        } else {
            Connectivity::Disconnected
        },
        error: if connected { None } else { error.clone() },
    };
    match error {
        Some(error) if !connected && !was_disconnected => {
            tracing::warn!(error = %error, "metrics connection lost");
            let alert = NewAlert::new(
                AlertSeverity::Critical,
                SYSTEM_SERVICE,
                format!("Lost connection to metrics stream: {error}"),
            );
            Some(push_alert(state, alert, now))
        }
        _ => None,
    }
}
