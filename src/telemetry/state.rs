// Store state: immutable slices behind Arc, swapped wholesale on every mutation

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Alert, ContainerInfo, ServiceHealth, ServiceMetrics, SystemMetrics};

/// Connectivity to the metrics source as last reported by the ingestion boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Nothing reported yet.
    #[default]
    Unknown,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub status: Connectivity,
    pub error: Option<String>,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        self.status == Connectivity::Connected
    }
}

/// One consistent view of everything the store owns. Handed out as `Arc<TelemetryState>`;
/// a handed-out value is never mutated, later mutations publish a new one.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryState {
    pub system: Option<Arc<SystemMetrics>>,
    pub containers: Arc<Vec<ContainerInfo>>,
    pub services: Arc<BTreeMap<String, ServiceMetrics>>,
    /// Aggregate computed fields from the payload's `metrics` key, kept as sent.
    pub aggregate: Option<Arc<serde_json::Map<String, serde_json::Value>>>,
    pub services_health: Arc<Vec<ServiceHealth>>,
    /// Newest first.
    pub alerts: Arc<Vec<Alert>>,
    pub connection: ConnectionState,
    pub last_update: Option<DateTime<Utc>>,
}

impl TelemetryState {
    pub fn service_health(&self, name: &str) -> Option<&ServiceHealth> {
        self.services_health.iter().find(|h| h.name == name)
    }

    pub fn container(&self, id: &str) -> Option<&ContainerInfo> {
        self.containers.iter().find(|c| c.id == id)
    }

    pub fn service_metrics(&self, service: &str) -> Option<&ServiceMetrics> {
        self.services.get(service)
    }

    pub fn unacknowledged_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|a| !a.acknowledged)
    }
}
