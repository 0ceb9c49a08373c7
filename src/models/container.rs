// Container models (ingestion wire shape + store slice)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Container run state; serializes to lowercase JSON (e.g. "running").
/// Anything Docker reports besides running/restarting collapses to `stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Restarting,
    #[default]
    #[serde(other)]
    Stopped,
}

impl RunState {
    /// Parse from Docker API state string (e.g. "running", "exited").
    pub fn from_docker(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "running" => RunState::Running,
            "restarting" => RunState::Restarting,
            _ => RunState::Stopped,
        }
    }
}

/// Docker health check result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerHealth {
    Healthy,
    Unhealthy,
    Starting,
    #[default]
    #[serde(other)]
    None,
}

impl ContainerHealth {
    /// Parse the health suffix of a Docker status line, e.g. "Up 3 minutes (healthy)".
    pub fn from_docker_status(status: &str) -> Self {
        let lower = status.to_lowercase();
        if lower.contains("(unhealthy)") {
            ContainerHealth::Unhealthy
        } else if lower.contains("(healthy)") {
            ContainerHealth::Healthy
        } else if lower.contains("(health: starting)") {
            ContainerHealth::Starting
        } else {
            ContainerHealth::None
        }
    }
}

/// Whether the container belongs to the required core stack, an optional add-on or user code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceCategory {
    Required,
    Optional,
    #[default]
    #[serde(other)]
    User,
}

const REQUIRED_SERVICES: &[&str] = &["postgres", "hasura", "auth", "nginx"];
const OPTIONAL_SERVICES: &[&str] = &[
    "redis",
    "minio",
    "storage",
    "mailpit",
    "mlflow",
    "meilisearch",
    "grafana",
    "prometheus",
    "loki",
    "tempo",
    "alertmanager",
    "functions",
    "admin",
];

impl ServiceCategory {
    /// Classify by service type (the container name without the project prefix).
    pub fn classify(service_type: &str) -> Self {
        if REQUIRED_SERVICES.contains(&service_type) {
            ServiceCategory::Required
        } else if OPTIONAL_SERVICES.contains(&service_type) {
            ServiceCategory::Optional
        } else {
            ServiceCategory::User
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerMemory {
    pub usage_bytes: u64,
    pub limit_bytes: u64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortMapping {
    #[serde(default)]
    pub private_port: u16,
    #[serde(default)]
    pub public_port: Option<u16>,
    #[serde(default)]
    pub protocol: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    #[serde(default)]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(rename = "status", alias = "runState", default)]
    pub run_state: RunState,
    #[serde(default)]
    pub health: ContainerHealth,
    #[serde(default)]
    pub cpu_percent: f64,
    #[serde(default)]
    pub memory: ContainerMemory,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Human uptime as reported by Docker (e.g. "Up 2 hours").
    #[serde(default)]
    pub uptime: String,
    #[serde(default)]
    pub restart_count: u32,
    #[serde(default)]
    pub service_type: String,
    #[serde(default)]
    pub category: ServiceCategory,
}
