// Per-service metrics and derived health

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status every per-service metrics record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
    #[default]
    #[serde(other)]
    Stopped,
}

/// Service-specific metrics (connection counts, cache hit rate, ...). Only `status` is fixed;
/// every other field is kept as sent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetrics {
    #[serde(default)]
    pub status: ServiceStatus,
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ServiceMetrics {
    pub fn new(status: ServiceStatus) -> Self {
        Self {
            status,
            fields: serde_json::Map::new(),
        }
    }

    pub fn with_field(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    pub fn number(&self, key: &str) -> Option<f64> {
        self.fields.get(key).and_then(|v| v.as_f64())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Degraded,
    Stopped,
}

/// Derived from the container list; never set directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_checked_at: DateTime<Utc>,
    pub message: String,
}
