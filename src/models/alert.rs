// Alerts raised by producers or synthesized by the telemetry store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Critical,
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: String,
    pub severity: AlertSeverity,
    pub service: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub acknowledged: bool,
}

/// Alert as submitted by a producer; the store assigns id and timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAlert {
    pub severity: AlertSeverity,
    pub service: String,
    pub message: String,
}

impl NewAlert {
    pub fn new(severity: AlertSeverity, service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity,
            service: service.into(),
            message: message.into(),
        }
    }
}
