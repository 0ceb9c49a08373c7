// Host resource usage slice

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageStats {
    pub used: u64,
    pub total: u64,
    pub percent: f64,
}

impl UsageStats {
    pub fn from_used_total(used: u64, total: u64) -> Self {
        let percent = if total > 0 {
            (used as f64 / total as f64) * 100.0
        } else {
            0.0
        };
        Self {
            used,
            total,
            percent,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkThroughput {
    /// Receive rate in bytes/sec.
    pub rx: f64,
    /// Transmit rate in bytes/sec.
    pub tx: f64,
    /// Fastest link speed in bits/sec, 0 when unknown.
    #[serde(default)]
    pub max_speed: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemMetrics {
    pub cpu_percent: f64,
    pub memory: UsageStats,
    pub disk: UsageStats,
    pub network: NetworkThroughput,
    #[serde(default)]
    pub uptime_seconds: u64,
}
