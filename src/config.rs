use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub activity: ActivityConfig,
    #[serde(default)]
    pub error_reporting: ErrorReportingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_pool_size: u32,
    #[serde(default = "default_retention_days")]
    pub retention_days: u32,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *"). Local time.
    #[serde(default)]
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    #[serde(default = "default_vacuum_interval_secs")]
    pub vacuum_interval_secs: u64,
    #[serde(default = "default_prune_interval_secs")]
    pub prune_interval_secs: u64,
}

fn default_retention_days() -> u32 {
    90
}

fn default_vacuum_interval_secs() -> u64 {
    86_400
}

fn default_prune_interval_secs() -> u64 {
    3_600
}

#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    /// Compose project prefix stripped from container names to get service names.
    #[serde(default)]
    pub container_prefix: String,
    pub sample_interval_ms: u64,
    /// Max number of state pushes buffered for /ws/telemetry (slow clients may lag).
    pub broadcast_capacity: usize,
    /// How often to log app stats (ws clients, subscribers, alerts) at INFO level.
    pub stats_log_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActivityConfig {
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,
}

impl Default for ActivityConfig {
    fn default() -> Self {
        Self {
            scan_limit: default_scan_limit(),
        }
    }
}

fn default_scan_limit() -> usize {
    crate::activity::DEFAULT_SCAN_LIMIT
}

#[derive(Debug, Clone, Deserialize)]
pub struct ErrorReportingConfig {
    /// Collector URL. Reports are only logged when unset.
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_max_reports")]
    pub max_reports: usize,
    #[serde(default = "default_window_secs")]
    pub window_secs: u64,
}

impl Default for ErrorReportingConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            max_reports: default_max_reports(),
            window_secs: default_window_secs(),
        }
    }
}

fn default_max_reports() -> usize {
    10
}

fn default_window_secs() -> u64 {
    60
}

impl ErrorReportingConfig {
    pub fn policy(&self) -> crate::error_reporting::RateLimitPolicy {
        crate::error_reporting::RateLimitPolicy {
            max_reports: self.max_reports,
            window: chrono::Duration::seconds(i64::try_from(self.window_secs).unwrap_or(i64::MAX)),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var("CONFIG_FILE").unwrap_or_else(|_| "config.toml".into());
        let s = std::fs::read_to_string(&path)?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.server.port > 0,
            "server.port must be between 1 and 65535, got {}",
            self.server.port
        );
        anyhow::ensure!(
            !self.database.path.is_empty(),
            "database.path must be non-empty"
        );
        anyhow::ensure!(
            self.database.max_pool_size > 0,
            "database.max_pool_size must be > 0, got {}",
            self.database.max_pool_size
        );
        anyhow::ensure!(
            self.database.retention_days > 0,
            "database.retention_days must be > 0, got {}",
            self.database.retention_days
        );
        anyhow::ensure!(
            self.database.vacuum_interval_secs > 0,
            "database.vacuum_interval_secs must be > 0, got {}",
            self.database.vacuum_interval_secs
        );
        anyhow::ensure!(
            self.database.prune_interval_secs > 0,
            "database.prune_interval_secs must be > 0, got {}",
            self.database.prune_interval_secs
        );
        if let Some(schedule) = &self.database.vacuum_schedule {
            anyhow::ensure!(
                <cron::Schedule as std::str::FromStr>::from_str(schedule).is_ok(),
                "database.vacuum_schedule is not a valid cron expression: {}",
                schedule
            );
        }
        anyhow::ensure!(
            self.telemetry.sample_interval_ms > 0,
            "telemetry.sample_interval_ms must be > 0, got {}",
            self.telemetry.sample_interval_ms
        );
        anyhow::ensure!(
            self.telemetry.broadcast_capacity > 0,
            "telemetry.broadcast_capacity must be > 0, got {}",
            self.telemetry.broadcast_capacity
        );
        anyhow::ensure!(
            self.telemetry.stats_log_interval_secs > 0,
            "telemetry.stats_log_interval_secs must be > 0, got {}",
            self.telemetry.stats_log_interval_secs
        );
        anyhow::ensure!(
            self.activity.scan_limit > 0,
            "activity.scan_limit must be > 0, got {}",
            self.activity.scan_limit
        );
        anyhow::ensure!(
            self.error_reporting.max_reports > 0,
            "error_reporting.max_reports must be > 0, got {}",
            self.error_reporting.max_reports
        );
        anyhow::ensure!(
            self.error_reporting.window_secs > 0,
            "error_reporting.window_secs must be > 0, got {}",
            self.error_reporting.window_secs
        );
        Ok(())
    }
}
