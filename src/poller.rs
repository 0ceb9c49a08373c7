// Background poller: samples host and Docker, pushes one metrics payload per tick into the
// telemetry store and tracks connectivity to the Docker daemon.

use crate::docker_repo::DockerRepo;
use crate::models::{ContainerInfo, HealthStatus, ServiceMetrics, ServiceStatus, SystemMetrics};
use crate::sysinfo_repo::SysinfoRepo;
use crate::telemetry::health::{derive_status, service_name};
use crate::telemetry::{Connectivity, TelemetryStore};
use chrono::{DateTime, Utc};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::{Duration, interval};
use tracing::Instrument;

/// Repos, store and shutdown for the poller.
pub struct PollerDeps {
    pub sysinfo_repo: Arc<SysinfoRepo>,
    pub docker_repo: Arc<DockerRepo>,
    pub store: Arc<TelemetryStore>,
    pub ws_connections: Arc<AtomicUsize>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Poller timing and logging config.
pub struct PollerConfig {
    pub sample_interval_ms: u64,
    /// How often to log app stats (real seconds).
    pub stats_log_interval_secs: u64,
}

/// Per-service metrics derived from a container sample.
pub fn service_metrics(container: &ContainerInfo) -> ServiceMetrics {
    let status = match derive_status(container).0 {
        HealthStatus::Healthy | HealthStatus::Degraded => ServiceStatus::Healthy,
        HealthStatus::Unhealthy => ServiceStatus::Unhealthy,
        HealthStatus::Stopped => ServiceStatus::Stopped,
    };
    ServiceMetrics::new(status)
        .with_field("cpuPercent", container.cpu_percent)
        .with_field("memoryPercent", container.memory.percent)
        .with_field("memoryUsageBytes", container.memory.usage_bytes)
        .with_field("restartCount", container.restart_count)
}

/// Builds the metrics payload the store ingests. Absent inputs leave their slice out so the
/// store keeps the previous value.
pub fn build_payload(
    system: Option<&SystemMetrics>,
    containers: Option<&[ContainerInfo]>,
    container_prefix: &str,
    now: DateTime<Utc>,
) -> Value {
    let mut docker = Map::new();
    let mut payload = Map::new();
    if let Some(system) = system {
        docker.insert("system".into(), json!(system));
    }
    if let Some(containers) = containers {
        docker.insert("containers".into(), json!(containers));
        let services: BTreeMap<&str, ServiceMetrics> = containers
            .iter()
            .map(|c| (service_name(&c.name, container_prefix), service_metrics(c)))
            .collect();
        payload.insert("services".into(), json!(services));
    }
    if !docker.is_empty() {
        payload.insert("docker".into(), Value::Object(docker));
    }
    payload.insert("lastUpdate".into(), json!(now.to_rfc3339()));
    Value::Object(payload)
}

pub fn spawn(deps: PollerDeps, config: PollerConfig) -> tokio::task::JoinHandle<()> {
    let PollerDeps {
        sysinfo_repo,
        docker_repo,
        store,
        ws_connections,
        mut shutdown_rx,
    } = deps;
    let PollerConfig {
        sample_interval_ms,
        stats_log_interval_secs,
    } = config;

    let poller_span = tracing::span!(tracing::Level::DEBUG, "poller", sample_interval_ms);
    tokio::spawn(
        async move {
            let mut tick = interval(Duration::from_millis(sample_interval_ms));
            tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
            stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            let mut payloads_total: u64 = 0;

            loop {
                tokio::select! {
                    _ = tick.tick() => {
                        let system = match sysinfo_repo.get_system_metrics().await {
                            Ok(s) => Some(s),
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    operation = "get_system_metrics",
                                    "system metrics failed"
                                );
                                None
                            }
                        };
                        let containers = docker_repo.list_containers().await;

                        let payload = build_payload(
                            system.as_ref(),
                            containers.as_ref().ok().map(Vec::as_slice),
                            store.container_prefix(),
                            Utc::now(),
                        );
                        let report = store.ingest(&payload);
                        payloads_total += 1;
                        if !report.is_clean() {
                            tracing::debug!(
                                operation = "ingest",
                                rejected = report.rejected.len(),
                                "payload partially rejected"
                            );
                        }

                        match containers {
                            Ok(_) => {
                                if store.snapshot().connection.status != Connectivity::Connected {
                                    store.set_connection_state(true, None);
                                    tracing::info!(operation = "list_containers", "Docker connection established");
                                }
                            }
                            Err(e) => {
                                tracing::debug!(error = %e, operation = "list_containers", "Docker list failed");
                                store.set_connection_state(false, Some(&e.to_string()));
                            }
                        }
                    }
                    _ = &mut shutdown_rx => {
                        tracing::debug!("Poller shutting down");
                        break;
                    }
                    _ = stats_log_tick.tick() => {
                        let state = store.snapshot();
                        tracing::info!(
                            ws_telemetry_clients = ws_connections.load(Ordering::Relaxed),
                            subscribers = store.subscriber_count(),
                            containers = state.containers.len(),
                            alerts = state.alerts.len(),
                            unacknowledged_alerts = state.unacknowledged_alerts().count(),
                            payloads_total,
                            "app stats"
                        );
                    }
                }
            }
        }
        .instrument(poller_span),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ContainerHealth, RunState};

    fn container(name: &str, run_state: RunState, health: ContainerHealth) -> ContainerInfo {
        serde_json::from_value(json!({ "name": name })).map(|c: ContainerInfo| ContainerInfo {
            run_state,
            health,
            ..c
        })
        .unwrap()
    }

    #[test]
    fn service_metrics_maps_degraded_to_healthy() {
        let c = container("proj_redis", RunState::Running, ContainerHealth::None);
        assert_eq!(service_metrics(&c).status, ServiceStatus::Healthy);
        let c = container("proj_redis", RunState::Stopped, ContainerHealth::None);
        assert_eq!(service_metrics(&c).status, ServiceStatus::Stopped);
        let c = container("proj_redis", RunState::Running, ContainerHealth::Unhealthy);
        assert_eq!(service_metrics(&c).status, ServiceStatus::Unhealthy);
    }

    #[test]
    fn payload_omits_missing_inputs() {
        let now = Utc::now();
        let payload = build_payload(None, None, "proj_", now);
        assert!(payload.get("docker").is_none());
        assert!(payload.get("services").is_none());
        assert!(payload.get("lastUpdate").is_some());

        let containers = vec![container(
            "proj_postgres",
            RunState::Running,
            ContainerHealth::Healthy,
        )];
        let payload = build_payload(None, Some(&containers), "proj_", now);
        assert_eq!(payload["services"]["postgres"]["status"], "healthy");
        assert_eq!(payload["docker"]["containers"][0]["name"], "proj_postgres");
        assert!(payload["docker"].get("system").is_none());
    }
}
