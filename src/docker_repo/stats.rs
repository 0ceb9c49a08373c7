// Turn raw Docker stats API responses and container summaries into store models.

use bollard::models::ContainerSummary;
use bollard::models::ContainerStatsResponse;
use chrono::{TimeZone, Utc};

use crate::models::{
    ContainerHealth, ContainerInfo, ContainerMemory, PortMapping, RunState, ServiceCategory,
};
use crate::telemetry::health::service_name;

/// Live resource usage of one running container, from its stats stream.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct ContainerUsage {
    pub cpu_percent: f64,
    pub memory: ContainerMemory,
}

/// Process a raw Docker stats response. Returns `None` until both CPU samples are present.
pub(crate) fn process_statistics(s: &ContainerStatsResponse) -> Option<ContainerUsage> {
    let cpu_stats = s.cpu_stats.as_ref()?;
    let precpu_stats = s.precpu_stats.as_ref()?;

    let cpu_usage = cpu_stats.cpu_usage.as_ref()?;
    let precpu_usage = precpu_stats.cpu_usage.as_ref()?;

    let cpu_delta =
        cpu_usage.total_usage.unwrap_or(0) as i64 - precpu_usage.total_usage.unwrap_or(0) as i64;
    let system_delta = cpu_stats.system_cpu_usage.unwrap_or(0) as i64
        - precpu_stats.system_cpu_usage.unwrap_or(0) as i64;
    let online = cpu_stats.online_cpus.unwrap_or(1) as f64;
    let cpu_percent = if system_delta > 0 && online > 0.0 {
        ((cpu_delta as f64 / system_delta as f64) * online * 100.0).max(0.0)
    } else {
        0.0
    };

    let memory = s.memory_stats.as_ref();
    let usage = memory.and_then(|m| m.usage).unwrap_or(0);
    // Page cache is reclaimable; `docker stats` reports usage without it.
    let cache = memory
        .and_then(|m| m.stats.as_ref())
        .and_then(|st| st.get("inactive_file").copied())
        .unwrap_or(0);
    let usage_bytes = usage.saturating_sub(cache);
    let limit_bytes = memory.and_then(|m| m.limit).unwrap_or(0);
    let percent = if limit_bytes > 0 {
        (usage_bytes as f64 / limit_bytes as f64) * 100.0
    } else {
        0.0
    };

    Some(ContainerUsage {
        cpu_percent,
        memory: ContainerMemory {
            usage_bytes,
            limit_bytes,
            percent,
        },
    })
}

/// Docker container name without the leading '/'; falls back to the id.
pub(crate) fn container_name(c: &ContainerSummary) -> String {
    let id = c.id.as_deref().unwrap_or_default();
    c.names
        .as_ref()
        .and_then(|n| n.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_else(|| id.to_string())
}

/// Static part of a container from the list endpoint. Usage and restart count are filled in
/// separately.
pub(crate) fn to_container_info(c: &ContainerSummary, prefix: &str) -> ContainerInfo {
    let name = container_name(c);
    let service_type = service_name(&name, prefix).to_string();
    let status = c.status.clone().unwrap_or_default();
    let run_state = c
        .state
        .as_ref()
        .map(|s| RunState::from_docker(&s.to_string()))
        .unwrap_or_default();
    let ports = c
        .ports
        .iter()
        .flatten()
        .map(|p| PortMapping {
            private_port: p.private_port,
            public_port: p.public_port,
            protocol: p.typ.as_ref().map(|t| t.to_string()).unwrap_or_default(),
        })
        .collect();

    ContainerInfo {
        id: c.id.clone().unwrap_or_default(),
        image: c.image.clone().unwrap_or_default(),
        run_state,
        health: ContainerHealth::from_docker_status(&status),
        cpu_percent: 0.0,
        memory: ContainerMemory::default(),
        ports,
        created_at: c.created.and_then(|s| Utc.timestamp_opt(s, 0).single()),
        uptime: status,
        restart_count: 0,
        category: ServiceCategory::classify(&service_type),
        service_type,
        name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bollard::models::{ContainerCpuStats, ContainerCpuUsage, ContainerMemoryStats};
    use std::collections::HashMap;

    fn minimal_cpu_stats(total_usage: u64, system_cpu_usage: u64) -> ContainerCpuStats {
        ContainerCpuStats {
            cpu_usage: Some(ContainerCpuUsage {
                total_usage: Some(total_usage),
                ..Default::default()
            }),
            system_cpu_usage: Some(system_cpu_usage),
            online_cpus: Some(2),
            throttling_data: None,
        }
    }

    #[test]
    fn process_statistics_returns_none_when_cpu_stats_missing() {
        let s = ContainerStatsResponse {
            cpu_stats: None,
            precpu_stats: Some(minimal_cpu_stats(0, 0)),
            ..Default::default()
        };
        assert!(process_statistics(&s).is_none());
    }

    #[test]
    fn process_statistics_returns_none_when_precpu_stats_missing() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(minimal_cpu_stats(100, 1000)),
            precpu_stats: None,
            ..Default::default()
        };
        assert!(process_statistics(&s).is_none());
    }

    #[test]
    fn process_statistics_computes_cpu_and_memory() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(minimal_cpu_stats(100_000_000, 1_000_000_000)),
            precpu_stats: Some(minimal_cpu_stats(50_000_000, 500_000_000)),
            memory_stats: Some(ContainerMemoryStats {
                usage: Some(300 * 1024 * 1024),
                limit: Some(512 * 1024 * 1024),
                stats: Some(HashMap::from([(
                    "inactive_file".to_string(),
                    44 * 1024 * 1024,
                )])),
                ..Default::default()
            }),
            ..Default::default()
        };
        let out = process_statistics(&s).unwrap();
        assert!((out.cpu_percent - 20.0).abs() < 0.01);
        assert_eq!(out.memory.usage_bytes, 256 * 1024 * 1024);
        assert_eq!(out.memory.limit_bytes, 512 * 1024 * 1024);
        assert!((out.memory.percent - 50.0).abs() < 0.01);
    }

    #[test]
    fn process_statistics_zero_system_delta_returns_zero_cpu_percent() {
        let s = ContainerStatsResponse {
            cpu_stats: Some(minimal_cpu_stats(100, 500)),
            precpu_stats: Some(minimal_cpu_stats(50, 500)),
            ..Default::default()
        };
        let out = process_statistics(&s).unwrap();
        assert_eq!(out.cpu_percent, 0.0);
        assert_eq!(out.memory.percent, 0.0);
    }

    #[test]
    fn container_info_from_summary() {
        let summary = ContainerSummary {
            id: Some("abc123".to_string()),
            names: Some(vec!["/proj_postgres".to_string()]),
            image: Some("postgres:16".to_string()),
            status: Some("Up 2 hours (healthy)".to_string()),
            created: Some(1_700_000_000),
            ..Default::default()
        };
        let info = to_container_info(&summary, "proj_");
        assert_eq!(info.id, "abc123");
        assert_eq!(info.name, "proj_postgres");
        assert_eq!(info.service_type, "postgres");
        assert_eq!(info.category, ServiceCategory::Required);
        assert_eq!(info.health, ContainerHealth::Healthy);
        assert_eq!(info.uptime, "Up 2 hours (healthy)");
        assert_eq!(info.created_at.map(|t| t.timestamp()), Some(1_700_000_000));
    }

    #[test]
    fn container_name_falls_back_to_id() {
        let summary = ContainerSummary {
            id: Some("deadbeef".to_string()),
            ..Default::default()
        };
        assert_eq!(container_name(&summary), "deadbeef");
        let info = to_container_info(&summary, "");
        assert_eq!(info.run_state, RunState::Stopped);
        assert_eq!(info.category, ServiceCategory::User);
    }
}
