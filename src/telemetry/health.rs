// ServiceHealth derivation from the container list.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{ContainerHealth, ContainerInfo, HealthStatus, RunState, ServiceHealth};

/// Service name for a container: leading '/' (Docker) and the project prefix removed.
/// A name that is nothing but the prefix is kept as is.
pub fn service_name<'a>(container_name: &'a str, prefix: &str) -> &'a str {
    let name = container_name.trim_start_matches('/');
    if prefix.is_empty() {
        return name;
    }
    match name.strip_prefix(prefix) {
        Some(rest) if !rest.is_empty() => rest,
        _ => name,
    }
}

/// Health check result wins over run state; a running container without a verdict is degraded.
pub fn derive_status(container: &ContainerInfo) -> (HealthStatus, &'static str) {
    match (container.health, container.run_state) {
        (ContainerHealth::Healthy, _) => (HealthStatus::Healthy, "health check passing"),
        (ContainerHealth::Unhealthy, _) => (HealthStatus::Unhealthy, "health check failing"),
        (ContainerHealth::Starting, RunState::Running) => {
            (HealthStatus::Degraded, "running, health check starting")
        }
        (ContainerHealth::None, RunState::Running) => {
            (HealthStatus::Degraded, "running without health check")
        }
        (_, RunState::Restarting) => (HealthStatus::Stopped, "restarting"),
        (_, RunState::Stopped) => (HealthStatus::Stopped, "not running"),
    }
}

/// Single pass over `containers`, one entry per distinct service name, in first-seen order.
/// When two containers map to the same name the later one wins.
pub fn derive_services_health(
    containers: &[ContainerInfo],
    prefix: &str,
    checked_at: DateTime<Utc>,
) -> Vec<ServiceHealth> {
    let mut index: HashMap<&str, usize> = HashMap::with_capacity(containers.len());
    let mut out: Vec<ServiceHealth> = Vec::with_capacity(containers.len());
    for container in containers {
        let name = service_name(&container.name, prefix);
        let (status, message) = derive_status(container);
        let entry = ServiceHealth {
            name: name.to_string(),
            status,
            last_checked_at: checked_at,
            message: message.to_string(),
        };
        match index.get(name) {
            Some(&i) => out[i] = entry,
            None => {
                index.insert(name, out.len());
                out.push(entry);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(name: &str, run_state: RunState, health: ContainerHealth) -> ContainerInfo {
        ContainerInfo {
            id: format!("id-{name}"),
            name: name.into(),
            image: String::new(),
            run_state,
            health,
            cpu_percent: 0.0,
            memory: Default::default(),
            ports: vec![],
            created_at: None,
            uptime: String::new(),
            restart_count: 0,
            service_type: String::new(),
            category: Default::default(),
        }
    }

    #[test]
    fn service_name_strips_prefix_and_slash() {
        assert_eq!(service_name("proj_postgres", "proj_"), "postgres");
        assert_eq!(service_name("/proj_redis", "proj_"), "redis");
        assert_eq!(service_name("other_redis", "proj_"), "other_redis");
        assert_eq!(service_name("proj_", "proj_"), "proj_");
        assert_eq!(service_name("hasura", ""), "hasura");
    }

    #[test]
    fn derive_status_priority() {
        use ContainerHealth as H;
        use RunState as R;
        let cases = [
            (R::Stopped, H::Healthy, HealthStatus::Healthy),
            (R::Running, H::Unhealthy, HealthStatus::Unhealthy),
            (R::Running, H::Starting, HealthStatus::Degraded),
            (R::Running, H::None, HealthStatus::Degraded),
            (R::Restarting, H::None, HealthStatus::Stopped),
            (R::Stopped, H::Starting, HealthStatus::Stopped),
        ];
        for (run_state, health, expected) in cases {
            let (status, _) = derive_status(&container("c", run_state, health));
            assert_eq!(status, expected, "{run_state:?}/{health:?}");
        }
    }

    #[test]
    fn duplicate_names_collapse_to_last() {
        let containers = vec![
            container("proj_db", RunState::Running, ContainerHealth::Healthy),
            container("proj_cache", RunState::Stopped, ContainerHealth::None),
            container("/proj_db", RunState::Running, ContainerHealth::Unhealthy),
        ];
        let health = derive_services_health(&containers, "proj_", Utc::now());
        assert_eq!(health.len(), 2);
        assert_eq!(health[0].name, "db");
        assert_eq!(health[0].status, HealthStatus::Unhealthy);
        assert_eq!(health[1].name, "cache");
    }
}
