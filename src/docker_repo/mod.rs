// Docker containers via bollard: list, per-container stats streams, restart counts.

mod stats;

use crate::models::ContainerInfo;
use bollard::Docker;
use bollard::query_parameters::{InspectContainerOptions, ListContainersOptions, StatsOptions};
use futures_util::StreamExt;
use stats::ContainerUsage;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::instrument;

pub struct DockerRepo {
    docker: Docker,
    container_prefix: String,
    live_stats: Arc<RwLock<HashMap<String, ContainerUsage>>>,
    active_streams: Arc<RwLock<HashMap<String, tokio::task::JoinHandle<()>>>>,
    /// id -> (status line when inspected, restart count). Re-inspected when the status changes.
    restart_counts: RwLock<HashMap<String, (String, u32)>>,
}

impl DockerRepo {
    pub fn connect(container_prefix: impl Into<String>) -> anyhow::Result<Self> {
        let docker = Docker::connect_with_unix_defaults()?;
        Ok(Self {
            docker,
            container_prefix: container_prefix.into(),
            live_stats: Arc::new(RwLock::new(HashMap::new())),
            active_streams: Arc::new(RwLock::new(HashMap::new())),
            restart_counts: RwLock::new(HashMap::new()),
        })
    }

    pub async fn ping(&self) -> anyhow::Result<()> {
        self.docker.ping().await?;
        Ok(())
    }

    /// All project containers (running or not) with live usage merged in.
    #[instrument(skip(self), fields(repo = "docker", operation = "list_containers"))]
    pub async fn list_containers(&self) -> anyhow::Result<Vec<ContainerInfo>> {
        let options = ListContainersOptions {
            all: true,
            ..Default::default()
        };
        let summaries = self.docker.list_containers(Some(options)).await?;

        let mut containers: Vec<ContainerInfo> = summaries
            .iter()
            .filter(|c| stats::container_name(c).starts_with(&self.container_prefix))
            .map(|c| stats::to_container_info(c, &self.container_prefix))
            .collect();

        let running: Vec<(String, String)> = containers
            .iter()
            .filter(|c| c.run_state == crate::models::RunState::Running)
            .map(|c| (c.id.clone(), c.name.clone()))
            .collect();
        self.refresh_streams(running).await;

        {
            let live = self.live_stats.read().await;
            for c in &mut containers {
                if let Some(usage) = live.get(&c.id) {
                    c.cpu_percent = usage.cpu_percent;
                    c.memory = usage.memory.clone();
                }
            }
        }

        for c in &mut containers {
            c.restart_count = self.restart_count(&c.id, &c.uptime).await;
        }
        let known: HashSet<&str> = containers.iter().map(|c| c.id.as_str()).collect();
        self.restart_counts
            .write()
            .await
            .retain(|id, _| known.contains(id.as_str()));

        Ok(containers)
    }

    async fn restart_count(&self, id: &str, status: &str) -> u32 {
        if let Some((seen, count)) = self.restart_counts.read().await.get(id)
            && seen == status
        {
            return *count;
        }
        let count = match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(details) => details
                .restart_count
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(0),
            Err(e) => {
                tracing::debug!(error = %e, container = id, "inspect_container failed");
                0
            }
        };
        self.restart_counts
            .write()
            .await
            .insert(id.to_string(), (status.to_string(), count));
        count
    }

    /// Start stats streams for newly running containers and stop those no longer running.
    async fn refresh_streams(&self, running: Vec<(String, String)>) {
        let running_set: HashSet<String> = running.iter().map(|(id, _)| id.clone()).collect();

        let current_keys: Vec<String> = {
            let r = self.active_streams.read().await;
            r.keys().cloned().collect()
        };

        let to_add: Vec<(String, String)> = running
            .into_iter()
            .filter(|(id, _)| !current_keys.contains(id))
            .collect();
        let to_remove: Vec<String> = current_keys
            .into_iter()
            .filter(|id| !running_set.contains(id))
            .collect();

        let mut streams = self.active_streams.write().await;
        for (id, name) in to_add {
            let handle = self.start_monitoring(id.clone(), name);
            streams.insert(id, handle);
        }
        for id in &to_remove {
            if let Some(handle) = streams.remove(id) {
                handle.abort();
            }
        }
        drop(streams);

        if !to_remove.is_empty() {
            let mut live = self.live_stats.write().await;
            for id in &to_remove {
                live.remove(id);
            }
        }
    }

    fn start_monitoring(&self, id: String, name: String) -> tokio::task::JoinHandle<()> {
        let docker = self.docker.clone();
        let live_stats = self.live_stats.clone();
        let active_streams = self.active_streams.clone();

        tokio::spawn(async move {
            let options = StatsOptions {
                stream: true,
                ..Default::default()
            };
            let mut stream = docker.stats(&id, Some(options));

            while let Some(result) = stream.next().await {
                match result {
                    Ok(s) => {
                        if let Some(usage) = stats::process_statistics(&s) {
                            live_stats.write().await.insert(id.clone(), usage);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, container = %name, "stats stream error");
                        break;
                    }
                }
            }
            tracing::debug!(container = %name, "stats stream ended");
            live_stats.write().await.remove(&id);
            active_streams.write().await.remove(&id);
        })
    }
}
