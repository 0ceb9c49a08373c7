// Background worker: prune audit log entries past retention every prune_interval_secs.
// VACUUM runs on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::audit_repo::SqliteAuditLog;
use tracing::{info, instrument, warn};

/// Config for the maintenance worker.
#[derive(Debug, Clone)]
pub struct MaintenanceWorkerConfig {
    pub prune_interval_secs: u64,
    /// Optional cron expression for VACUUM (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Run VACUUM every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

/// Spawns the maintenance worker. Stops when `shutdown_rx` fires.
pub fn spawn(
    repo: Arc<SqliteAuditLog>,
    config: MaintenanceWorkerConfig,
    shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(repo, config, shutdown_rx).await;
    })
}

#[instrument(skip(repo, shutdown_rx), fields(interval_secs = config.prune_interval_secs))]
async fn run(
    repo: Arc<SqliteAuditLog>,
    config: MaintenanceWorkerConfig,
    mut shutdown_rx: tokio::sync::oneshot::Receiver<()>,
) {
    let mut prune_interval = tokio::time::interval(Duration::from_secs(config.prune_interval_secs));
    prune_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    let scheduler = tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    let mut pruned_total: u64 = 0;
    loop {
        tokio::select! {
            _ = prune_interval.tick() => {
                match repo.prune_old_entries().await {
                    Ok(n) => {
                        pruned_total += n;
                        if n > 0 {
                            info!(pruned = n, pruned_total, "audit log pruned");
                        }
                    }
                    Err(e) => warn!(error = %e, operation = "prune_old_entries", "prune failed"),
                }
            }
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = repo.vacuum().await {
                    warn!(error = %e, operation = "vacuum", "vacuum failed");
                } else {
                    info!("vacuum complete");
                }
            }
            _ = &mut shutdown_rx => {
                tracing::debug!("Maintenance worker shutting down");
                break;
            }
        }
    }
    scheduler.abort();
}

/// Delay until the next VACUUM. `None` when the cron schedule has no upcoming time.
pub fn next_vacuum_delay(
    config: &MaintenanceWorkerConfig,
    now: chrono::DateTime<chrono::Local>,
) -> anyhow::Result<Option<Duration>> {
    match config.vacuum_schedule {
        Some(ref cron_str) => {
            let schedule = cron::Schedule::from_str(cron_str)
                .map_err(|e| anyhow::anyhow!("invalid vacuum_schedule {:?}: {}", cron_str, e))?;
            Ok(schedule
                .after(&now)
                .next()
                .map(|next| (next - now).to_std().unwrap_or(Duration::from_secs(1))))
        }
        None => Ok(Some(Duration::from_secs(config.vacuum_interval_secs))),
    }
}

/// Sends a message on `tx` at each VACUUM time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: MaintenanceWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    loop {
        match next_vacuum_delay(&config, chrono::Local::now()) {
            Ok(Some(delay)) => {
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            }
            Ok(None) => tokio::time::sleep(Duration::from_secs(3600)).await,
            Err(e) => {
                warn!(error = %e, "VACUUM will not run");
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(schedule: Option<&str>) -> MaintenanceWorkerConfig {
        MaintenanceWorkerConfig {
            prune_interval_secs: 3600,
            vacuum_schedule: schedule.map(str::to_string),
            vacuum_interval_secs: 86_400,
        }
    }

    #[test]
    fn fixed_interval_without_schedule() {
        let delay = next_vacuum_delay(&config(None), chrono::Local::now()).unwrap();
        assert_eq!(delay, Some(Duration::from_secs(86_400)));
    }

    #[test]
    fn cron_schedule_waits_until_next_fire() {
        let now = chrono::Local
            .with_ymd_and_hms(2026, 3, 10, 2, 0, 0)
            .single()
            .unwrap();
        let delay = next_vacuum_delay(&config(Some("0 0 3 * * *")), now)
            .unwrap()
            .unwrap();
        assert_eq!(delay, Duration::from_secs(3600));
    }

    #[test]
    fn invalid_cron_is_an_error() {
        assert!(next_vacuum_delay(&config(Some("not a cron")), chrono::Local::now()).is_err());
    }
}
