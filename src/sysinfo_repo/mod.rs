// Host metrics via sysinfo: CPU, memory, disk totals, network throughput, uptime.

mod linux;

use std::sync::{Arc, Mutex};
use std::time::Instant;

use sysinfo::{Disks, Networks, System};
use tracing::instrument;

use crate::models::{NetworkThroughput, SystemMetrics, UsageStats};

/// Cumulative byte counters at a point in time.
#[derive(Debug, Clone, Copy)]
struct NetworkCounters {
    rx_bytes: u64,
    tx_bytes: u64,
    at: Instant,
}

struct Probes {
    sys: System,
    disks: Disks,
    networks: Networks,
    last_network: Option<NetworkCounters>,
}

pub struct SysinfoRepo {
    probes: Arc<Mutex<Probes>>,
}

impl Default for SysinfoRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl SysinfoRepo {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_all();
        sys.refresh_memory();
        Self {
            probes: Arc::new(Mutex::new(Probes {
                sys,
                disks: Disks::new_with_refreshed_list(),
                networks: Networks::new_with_refreshed_list(),
                last_network: None,
            })),
        }
    }

    /// One sample of host metrics. The first call reports zero CPU and network rates since
    /// both need a previous sample to diff against.
    #[instrument(skip(self), fields(repo = "sysinfo", operation = "get_system_metrics"))]
    pub async fn get_system_metrics(&self) -> anyhow::Result<SystemMetrics> {
        let probes = self.probes.clone();
        tokio::task::spawn_blocking(move || {
            let mut guard = probes
                .lock()
                .map_err(|e| anyhow::anyhow!("sysinfo lock poisoned: {}", e))?;
            let probes = &mut *guard;

            probes.sys.refresh_cpu_all();
            probes.sys.refresh_memory();
            let cpu_percent = (probes.sys.global_cpu_usage() as f64).clamp(0.0, 100.0);

            let mem_total = probes.sys.total_memory();
            let mem_used = mem_total.saturating_sub(probes.sys.available_memory());

            probes.disks.refresh(false);
            let (disk_total, disk_available) = probes
                .disks
                .list()
                .iter()
                .fold((0u64, 0u64), |(t, a), d| {
                    (t + d.total_space(), a + d.available_space())
                });

            probes.networks.refresh(true);
            let mut rx_bytes = 0u64;
            let mut tx_bytes = 0u64;
            let mut max_speed = 0u64;
            for (name, data) in probes.networks.list() {
                if linux::is_virtual_interface(name) {
                    continue;
                }
                rx_bytes = rx_bytes.saturating_add(data.total_received());
                tx_bytes = tx_bytes.saturating_add(data.total_transmitted());
                max_speed = max_speed.max(linux::get_interface_speed(name));
            }
            let now = NetworkCounters {
                rx_bytes,
                tx_bytes,
                at: Instant::now(),
            };
            let (rx, tx) = probes
                .last_network
                .map(|prev| network_rates(prev, now))
                .unwrap_or((0.0, 0.0));
            probes.last_network = Some(now);

            Ok(SystemMetrics {
                cpu_percent,
                memory: UsageStats::from_used_total(mem_used, mem_total),
                disk: UsageStats::from_used_total(
                    disk_total.saturating_sub(disk_available),
                    disk_total,
                ),
                network: NetworkThroughput { rx, tx, max_speed },
                uptime_seconds: System::uptime(),
            })
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}

/// Bytes/sec between two samples. Counter resets (interface went away) yield 0.
fn network_rates(prev: NetworkCounters, now: NetworkCounters) -> (f64, f64) {
    let dt = now.at.duration_since(prev.at).as_secs_f64();
    if dt <= 0.0 {
        return (0.0, 0.0);
    }
    let rx = now.rx_bytes.saturating_sub(prev.rx_bytes) as f64 / dt;
    let tx = now.tx_bytes.saturating_sub(prev.tx_bytes) as f64 / dt;
    (rx, tx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn network_rates_divide_by_elapsed() {
        let t0 = Instant::now();
        let prev = NetworkCounters {
            rx_bytes: 1_000,
            tx_bytes: 500,
            at: t0,
        };
        let now = NetworkCounters {
            rx_bytes: 3_000,
            tx_bytes: 1_500,
            at: t0 + Duration::from_secs(2),
        };
        assert_eq!(network_rates(prev, now), (1_000.0, 500.0));
    }

    #[test]
    fn network_rates_handle_counter_reset() {
        let t0 = Instant::now();
        let prev = NetworkCounters {
            rx_bytes: 5_000,
            tx_bytes: 5_000,
            at: t0,
        };
        let now = NetworkCounters {
            rx_bytes: 10,
            tx_bytes: 10,
            at: t0 + Duration::from_secs(1),
        };
        assert_eq!(network_rates(prev, now), (0.0, 0.0));
        assert_eq!(network_rates(now, now), (0.0, 0.0));
    }
}
