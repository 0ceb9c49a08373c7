use anyhow::Result;
use opsdash::*;
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::time::FormatTime;

struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut tracing_subscriber::fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(
            w,
            "{}",
            chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z")
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_timer(LocalTimer)
        .with_env_filter(filter)
        .init();

    let app_config = config::AppConfig::load()?;

    let store = Arc::new(telemetry::TelemetryStore::new(
        app_config.telemetry.container_prefix.clone(),
    ));
    let (telemetry_tx, _) =
        broadcast::channel::<routes::TelemetryPush>(app_config.telemetry.broadcast_capacity);
    routes::forward_telemetry(&store, telemetry_tx.clone());

    let audit_log = Arc::new(
        audit_repo::SqliteAuditLog::connect(
            &app_config.database.path,
            app_config.database.max_pool_size,
            app_config.database.retention_days,
        )
        .await?,
    );
    audit_log.init().await?;
    let feed = Arc::new(activity::ActivityFeed::new(
        audit_log.clone(),
        app_config.activity.scan_limit,
    ));

    let reporter = Arc::new(error_reporting::ErrorReporter::new(
        error_reporting::HttpErrorTransport::new(app_config.error_reporting.endpoint.clone())?,
        app_config.error_reporting.policy(),
    ));

    let sysinfo_repo = Arc::new(sysinfo_repo::SysinfoRepo::new());
    let docker_repo = Arc::new(docker_repo::DockerRepo::connect(
        app_config.telemetry.container_prefix.clone(),
    )?);

    let ws_connections = Arc::new(AtomicUsize::new(0));
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let (maintenance_shutdown_tx, maintenance_shutdown_rx) = tokio::sync::oneshot::channel();

    let poller_handle = poller::spawn(
        poller::PollerDeps {
            sysinfo_repo,
            docker_repo,
            store: store.clone(),
            ws_connections: ws_connections.clone(),
            shutdown_rx,
        },
        poller::PollerConfig {
            sample_interval_ms: app_config.telemetry.sample_interval_ms,
            stats_log_interval_secs: app_config.telemetry.stats_log_interval_secs,
        },
    );
    let maintenance_handle = maintenance_worker::spawn(
        audit_log,
        maintenance_worker::MaintenanceWorkerConfig {
            prune_interval_secs: app_config.database.prune_interval_secs,
            vacuum_schedule: app_config.database.vacuum_schedule.clone(),
            vacuum_interval_secs: app_config.database.vacuum_interval_secs,
        },
        maintenance_shutdown_rx,
    );

    let app = routes::app(routes::AppState {
        store,
        feed,
        reporter,
        telemetry_tx,
        ws_connections,
    });
    let addr = format!("{}:{}", app_config.server.host, app_config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    let in_container = std::path::Path::new("/.dockerenv").exists()
        || std::env::var("CONTAINER").as_deref() == Ok("1");

    if in_container {
        // In Docker: run server until error or SIGTERM (no signal handler; avoids immediate exit)
        axum::serve(listener, app).await?;
    } else {
        tokio::select! {
            result = axum::serve(listener, app) => {
                result?;
            }
            _ = async {
                #[cfg(unix)]
                {
                    let mut sigterm = match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                        Ok(s) => s,
                        Err(_) => {
                            let _ = tokio::signal::ctrl_c().await;
                            return;
                        }
                    };
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                #[cfg(not(unix))]
                {
                    let _ = tokio::signal::ctrl_c().await;
                }
            } => {
                tracing::info!("Received shutdown signal");
                let _ = shutdown_tx.send(());
                let _ = maintenance_shutdown_tx.send(());
                let _ = poller_handle.await;
                let _ = maintenance_handle.await;
            }
        }
    }

    Ok(())
}
