//! Startup and shutdown orchestration.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use healthtrack_bus::EventBusClient;
use healthtrack_core::clock::{Clock, SystemClock};
use healthtrack_core::repository::{OutboxRepository, ProjectionStore, RecordRepository};
use healthtrack_monitor::{HealthCheck, HealthMonitor, Metrics, ServiceHealth, StoreProbe};
use healthtrack_replication::{OutboxRelay, ReplicationConsumer, ReplicationPublisher};
use healthtrack_store::{
    DualStore, PendingMigrations, PgOutbox, PgProjectionStore, PgRecordRepository,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::build_router;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::state::AppState;

/// Runs the server until `shutdown` resolves, then tears everything down in
/// order: HTTP drain, consumer, background tasks, bus, store pools.
///
/// # Errors
///
/// Returns `AppError::StoresUnreachable` when neither store answers at
/// startup, and any bind, bus or registry failure.
pub async fn run<F>(config: AppConfig, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = config.bind_addr()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(Metrics::new()?);

    let store = DualStore::connect(&config.store)?;
    let status = store.check_connection().await;
    if !status.any() {
        error!("neither the write store nor the read store is reachable");
        return Err(AppError::StoresUnreachable);
    }
    let (stop_tx, stop_rx) = watch::channel(false);
    let mut tasks = Vec::new();
    let pending = store.migrate_reachable(PendingMigrations::ALL).await?;
    if !pending.is_done() {
        warn!(write = pending.write, read = pending.read, "store unreachable, migrations deferred");
        tasks.push((
            "deferred migrations",
            spawn_deferred_migrations(
                store.clone(),
                pending,
                config.health_check_interval,
                stop_rx.clone(),
            ),
        ));
    }

    let bus = Arc::new(EventBusClient::connect(&config.bus).await?);
    info!(backend = bus.backend_name(), degraded = bus.is_degraded(), "event bus ready");

    let health = ServiceHealth::new(Arc::clone(&clock), Some(Arc::clone(&metrics)));
    let monitor = HealthMonitor::new(&health, health_checks(&store))?;
    monitor.run_checks().await;
    tasks.push((
        "health monitor",
        monitor.spawn(config.health_check_interval, stop_rx.clone()),
    ));

    let outbox: Arc<dyn OutboxRepository> =
        Arc::new(PgOutbox::new(store.write_pool().clone(), Arc::clone(&clock)));
    let publisher = Arc::new(ReplicationPublisher::new(
        Arc::clone(&bus),
        Arc::clone(&outbox),
        Arc::clone(&clock),
        Some(Arc::clone(&metrics)),
    ));
    tasks.push((
        "outbox relay",
        OutboxRelay::new(Arc::clone(&bus), outbox, Some(Arc::clone(&metrics)))
            .spawn(config.outbox_relay_interval, stop_rx),
    ));

    let projection: Arc<dyn ProjectionStore> =
        Arc::new(PgProjectionStore::new(store.read_pool().clone()));
    let consumer = ReplicationConsumer::new(projection, Some(Arc::clone(&metrics)));
    if let Err(e) = consumer.start(&bus).await {
        error!(error = %e, "replication consumer failed to start");
    }

    let records: Arc<dyn RecordRepository> =
        Arc::new(PgRecordRepository::new(store.clone(), Arc::clone(&clock)));
    let app = build_router(AppState::new(records, publisher, health, metrics));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "listening");
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;
    info!("http server stopped, shutting down");

    let dropped = consumer.stop(config.shutdown_grace).await;
    if dropped > 0 {
        warn!(dropped, "replication workers did not finish within the grace period");
    }
    // The receivers only fail to observe this if the tasks already ended.
    let _ = stop_tx.send(true);
    for (name, task) in tasks {
        if let Err(e) = task.await {
            warn!(task = name, error = %e, "background task ended abnormally");
        }
    }
    bus.disconnect();
    store.close().await;
    info!("shutdown complete");

    served.map_err(AppError::from)
}

/// Probes for every category service and the dashboard on the read store,
/// plus the write store itself.
fn health_checks(store: &DualStore) -> Vec<Arc<dyn HealthCheck>> {
    StoreProbe::all(store.read_pool())
        .into_iter()
        .chain(std::iter::once(StoreProbe::write_store(store.write_pool().clone())))
        .map(|probe| Arc::new(probe) as Arc<dyn HealthCheck>)
        .collect()
}

/// Retries the migrations of stores that were unreachable at startup every
/// `interval` until all are applied or `shutdown` flips to `true`.
fn spawn_deferred_migrations(
    store: DualStore,
    mut pending: PendingMigrations,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ticker.tick().await;
        while !pending.is_done() {
            tokio::select! {
                _ = ticker.tick() => {
                    match store.migrate_reachable(pending).await {
                        Ok(remaining) => pending = remaining,
                        Err(e) => error!(error = %e, "deferred migration failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        if pending.is_done() {
            info!("deferred migrations applied");
        }
    })
}

/// Resolves on Ctrl-C or, on Unix, SIGTERM.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use healthtrack_bus::BusConfig;
    use healthtrack_monitor::{HealthState, HealthStatus};
    use healthtrack_store::StoreConfig;
    use sqlx::postgres::PgPoolOptions;

    use super::*;

    #[tokio::test]
    async fn test_run_fails_when_both_stores_are_unreachable() {
        // Arrange
        let config = AppConfig {
            store: StoreConfig {
                write_url: "postgres://health@127.0.0.1:1/write".into(),
                read_url: "postgres://health@127.0.0.1:1/read".into(),
                max_connections: 1,
                acquire_timeout: Duration::from_millis(500),
            },
            host: "127.0.0.1".into(),
            port: 0,
            bus: BusConfig {
                enabled: false,
                local_log_dir: None,
                ..BusConfig::default()
            },
            health_check_interval: Duration::from_secs(15),
            outbox_relay_interval: Duration::from_secs(5),
            shutdown_grace: Duration::from_secs(1),
            otlp_endpoint: None,
        };

        // Act
        let result = run(config, std::future::pending()).await;

        // Assert
        assert!(matches!(result, Err(AppError::StoresUnreachable)));
    }

    fn unreachable_pool(db: &str) -> sqlx::PgPool {
        PgPoolOptions::new()
            .acquire_timeout(Duration::from_millis(200))
            .connect_lazy(&format!("postgres://health@127.0.0.1:1/{db}"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_unreachable_write_store_degrades_health() {
        // Arrange
        let store = DualStore::from_pools(unreachable_pool("write"), unreachable_pool("read"));
        let health = ServiceHealth::new(Arc::new(SystemClock), None);
        let monitor = HealthMonitor::new(&health, health_checks(&store)).unwrap();

        // Act
        let down = monitor.run_checks().await;
        let report = health.report();

        // Assert
        assert_eq!(down, 6);
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.services["write_store"], HealthState::Down);
        assert_eq!(report.services.len(), 6);
    }

    #[tokio::test]
    async fn test_deferred_migrations_stop_on_shutdown() {
        // Arrange
        let store = DualStore::from_pools(unreachable_pool("write"), unreachable_pool("read"));
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = spawn_deferred_migrations(
            store,
            PendingMigrations::ALL,
            Duration::from_millis(20),
            stop_rx,
        );
        tokio::time::sleep(Duration::from_millis(100)).await;

        // Act
        stop_tx.send(true).unwrap();
        let finished = tokio::time::timeout(Duration::from_secs(5), task).await;

        // Assert
        assert!(matches!(finished, Ok(Ok(()))));
    }
}
