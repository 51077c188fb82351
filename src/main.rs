use anyhow::Result;
use std::time::Duration;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use aquacheck_service::{
    api::{self, AppState},
    bridge::{run_status_listener, RealtimeBridge},
    config::Config,
    db,
    ingest::IngestService,
    scan::{ScanCoordinator, ScanStatusStore},
    sensor::SensorSource,
    snapshot::LiveSnapshot,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent — env vars may be set externally)
    let _ = dotenvy::dotenv();

    // Initialise tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    // Load config
    let config = Config::from_env()?;

    // Connect to DB and run migrations
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    // Shared in-memory state and services
    let snapshot = LiveSnapshot::new();
    let bridge = RealtimeBridge::new();
    let ingest = IngestService::new(pool.clone(), snapshot.clone(), bridge.clone());
    let source = SensorSource::new(&config);
    let scan_status = ScanStatusStore::new(pool.clone());
    let coordinator = ScanCoordinator::new(
        scan_status.clone(),
        source.clone(),
        ingest.clone(),
        config.allowed_intervals_ms.clone(),
    );

    // Follow shared scan-status changes — this also resumes a scan that is
    // already running cluster-wide when the process comes up.
    tokio::spawn(run_status_listener(
        scan_status.clone(),
        coordinator.clone(),
        bridge.clone(),
    ));

    let state = AppState {
        pool,
        snapshot,
        bridge,
        ingest,
        coordinator,
        source,
        scan_status,
        offline_threshold: Duration::from_secs(config.offline_threshold_secs),
        cron_user_id: config.cron_user_id,
    };

    // Start HTTP server
    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
