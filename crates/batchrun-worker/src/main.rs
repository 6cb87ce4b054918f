//! batchrun worker daemon.
//!
//! Connects to PostgreSQL, applies migrations and drives the batch processor
//! until interrupted.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use batchrun_core::defaults;
use batchrun_db::{log_pool_metrics, Database, PoolConfig};
use batchrun_jobs::{
    batch_kind, executor_for_mode, BatchAdmin, DrainMode, ExecutorRegistry, TaskStore,
    WorkerBuilder, WorkerConfig, WorkerEvent,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let _log_guard = init_logging();

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| defaults::DATABASE_URL.to_string());

    let db = Database::connect_with_config(&database_url, PoolConfig::from_env()).await?;
    log_pool_metrics(db.pool());

    db.migrate().await?;
    info!("Database migrations applied");

    let config = WorkerConfig::from_env();
    let enabled = config.enabled;

    // Domain executors are registered here; a batch whose kind has none
    // fails and stays open until one is.
    let registry = ExecutorRegistry::new();
    log_backlog(&db, &registry, config.drain_mode).await?;

    let tasks: Arc<dyn TaskStore> = Arc::new(db.tasks.clone());
    let executor = executor_for_mode(config.drain_mode, registry, tasks.clone());
    let worker = WorkerBuilder::new(Arc::new(db.batches.clone()), tasks)
        .with_config(config)
        .with_executor(executor)
        .build()?;

    let mut events = worker.events();
    let handle = worker.start();

    let stopped_early = tokio::select! {
        _ = shutdown_signal() => false,
        _ = wait_for_stop(&mut events) => true,
    };

    if stopped_early {
        if enabled {
            warn!("Batch worker exited on its own");
        }
    } else {
        handle.shutdown().await?;
        let wait = Duration::from_secs(defaults::WORKER_SHUTDOWN_TIMEOUT_SECS);
        if tokio::time::timeout(wait, wait_for_stop(&mut events))
            .await
            .is_err()
        {
            warn!(
                timeout_secs = defaults::WORKER_SHUTDOWN_TIMEOUT_SECS,
                "Batch worker did not stop in time"
            );
        }
    }

    db.pool().close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Report incomplete batches at startup and flag kinds nothing can run.
async fn log_backlog(
    db: &Database,
    registry: &ExecutorRegistry,
    mode: DrainMode,
) -> anyhow::Result<()> {
    let backlog = db
        .batches
        .list_incomplete(defaults::LIST_INCOMPLETE_LIMIT)
        .await?;
    info!(
        drain_mode = %mode,
        registered_kinds = ?registry.kinds(),
        incomplete_batches = backlog.len(),
        "Batch backlog at startup"
    );

    if mode == DrainMode::Registry {
        for batch in &backlog {
            let kind = batch_kind(&batch.batch_params);
            if !kind.is_some_and(|k| registry.has_executor(k)) {
                warn!(
                    batch_id = %batch.id,
                    batch_kind = kind.unwrap_or("-"),
                    "No executor registered for batch kind, it will not progress"
                );
            }
        }
    }
    Ok(())
}

/// Initialize tracing with configurable output.
///
/// Environment variables:
///   LOG_FORMAT  - "json" or "text" (default: "text")
///   LOG_FILE    - path to log file (optional, enables daily-rotated file logging)
///   LOG_ANSI    - "true"/"false" override ANSI colors (auto-detected by default)
///   RUST_LOG    - standard env filter (default: [`defaults::LOG_FILTER`])
///
/// The returned guard must live until exit so buffered file output is flushed.
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "text".to_string());
    let log_file = std::env::var("LOG_FILE").ok();
    let log_ansi = std::env::var("LOG_ANSI")
        .ok()
        .map(|v| v == "true" || v == "1");

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| defaults::LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(env_filter);

    let guard = match log_file.as_deref() {
        Some(path) => {
            let path = std::path::Path::new(path);
            let dir = path.parent().unwrap_or(std::path::Path::new("."));
            let file_name = path
                .file_name()
                .and_then(|f| f.to_str())
                .unwrap_or("batchrun-worker.log");
            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::daily(dir, file_name));

            if log_format == "json" {
                registry
                    .with(tracing_subscriber::fmt::layer().json().with_writer(writer))
                    .init();
            } else {
                // No ANSI in files unless asked for.
                let layer = tracing_subscriber::fmt::layer()
                    .with_writer(writer)
                    .with_ansi(log_ansi.unwrap_or(false));
                registry.with(layer).init();
            }
            Some(guard)
        }
        None => {
            if log_format == "json" {
                registry
                    .with(tracing_subscriber::fmt::layer().json())
                    .init();
            } else {
                let mut layer = tracing_subscriber::fmt::layer();
                if let Some(ansi) = log_ansi {
                    layer = layer.with_ansi(ansi);
                }
                registry.with(layer).init();
            }
            None
        }
    };

    info!(
        log_format = %log_format,
        log_file = log_file.as_deref().unwrap_or("(stdout)"),
        "Logging initialized"
    );
    guard
}

/// Resolve once the worker reports it has stopped or its event bus closes.
async fn wait_for_stop(events: &mut broadcast::Receiver<WorkerEvent>) {
    loop {
        match events.recv().await {
            Ok(WorkerEvent::WorkerStopped) | Err(broadcast::error::RecvError::Closed) => return,
            Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
        }
    }
}

/// Wait for Ctrl+C or, on unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                warn!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received SIGTERM, shutting down");
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
