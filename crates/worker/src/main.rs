use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use helmsman_events::{EventBus, HookNotifier, ScriptDelivery, WebhookDelivery};
use helmsman_pipeline::{ExecutionPipeline, PeriodicTaskService};
use helmsman_worker::background::{history_reaper, scheduler};
use helmsman_worker::config::WorkerConfig;
use helmsman_worker::seed;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long to wait for each background loop to stop.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "helmsman_worker=debug,helmsman_pipeline=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env();
    tracing::info!(
        projects_dir = %config.pipeline.projects_dir.display(),
        workers = config.pipeline.worker_concurrency,
        "Loaded worker configuration"
    );
    tokio::fs::create_dir_all(&config.pipeline.projects_dir)
        .await
        .context("creating projects directory")?;

    // --- Storage and events ---
    let pool = helmsman_db::create_pool();
    let event_bus = Arc::new(EventBus::default());

    let notifier = HookNotifier::new(
        pool.clone(),
        WebhookDelivery::new().context("building webhook client")?,
        ScriptDelivery::new(config.pipeline.hooks_dir.clone()),
    );
    let notifier_handle = tokio::spawn(notifier.run(event_bus.subscribe()));

    // --- Pipeline ---
    let pipeline =
        ExecutionPipeline::with_ansible(pool.clone(), config.pipeline.clone(), Arc::clone(&event_bus))
            .context("building execution pipeline")?;

    if let Some(path) = &config.seed_file {
        let loaded = seed::load_file(path).await?;
        seed::apply(&pipeline, loaded).await?;
    }

    // --- Background loops ---
    let cancel = CancellationToken::new();
    let scheduler_handle = tokio::spawn(scheduler::run(
        PeriodicTaskService::new(pipeline.clone()),
        config.scheduler_tick,
        cancel.clone(),
    ));
    let reaper_handle = tokio::spawn(history_reaper::run(
        pool.clone(),
        config.history_stale_after,
        config.reaper_interval,
        cancel.clone(),
    ));
    tracing::info!("Worker running");

    shutdown_signal().await;

    // --- Shutdown ---
    tracing::info!("Shutdown requested, stopping background loops");
    cancel.cancel();
    let _ = tokio::time::timeout(STOP_TIMEOUT, scheduler_handle).await;
    let _ = tokio::time::timeout(STOP_TIMEOUT, reaper_handle).await;

    pipeline.shutdown().await;
    tracing::info!("Running executions drained");

    // The pipeline holds a clone of the bus; dropping both closes the channel.
    drop(pipeline);
    drop(event_bus);
    let _ = tokio::time::timeout(STOP_TIMEOUT, notifier_handle).await;

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
