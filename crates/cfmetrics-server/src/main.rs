mod config;

use std::sync::Arc;

use anyhow::Context;
use cfmetrics_api::{ApiState, api_router};
use cfmetrics_collector::{Aggregator, CollectionScheduler, CollectorStats, SnapshotStore};
use cfmetrics_platform::{CfResolver, HttpInstanceFetcher};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{Cli, ExporterConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::from_default_env().add_directive("cfmetrics=info".parse()?);
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let config = ExporterConfig::from_cli(Cli::parse()).context("invalid configuration")?;
    info!(
        api = %config.platform.api,
        app_guid = %config.aggregator.app_guid,
        metrics_url = %config.fetcher.metrics_url,
        "starting cfmetrics"
    );

    let resolver = Arc::new(CfResolver::new(config.platform.clone())?);
    let fetcher = Arc::new(HttpInstanceFetcher::new(config.fetcher.clone())?);
    let store = Arc::new(SnapshotStore::new());
    let stats = Arc::new(CollectorStats::new());
    let aggregator = Arc::new(Aggregator::new(
        resolver,
        fetcher,
        Arc::clone(&store),
        Arc::clone(&stats),
        config.aggregator.clone(),
    ));

    let scheduler = CollectionScheduler::new(aggregator, config.collect_interval);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let runner = scheduler.clone();
    let scheduler_task = tokio::spawn(async move { runner.run(shutdown_rx).await });

    let state = Arc::new(ApiState::new(store, stats, scheduler.trigger_handle()));
    let app = api_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    info!("cfmetrics listening on {}", config.listen_addr);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(err) = scheduler_task.await {
        warn!(error = %err, "collection scheduler task ended abnormally");
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
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

    info!("shutdown signal received");
}
