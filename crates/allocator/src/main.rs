//! Cost Allocator - required resource collector
//!
//! Periodically queries Prometheus for the required CPU, memory and
//! replicas of every component and stores them as runs.

use allocation_lib::{
    CollectionConfig, CollectionLoop, CostAllocator, PrometheusSource, RunStore,
    StructuredLogger,
};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const ALLOCATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting cost-allocator");

    let config = config::AllocatorConfig::load()?;
    info!(
        instance = %config.instance_name,
        database_url = %config.database_url,
        "Allocator configured"
    );

    let logger = StructuredLogger::new(&config.instance_name);
    logger.log_startup(ALLOCATOR_VERSION, &config.prometheus_url, config.interval_secs);

    let source = PrometheusSource::new(config.prometheus()).context("Failed to create Prometheus source")?;
    let store = RunStore::connect(&config.database_url)
        .await
        .context("Failed to open run store")?;

    let allocator = Arc::new(
        CostAllocator::new(Arc::new(source), store)
            .with_policy(config.unmatched_policy)
            .with_logger(logger.clone()),
    );

    let mut collection_loop = CollectionLoop::new(
        allocator.clone(),
        CollectionConfig {
            interval: config.interval(),
        },
    );

    if config.run_once {
        let result = collection_loop.collect_once().await;
        allocator.store().close().await;
        logger.log_shutdown("single collection finished");
        result.context("Collection failed")?;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let loop_handle = tokio::spawn(collection_loop.run(shutdown_rx));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    let _ = shutdown_tx.send(());

    let results = loop_handle.await.context("Collection loop panicked")?;
    info!(
        successes = results.success_count,
        errors = results.error_count,
        "Shutting down"
    );

    allocator.store().close().await;
    Ok(())
}
