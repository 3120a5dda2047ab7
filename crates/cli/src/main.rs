//! Cost Allocation CLI
//!
//! A command-line tool for collecting a single run on demand and
//! listing stored runs for a time range.

mod commands;
mod output;

use allocation_lib::{
    source::DEFAULT_METRIC_PREFIX, CostAllocator, PrometheusSource, PrometheusSourceConfig,
    RunStore, UnmatchedPolicy,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use commands::{collect, runs};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Cost Allocation CLI
#[derive(Parser)]
#[command(name = "costctl")]
#[command(author, version, about = "CLI for Cost Allocation runs", long_about = None)]
pub struct Cli {
    /// Run database URL (can also be set via COST_DATABASE_URL env var)
    #[arg(long, env = "COST_DATABASE_URL", default_value = "sqlite://cost-allocation.db")]
    pub database_url: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Measure required resources once and store them as a run
    Collect {
        /// Prometheus base URL
        #[arg(long, env = "COST_PROMETHEUS_URL", default_value = "http://localhost:9090")]
        prometheus_url: String,

        /// Measurement time (RFC 3339), defaults to now
        #[arg(long)]
        at: Option<DateTime<Utc>>,

        /// Time budget per metrics query in seconds
        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,

        /// Prefix of the required-resource metric names
        #[arg(long, default_value = DEFAULT_METRIC_PREFIX)]
        metric_prefix: String,

        /// Fail when a CPU or memory sample has no replica sample
        #[arg(long)]
        strict: bool,

        /// Measure without storing the run
        #[arg(long)]
        dry_run: bool,
    },

    /// List stored runs measured within a time range
    Runs {
        /// Start of the range (RFC 3339, inclusive), defaults to 24h before --to
        #[arg(long)]
        from: Option<DateTime<Utc>>,

        /// End of the range (RFC 3339, inclusive), defaults to now
        #[arg(long)]
        to: Option<DateTime<Utc>>,

        /// Show the resources of every run
        #[arg(long)]
        details: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init();

    let store = RunStore::connect(&cli.database_url)
        .await
        .with_context(|| format!("Failed to open run database {}", cli.database_url))?;
    debug!(database_url = %cli.database_url, "Opened run database");

    match cli.command {
        Commands::Collect {
            prometheus_url,
            at,
            timeout_secs,
            metric_prefix,
            strict,
            dry_run,
        } => {
            let source = PrometheusSource::new(PrometheusSourceConfig {
                address: prometheus_url,
                query_timeout: Duration::from_secs(timeout_secs),
                metric_prefix,
            })?;
            let policy = if strict {
                UnmatchedPolicy::Reject
            } else {
                UnmatchedPolicy::Skip
            };
            let allocator = CostAllocator::new(Arc::new(source), store).with_policy(policy);

            let result =
                collect::collect_run(&allocator, at.unwrap_or_else(Utc::now), dry_run, cli.format)
                    .await;
            allocator.store().close().await;
            result
        }
        Commands::Runs { from, to, details } => {
            let (from, to) = runs::resolve_range(from, to)?;
            let result = runs::list_runs(&store, from, to, details, cli.format).await;
            store.close().await;
            result
        }
    }
}
