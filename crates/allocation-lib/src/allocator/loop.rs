//! Periodic collection loop
//!
//! Runs one measurement per tick until shutdown. A failed tick is logged and
//! the next tick starts a fresh measurement; nothing is retried.

use super::CostAllocator;
use crate::error::Result;
use crate::models::Run;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// Configuration for the collection loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Time between measurements (default: 1 hour)
    pub interval: Duration,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60 * 60),
        }
    }
}

/// Collection loop measuring and persisting a run on every tick
pub struct CollectionLoop {
    allocator: Arc<CostAllocator>,
    config: CollectionConfig,
    results: CollectionResults,
}

/// Counts of collection outcomes since the loop started
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectionResults {
    pub success_count: usize,
    pub error_count: usize,
}

impl CollectionLoop {
    pub fn new(allocator: Arc<CostAllocator>, config: CollectionConfig) -> Self {
        Self {
            allocator,
            config,
            results: CollectionResults::default(),
        }
    }

    /// Run until a shutdown message arrives; returns the outcome counts
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) -> CollectionResults {
        info!(
            interval_secs = self.config.interval.as_secs(),
            "Starting resource collection loop"
        );

        let mut ticker = interval(self.config.interval);
        // A long outage must not trigger a burst of back-to-back measurements
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let _ = self.collect_once().await;
                }
                _ = shutdown.recv() => {
                    info!(
                        successes = self.results.success_count,
                        errors = self.results.error_count,
                        "Shutting down resource collection loop"
                    );
                    break;
                }
            }
        }

        self.results
    }

    /// Measure and persist a single run at the current time
    pub async fn collect_once(&mut self) -> Result<Run> {
        let start = Instant::now();
        let at = Utc::now();

        let result = self.allocator.collect(at).await;
        match &result {
            Ok(run) => {
                self.results.success_count += 1;
                debug!(
                    run_id = ?run.id,
                    elapsed_ms = start.elapsed().as_millis(),
                    "Collection cycle complete"
                );
            }
            Err(e) => {
                self.results.error_count += 1;
                self.allocator.logger().log_collection_failed(at, e);
            }
        }

        result
    }

    pub fn results(&self) -> CollectionResults {
        self.results
    }
}
