//! Measurement pipeline
//!
//! Drives one measurement end to end: query the metric source, join the
//! vectors into resource records, compute cluster totals and persist the run.

mod r#loop;

pub use r#loop::{CollectionConfig, CollectionLoop, CollectionResults};

use crate::aggregate::{aggregate, UnmatchedPolicy};
use crate::error::Result;
use crate::models::Run;
use crate::observability::StructuredLogger;
use crate::source::{fetch_required_vectors, MetricSource};
use crate::store::RunStore;
use chrono::{DateTime, SubsecRound, Utc};
use std::sync::Arc;

/// Joins metric source and run store into the collection pipeline
pub struct CostAllocator {
    source: Arc<dyn MetricSource>,
    store: RunStore,
    policy: UnmatchedPolicy,
    logger: StructuredLogger,
}

impl CostAllocator {
    /// Create an allocator skipping unmatched samples
    pub fn new(source: Arc<dyn MetricSource>, store: RunStore) -> Self {
        Self {
            source,
            store,
            policy: UnmatchedPolicy::default(),
            logger: StructuredLogger::default(),
        }
    }

    /// Set the policy for CPU/memory samples without a replica sample
    pub fn with_policy(mut self, policy: UnmatchedPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Set the structured logger
    pub fn with_logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = logger;
        self
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    pub fn logger(&self) -> &StructuredLogger {
        &self.logger
    }

    /// Measure required resources at `at` without persisting them.
    ///
    /// The measurement time is truncated to milliseconds, the precision kept by the store.
    pub async fn measure(&self, at: DateTime<Utc>) -> Result<Run> {
        let at = at.trunc_subsecs(3);
        let vectors = fetch_required_vectors(self.source.as_ref(), at).await?;
        let resources = aggregate(&vectors, self.policy)?;

        Ok(Run::from_resources(at, resources))
    }

    /// Measure required resources at `at` and persist them as a new run.
    pub async fn collect(&self, at: DateTime<Utc>) -> Result<Run> {
        let mut run = self.measure(at).await?;
        self.store.save_run(&mut run).await?;

        self.logger.log_run_persisted(&run);
        Ok(run)
    }

    /// Runs measured within `[from, to]`, with their resources.
    pub async fn runs_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Result<Vec<Run>> {
        self.store.runs_between(from, to).await
    }
}
