//! Structured logging for allocation events
//!
//! Every event carries an `event` field and the allocator instance name so
//! JSON log lines can be filtered without parsing messages.

use crate::error::Error;
use crate::models::Run;
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

/// Structured logger for allocator events
#[derive(Debug, Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl Default for StructuredLogger {
    fn default() -> Self {
        Self::new("cost-allocator")
    }
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    /// Log allocator startup
    pub fn log_startup(&self, version: &str, prometheus_url: &str, interval_secs: u64) {
        info!(
            event = "allocator_started",
            instance = %self.instance,
            version = %version,
            prometheus_url = %prometheus_url,
            interval_secs = interval_secs,
            "Cost allocator started"
        );
    }

    /// Log allocator shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "allocator_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Cost allocator shutting down"
        );
    }

    /// Log a run that was written to the store
    pub fn log_run_persisted(&self, run: &Run) {
        let run_id = run.id.unwrap_or_default();

        if run.resources.is_empty() {
            warn!(
                event = "run_persisted",
                instance = %self.instance,
                run_id = run_id,
                measured_time = %run.measured_time_utc,
                "Persisted run without any components"
            );
            return;
        }

        info!(
            event = "run_persisted",
            instance = %self.instance,
            run_id = run_id,
            measured_time = %run.measured_time_utc,
            components = run.resources.len(),
            replicas = run.total_replicas(),
            cluster_cpu_millicores = run.cluster_cpu_millicores,
            cluster_memory_mega_bytes = run.cluster_memory_mega_bytes,
            "Persisted resource run"
        );
    }

    /// Log a failed collection for the given measurement time
    pub fn log_collection_failed(&self, measured_time: DateTime<Utc>, err: &Error) {
        let stage = if err.is_source_error() {
            "metrics"
        } else if matches!(err, Error::AggregationInconsistency { .. }) {
            "aggregation"
        } else {
            "storage"
        };

        error!(
            event = "collection_failed",
            instance = %self.instance,
            measured_time = %measured_time,
            stage = stage,
            error = %err,
            "Resource collection failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Metric;

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-allocator");
        assert_eq!(logger.instance(), "test-allocator");
        assert_eq!(StructuredLogger::default().instance(), "cost-allocator");
    }

    #[test]
    fn test_logging_does_not_panic_without_subscriber() {
        let logger = StructuredLogger::new("test-allocator");
        let run = Run::from_resources(Utc::now(), vec![]);

        logger.log_run_persisted(&run);
        logger.log_collection_failed(
            Utc::now(),
            &Error::QueryFailed {
                metric: Metric::Cpu,
                reason: "timeout".to_string(),
            },
        );
    }
}
