//! Metric source adapter
//!
//! Queries the metrics backend for the required CPU, memory and replica
//! vectors of every component at a single point in time.

mod prometheus;

pub use prometheus::{PrometheusSource, PrometheusSourceConfig};

use crate::error::Result;
use crate::models::{labels, RequiredResourceVectors, Sample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

pub use async_trait::async_trait;

/// Default prefix of the required-resource metric names
pub const DEFAULT_METRIC_PREFIX: &str = "radix_operator";

/// The three required-resource metrics joined into a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Memory,
    Replicas,
}

impl Metric {
    /// Metric name suffix as exported by the operator
    pub fn name(&self) -> &'static str {
        match self {
            Metric::Cpu => "requested_cpu",
            Metric::Memory => "requested_memory",
            Metric::Replicas => "requested_replicas",
        }
    }

    /// Instant query expression summing the metric per identity key
    pub fn query(&self, prefix: &str) -> String {
        format!(
            "sum({}_{}) by ({}, {}, {})",
            prefix,
            self.name(),
            labels::APPLICATION,
            labels::ENVIRONMENT,
            labels::COMPONENT
        )
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Metric::Cpu => "cpu",
            Metric::Memory => "memory",
            Metric::Replicas => "replicas",
        };
        f.write_str(name)
    }
}

/// Backend able to evaluate an instant query for a required-resource metric
#[async_trait]
pub trait MetricSource: Send + Sync {
    /// Evaluate the query for `metric` at `at`, returning one sample per series
    async fn query_vector(&self, metric: Metric, at: DateTime<Utc>) -> Result<Vec<Sample>>;
}

/// Fetch the CPU, memory and replica vectors one after another.
///
/// The first failing query aborts the retrieval; there is no partial result.
pub async fn fetch_required_vectors(
    source: &dyn MetricSource,
    at: DateTime<Utc>,
) -> Result<RequiredResourceVectors> {
    let cpu = source.query_vector(Metric::Cpu, at).await?;
    let memory = source.query_vector(Metric::Memory, at).await?;
    let replicas = source.query_vector(Metric::Replicas, at).await?;

    debug!(
        at = %at,
        cpu_samples = cpu.len(),
        memory_samples = memory.len(),
        replica_samples = replicas.len(),
        "Fetched required resource vectors"
    );

    Ok(RequiredResourceVectors {
        cpu,
        memory,
        replicas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    /// Mock source recording the order of queried metrics
    struct MockSource {
        calls: Mutex<Vec<Metric>>,
        fail_on: Option<Metric>,
    }

    impl MockSource {
        fn new(fail_on: Option<Metric>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail_on,
            }
        }
    }

    #[async_trait]
    impl MetricSource for MockSource {
        async fn query_vector(&self, metric: Metric, _at: DateTime<Utc>) -> Result<Vec<Sample>> {
            self.calls.lock().unwrap().push(metric);
            if self.fail_on == Some(metric) {
                return Err(Error::QueryFailed {
                    metric,
                    reason: "backend unavailable".to_string(),
                });
            }
            Ok(vec![Sample {
                labels: Default::default(),
                value: 1.0,
            }])
        }
    }

    #[test]
    fn test_query_expressions() {
        assert_eq!(
            Metric::Cpu.query(DEFAULT_METRIC_PREFIX),
            "sum(radix_operator_requested_cpu) by (application, environment, component)"
        );
        assert_eq!(
            Metric::Replicas.query("custom"),
            "sum(custom_requested_replicas) by (application, environment, component)"
        );
    }

    #[tokio::test]
    async fn test_fetch_queries_sequentially() {
        let source = MockSource::new(None);
        let vectors = fetch_required_vectors(&source, Utc::now()).await.unwrap();

        assert_eq!(
            *source.calls.lock().unwrap(),
            vec![Metric::Cpu, Metric::Memory, Metric::Replicas]
        );
        assert_eq!(vectors.cpu.len(), 1);
        assert_eq!(vectors.memory.len(), 1);
        assert_eq!(vectors.replicas.len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_aborts_on_first_failure() {
        let source = MockSource::new(Some(Metric::Memory));
        let err = fetch_required_vectors(&source, Utc::now())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::QueryFailed {
                metric: Metric::Memory,
                ..
            }
        ));
        // Replicas are never queried once memory failed
        assert_eq!(
            *source.calls.lock().unwrap(),
            vec![Metric::Cpu, Metric::Memory]
        );
    }
}
