//! Allocator configuration

use allocation_lib::{source::DEFAULT_METRIC_PREFIX, PrometheusSourceConfig, UnmatchedPolicy};
use anyhow::{ensure, Context, Result};
use config::builder::DefaultState;
use config::ConfigBuilder;
use serde::Deserialize;
use std::time::Duration;

/// Allocator configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AllocatorConfig {
    /// Name reported in structured log events
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Prometheus server base URL
    #[serde(default = "default_prometheus_url")]
    pub prometheus_url: String,

    /// SQLite database URL for runs
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Seconds between measurements
    #[serde(default = "default_interval")]
    pub interval_secs: u64,

    /// Time budget per metrics query in seconds
    #[serde(default = "default_query_timeout")]
    pub query_timeout_secs: u64,

    /// Prefix of the required-resource metric names
    #[serde(default = "default_metric_prefix")]
    pub metric_prefix: String,

    /// Handling of CPU/memory samples without a replica sample
    #[serde(default)]
    pub unmatched_policy: UnmatchedPolicy,

    /// Collect a single run and exit
    #[serde(default)]
    pub run_once: bool,
}

fn default_instance_name() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "cost-allocator".to_string())
}

fn default_prometheus_url() -> String {
    "http://prometheus:9090".to_string()
}

fn default_database_url() -> String {
    "sqlite://cost-allocation.db".to_string()
}

fn default_interval() -> u64 {
    3600
}

fn default_query_timeout() -> u64 {
    10
}

fn default_metric_prefix() -> String {
    DEFAULT_METRIC_PREFIX.to_string()
}

impl AllocatorConfig {
    /// Load configuration from `ALLOCATOR_*` environment variables
    pub fn load() -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::Environment::with_prefix("ALLOCATOR").try_parsing(true));

        Self::from_builder(builder)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let config: AllocatorConfig = builder
            .build()
            .context("Failed to read allocator configuration")?
            .try_deserialize()
            .context("Invalid allocator configuration")?;

        ensure!(config.interval_secs > 0, "interval_secs must be positive");
        ensure!(
            config.query_timeout_secs > 0,
            "query_timeout_secs must be positive"
        );

        Ok(config)
    }

    /// Settings for the Prometheus metric source
    pub fn prometheus(&self) -> PrometheusSourceConfig {
        PrometheusSourceConfig {
            address: self.prometheus_url.clone(),
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            metric_prefix: self.metric_prefix.clone(),
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AllocatorConfig::from_builder(config::Config::builder()).unwrap();

        assert_eq!(config.prometheus_url, "http://prometheus:9090");
        assert_eq!(config.database_url, "sqlite://cost-allocation.db");
        assert_eq!(config.interval(), Duration::from_secs(3600));
        assert_eq!(config.prometheus().query_timeout, Duration::from_secs(10));
        assert_eq!(config.metric_prefix, "radix_operator");
        assert_eq!(config.unmatched_policy, UnmatchedPolicy::Skip);
        assert!(!config.run_once);
    }

    #[test]
    fn test_overrides() {
        let builder = config::Config::builder()
            .set_override("interval_secs", 300)
            .unwrap()
            .set_override("unmatched_policy", "reject")
            .unwrap()
            .set_override("run_once", true)
            .unwrap();

        let config = AllocatorConfig::from_builder(builder).unwrap();

        assert_eq!(config.interval_secs, 300);
        assert_eq!(config.unmatched_policy, UnmatchedPolicy::Reject);
        assert!(config.run_once);
    }

    #[test]
    fn test_zero_interval_rejected() {
        let builder = config::Config::builder()
            .set_override("interval_secs", 0)
            .unwrap();

        assert!(AllocatorConfig::from_builder(builder).is_err());
    }
}
