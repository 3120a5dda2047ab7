//! Prometheus HTTP API client for instant queries

use super::{async_trait, Metric, MetricSource, DEFAULT_METRIC_PREFIX};
use crate::error::{Error, Result};
use crate::models::Sample;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Configuration for the Prometheus source
#[derive(Debug, Clone)]
pub struct PrometheusSourceConfig {
    /// Base URL of the Prometheus server (e.g., "http://prometheus:9090")
    pub address: String,
    /// Time budget for each query (default: 10 seconds)
    pub query_timeout: Duration,
    /// Prefix of the required-resource metric names
    pub metric_prefix: String,
}

impl Default for PrometheusSourceConfig {
    fn default() -> Self {
        Self {
            address: "http://prometheus:9090".to_string(),
            query_timeout: Duration::from_secs(10),
            metric_prefix: DEFAULT_METRIC_PREFIX.to_string(),
        }
    }
}

/// Instant query response envelope
#[derive(Debug, Deserialize)]
struct PrometheusResponse {
    status: String,
    #[serde(default)]
    data: Option<PrometheusData>,
    #[serde(default, rename = "errorType")]
    error_type: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    warnings: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PrometheusData {
    #[serde(rename = "resultType")]
    result_type: String,
    // Shape depends on result_type, decoded once the type is known
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct VectorSample {
    #[serde(default)]
    metric: HashMap<String, String>,
    value: (f64, String),
}

/// Metric source backed by the Prometheus HTTP API
pub struct PrometheusSource {
    client: Client,
    query_url: Url,
    config: PrometheusSourceConfig,
}

impl PrometheusSource {
    /// Create a new source for the given configuration
    pub fn new(config: PrometheusSourceConfig) -> Result<Self> {
        let mut base = Url::parse(&config.address).map_err(|e| Error::ClientCreationFailed {
            reason: format!("invalid address '{}': {}", config.address, e),
        })?;

        if base.cannot_be_a_base() {
            return Err(Error::ClientCreationFailed {
                reason: format!("address '{}' cannot be used as a base URL", config.address),
            });
        }

        // Keep any path prefix when joining the API path
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }

        let query_url = base
            .join("api/v1/query")
            .map_err(|e| Error::ClientCreationFailed {
                reason: e.to_string(),
            })?;

        let client = Client::builder()
            .timeout(config.query_timeout)
            .build()
            .map_err(|e| Error::ClientCreationFailed {
                reason: e.to_string(),
            })?;

        Ok(Self {
            client,
            query_url,
            config,
        })
    }

    /// Create a source with default settings for the given address
    pub fn with_address(address: impl Into<String>) -> Result<Self> {
        Self::new(PrometheusSourceConfig {
            address: address.into(),
            ..Default::default()
        })
    }

    /// Full URL of the instant query endpoint
    pub fn query_url(&self) -> &Url {
        &self.query_url
    }

    async fn instant_query(&self, metric: Metric, at: DateTime<Utc>) -> Result<PrometheusData> {
        let query = metric.query(&self.config.metric_prefix);
        let time = format!("{:.3}", at.timestamp_millis() as f64 / 1000.0);
        let timeout = format!("{}s", self.config.query_timeout.as_secs().max(1));

        debug!(metric = %metric, query = %query, time = %time, "Querying Prometheus");

        let response = self
            .client
            .get(self.query_url.clone())
            .query(&[
                ("query", query.as_str()),
                ("time", time.as_str()),
                ("timeout", timeout.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("timed out after {:?}", self.config.query_timeout)
                } else {
                    e.to_string()
                };
                Error::QueryFailed { metric, reason }
            })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| Error::QueryFailed {
            metric,
            reason: format!("failed to read response body: {}", e),
        })?;

        let parsed: Option<PrometheusResponse> = serde_json::from_str(&body).ok();

        if !status.is_success() {
            let detail = parsed
                .as_ref()
                .and_then(|p| p.error.clone())
                .unwrap_or(body);
            return Err(Error::QueryFailed {
                metric,
                reason: format!("HTTP {}: {}", status, detail),
            });
        }

        let parsed = parsed.ok_or_else(|| Error::QueryFailed {
            metric,
            reason: "response is not a valid query result".to_string(),
        })?;

        if !parsed.warnings.is_empty() {
            warn!(metric = %metric, warnings = ?parsed.warnings, "Prometheus returned warnings");
        }

        if parsed.status != "success" {
            return Err(Error::QueryFailed {
                metric,
                reason: format!(
                    "{}: {}",
                    parsed.error_type.unwrap_or_else(|| parsed.status.clone()),
                    parsed.error.unwrap_or_default()
                ),
            });
        }

        parsed.data.ok_or_else(|| Error::QueryFailed {
            metric,
            reason: "response has no data".to_string(),
        })
    }
}

#[async_trait]
impl MetricSource for PrometheusSource {
    async fn query_vector(&self, metric: Metric, at: DateTime<Utc>) -> Result<Vec<Sample>> {
        let data = self.instant_query(metric, at).await?;

        if data.result_type != "vector" {
            return Err(Error::UnexpectedResultType {
                metric,
                result_type: data.result_type,
            });
        }

        let series: Vec<VectorSample> =
            serde_json::from_value(data.result).map_err(|e| Error::QueryFailed {
                metric,
                reason: format!("malformed vector result: {}", e),
            })?;

        series
            .into_iter()
            .map(|s| {
                let value = s.value.1.parse::<f64>().map_err(|e| Error::QueryFailed {
                    metric,
                    reason: format!("invalid sample value '{}': {}", s.value.1, e),
                })?;
                Ok(Sample {
                    labels: s.metric,
                    value,
                })
            })
            .collect()
    }
}
