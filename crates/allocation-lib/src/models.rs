//! Core data models for cost allocation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Label names carrying the identity of a component in metric samples
pub mod labels {
    pub const APPLICATION: &str = "application";
    pub const ENVIRONMENT: &str = "environment";
    pub const COMPONENT: &str = "component";
}

/// Identifies one component's resource usage within a measurement
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IdentityKey {
    pub application: String,
    pub environment: String,
    pub component: String,
}

impl IdentityKey {
    pub fn new(
        application: impl Into<String>,
        environment: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        Self {
            application: application.into(),
            environment: environment.into(),
            component: component.into(),
        }
    }
}

impl fmt::Display for IdentityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.application, self.environment, self.component
        )
    }
}

/// A single labeled scalar from an instant query vector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub labels: HashMap<String, String>,
    pub value: f64,
}

impl Sample {
    /// Identity key formed from the sample labels. Missing labels are empty.
    pub fn identity_key(&self) -> IdentityKey {
        let label = |name: &str| self.labels.get(name).cloned().unwrap_or_default();
        IdentityKey {
            application: label(labels::APPLICATION),
            environment: label(labels::ENVIRONMENT),
            component: label(labels::COMPONENT),
        }
    }

    /// Sample value truncated toward zero
    pub fn truncated(&self) -> i64 {
        self.value as i64
    }
}

/// The three vectors making up one measurement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequiredResourceVectors {
    pub cpu: Vec<Sample>,
    pub memory: Vec<Sample>,
    pub replicas: Vec<Sample>,
}

/// One component's required CPU, memory and replicas within a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Storage identifier, absent until saved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Cost code, only present on records loaded from storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wbs: Option<String>,
    #[serde(flatten)]
    pub key: IdentityKey,
    pub cpu_millicores: i64,
    pub memory_mega_bytes: i64,
    pub replicas: i64,
}

impl ResourceUsage {
    /// Record anchored on a replica sample, CPU and memory still zero
    pub fn from_replicas(key: IdentityKey, replicas: i64) -> Self {
        Self {
            id: None,
            wbs: None,
            key,
            cpu_millicores: 0,
            memory_mega_bytes: 0,
            replicas,
        }
    }
}

/// A timestamped snapshot of cluster-wide and per-component usage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Run {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub measured_time_utc: DateTime<Utc>,
    pub cluster_cpu_millicores: i64,
    pub cluster_memory_mega_bytes: i64,
    pub resources: Vec<ResourceUsage>,
}

impl Run {
    /// Build an unsaved run whose cluster totals are the sums over its resources
    pub fn from_resources(measured_time_utc: DateTime<Utc>, resources: Vec<ResourceUsage>) -> Self {
        let cluster_cpu_millicores = saturating_total(resources.iter().map(|r| r.cpu_millicores));
        let cluster_memory_mega_bytes =
            saturating_total(resources.iter().map(|r| r.memory_mega_bytes));

        Self {
            id: None,
            measured_time_utc,
            cluster_cpu_millicores,
            cluster_memory_mega_bytes,
            resources,
        }
    }

    /// Total replica count across all components
    pub fn total_replicas(&self) -> i64 {
        saturating_total(self.resources.iter().map(|r| r.replicas))
    }
}

// Infinite samples truncate to i64::MAX, so totals must not overflow
fn saturating_total(values: impl Iterator<Item = i64>) -> i64 {
    values.fold(0i64, |total, value| total.saturating_add(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(pairs: &[(&str, &str)], value: f64) -> Sample {
        Sample {
            labels: pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            value,
        }
    }

    #[test]
    fn test_identity_key_from_labels() {
        let s = sample(
            &[
                ("application", "a"),
                ("environment", "prod"),
                ("component", "web"),
                ("job", "ignored"),
            ],
            1.0,
        );

        assert_eq!(s.identity_key(), IdentityKey::new("a", "prod", "web"));
    }

    #[test]
    fn test_identity_key_missing_labels_are_empty() {
        let s = sample(&[("application", "a")], 1.0);
        assert_eq!(s.identity_key(), IdentityKey::new("a", "", ""));
    }

    #[test]
    fn test_truncation_toward_zero() {
        assert_eq!(sample(&[], 2.9).truncated(), 2);
        assert_eq!(sample(&[], -2.9).truncated(), -2);
        assert_eq!(sample(&[], f64::NAN).truncated(), 0);
    }

    #[test]
    fn test_run_totals_from_resources() {
        let mut web = ResourceUsage::from_replicas(IdentityKey::new("a", "prod", "web"), 2);
        web.cpu_millicores = 100;
        web.memory_mega_bytes = 256;
        let mut api = ResourceUsage::from_replicas(IdentityKey::new("a", "prod", "api"), 3);
        api.cpu_millicores = 50;
        api.memory_mega_bytes = 128;

        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let run = Run::from_resources(at, vec![web, api]);

        assert_eq!(run.id, None);
        assert_eq!(run.cluster_cpu_millicores, 150);
        assert_eq!(run.cluster_memory_mega_bytes, 384);
        assert_eq!(run.total_replicas(), 5);
    }

    #[test]
    fn test_run_totals_saturate() {
        let mut web = ResourceUsage::from_replicas(IdentityKey::new("a", "prod", "web"), 1);
        web.cpu_millicores = sample(&[], f64::INFINITY).truncated();
        let mut api = ResourceUsage::from_replicas(IdentityKey::new("a", "prod", "api"), 1);
        api.cpu_millicores = i64::MAX;
        api.memory_mega_bytes = 64;

        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let run = Run::from_resources(at, vec![web, api]);

        assert_eq!(run.cluster_cpu_millicores, i64::MAX);
        assert_eq!(run.cluster_memory_mega_bytes, 64);
    }

    #[test]
    fn test_resource_usage_json_is_flat() {
        let record = ResourceUsage::from_replicas(IdentityKey::new("a", "prod", "web"), 1);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["application"], "a");
        assert_eq!(json["replicas"], 1);
        assert!(json.get("id").is_none());
    }
}
