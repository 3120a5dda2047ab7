//! Joins the required CPU, memory and replica vectors into resource records
//!
//! The replica vector decides which components exist in a measurement.
//! CPU and memory samples only fill in values for components already
//! anchored by a replica sample.

use crate::error::{Error, Result};
use crate::models::{IdentityKey, RequiredResourceVectors, ResourceUsage, Sample};
use crate::source::Metric;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// What to do with a CPU or memory sample whose key has no replica sample
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedPolicy {
    /// Drop the sample and log a warning
    #[default]
    Skip,
    /// Fail the aggregation with `AggregationInconsistency`
    Reject,
}

/// Merge the three vectors into one record per replica identity key.
///
/// The returned order is unspecified.
pub fn aggregate(
    vectors: &RequiredResourceVectors,
    policy: UnmatchedPolicy,
) -> Result<Vec<ResourceUsage>> {
    let mut records: HashMap<IdentityKey, ResourceUsage> =
        HashMap::with_capacity(vectors.replicas.len());

    for sample in &vectors.replicas {
        let key = sample.identity_key();
        records.insert(
            key.clone(),
            ResourceUsage::from_replicas(key, non_negative(sample, Metric::Replicas)),
        );
    }

    let skipped_cpu = merge(&mut records, &vectors.cpu, Metric::Cpu, policy, |r, v| {
        r.cpu_millicores = v
    })?;
    let skipped_memory = merge(
        &mut records,
        &vectors.memory,
        Metric::Memory,
        policy,
        |r, v| r.memory_mega_bytes = v,
    )?;

    debug!(
        records = records.len(),
        skipped_cpu = skipped_cpu,
        skipped_memory = skipped_memory,
        "Aggregated required resources"
    );

    Ok(records.into_values().collect())
}

/// Apply one value vector onto the anchored records, returning the skip count
fn merge<F>(
    records: &mut HashMap<IdentityKey, ResourceUsage>,
    samples: &[Sample],
    metric: Metric,
    policy: UnmatchedPolicy,
    set: F,
) -> Result<usize>
where
    F: Fn(&mut ResourceUsage, i64),
{
    let mut skipped = 0;

    for sample in samples {
        let key = sample.identity_key();
        match records.get_mut(&key) {
            Some(record) => set(record, non_negative(sample, metric)),
            None => match policy {
                UnmatchedPolicy::Skip => {
                    warn!(
                        metric = %metric,
                        key = %key,
                        value = sample.value,
                        "Skipping sample without matching replica sample"
                    );
                    skipped += 1;
                }
                UnmatchedPolicy::Reject => {
                    return Err(Error::AggregationInconsistency { metric, key });
                }
            },
        }
    }

    Ok(skipped)
}

/// Truncated sample value, with negative values clamped to zero
fn non_negative(sample: &Sample, metric: Metric) -> i64 {
    let value = sample.truncated();
    if value < 0 {
        warn!(
            metric = %metric,
            key = %sample.identity_key(),
            value = sample.value,
            "Clamping negative sample to zero"
        );
        return 0;
    }
    value
}
