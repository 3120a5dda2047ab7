//! On-demand collection command

use allocation_lib::CostAllocator;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;

use super::runs::print_resources;
use crate::output::{format_cpu, format_megabytes, print_json, print_success, print_warning, OutputFormat};

/// Measure required resources at `at`, then store the run unless `dry_run`
pub async fn collect_run(
    allocator: &CostAllocator,
    at: DateTime<Utc>,
    dry_run: bool,
    format: OutputFormat,
) -> Result<()> {
    let run = if dry_run {
        allocator.measure(at).await
    } else {
        allocator.collect(at).await
    }
    .with_context(|| format!("Collection at {} failed", at.to_rfc3339()))?;

    match format {
        OutputFormat::Json => print_json(&run)?,
        OutputFormat::Table => {
            match run.id {
                Some(id) => print_success(&format!(
                    "Stored run {} measured at {}",
                    id,
                    run.measured_time_utc.to_rfc3339()
                )),
                None => print_warning(&format!(
                    "Dry run: measured at {}, nothing stored",
                    run.measured_time_utc.to_rfc3339()
                )),
            }
            println!(
                "{} {} CPU, {} memory, {} replicas",
                "Cluster:".bold(),
                format_cpu(run.cluster_cpu_millicores).cyan(),
                format_megabytes(run.cluster_memory_mega_bytes).cyan(),
                run.total_replicas()
            );
            print_resources(&run);
        }
    }

    Ok(())
}
