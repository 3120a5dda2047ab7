//! Run listing commands

use allocation_lib::{ResourceUsage, Run, RunStore};
use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use colored::Colorize;
use tabled::Tabled;

use crate::output::{format_cpu, format_megabytes, format_wbs, print_json, print_table, OutputFormat};

/// Default look-back when `--from` is omitted
const DEFAULT_RANGE_HOURS: i64 = 24;

/// Row for the runs table
#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Measured (UTC)")]
    measured: String,
    #[tabled(rename = "Components")]
    components: usize,
    #[tabled(rename = "Replicas")]
    replicas: i64,
    #[tabled(rename = "Cluster CPU")]
    cpu: String,
    #[tabled(rename = "Cluster Memory")]
    memory: String,
}

impl From<&Run> for RunRow {
    fn from(run: &Run) -> Self {
        Self {
            id: run.id.map(|id| id.to_string()).unwrap_or_else(|| "-".to_string()),
            measured: run.measured_time_utc.format("%Y-%m-%d %H:%M:%S%.3f").to_string(),
            components: run.resources.len(),
            replicas: run.total_replicas(),
            cpu: format_cpu(run.cluster_cpu_millicores),
            memory: format_megabytes(run.cluster_memory_mega_bytes),
        }
    }
}

/// Row for the resources of a single run
#[derive(Tabled)]
pub struct ResourceRow {
    #[tabled(rename = "Application")]
    application: String,
    #[tabled(rename = "Environment")]
    environment: String,
    #[tabled(rename = "Component")]
    component: String,
    #[tabled(rename = "WBS")]
    wbs: String,
    #[tabled(rename = "Replicas")]
    replicas: i64,
    #[tabled(rename = "CPU")]
    cpu: String,
    #[tabled(rename = "Memory")]
    memory: String,
}

impl From<&ResourceUsage> for ResourceRow {
    fn from(resource: &ResourceUsage) -> Self {
        Self {
            application: resource.key.application.clone(),
            environment: resource.key.environment.clone(),
            component: resource.key.component.clone(),
            wbs: format_wbs(resource.wbs.as_deref()),
            replicas: resource.replicas,
            cpu: format_cpu(resource.cpu_millicores),
            memory: format_megabytes(resource.memory_mega_bytes),
        }
    }
}

/// Print the resources of one run as a table
pub fn print_resources(run: &Run) {
    let rows: Vec<ResourceRow> = run.resources.iter().map(ResourceRow::from).collect();
    print_table(&rows);
}

/// Fill in range defaults and reject inverted ranges
pub fn resolve_range(
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let to = to.unwrap_or_else(Utc::now);
    let from = from.unwrap_or(to - Duration::hours(DEFAULT_RANGE_HOURS));

    if from > to {
        bail!("--from ({}) is after --to ({})", from.to_rfc3339(), to.to_rfc3339());
    }
    Ok((from, to))
}

/// List runs measured within `[from, to]`
pub async fn list_runs(
    store: &RunStore,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
    details: bool,
    format: OutputFormat,
) -> Result<()> {
    let runs = store.runs_between(from, to).await?;

    match format {
        OutputFormat::Json => print_json(&runs)?,
        OutputFormat::Table => {
            println!(
                "{} {} .. {}",
                "Runs".bold(),
                from.to_rfc3339().cyan(),
                to.to_rfc3339().cyan()
            );
            let rows: Vec<RunRow> = runs.iter().map(RunRow::from).collect();
            print_table(&rows);

            if details {
                for run in &runs {
                    println!();
                    println!(
                        "{} {}",
                        "Run".bold(),
                        run.id.map(|id| id.to_string()).unwrap_or_default().cyan()
                    );
                    print_resources(run);
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_resolve_range_defaults_to_last_day() {
        let to = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let (from, resolved_to) = resolve_range(None, Some(to)).unwrap();

        assert_eq!(resolved_to, to);
        assert_eq!(from, Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_resolve_range_accepts_single_instant() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert_eq!(resolve_range(Some(at), Some(at)).unwrap(), (at, at));
    }

    #[test]
    fn test_resolve_range_rejects_inverted() {
        let from = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let to = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        assert!(resolve_range(Some(from), Some(to)).is_err());
    }

    #[test]
    fn test_run_row_summarizes_run() {
        let run = Run {
            id: Some(7),
            measured_time_utc: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            cluster_cpu_millicores: 1500,
            cluster_memory_mega_bytes: 256,
            resources: vec![],
        };

        let row = RunRow::from(&run);

        assert_eq!(row.id, "7");
        assert_eq!(row.measured, "2024-03-01 12:00:00.000");
        assert_eq!(row.components, 0);
        assert_eq!(row.cpu, "1.5");
        assert_eq!(row.memory, "256M");
    }
}
