//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

/// Output format for CLI commands
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table of rows, or "No items found" when there are none
pub fn print_table<T: Tabled>(items: &[T]) {
    if items.is_empty() {
        println!("{}", "No items found".yellow());
        return;
    }
    let table = Table::new(items).with(Style::rounded()).to_string();
    println!("{}", table);
}

/// Print any serializable value as pretty JSON
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Format millicores as human-readable string
pub fn format_cpu(millicores: i64) -> String {
    if millicores >= 1000 {
        format!("{:.1}", millicores as f64 / 1000.0)
    } else {
        format!("{}m", millicores)
    }
}

/// Format megabytes as human-readable string
pub fn format_megabytes(megabytes: i64) -> String {
    if megabytes >= 1000 {
        format!("{:.2}G", megabytes as f64 / 1000.0)
    } else {
        format!("{}M", megabytes)
    }
}

/// Show a missing or empty WBS code as a dash
pub fn format_wbs(wbs: Option<&str>) -> String {
    match wbs {
        Some(code) if !code.is_empty() => code.to_string(),
        _ => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cpu() {
        assert_eq!(format_cpu(0), "0m");
        assert_eq!(format_cpu(250), "250m");
        assert_eq!(format_cpu(1500), "1.5");
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(512), "512M");
        assert_eq!(format_megabytes(2500), "2.50G");
    }

    #[test]
    fn test_format_wbs() {
        assert_eq!(format_wbs(None), "-");
        assert_eq!(format_wbs(Some("")), "-");
        assert_eq!(format_wbs(Some("A.01")), "A.01");
    }
}
