//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use forecast_lib::evaluation::RegressionMetrics;
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

/// Two-column row for key/value reports
#[derive(Tabled)]
pub struct FieldRow {
    #[tabled(rename = "Field")]
    pub field: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

impl FieldRow {
    pub fn new(field: &str, value: impl ToString) -> Self {
        Self {
            field: field.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Tabled)]
struct MetricsRow {
    #[tabled(rename = "Split")]
    split: String,
    #[tabled(rename = "Samples")]
    samples: usize,
    #[tabled(rename = "MAE")]
    mae: String,
    #[tabled(rename = "RMSE")]
    rmse: String,
    #[tabled(rename = "R²")]
    r2: String,
}

/// Print `value` as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_fields(rows: Vec<FieldRow>) {
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Metrics table, one row per named split
pub fn print_metrics(splits: &[(&str, &RegressionMetrics)]) {
    let rows: Vec<MetricsRow> = splits
        .iter()
        .map(|(name, m)| MetricsRow {
            split: name.to_string(),
            samples: m.samples,
            mae: format_metric(m.mae),
            rmse: format_metric(m.rmse),
            r2: format_metric(m.r2),
        })
        .collect();
    println!("{}", Table::new(rows).with(Style::rounded()));
}

/// Print a success message
pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Print an error message
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Print a warning message
pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

/// Print an info message
pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

pub fn format_metric(value: f64) -> String {
    format!("{:.4}", value)
}

/// Temperature with unit, colored by band
pub fn format_temperature(celsius: f64) -> String {
    let text = format!("{:.2} °C", celsius);
    if celsius >= 35.0 {
        text.red().to_string()
    } else if celsius <= 10.0 {
        text.blue().to_string()
    } else {
        text.green().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_metric() {
        assert_eq!(format_metric(0.123456), "0.1235");
        assert_eq!(format_metric(1.0), "1.0000");
    }

    #[test]
    fn test_format_temperature_keeps_value() {
        colored::control::set_override(false);
        assert_eq!(format_temperature(27.456), "27.46 °C");
        assert_eq!(format_temperature(-3.0), "-3.00 °C");
    }
}
