//! Data commands: historical fetch, feature engineering, validation and
//! the live collector

use anyhow::{bail, Result};
use chrono::NaiveDate;
use colored::Colorize;
use forecast_lib::dataset::{self, AppendOutcome};
use forecast_lib::observability::StructuredLogger;
use forecast_lib::{OpenMeteoClient, WeatherSource};
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::output::{
    print_fields, print_info, print_json, print_success, print_warning, FieldRow, OutputFormat,
};

#[derive(Serialize)]
struct FetchSummary<'a> {
    output: &'a Path,
    rows: usize,
    start: NaiveDate,
    end: NaiveDate,
}

#[derive(Serialize)]
struct EngineerSummary<'a> {
    input: &'a Path,
    output: &'a Path,
    rows: usize,
    invalid_rows: usize,
    examples: usize,
    duplicate_timestamps: usize,
    skipped_gaps: usize,
}

#[derive(Serialize)]
struct CollectSummary<'a> {
    output: &'a Path,
    timestamp: Option<&'a str>,
    appended: bool,
}

/// Download archive rows for `[start, end]` into a raw observation CSV
pub async fn fetch(
    config: &Config,
    start: NaiveDate,
    end: NaiveDate,
    output: &Path,
    format: OutputFormat,
) -> Result<()> {
    let client = OpenMeteoClient::new(config.open_meteo())?;
    let rows = client.archive(start, end).await?;
    dataset::write_observations(output, &rows)?;

    let summary = FetchSummary {
        output,
        rows: rows.len(),
        start,
        end,
    };
    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => print_success(&format!(
            "Saved {} hourly rows ({} to {}) to {}",
            summary.rows,
            start,
            end,
            output.display()
        )),
    }
    Ok(())
}

/// Build the engineered table with next-hour targets from a raw CSV.
///
/// Malformed rows abort the run unless `skip_invalid` is set, in which case
/// they are dropped and counted.
pub fn engineer(input: &Path, output: &Path, skip_invalid: bool, format: OutputFormat) -> Result<()> {
    let rows = dataset::read_observations(input)?;
    let (observations, invalid_rows) = if skip_invalid {
        let (valid, errors) = dataset::partition_valid(&rows);
        for e in errors.iter().take(5) {
            tracing::warn!(error = %e, "Skipping invalid row");
        }
        (valid, errors.len())
    } else {
        (dataset::parse_observations(&rows)?, 0)
    };

    let set = dataset::build_examples(&observations);
    if set.examples.is_empty() {
        bail!(
            "No training examples could be built from {} ({} rows)",
            input.display(),
            rows.len()
        );
    }
    dataset::write_engineered(output, &set.examples)?;

    let summary = EngineerSummary {
        input,
        output,
        rows: rows.len(),
        invalid_rows,
        examples: set.examples.len(),
        duplicate_timestamps: set.duplicate_timestamps,
        skipped_gaps: set.skipped_gaps,
    };
    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            print_fields(vec![
                FieldRow::new("Input rows", summary.rows),
                FieldRow::new("Invalid rows", summary.invalid_rows),
                FieldRow::new("Duplicate timestamps", summary.duplicate_timestamps),
                FieldRow::new("Gaps skipped", summary.skipped_gaps),
                FieldRow::new("Examples", summary.examples),
            ]);
            if summary.duplicate_timestamps > 0 || summary.skipped_gaps > 0 {
                print_warning("Some rows were dropped; see counts above");
            }
            print_success(&format!("Engineered data saved to {}", output.display()));
        }
    }
    Ok(())
}

/// Report on a raw observation CSV; fails when the table is not clean
pub fn validate(input: &Path, format: OutputFormat) -> Result<()> {
    let rows = dataset::read_observations(input)?;
    let report = dataset::validate(&rows);

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Table => {
            println!("{} {}", "Validation:".bold(), input.display());
            print_fields(vec![
                FieldRow::new("Rows", report.rows),
                FieldRow::new("Valid rows", report.valid_rows),
                FieldRow::new("Invalid rows", report.invalid_rows),
                FieldRow::new("Duplicate timestamps", report.duplicate_timestamps),
                FieldRow::new("Gaps", report.gaps),
                FieldRow::new("Temperature out of range", report.temperature_out_of_range),
                FieldRow::new("First", report.first_timestamp.as_deref().unwrap_or("-")),
                FieldRow::new("Last", report.last_timestamp.as_deref().unwrap_or("-")),
            ]);
            if report.gaps > 0 {
                print_info("Gaps are allowed; pairs across a gap are skipped when engineering");
            }
        }
    }

    if !report.is_clean() {
        bail!("{} failed validation", input.display());
    }
    Ok(())
}

/// Append the provider's current-hour row to the live CSV
pub async fn collect(
    config: &Config,
    output: &Path,
    logger: &StructuredLogger,
    format: OutputFormat,
) -> Result<()> {
    let client = OpenMeteoClient::new(config.open_meteo())?;
    let row = client.latest().await?;
    let outcome = dataset::append_observation(output, &row)?;
    let appended = outcome == AppendOutcome::Appended;
    let timestamp = row.timestamp.as_deref();
    logger.log_observation_collected(timestamp.unwrap_or("-"), appended);

    let summary = CollectSummary {
        output,
        timestamp,
        appended,
    };
    match format {
        OutputFormat::Json => print_json(&summary)?,
        OutputFormat::Table => {
            let stamp = timestamp.unwrap_or("-");
            if appended {
                print_success(&format!("Appended {} to {}", stamp, output.display()));
            } else {
                print_info(&format!("{} already collected", stamp));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forecast_lib::RawObservation;
    use tempfile::TempDir;

    fn hourly_rows(n: usize) -> Vec<RawObservation> {
        (0..n)
            .map(|i| RawObservation {
                timestamp: Some(format!("2025-06-{:02}T{:02}:00", 1 + i / 24, i % 24)),
                temperature: Some(25.0 + (i % 24) as f64 * 0.3),
                humidity: Some(60.0),
                pressure: Some(1008.0),
                wind_speed: Some(3.0),
            })
            .collect()
    }

    #[test]
    fn test_engineer_writes_examples() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("raw.csv");
        let output = dir.path().join("out").join("engineered.csv");
        dataset::write_observations(&input, &hourly_rows(48)).unwrap();

        engineer(&input, &output, false, OutputFormat::Json).unwrap();
        let examples = dataset::read_engineered(&output).unwrap();
        assert_eq!(examples.len(), 47);
    }

    #[test]
    fn test_engineer_invalid_rows() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("raw.csv");
        let output = dir.path().join("engineered.csv");
        let mut rows = hourly_rows(24);
        rows[5].humidity = None;
        dataset::write_observations(&input, &rows).unwrap();

        assert!(engineer(&input, &output, false, OutputFormat::Json).is_err());
        engineer(&input, &output, true, OutputFormat::Json).unwrap();
        // the missing row breaks contiguity on both sides
        assert_eq!(dataset::read_engineered(&output).unwrap().len(), 21);
    }

    #[test]
    fn test_validate_fails_on_duplicates() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("raw.csv");
        let mut rows = hourly_rows(6);
        rows.push(rows[2].clone());
        dataset::write_observations(&input, &rows).unwrap();
        assert!(validate(&input, OutputFormat::Json).is_err());

        dataset::write_observations(&input, &hourly_rows(6)).unwrap();
        validate(&input, OutputFormat::Json).unwrap();
    }
}
