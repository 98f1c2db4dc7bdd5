//! CSV storage for observations and training examples
//!
//! Two tables live on disk:
//! - raw observations (`timestamp,temperature,humidity,pressure,wind_speed`),
//!   written by the historical fetch and the live collector
//! - the engineered table, which adds calendar columns and `temp_next_hour`
//!
//! Columns are matched by header name, so extra columns and column order do
//! not matter.

use crate::error::{ForecastError, Result as CoreResult};
use crate::models::{format_timestamp, parse_timestamp, Observation, RawObservation, TrainingExample};
use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, FixedOffset, Timelike};
use csv::{ReaderBuilder, Trim, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::path::Path;
use tracing::{debug, info, warn};

/// Plausible air temperature range in °C
pub const TEMPERATURE_RANGE: std::ops::RangeInclusive<f64> = -50.0..=60.0;

/// Row of the engineered table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineeredRow {
    pub timestamp: String,
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub hour: u32,
    pub day: u32,
    pub month: u32,
    pub weekday: u32,
    pub temp_next_hour: f64,
}

impl From<&TrainingExample> for EngineeredRow {
    fn from(example: &TrainingExample) -> Self {
        let obs = &example.observation;
        Self {
            timestamp: format_timestamp(&obs.timestamp),
            temperature: obs.temperature,
            humidity: obs.humidity,
            pressure: obs.pressure,
            wind_speed: obs.wind_speed,
            hour: obs.timestamp.hour(),
            day: obs.timestamp.day(),
            month: obs.timestamp.month(),
            weekday: obs.timestamp.weekday().num_days_from_monday(),
            temp_next_hour: example.target,
        }
    }
}

/// Raw table row as text. Numeric cells are parsed per row so a bad cell
/// invalidates only its own row.
#[derive(Debug, Deserialize)]
struct ObservationRecord {
    timestamp: Option<String>,
    temperature: Option<String>,
    humidity: Option<String>,
    pressure: Option<String>,
    wind_speed: Option<String>,
}

impl ObservationRecord {
    fn into_raw(self, index: usize) -> RawObservation {
        RawObservation {
            temperature: numeric_cell(index, "temperature", self.temperature),
            humidity: numeric_cell(index, "humidity", self.humidity),
            pressure: numeric_cell(index, "pressure", self.pressure),
            wind_speed: numeric_cell(index, "wind_speed", self.wind_speed),
            timestamp: self.timestamp,
        }
    }
}

/// Engineered row as read back: calendar columns are not trusted
#[derive(Debug, Deserialize)]
struct LabelledRecord {
    timestamp: Option<String>,
    temperature: Option<String>,
    humidity: Option<String>,
    pressure: Option<String>,
    wind_speed: Option<String>,
    temp_next_hour: Option<String>,
}

impl LabelledRecord {
    fn into_parts(self, index: usize) -> (RawObservation, Option<f64>) {
        let target = numeric_cell(index, "temp_next_hour", self.temp_next_hour);
        let raw = ObservationRecord {
            timestamp: self.timestamp,
            temperature: self.temperature,
            humidity: self.humidity,
            pressure: self.pressure,
            wind_speed: self.wind_speed,
        }
        .into_raw(index);
        (raw, target)
    }
}

/// Empty and unparseable cells both read as missing
fn numeric_cell(index: usize, column: &str, cell: Option<String>) -> Option<f64> {
    let text = cell?;
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    match text.parse::<f64>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(row = index, column, value = %text, "Unparseable numeric cell");
            None
        }
    }
}

/// Result of pairing observations with next-hour targets
#[derive(Debug, Clone, Default)]
pub struct ExampleSet {
    pub examples: Vec<TrainingExample>,
    /// Adjacent pairs dropped because they were not exactly one hour apart
    pub skipped_gaps: usize,
    /// Rows removed because an earlier row had the same timestamp
    pub duplicate_timestamps: usize,
    /// Final row, which has no successor
    pub dropped_trailing: usize,
}

/// Whether the live collector wrote a new row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    Duplicate,
}

/// Summary of a raw observation table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub rows: usize,
    pub valid_rows: usize,
    /// Rows with a missing field, bad timestamp or out-of-range value
    pub invalid_rows: usize,
    pub duplicate_timestamps: usize,
    /// Consecutive valid rows more than one hour apart
    pub gaps: usize,
    pub temperature_out_of_range: usize,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.rows > 0
            && self.invalid_rows == 0
            && self.duplicate_timestamps == 0
            && self.temperature_out_of_range == 0
    }
}

/// Read raw observations. Missing or unparseable numeric cells become
/// `None`, leaving the row for [`Observation::from_raw`] to reject.
pub fn read_observations(path: &Path) -> Result<Vec<RawObservation>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut rows = Vec::new();
    for (index, record) in reader.deserialize::<ObservationRecord>().enumerate() {
        let record = record.with_context(|| {
            format!("Invalid CSV record {} in {}", index, path.display())
        })?;
        rows.push(record.into_raw(index));
    }
    debug!(path = %path.display(), rows = rows.len(), "Observations read");
    Ok(rows)
}

/// Replace `path` with `rows`
pub fn write_observations(path: &Path, rows: &[RawObservation]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = rows.len(), "Observations written");
    Ok(())
}

/// Append one row unless a row with the same timestamp is already present.
/// The header is written when the file is new.
pub fn append_observation(path: &Path, row: &RawObservation) -> Result<AppendOutcome> {
    let exists = path.exists() && fs::metadata(path)?.len() > 0;
    if exists {
        let key = timestamp_key(row);
        let existing = read_observations(path)?;
        if existing.iter().any(|r| timestamp_key(r) == key) {
            debug!(timestamp = ?row.timestamp, "Row already collected");
            return Ok(AppendOutcome::Duplicate);
        }
    } else {
        ensure_parent(path)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {} for append", path.display()))?;
    let mut writer = WriterBuilder::new().has_headers(!exists).from_writer(file);
    writer.serialize(row)?;
    writer.flush()?;
    Ok(AppendOutcome::Appended)
}

/// Validate every raw row, failing on the first malformed one
pub fn parse_observations(rows: &[RawObservation]) -> CoreResult<Vec<Observation>> {
    rows.iter()
        .enumerate()
        .map(|(index, raw)| Observation::from_raw(raw, index))
        .collect()
}

/// Split raw rows into valid observations and the errors of the rest
pub fn partition_valid(rows: &[RawObservation]) -> (Vec<Observation>, Vec<ForecastError>) {
    let mut valid = Vec::with_capacity(rows.len());
    let mut errors = Vec::new();
    for (index, raw) in rows.iter().enumerate() {
        match Observation::from_raw(raw, index) {
            Ok(obs) => valid.push(obs),
            Err(e) => errors.push(e),
        }
    }
    (valid, errors)
}

/// Pair each observation with the temperature exactly one hour later.
///
/// Rows are sorted by time and deduplicated by timestamp (first wins). A
/// pair whose timestamps are not exactly one hour apart yields no example.
pub fn build_examples(observations: &[Observation]) -> ExampleSet {
    let mut sorted: Vec<&Observation> = observations.iter().collect();
    sorted.sort_by_key(|o| o.timestamp);

    let before = sorted.len();
    sorted.dedup_by_key(|o| o.timestamp);
    let duplicate_timestamps = before - sorted.len();

    let mut set = ExampleSet {
        duplicate_timestamps,
        dropped_trailing: usize::from(!sorted.is_empty()),
        ..Default::default()
    };
    for pair in sorted.windows(2) {
        let (current, next) = (pair[0], pair[1]);
        if next.timestamp - current.timestamp == Duration::hours(1) {
            set.examples.push(TrainingExample {
                observation: current.clone(),
                target: next.temperature,
            });
        } else {
            set.skipped_gaps += 1;
        }
    }

    if set.skipped_gaps > 0 {
        warn!(skipped_gaps = set.skipped_gaps, "Non-contiguous rows excluded from targets");
    }
    if set.duplicate_timestamps > 0 {
        warn!(duplicates = set.duplicate_timestamps, "Duplicate timestamps removed");
    }
    info!(
        observations = observations.len(),
        examples = set.examples.len(),
        "Training examples built"
    );
    set
}

/// Replace `path` with the engineered table: raw columns, calendar columns
/// and the `temp_next_hour` label
pub fn write_engineered(path: &Path, examples: &[TrainingExample]) -> Result<()> {
    ensure_parent(path)?;
    let mut writer = WriterBuilder::new()
        .from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for example in examples {
        writer.serialize(EngineeredRow::from(example))?;
    }
    writer.flush()?;
    info!(path = %path.display(), rows = examples.len(), "Engineered table written");
    Ok(())
}

/// Read labelled examples. Calendar columns are ignored; features are
/// always recomputed from the timestamp.
pub fn read_engineered(path: &Path) -> Result<Vec<TrainingExample>> {
    let mut reader = ReaderBuilder::new()
        .trim(Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;

    let mut examples = Vec::new();
    for (index, record) in reader.deserialize::<LabelledRecord>().enumerate() {
        let record = record.with_context(|| {
            format!("Invalid CSV record {} in {}", index, path.display())
        })?;
        let (raw, target) = record.into_parts(index);
        let observation = Observation::from_raw(&raw, index)?;
        let target = match target {
            Some(t) if t.is_finite() => t,
            _ => return Err(ForecastError::malformed(index, "missing or non-finite `temp_next_hour`").into()),
        };
        examples.push(TrainingExample { observation, target });
    }
    debug!(path = %path.display(), rows = examples.len(), "Engineered table read");
    Ok(examples)
}

/// Split in time order: the last `test_fraction` of examples (rounded up)
/// form the test set
pub fn chronological_split(
    examples: &[TrainingExample],
    test_fraction: f64,
) -> CoreResult<(&[TrainingExample], &[TrainingExample])> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(ForecastError::InvalidParameter(format!(
            "test_fraction {} outside (0, 1)",
            test_fraction
        )));
    }
    let n_test = (examples.len() as f64 * test_fraction).ceil() as usize;
    let n_train = examples.len().saturating_sub(n_test);
    if n_train == 0 || n_test == 0 {
        return Err(ForecastError::InsufficientData(format!(
            "{} examples cannot be split with test_fraction {}",
            examples.len(),
            test_fraction
        )));
    }
    Ok(examples.split_at(n_train))
}

/// Inspect a raw table without rejecting it
pub fn validate(rows: &[RawObservation]) -> ValidationReport {
    let (valid, errors) = partition_valid(rows);
    let mut report = ValidationReport {
        rows: rows.len(),
        valid_rows: valid.len(),
        invalid_rows: errors.len(),
        ..Default::default()
    };

    report.temperature_out_of_range = valid
        .iter()
        .filter(|o| !TEMPERATURE_RANGE.contains(&o.temperature))
        .count();

    let mut stamps: Vec<DateTime<FixedOffset>> = valid.iter().map(|o| o.timestamp).collect();
    stamps.sort();
    let mut seen = HashSet::new();
    report.duplicate_timestamps = stamps.iter().filter(|ts| !seen.insert(**ts)).count();
    stamps.dedup();
    report.gaps = stamps
        .windows(2)
        .filter(|w| w[1] - w[0] > Duration::hours(1))
        .count();
    report.first_timestamp = stamps.first().map(format_timestamp);
    report.last_timestamp = stamps.last().map(format_timestamp);
    report
}

/// Dedup key: the parsed instant when the timestamp parses, else the text
fn timestamp_key(row: &RawObservation) -> Option<String> {
    let text = row.timestamp.as_deref()?;
    Some(match parse_timestamp(text) {
        Some(ts) => ts.to_rfc3339(),
        None => text.trim().to_string(),
    })
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn raw(ts: &str, temperature: f64) -> RawObservation {
        RawObservation {
            timestamp: Some(ts.to_string()),
            temperature: Some(temperature),
            humidity: Some(60.0),
            pressure: Some(1008.0),
            wind_speed: Some(3.0),
        }
    }

    fn observations(rows: &[RawObservation]) -> Vec<Observation> {
        parse_observations(rows).unwrap()
    }

    #[test]
    fn test_targets_are_next_hour_temperature() {
        let rows = [
            raw("2025-07-03T00:00:00", 25.0),
            raw("2025-07-03T01:00:00", 26.0),
            raw("2025-07-03T02:00:00", 27.5),
        ];
        let set = build_examples(&observations(&rows));
        assert_eq!(set.examples.len(), 2);
        assert_eq!(set.examples[0].target, 26.0);
        assert_eq!(set.examples[1].target, 27.5);
        assert_eq!(set.dropped_trailing, 1);
        assert_eq!(set.skipped_gaps, 0);
    }

    #[test]
    fn test_gap_excludes_adjacent_pair() {
        let rows = [
            raw("2025-07-03T00:00:00", 25.0),
            raw("2025-07-03T01:00:00", 26.0),
            // 02:00 is missing
            raw("2025-07-03T03:00:00", 24.0),
            raw("2025-07-03T04:00:00", 23.0),
        ];
        let set = build_examples(&observations(&rows));
        assert_eq!(set.skipped_gaps, 1);
        let stamps: Vec<String> = set
            .examples
            .iter()
            .map(|e| format_timestamp(&e.observation.timestamp))
            .collect();
        assert_eq!(stamps, vec!["2025-07-03T00:00:00", "2025-07-03T03:00:00"]);
    }

    #[test]
    fn test_unsorted_and_duplicate_rows() {
        let rows = [
            raw("2025-07-03T01:00:00", 26.0),
            raw("2025-07-03T00:00:00", 25.0),
            raw("2025-07-03T01:00:00", 99.0),
        ];
        let set = build_examples(&observations(&rows));
        assert_eq!(set.duplicate_timestamps, 1);
        assert_eq!(set.examples.len(), 1);
        assert_eq!(set.examples[0].target, 26.0);
    }

    #[test]
    fn test_empty_input_builds_nothing() {
        let set = build_examples(&[]);
        assert!(set.examples.is_empty());
        assert_eq!(set.dropped_trailing, 0);
    }

    #[test]
    fn test_observation_csv_round_trip_with_missing_cell() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data").join("historical.csv");
        let mut rows = vec![raw("2025-07-03T00:00", 25.0), raw("2025-07-03T01:00", 26.0)];
        rows[1].humidity = None;

        write_observations(&path, &rows).unwrap();
        let back = read_observations(&path).unwrap();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_reader_ignores_extra_columns_and_order() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("raw.csv");
        fs::write(
            &path,
            "wind_speed,station,timestamp,pressure,humidity,temperature\n\
             3.5,HYD,2025-07-03 00:00:00,1007.1,71,26.4\n",
        )
        .unwrap();
        let rows = read_observations(&path).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].temperature, Some(26.4));
        assert_eq!(rows[0].wind_speed, Some(3.5));
        assert_eq!(rows[0].timestamp.as_deref(), Some("2025-07-03 00:00:00"));
    }

    #[test]
    fn test_append_writes_header_once_and_dedups() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("live.csv");

        assert_eq!(
            append_observation(&path, &raw("2025-07-03T00:00", 25.0)).unwrap(),
            AppendOutcome::Appended
        );
        assert_eq!(
            append_observation(&path, &raw("2025-07-03T01:00", 26.0)).unwrap(),
            AppendOutcome::Appended
        );
        // same instant written differently
        assert_eq!(
            append_observation(&path, &raw("2025-07-03 00:00:00", 30.0)).unwrap(),
            AppendOutcome::Duplicate
        );

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("timestamp").count(), 1);
        let rows = read_observations(&path).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].temperature, Some(25.0));
    }

    #[test]
    fn test_engineered_round_trip_recomputes_calendar() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engineered.csv");
        let rows = [
            raw("2025-07-03T00:00:00", 25.0),
            raw("2025-07-03T01:00:00", 26.0),
        ];
        let set = build_examples(&observations(&rows));
        write_engineered(&path, &set.examples).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let header = content.lines().next().unwrap();
        assert_eq!(
            header,
            "timestamp,temperature,humidity,pressure,wind_speed,hour,day,month,weekday,temp_next_hour"
        );
        // 2025-07-03 is a Thursday
        assert!(content.lines().nth(1).unwrap().ends_with(",0,3,7,3,26.0"));

        let back = read_engineered(&path).unwrap();
        assert_eq!(back, set.examples);
    }

    #[test]
    fn test_engineered_missing_target_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("engineered.csv");
        fs::write(
            &path,
            "timestamp,temperature,humidity,pressure,wind_speed,temp_next_hour\n\
             2025-07-03T00:00:00,25,60,1008,3,26\n\
             2025-07-03T01:00:00,26,60,1008,3,\n",
        )
        .unwrap();
        let err = read_engineered(&path).unwrap_err();
        match err.downcast_ref::<ForecastError>() {
            Some(ForecastError::MalformedInput { index, .. }) => assert_eq!(*index, 1),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_chronological_split() {
        let rows: Vec<RawObservation> = (0..11)
            .map(|h| raw(&format!("2025-07-03T{:02}:00:00", h), 20.0 + h as f64))
            .collect();
        let set = build_examples(&observations(&rows));
        assert_eq!(set.examples.len(), 10);

        let (train, test) = chronological_split(&set.examples, 0.2).unwrap();
        assert_eq!(train.len(), 8);
        assert_eq!(test.len(), 2);
        assert!(train.last().unwrap().observation.timestamp < test[0].observation.timestamp);

        assert!(matches!(
            chronological_split(&set.examples, 1.0),
            Err(ForecastError::InvalidParameter(_))
        ));
        assert!(matches!(
            chronological_split(&set.examples[..1], 0.2),
            Err(ForecastError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_validate_report() {
        let mut rows = vec![
            raw("2025-07-03T00:00:00", 25.0),
            raw("2025-07-03T01:00:00", 26.0),
            raw("2025-07-03T01:00:00", 26.0),
            raw("2025-07-03T05:00:00", 75.0),
            raw("2025-07-03T06:00:00", 24.0),
        ];
        rows[4].humidity = None;

        let report = validate(&rows);
        assert_eq!(report.rows, 5);
        assert_eq!(report.invalid_rows, 1);
        assert_eq!(report.duplicate_timestamps, 1);
        assert_eq!(report.gaps, 1);
        assert_eq!(report.temperature_out_of_range, 1);
        assert_eq!(report.first_timestamp.as_deref(), Some("2025-07-03T00:00:00"));
        assert_eq!(report.last_timestamp.as_deref(), Some("2025-07-03T05:00:00"));
        assert!(!report.is_clean());
    }

    #[test]
    fn test_non_numeric_cell_invalidates_only_its_row() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("live.csv");
        fs::write(
            &path,
            "timestamp,temperature,humidity,pressure,wind_speed\n\
             2025-07-03T00:00:00,25.0,60,1008,3\n\
             2025-07-03T01:00:00,n/a,60,1008,3\n\
             2025-07-03T02:00:00,27.0,61,1008,--\n",
        )
        .unwrap();

        let rows = read_observations(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].temperature, None);
        assert_eq!(rows[2].wind_speed, None);

        let report = validate(&rows);
        assert_eq!(report.valid_rows, 1);
        assert_eq!(report.invalid_rows, 2);

        let (valid, errors) = partition_valid(&rows);
        assert_eq!(valid.len(), 1);
        assert!(matches!(errors[0], ForecastError::MalformedInput { index: 1, .. }));

        // collection keeps working on a table with a bad cell
        assert_eq!(
            append_observation(&path, &raw("2025-07-03T03:00:00", 28.0)).unwrap(),
            AppendOutcome::Appended
        );
        assert_eq!(read_observations(&path).unwrap().len(), 4);
    }
}
