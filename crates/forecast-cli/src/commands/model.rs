//! Model commands: train, evaluate, inspect and predict

use anyhow::{bail, Context, Result};
use colored::Colorize;
use forecast_lib::dataset;
use forecast_lib::evaluation::{evaluate as score, EvaluationGate, RegressionMetrics};
use forecast_lib::observability::StructuredLogger;
use forecast_lib::predictor::{Estimator, EstimatorModel, FEATURE_NAMES};
use forecast_lib::training::{Trainer, TrainingConfig};
use forecast_lib::{ModelStore, OpenMeteoClient, RawObservation, WeatherPipeline, WeatherSource};
use serde::Serialize;
use std::path::Path;

use crate::config::Config;
use crate::output::{
    format_metric, format_temperature, print_fields, print_json, print_metrics, print_success,
    FieldRow, OutputFormat,
};

#[derive(Serialize)]
struct TrainSummary<'a> {
    algorithm: &'a str,
    examples: usize,
    model_path: &'a Path,
    checksum: &'a str,
    train: &'a RegressionMetrics,
    test: &'a RegressionMetrics,
    cv_r2: &'a [f64],
    cv_r2_mean: Option<f64>,
}

#[derive(Serialize)]
struct EvaluationSummary<'a> {
    model_path: &'a Path,
    metrics: &'a RegressionMetrics,
    max_mae: f64,
    passed: bool,
}

#[derive(Serialize)]
struct PredictSummary<'a> {
    predicted_temp: f64,
    timestamp_used: &'a str,
    source: &'a str,
}

fn load_pipeline(model: &Path) -> Result<WeatherPipeline> {
    ModelStore::new(model)
        .load::<EstimatorModel>()
        .with_context(|| format!("Failed to load model from {}", model.display()))
}

/// Fit on the engineered table and save the pipeline artifact
pub fn train(
    data: &Path,
    model: &Path,
    config: TrainingConfig,
    format: OutputFormat,
    logger: &StructuredLogger,
) -> Result<()> {
    let examples = dataset::read_engineered(data)?;
    let outcome = Trainer::new(config).run(&examples)?;
    let info = ModelStore::new(model).save(&outcome.pipeline)?;

    let algorithm = outcome.pipeline.estimator().algorithm();
    logger.log_training_completed(
        algorithm,
        examples.len(),
        outcome.test_metrics.mae,
        outcome.test_metrics.r2,
        outcome.cv_r2_mean(),
    );

    match format {
        OutputFormat::Json => print_json(&TrainSummary {
            algorithm,
            examples: examples.len(),
            model_path: model,
            checksum: &info.checksum,
            train: &outcome.train_metrics,
            test: &outcome.test_metrics,
            cv_r2: &outcome.cv_r2,
            cv_r2_mean: outcome.cv_r2_mean(),
        })?,
        OutputFormat::Table => {
            println!("{} {}", "Algorithm:".bold(), algorithm.cyan());
            print_metrics(&[
                ("train", &outcome.train_metrics),
                ("test", &outcome.test_metrics),
            ]);
            if let Some(mean) = outcome.cv_r2_mean() {
                let folds: Vec<String> = outcome.cv_r2.iter().map(|r| format_metric(*r)).collect();
                println!("CV R² folds: [{}]", folds.join(", "));
                println!("CV R² mean:  {}", format_metric(mean));
            }
            print_success(&format!("Model saved to {}", model.display()));
        }
    }
    Ok(())
}

/// Score a saved artifact on the engineered table and apply the MAE gate
pub fn evaluate(
    data: &Path,
    model: &Path,
    max_mae: f64,
    format: OutputFormat,
    logger: &StructuredLogger,
) -> Result<()> {
    let pipeline = load_pipeline(model)?;
    let examples = dataset::read_engineered(data)?;
    let metrics = score(&pipeline, &examples)?;
    let gate = EvaluationGate { max_mae };
    let passed = gate.passes(&metrics);
    logger.log_evaluation_completed(metrics.mae, metrics.rmse, metrics.r2, passed);

    match format {
        OutputFormat::Json => print_json(&EvaluationSummary {
            model_path: model,
            metrics: &metrics,
            max_mae,
            passed,
        })?,
        OutputFormat::Table => {
            print_metrics(&[("full", &metrics)]);
            if passed {
                print_success(&format!(
                    "MAE {} within limit {}",
                    format_metric(metrics.mae),
                    max_mae
                ));
            }
        }
    }

    if !passed {
        bail!(
            "MAE too high: {} exceeds {}",
            format_metric(metrics.mae),
            max_mae
        );
    }
    Ok(())
}

/// Print artifact envelope metadata without loading the estimator
pub fn inspect(model: &Path, format: OutputFormat) -> Result<()> {
    let info = ModelStore::new(model).inspect()?;

    match format {
        OutputFormat::Json => print_json(&info)?,
        OutputFormat::Table => {
            let schema_matches = info.feature_schema == FEATURE_NAMES;
            print_fields(vec![
                FieldRow::new("Path", info.path.display()),
                FieldRow::new("Format version", info.format_version),
                FieldRow::new("Algorithm", &info.algorithm),
                FieldRow::new("Transform version", info.transform_version),
                FieldRow::new("Feature schema", info.feature_schema.join(", ")),
                FieldRow::new("Schema current", if schema_matches { "yes" } else { "no" }),
                FieldRow::new("Saved at", info.saved_at.to_rfc3339()),
                FieldRow::new("Checksum", &info.checksum),
                FieldRow::new("Size (bytes)", info.size_bytes),
            ]);
        }
    }
    Ok(())
}

/// Forecast from `row`, or from the provider's current hour when absent
pub async fn predict(
    config: &Config,
    model: &Path,
    row: Option<RawObservation>,
    format: OutputFormat,
) -> Result<()> {
    let pipeline = load_pipeline(model)?;
    let (raw, source) = match row {
        Some(raw) => (raw, "input".to_string()),
        None => {
            let client = OpenMeteoClient::new(config.open_meteo())?;
            (client.latest().await?, client.name().to_string())
        }
    };
    let prediction = pipeline.predict_row(&raw)?;

    match format {
        OutputFormat::Json => print_json(&PredictSummary {
            predicted_temp: (prediction.predicted_temp * 100.0).round() / 100.0,
            timestamp_used: &prediction.timestamp_used,
            source: &source,
        })?,
        OutputFormat::Table => {
            println!(
                "Next-hour temperature after {}: {}",
                prediction.timestamp_used.as_str().cyan(),
                format_temperature(prediction.predicted_temp)
            );
        }
    }
    Ok(())
}
