//! Next-hour temperature forecaster CLI
//!
//! Fetches and prepares weather data, trains and evaluates the prediction
//! pipeline, and produces forecasts from the saved artifact.

mod commands;
mod config;
mod output;

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use commands::{data, model};
use forecast_lib::evaluation::DEFAULT_MAX_MAE;
use forecast_lib::observability::StructuredLogger;
use forecast_lib::predictor::{Algorithm, EstimatorConfig, GradientBoostingParams, RidgeParams};
use forecast_lib::training::TrainingConfig;
use forecast_lib::RawObservation;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Next-hour temperature forecaster CLI
#[derive(Parser)]
#[command(name = "wxf")]
#[command(author, version, about = "CLI for the next-hour temperature forecaster", long_about = None)]
pub struct Cli {
    /// Latitude of the forecast site
    #[arg(long, env = "WXF_LATITUDE", global = true)]
    pub latitude: Option<f64>,

    /// Longitude of the forecast site
    #[arg(long, env = "WXF_LONGITUDE", global = true)]
    pub longitude: Option<f64>,

    /// Directory holding the CSV tables
    #[arg(long, env = "WXF_DATA_DIR", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table", global = true)]
    pub format: output::OutputFormat,

    /// Enable verbose output
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download historical hourly observations
    Fetch {
        /// First day (YYYY-MM-DD)
        #[arg(long)]
        start: NaiveDate,

        /// Last day, inclusive (YYYY-MM-DD)
        #[arg(long)]
        end: NaiveDate,

        /// Output CSV (default: <data-dir>/historical_weather.csv)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Build the engineered training table from raw observations
    Engineer {
        /// Raw observation CSV (default: <data-dir>/historical_weather.csv)
        #[arg(long, short)]
        input: Option<PathBuf>,

        /// Engineered CSV (default: <data-dir>/engineered_weather.csv)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Drop malformed rows instead of failing
        #[arg(long)]
        skip_invalid: bool,
    },

    /// Check a raw observation table for gaps, duplicates and bad values
    Validate {
        /// Raw observation CSV (default: <data-dir>/historical_weather.csv)
        #[arg(long, short)]
        input: Option<PathBuf>,
    },

    /// Train the pipeline and save the artifact
    Train {
        /// Engineered CSV (default: <data-dir>/engineered_weather.csv)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Artifact path
        #[arg(long, env = "WXF_MODEL_PATH")]
        model: Option<PathBuf>,

        /// Estimator family (gradient_boosting, ridge)
        #[arg(long, default_value = "gradient_boosting")]
        algorithm: Algorithm,

        /// Boosting stages
        #[arg(long, default_value_t = 300)]
        n_estimators: usize,

        #[arg(long, default_value_t = 0.05)]
        learning_rate: f64,

        /// Maximum tree depth
        #[arg(long, default_value_t = 3)]
        max_depth: usize,

        /// Ridge L2 penalty
        #[arg(long, default_value_t = 1.0)]
        alpha: f64,

        /// Cross-validation folds over the training part (0 disables)
        #[arg(long, default_value_t = 5)]
        cv_folds: usize,

        /// Share of the most recent examples held out for testing
        #[arg(long, default_value_t = 0.2)]
        test_fraction: f64,
    },

    /// Score a saved artifact and fail when MAE exceeds the limit
    Evaluate {
        /// Engineered CSV (default: <data-dir>/engineered_weather.csv)
        #[arg(long)]
        data: Option<PathBuf>,

        /// Artifact path
        #[arg(long, env = "WXF_MODEL_PATH")]
        model: Option<PathBuf>,

        /// Largest acceptable mean absolute error in °C
        #[arg(long, default_value_t = DEFAULT_MAX_MAE)]
        max_mae: f64,
    },

    /// Append the current-hour observation to the live table
    Collect {
        /// Live CSV (default: <data-dir>/live_weather.csv)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Forecast the next hour; uses live data unless fields are given
    Predict {
        /// Artifact path
        #[arg(long, env = "WXF_MODEL_PATH")]
        model: Option<PathBuf>,

        /// Observation time (ISO 8601)
        #[arg(long)]
        timestamp: Option<String>,

        /// Temperature in °C
        #[arg(long, allow_hyphen_values = true)]
        temperature: Option<f64>,

        /// Relative humidity in percent
        #[arg(long)]
        humidity: Option<f64>,

        /// Mean sea level pressure in hPa
        #[arg(long)]
        pressure: Option<f64>,

        /// Wind speed in m/s
        #[arg(long)]
        wind_speed: Option<f64>,
    },

    /// Show artifact metadata
    Inspect {
        /// Artifact path
        #[arg(long, env = "WXF_MODEL_PATH")]
        model: Option<PathBuf>,
    },
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = config::Config::load()?;
    if cli.latitude.is_some() {
        config.latitude = cli.latitude;
    }
    if cli.longitude.is_some() {
        config.longitude = cli.longitude;
    }
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir;
    }

    let logger = StructuredLogger::new("cli");
    let format = cli.format;

    match cli.command {
        Commands::Fetch { start, end, output } => {
            let output = config.data_file(output, config::HISTORICAL_FILE);
            data::fetch(&config, start, end, &output, format).await?;
        }
        Commands::Engineer {
            input,
            output,
            skip_invalid,
        } => {
            let input = config.data_file(input, config::HISTORICAL_FILE);
            let output = config.data_file(output, config::ENGINEERED_FILE);
            data::engineer(&input, &output, skip_invalid, format)?;
        }
        Commands::Validate { input } => {
            let input = config.data_file(input, config::HISTORICAL_FILE);
            data::validate(&input, format)?;
        }
        Commands::Train {
            data,
            model,
            algorithm,
            n_estimators,
            learning_rate,
            max_depth,
            alpha,
            cv_folds,
            test_fraction,
        } => {
            let training = TrainingConfig {
                estimator: EstimatorConfig {
                    algorithm,
                    gradient_boosting: GradientBoostingParams {
                        n_estimators,
                        learning_rate,
                        max_depth,
                        ..Default::default()
                    },
                    ridge: RidgeParams { alpha },
                },
                test_fraction,
                cv_folds,
            };
            let data = config.data_file(data, config::ENGINEERED_FILE);
            let model = config.model_path(model);
            model::train(&data, &model, training, format, &logger)?;
        }
        Commands::Evaluate {
            data,
            model,
            max_mae,
        } => {
            let data = config.data_file(data, config::ENGINEERED_FILE);
            let model = config.model_path(model);
            model::evaluate(&data, &model, max_mae, format, &logger)?;
        }
        Commands::Collect { output } => {
            let output = config.data_file(output, config::LIVE_FILE);
            data::collect(&config, &output, &logger, format).await?;
        }
        Commands::Predict {
            model,
            timestamp,
            temperature,
            humidity,
            pressure,
            wind_speed,
        } => {
            let row = RawObservation {
                timestamp,
                temperature,
                humidity,
                pressure,
                wind_speed,
            };
            // Any field given means a caller-supplied observation
            let row = (row != RawObservation::default()).then_some(row);
            let model = config.model_path(model);
            model::predict(&config, &model, row, format).await?;
        }
        Commands::Inspect { model } => {
            let model = config.model_path(model);
            model::inspect(&model, format)?;
        }
    }

    Ok(())
}
