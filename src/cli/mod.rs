//! Command-line parsing.
//!
//! Each subcommand mirrors one request of the forecasting API; parsing and
//! dispatch stay separate from the resolution and forecasting code.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

use crate::domain::SortOrder;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "epicast", version, about = "Per-country epidemic case forecasting")]
pub struct Cli {
    /// Print the JSON payload (or error envelope) instead of a text report.
    #[arg(long, global = true)]
    pub json: bool,

    /// Base directory holding data/, enhanced_data/ and models/ (overrides EPICAST_BASE_DIR).
    #[arg(long, global = true, value_name = "DIR")]
    pub base_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List every country with data, its models and data quality.
    Countries,
    /// Historical series for one country.
    History {
        country: String,
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,
        /// Comma-separated metric columns (default: new/total cases and deaths).
        #[arg(long, value_delimiter = ',')]
        metrics: Vec<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
        /// Column to sort rows by before paging.
        #[arg(long)]
        sort: Option<String>,
        /// `asc` or `desc`.
        #[arg(long, default_value = "asc", value_parser = parse_order)]
        order: SortOrder,
    },
    /// One metric across several countries.
    Compare {
        #[arg(required = true)]
        countries: Vec<String>,
        #[arg(long, default_value = "new_cases")]
        metric: String,
        #[arg(long, value_parser = parse_date)]
        start: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date)]
        end: Option<NaiveDate>,
    },
    /// Most recent row per country (all countries when none are given).
    Latest { countries: Vec<String> },
    /// Forecast new cases for the next N days.
    Predict(PredictArgs),
    /// Model kinds registered for a country.
    Models { country: String },
    /// Stored accuracy metrics for a country's models.
    Metrics {
        country: String,
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Debug, Parser, Clone)]
pub struct PredictArgs {
    pub country: String,

    /// Forecast horizon in days (1 to 60).
    #[arg(short, long, default_value_t = 30)]
    pub days: usize,

    /// Model kind (defaults to EPICAST_DEFAULT_MODEL).
    #[arg(short, long)]
    pub model: Option<String>,

    /// Prefer the enhanced sequence model when the country has one.
    #[arg(long)]
    pub enhanced: bool,

    /// Write the forecast rows to CSV.
    #[arg(long, value_name = "CSV")]
    pub export: Option<PathBuf>,
}

impl Command {
    /// Endpoint-style path used in error envelopes.
    pub fn request_path(&self) -> String {
        match self {
            Command::Countries => "/countries".to_string(),
            Command::History { country, .. } => format!("/historical/{country}"),
            Command::Compare { .. } => "/compare".to_string(),
            Command::Latest { .. } => "/latest".to_string(),
            Command::Predict(args) => format!("/predict/{}", args.country),
            Command::Models { country } => format!("/models/{country}"),
            Command::Metrics { country, .. } => format!("/metrics/{country}"),
        }
    }
}

fn parse_order(raw: &str) -> Result<SortOrder, String> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "asc" | "desc" => Ok(SortOrder::parse(raw)),
        other => Err(format!("expected `asc` or `desc`, got `{other}`")),
    }
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD ({e})"))
}
