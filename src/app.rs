//! Top-level application orchestration.
//!
//! `src/main.rs` only maps the result to an exit code; this module:
//! - parses CLI arguments
//! - loads settings and installs logging
//! - builds the [`ForecastService`] and runs one request against it
//! - prints a text report, the JSON payload, or the JSON error envelope
//! - writes optional exports

use std::collections::BTreeMap;

use clap::Parser;
use serde::Serialize;
use tracing::{error, info};

use crate::cli::{Cli, Command, PredictArgs};
use crate::config::Settings;
use crate::domain::{CompareResponse, CountryInfo, ForecastResponse, HistoryResponse, LatestResponse, ModelsResponse};
use crate::error::{AppError, ServiceError};
use crate::models::ModelMetadata;

pub mod service;

pub use service::{ForecastService, Page};

/// Entry point for the `epicast` binary.
pub fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let path = cli.command.request_path();

    let settings = match Settings::from_env_with_base(cli.base_dir.as_deref()) {
        Ok(s) => s,
        Err(err) => return Err(fail(err, &path, cli.json)),
    };
    crate::logging::init(&settings);
    settings.log_summary();

    let service = ForecastService::new(settings);
    execute(&service, cli.command, cli.json)
}

/// Run one command and print its outcome to stdout.
pub fn execute(service: &ForecastService, command: Command, json: bool) -> Result<(), AppError> {
    let path = command.request_path();
    let export = match &command {
        Command::Predict(PredictArgs { export, .. }) => export.clone(),
        _ => None,
    };

    let payload = match respond(service, command) {
        Ok(p) => p,
        Err(err) => return Err(fail(err, &path, json)),
    };

    let body = if json { payload.to_json()? } else { payload.to_text() };
    println!("{body}");

    if let (Some(export_path), Payload::Forecast(forecast)) = (export, &payload) {
        crate::io::export::write_forecast_csv(&export_path, forecast)?;
        info!(path = %export_path.display(), rows = forecast.predictions.len(), "forecast exported");
    }
    Ok(())
}

/// Success payload of one request.
#[derive(Debug, Clone)]
pub enum Payload {
    Countries(Vec<CountryInfo>),
    History(HistoryResponse),
    Compare(CompareResponse),
    Latest(LatestResponse),
    Forecast(ForecastResponse),
    Models(ModelsResponse),
    Metrics {
        country: String,
        metrics: BTreeMap<String, ModelMetadata>,
    },
}

#[derive(Serialize)]
struct CountriesBody<'a> {
    countries: &'a [CountryInfo],
    total: usize,
}

#[derive(Serialize)]
struct MetricsBody<'a> {
    country: &'a str,
    metrics: &'a BTreeMap<String, ModelMetadata>,
}

impl Payload {
    pub fn to_json(&self) -> Result<String, AppError> {
        let out = match self {
            Payload::Countries(c) => serde_json::to_string_pretty(&CountriesBody {
                countries: c,
                total: c.len(),
            }),
            Payload::History(h) => serde_json::to_string_pretty(h),
            Payload::Compare(c) => serde_json::to_string_pretty(c),
            Payload::Latest(l) => serde_json::to_string_pretty(l),
            Payload::Forecast(f) => serde_json::to_string_pretty(f),
            Payload::Models(m) => serde_json::to_string_pretty(m),
            Payload::Metrics { country, metrics } => serde_json::to_string_pretty(&MetricsBody { country, metrics }),
        };
        out.map_err(|e| AppError::new(4, format!("Failed to serialize response: {e}")))
    }

    pub fn to_text(&self) -> String {
        use crate::report;
        match self {
            Payload::Countries(c) => report::format_countries(c),
            Payload::History(h) => report::format_history(h),
            Payload::Compare(c) => report::format_compare(c),
            Payload::Latest(l) => report::format_latest(l),
            Payload::Forecast(f) => report::format_forecast(f),
            Payload::Models(m) => report::format_models(m),
            Payload::Metrics { country, metrics } => report::format_metrics(country, metrics),
        }
    }
}

pub fn respond(service: &ForecastService, command: Command) -> Result<Payload, ServiceError> {
    Ok(match command {
        Command::Countries => Payload::Countries(service.countries()),
        Command::History {
            country,
            start,
            end,
            metrics,
            offset,
            limit,
            sort,
            order,
        } => Payload::History(service.history(
            &country,
            start,
            end,
            &metrics,
            Page {
                offset,
                limit,
                sort_by: sort,
                order,
            },
        )?),
        Command::Compare {
            countries,
            metric,
            start,
            end,
        } => Payload::Compare(service.compare(&countries, &metric, start, end)?),
        Command::Latest { countries } => Payload::Latest(service.latest(&countries)?),
        Command::Predict(args) => Payload::Forecast(service.predict(
            &args.country,
            args.days,
            args.model.as_deref(),
            args.enhanced,
        )?),
        Command::Models { country } => Payload::Models(service.models(&country)?),
        Command::Metrics { country, model } => Payload::Metrics {
            metrics: service.metrics(&country, model.as_deref())?,
            country,
        },
    })
}

/// Log the failure and, in JSON mode, print its envelope.
fn fail(err: ServiceError, path: &str, json: bool) -> AppError {
    error!(path, code = err.code(), status = err.status_code(), "{}", err.message());
    if json {
        match serde_json::to_string_pretty(&err.to_envelope(path)) {
            Ok(body) => println!("{body}"),
            Err(e) => error!(error = %e, "failed to serialize error envelope"),
        }
    }
    AppError::from(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &std::path::Path) -> ForecastService {
        std::fs::create_dir_all(dir.join("data")).unwrap();
        std::fs::write(
            dir.join("data").join(crate::config::RAW_DATA_FILE),
            "country,date,new_cases\nFrance,2020-01-01,3\nFrance,2020-01-02,5\n",
        )
        .unwrap();
        ForecastService::new(Settings::for_base_dir(dir).unwrap())
    }

    #[test]
    fn history_payload_renders_both_ways() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());
        let cli = Cli::try_parse_from(["epicast", "history", "France", "--metrics", "new_cases"]).unwrap();

        let payload = respond(&svc, cli.command).unwrap();
        let json: serde_json::Value = serde_json::from_str(&payload.to_json().unwrap()).unwrap();
        assert_eq!(json["country"], "France");
        assert_eq!(json["total_records"], 2);
        assert_eq!(json["data"][1]["new_cases"], 5.0);
        assert!(payload.to_text().contains("France history"));
    }

    #[test]
    fn service_errors_map_to_exit_codes() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(dir.path());

        let cli = Cli::try_parse_from(["epicast", "predict", "France", "--days", "90"]).unwrap();
        let err = execute(&svc, cli.command, true).unwrap_err();
        assert_eq!(err.exit_code(), 3);

        let cli = Cli::try_parse_from(["epicast", "models", "France"]).unwrap();
        let err = execute(&svc, cli.command, false).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
