//! Export a forecast to CSV.
//!
//! One row per predicted day, with the response-level model and pipeline
//! fields repeated so the file stands on its own in a spreadsheet.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use crate::domain::ForecastResponse;
use crate::error::AppError;

pub const FORECAST_HEADER: &str =
    "country,date,new_cases,total_cases,lower_bound,upper_bound,estimation,model_used,resolved_model,pipeline";

pub fn write_forecast_csv(path: &Path, forecast: &ForecastResponse) -> Result<(), AppError> {
    let mut file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create export CSV '{}': {e}", path.display())))?;

    writeln!(file, "{FORECAST_HEADER}")
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    let country = quote(&forecast.country);
    for p in &forecast.predictions {
        writeln!(
            file,
            "{},{},{},{},{},{},{},{},{},{}",
            country,
            p.date,
            p.new_cases,
            p.total_cases,
            p.lower_bound,
            p.upper_bound,
            p.estimation,
            forecast.model_used,
            forecast.resolved_model,
            forecast.pipeline.as_str(),
        )
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }
    Ok(())
}

/// Country names may carry commas ("Korea, South").
fn quote(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}
