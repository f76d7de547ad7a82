//! Serializable response types.
//!
//! These are the payloads the request surface prints (text or JSON) and the
//! forecast export writes.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::domain::table::CaseRecord;

/// One forecast day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PredictionPoint {
    pub date: NaiveDate,
    pub new_cases: u64,
    pub total_cases: u64,
    pub lower_bound: u64,
    pub upper_bound: u64,
    /// Set when the model call failed and a heuristic estimate was substituted.
    pub estimation: bool,
}

/// Which prediction algorithm produced a forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ForecastPath {
    Standard,
    Enhanced,
}

impl ForecastPath {
    pub fn as_str(self) -> &'static str {
        match self {
            ForecastPath::Standard => "standard",
            ForecastPath::Enhanced => "enhanced",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ForecastResponse {
    pub country: String,
    pub predictions: Vec<PredictionPoint>,
    /// Effective requested kind (after enhanced degradation).
    pub model_used: String,
    /// Kind actually loaded after alternative-kind fallback.
    pub resolved_model: String,
    pub prediction_days: usize,
    pub pipeline: ForecastPath,
    pub generated_at: DateTime<Utc>,
    pub metrics: BTreeMap<String, f64>,
}

/// Where a country's data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataQuality {
    Enhanced,
    Standard,
    Simulated,
}

impl DataQuality {
    pub fn as_str(self) -> &'static str {
        match self {
            DataQuality::Enhanced => "enhanced",
            DataQuality::Standard => "standard",
            DataQuality::Simulated => "simulated",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CountryInfo {
    pub name: String,
    pub has_enhanced_model: bool,
    pub available_models: Vec<String>,
    pub data_quality: DataQuality,
}

/// One historical row restricted to the requested metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesRecord {
    pub country: String,
    pub date: NaiveDate,
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl SeriesRecord {
    pub fn from_record<'a>(record: &CaseRecord, metrics: impl IntoIterator<Item = &'a str>) -> Self {
        let values = metrics
            .into_iter()
            .filter_map(|m| record.value(m).map(|v| (m.to_string(), v)))
            .collect();
        Self {
            country: record.country.clone(),
            date: record.date,
            values,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryResponse {
    pub country: String,
    pub data: Vec<SeriesRecord>,
    pub total_records: usize,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComparePoint {
    pub date: NaiveDate,
    pub value: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompareResponse {
    pub metric: String,
    pub countries: Vec<String>,
    pub data: BTreeMap<String, Vec<ComparePoint>>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LatestResponse {
    pub timestamp: DateTime<Utc>,
    pub countries: usize,
    pub data: Vec<SeriesRecord>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModelsResponse {
    pub country: String,
    pub models: Vec<String>,
    pub has_enhanced_model: bool,
}
