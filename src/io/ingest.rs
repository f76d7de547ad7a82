//! CSV ingest and column normalization.
//!
//! This module turns a heterogeneous case-count CSV into a [`RawFrame`]:
//! rows keyed by (country, date) with whatever numeric columns the file had,
//! under normalized lower_snake_case names.
//!
//! Design goals:
//! - **Strict schema** for the key columns (country + a date-like column)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **No derivation here**: filling missing metrics is the data layer's job

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime};
use csv::StringRecord;

use crate::error::{ErrorDetail, ServiceError};

/// Known source spellings and the canonical column they map to.
///
/// Applied case-insensitively, and only when the canonical column is not
/// already present in the file.
pub const COLUMN_RENAMES: [(&str, &str); 10] = [
    ("Country/Region", "country"),
    ("Country_Region", "country"),
    ("location", "country"),
    ("Date", "date"),
    ("date_value", "date"),
    ("confirmed", "total_cases"),
    ("deaths", "total_deaths"),
    ("recovered", "total_recovered"),
    ("active", "active_cases"),
    ("cases", "total_cases"),
];

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RawRow {
    pub country: String,
    pub date: NaiveDate,
    pub values: BTreeMap<String, f64>,
}

/// Ingest output: normalized rows + the numeric columns seen + row errors.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub path: PathBuf,
    /// Numeric columns with at least one parsed value (excludes `country`/`date`).
    pub columns: BTreeSet<String>,
    pub rows: Vec<RawRow>,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
}

/// Read and normalize a case CSV.
///
/// `default_country` fills the country for files that lack a country column
/// (per-country files).
pub fn read_case_csv(path: &Path, default_country: Option<&str>) -> Result<RawFrame, ServiceError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| invalid_file(path, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);

    let country_idx = header_map.get("country").copied();
    if country_idx.is_none() && default_country.is_none() {
        return Err(missing_column(path, "country"));
    }
    let date_idx = find_date_column(&header_map).ok_or_else(|| missing_column(path, "date"))?;

    let value_columns: Vec<(&str, usize)> = header_map
        .iter()
        .filter(|(name, idx)| name.as_str() != "country" && **idx != date_idx)
        .map(|(name, idx)| (name.as_str(), *idx))
        .collect();

    let mut columns = BTreeSet::new();
    let mut rows = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header and CSV lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let country = match country_idx.and_then(|i| get_field(&record, i)) {
            Some(c) => c.to_string(),
            None => match default_country {
                Some(c) => c.to_string(),
                None => {
                    row_errors.push(RowError {
                        line,
                        message: "Missing country value.".to_string(),
                    });
                    continue;
                }
            },
        };

        let date = match get_field(&record, date_idx).map(parse_date) {
            Some(Ok(d)) => d,
            Some(Err(e)) => {
                row_errors.push(RowError { line, message: e });
                continue;
            }
            None => {
                row_errors.push(RowError {
                    line,
                    message: "Missing date value.".to_string(),
                });
                continue;
            }
        };

        let mut values = BTreeMap::new();
        for (name, col_idx) in &value_columns {
            if let Some(v) = parse_opt_f64(get_field(&record, *col_idx)) {
                values.insert(name.to_string(), v);
            }
        }
        columns.extend(values.keys().cloned());

        rows.push(RawRow { country, date, values });
    }

    Ok(RawFrame {
        path: path.to_path_buf(),
        columns,
        rows,
        row_errors,
        rows_read,
    })
}

/// Collect the distinct countries of a CSV without parsing anything else.
pub fn read_country_column(path: &Path) -> Result<BTreeSet<String>, ServiceError> {
    let mut reader = open_reader(path)?;
    let headers = reader
        .headers()
        .map_err(|e| invalid_file(path, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let idx = *header_map
        .get("country")
        .ok_or_else(|| missing_column(path, "country"))?;

    let mut out = BTreeSet::new();
    for record in reader.records().flatten() {
        if let Some(c) = get_field(&record, idx) {
            out.insert(c.to_string());
        }
    }
    Ok(out)
}

/// Logical country name from a file or directory stem (`United_Kingdom` -> `United Kingdom`).
pub fn country_from_stem(stem: &str) -> String {
    stem.trim().replace('_', " ")
}

/// Inverse of [`country_from_stem`].
pub fn stem_from_country(country: &str) -> String {
    country.trim().replace(' ', "_")
}

fn open_reader(path: &Path) -> Result<csv::Reader<File>, ServiceError> {
    let file = File::open(path).map_err(|e| {
        ServiceError::data_not_found(
            format!("Failed to open CSV '{}': {e}", path.display()),
            vec![ErrorDetail::new(path.display().to_string(), "file_not_found")],
        )
    })?;
    Ok(csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file))
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    let normalized: Vec<String> = headers.iter().map(normalize_header_name).collect();
    let mut map = HashMap::new();
    for (idx, raw) in headers.iter().enumerate() {
        let raw = strip_header(raw);
        let renamed = COLUMN_RENAMES
            .iter()
            .find(|(from, _)| from.eq_ignore_ascii_case(raw))
            .map(|(_, to)| *to)
            .filter(|to| !normalized.iter().any(|n| n == to));
        let name = renamed.map(str::to_string).unwrap_or_else(|| normalized[idx].clone());
        map.entry(name).or_insert(idx);
    }
    map
}

fn strip_header(name: &str) -> &str {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}')
}

/// Lower-snake-case a header: trim, strip BOM, lowercase, spaces to underscores.
pub fn normalize_header_name(name: &str) -> String {
    strip_header(name).to_lowercase().replace(' ', "_")
}

fn find_date_column(header_map: &HashMap<String, usize>) -> Option<usize> {
    if let Some(idx) = header_map.get("date") {
        return Some(*idx);
    }
    // Otherwise the left-most column whose name mentions a date.
    header_map
        .iter()
        .filter(|(name, _)| name.contains("date"))
        .map(|(_, idx)| *idx)
        .min()
}

fn get_field(record: &StringRecord, idx: usize) -> Option<&str> {
    record.get(idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    const DATE_FMTS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y"];
    const DATETIME_FMTS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];
    for fmt in DATE_FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    for fmt in DATETIME_FMTS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(dt.date());
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, YYYY/MM/DD, DD/MM/YYYY, DD-MM-YYYY."
    ))
}

fn parse_opt_f64(s: Option<&str>) -> Option<f64> {
    let v = s?.parse::<f64>().ok()?;
    if v.is_finite() { Some(v) } else { None }
}

fn missing_column(path: &Path, column: &str) -> ServiceError {
    ServiceError::data_validation(
        format!("Missing required column `{column}` in '{}'.", path.display()),
        vec![ErrorDetail::new(format!("Missing column: {column}"), "missing_column").at(&["body", column])],
    )
}

fn invalid_file(path: &Path, message: String) -> ServiceError {
    ServiceError::data_validation(
        message,
        vec![ErrorDetail::new(path.display().to_string(), "invalid_csv")],
    )
}
