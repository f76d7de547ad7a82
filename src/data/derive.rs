//! Metric derivation: turn an ingested frame into a [`CaseTable`].
//!
//! Whatever subset of the four core metrics a file carried, the table always
//! ends up with all four:
//!
//! - `new_*` missing, `total_*` present: first difference (first row 0), clamped at 0
//! - `total_*` missing, `new_*` present: cumulative sum
//! - deaths entirely absent: `total_deaths` estimated as 2% of `total_cases`
//!
//! Duplicate (country, date) rows keep the last occurrence.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use tracing::warn;

use crate::domain::{CORE_METRICS, CaseRecord, CaseTable, NEW_CASES, NEW_DEATHS, TOTAL_CASES, TOTAL_DEATHS};
use crate::error::{ErrorDetail, ServiceError};
use crate::io::RawFrame;

/// Share of cases assumed fatal when a file has no death columns at all.
pub const ESTIMATED_DEATH_RATE: f64 = 0.02;

type CountryRows = BTreeMap<NaiveDate, BTreeMap<String, f64>>;

pub fn build_table(frame: RawFrame) -> Result<CaseTable, ServiceError> {
    let has = |c: &str| frame.columns.contains(c);
    let (has_tc, has_nc, has_td, has_nd) = (has(TOTAL_CASES), has(NEW_CASES), has(TOTAL_DEATHS), has(NEW_DEATHS));

    if !has_tc && !has_nc {
        return Err(ServiceError::data_validation(
            format!(
                "'{}' has neither `{TOTAL_CASES}` nor `{NEW_CASES}`.",
                frame.path.display()
            ),
            vec![ErrorDetail::new("No case column to derive from", "missing_column").at(&["body", TOTAL_CASES])],
        ));
    }

    if !frame.row_errors.is_empty() {
        let first = &frame.row_errors[0];
        warn!(
            path = %frame.path.display(),
            skipped = frame.row_errors.len(),
            rows_read = frame.rows_read,
            "skipped invalid rows (first at line {}: {})",
            first.line,
            first.message
        );
    }

    // Later rows overwrite earlier ones for the same key.
    let mut grouped: BTreeMap<String, CountryRows> = BTreeMap::new();
    for row in frame.rows {
        grouped.entry(row.country).or_default().insert(row.date, row.values);
    }

    let mut rows = Vec::new();
    for (country, by_date) in grouped {
        let dates: Vec<NaiveDate> = by_date.keys().copied().collect();
        let column = |name: &str| -> Vec<Option<f64>> { by_date.values().map(|v| v.get(name).copied()).collect() };

        let (total_cases, new_cases) = derive_pair(column(TOTAL_CASES), column(NEW_CASES), has_tc, has_nc);
        let (total_deaths, new_deaths) = if has_td || has_nd {
            derive_pair(column(TOTAL_DEATHS), column(NEW_DEATHS), has_td, has_nd)
        } else {
            let estimated: Vec<f64> = total_cases
                .iter()
                .map(|tc| (tc * ESTIMATED_DEATH_RATE).floor())
                .collect();
            let new = first_difference(&estimated);
            (estimated, new)
        };

        for (i, (date, values)) in dates.iter().zip(by_date.into_values()).enumerate() {
            let extras = values
                .into_iter()
                .filter(|(k, _)| !CORE_METRICS.contains(&k.as_str()))
                .collect();
            rows.push(CaseRecord {
                country: country.clone(),
                date: *date,
                total_cases: total_cases[i],
                new_cases: new_cases[i],
                total_deaths: total_deaths[i],
                new_deaths: new_deaths[i],
                extras,
            });
        }
    }

    let columns: BTreeSet<String> = ["country", "date"]
        .into_iter()
        .chain(CORE_METRICS)
        .map(str::to_string)
        .chain(frame.columns)
        .collect();

    Ok(CaseTable::new(columns, rows))
}

/// Complete a (cumulative, delta) pair from whichever side the file carried.
fn derive_pair(
    totals: Vec<Option<f64>>,
    deltas: Vec<Option<f64>>,
    has_total: bool,
    has_delta: bool,
) -> (Vec<f64>, Vec<f64>) {
    let totals = has_total.then(|| forward_fill(&totals));
    let deltas = has_delta.then(|| deltas.iter().map(|v| v.unwrap_or(0.0).max(0.0)).collect::<Vec<_>>());

    match (totals, deltas) {
        (Some(t), Some(d)) => (t, d),
        (Some(t), None) => {
            let d = first_difference(&t);
            (t, d)
        }
        (None, Some(d)) => (cumulative_sum(&d), d),
        (None, None) => (Vec::new(), Vec::new()),
    }
}

/// Differences between consecutive values; the first entry is 0 and negatives clamp to 0.
pub fn first_difference(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f64> = None;
    for &v in values {
        out.push(prev.map(|p| (v - p).max(0.0)).unwrap_or(0.0));
        prev = Some(v);
    }
    out
}

pub fn cumulative_sum(values: &[f64]) -> Vec<f64> {
    values
        .iter()
        .scan(0.0, |acc, v| {
            *acc += v;
            Some(*acc)
        })
        .collect()
}

fn forward_fill(values: &[Option<f64>]) -> Vec<f64> {
    let mut last = 0.0;
    values
        .iter()
        .map(|v| {
            if let Some(v) = v {
                last = *v;
            }
            last
        })
        .collect()
}
