//! Feature preparation for the forecasting paths.

use chrono::{Datelike, NaiveDate};

use crate::domain::{CaseRecord, CaseTable};
use crate::error::{ErrorDetail, ServiceError};

/// Most recent rows used to seed a forecast.
pub const HISTORY_WINDOW: usize = 30;
/// Rolling window (days) for averages.
pub const ROLLING_WINDOW: usize = 7;

/// Model inputs for one day.
///
/// Calendar features (`dow_0`..`dow_6` with Monday = 0, `month`, `day`) are
/// computed from `date` on lookup, so moving the row to a new date is enough to
/// advance them.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRow {
    pub date: NaiveDate,
    pub new_cases: f64,
    pub total_cases: f64,
    pub new_deaths: f64,
    pub total_deaths: f64,
    pub new_cases_7d_avg: f64,
    pub growth_rate: f64,
    pub growth_7d_avg: f64,
    pub mortality_rate: f64,
}

impl FeatureRow {
    pub fn day_of_week(&self) -> u32 {
        self.date.weekday().num_days_from_monday()
    }

    /// Value of a named feature, as artifacts refer to them.
    pub fn value(&self, name: &str) -> Option<f64> {
        let v = match name {
            "new_cases" => self.new_cases,
            "total_cases" => self.total_cases,
            "new_deaths" => self.new_deaths,
            "total_deaths" => self.total_deaths,
            "new_cases_7d_avg" => self.new_cases_7d_avg,
            "growth_rate" => self.growth_rate,
            "growth_7d_avg" => self.growth_7d_avg,
            "mortality_rate" => self.mortality_rate,
            "month" => f64::from(self.date.month()),
            "day" => f64::from(self.date.day()),
            "day_of_week" => f64::from(self.day_of_week()),
            other => {
                let idx: u32 = other.strip_prefix("dow_")?.parse().ok()?;
                if idx > 6 {
                    return None;
                }
                if idx == self.day_of_week() { 1.0 } else { 0.0 }
            }
        };
        Some(v)
    }

    /// Same state, moved to `date`.
    pub fn at(&self, date: NaiveDate) -> FeatureRow {
        FeatureRow { date, ..self.clone() }
    }
}

/// Build feature rows from the last [`HISTORY_WINDOW`] rows of one country.
///
/// Non-finite values (zero-division growth, for instance) become 0.
pub fn prepare_features(table: &CaseTable, country: &str) -> Result<Vec<FeatureRow>, ServiceError> {
    let mut rows: Vec<&CaseRecord> = table.rows_for(country).collect();
    if rows.is_empty() {
        return Err(ServiceError::prediction(
            format!("No historical rows for '{country}' to build features from."),
            vec![ErrorDetail::new("Empty history", "feature_preparation").at(&["path", "country"])],
        ));
    }
    rows.sort_by_key(|r| r.date);
    let recent = &rows[rows.len().saturating_sub(HISTORY_WINDOW)..];

    let new_cases: Vec<f64> = recent.iter().map(|r| r.new_cases).collect();
    let growth: Vec<f64> = pct_change(&new_cases).into_iter().map(finite_or_zero).collect();
    let avg = rolling_mean(&new_cases, ROLLING_WINDOW);
    let growth_avg = rolling_mean(&growth, ROLLING_WINDOW);

    Ok(recent
        .iter()
        .enumerate()
        .map(|(i, r)| FeatureRow {
            date: r.date,
            new_cases: finite_or_zero(r.new_cases),
            total_cases: finite_or_zero(r.total_cases),
            new_deaths: finite_or_zero(r.new_deaths),
            total_deaths: finite_or_zero(r.total_deaths),
            new_cases_7d_avg: finite_or_zero(avg[i]),
            growth_rate: growth[i],
            growth_7d_avg: finite_or_zero(growth_avg[i]),
            mortality_rate: if r.total_cases > 0.0 {
                finite_or_zero(r.total_deaths / r.total_cases)
            } else {
                0.0
            },
        })
        .collect())
}

/// Trailing mean over up to `window` values (partial windows at the start).
pub fn rolling_mean(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Relative change from the previous value; the first entry is 0.
pub fn pct_change(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        if i == 0 {
            out.push(0.0);
        } else {
            out.push((values[i] - values[i - 1]) / values[i - 1]);
        }
    }
    out
}

pub fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::table::tests::{core_columns, record};

    fn table(new_cases: &[f64]) -> CaseTable {
        let mut total = 0.0;
        let rows = new_cases
            .iter()
            .enumerate()
            .map(|(i, n)| {
                total += n;
                let mut r = record("A", i as u32 + 1, total);
                r.new_cases = *n;
                r.total_deaths = total / 10.0;
                r
            })
            .collect();
        CaseTable::new(core_columns(), rows)
    }

    #[test]
    fn growth_guards_zero_division() {
        let rows = prepare_features(&table(&[0.0, 0.0, 4.0, 6.0]), "A").unwrap();
        let growth: Vec<f64> = rows.iter().map(|r| r.growth_rate).collect();
        assert_eq!(growth, vec![0.0, 0.0, 0.0, 0.5]);
        assert_eq!(rows[3].new_cases_7d_avg, 2.5);
        assert!((rows[3].mortality_rate - 0.1).abs() < 1e-12);
        assert_eq!(rows[0].mortality_rate, 0.0);
    }

    #[test]
    fn keeps_last_thirty_rows() {
        let values: Vec<f64> = (1..=31).map(f64::from).collect();
        let rows = prepare_features(&table(&values), "A").unwrap();
        assert_eq!(rows.len(), HISTORY_WINDOW);
        assert_eq!(rows[0].new_cases, 2.0);
    }

    #[test]
    fn empty_history_is_prediction_error() {
        let err = prepare_features(&table(&[1.0]), "B").unwrap_err();
        assert_eq!(err.code(), "PREDICTION_ERROR");
    }

    #[test]
    fn calendar_features_follow_date() {
        let rows = prepare_features(&table(&[1.0]), "A").unwrap();
        // 2020-01-01 was a Wednesday.
        let row = &rows[0];
        assert_eq!(row.value("dow_2"), Some(1.0));
        assert_eq!(row.value("dow_0"), Some(0.0));
        assert_eq!(row.value("dow_9"), None);
        let moved = row.at(NaiveDate::from_ymd_opt(2020, 2, 3).unwrap());
        assert_eq!(moved.value("dow_0"), Some(1.0));
        assert_eq!(moved.value("month"), Some(2.0));
        assert_eq!(moved.value("day"), Some(3.0));
        assert_eq!(moved.value("unknown"), None);
    }
}
