//! Synthetic case series for countries no real source can serve.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::derive::build_table;
use crate::domain::{CaseTable, NEW_CASES, NEW_DEATHS};
use crate::error::ServiceError;
use crate::io::{RawFrame, RawRow};

/// Countries the synthetic source can generate.
pub const SYNTHETIC_COUNTRIES: [&str; 11] = [
    "France",
    "US",
    "Brazil",
    "Afghanistan",
    "China",
    "Italy",
    "Spain",
    "Germany",
    "United Kingdom",
    "India",
    "Cuba",
];

/// Logistic steepness (per day).
const GROWTH_RATE: f64 = 0.01;
const NOISE_SHARE: f64 = 0.1;
const SEASONAL_AMPLITUDE: f64 = 0.3;
const DEATH_RATE: f64 = 0.02;

/// Shape of one generated series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveShape {
    pub multiplier: f64,
    pub midpoint_day: f64,
}

impl CurveShape {
    pub fn for_country(country: &str, enhanced: bool) -> Self {
        match (country, enhanced) {
            ("US", true) => CurveShape {
                multiplier: 2000.0,
                midpoint_day: 200.0,
            },
            (_, true) => CurveShape {
                multiplier: 1000.0,
                midpoint_day: 200.0,
            },
            _ => CurveShape {
                multiplier: 500.0,
                midpoint_day: 150.0,
            },
        }
    }

    fn base(&self, day: usize) -> f64 {
        self.multiplier / (1.0 + (-GROWTH_RATE * (day as f64 - self.midpoint_day)).exp())
    }
}

pub fn first_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2020, 1, 1).unwrap_or(NaiveDate::MIN)
}

pub fn last_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2023, 12, 31).unwrap_or(NaiveDate::MIN)
}

/// Generate the daily table for one country.
///
/// Daily new cases follow a logistic base with Gaussian noise and a yearly
/// winter wave; deaths are a fixed share of cases. Totals are derived the same
/// way file sources derive them.
pub fn generate_country(country: &str, enhanced: bool, seed: u64) -> Result<CaseTable, ServiceError> {
    let shape = CurveShape::for_country(country, enhanced);
    let dates: Vec<NaiveDate> = first_day().iter_days().take_while(|d| *d <= last_day()).collect();

    let base: Vec<f64> = (0..dates.len()).map(|i| shape.base(i)).collect();
    let base_max = base.iter().copied().fold(0.0_f64, f64::max);

    let mut rng = StdRng::seed_from_u64(country_seed(seed, country));
    let normal = Normal::new(0.0, (base_max * NOISE_SHARE).max(f64::MIN_POSITIVE))
        .map_err(|e| ServiceError::prediction(format!("Noise distribution error: {e}"), Vec::new()))?;

    let rows = dates
        .iter()
        .zip(&base)
        .enumerate()
        .map(|(i, (date, level))| {
            let noisy = (level + normal.sample(&mut rng)).max(0.0);
            let cases = (noisy * (1.0 + seasonal_factor(i))).trunc();
            let mut values = BTreeMap::new();
            values.insert(NEW_CASES.to_string(), cases);
            values.insert(NEW_DEATHS.to_string(), (cases * DEATH_RATE).trunc());
            RawRow {
                country: country.to_string(),
                date: *date,
                values,
            }
        })
        .collect::<Vec<_>>();

    build_table(RawFrame {
        path: format!("<synthetic:{country}>").into(),
        columns: BTreeSet::from([NEW_CASES.to_string(), NEW_DEATHS.to_string()]),
        rows_read: rows.len(),
        rows,
        row_errors: Vec::new(),
    })
}

/// Winter peak: phase-shifted yearly sine.
fn seasonal_factor(day: usize) -> f64 {
    let phase = (day % 365) as f64 / 365.0;
    SEASONAL_AMPLITUDE * (2.0 * std::f64::consts::PI * phase + std::f64::consts::PI).sin()
}

/// FNV-1a over the country name, starting from the configured seed.
fn country_seed(seed: u64, country: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;
    country
        .bytes()
        .fold(FNV_OFFSET ^ seed, |h, b| (h ^ u64::from(b)).wrapping_mul(FNV_PRIME))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn covers_four_years_and_is_deterministic() {
        let a = generate_country("Cuba", false, 42).unwrap();
        let b = generate_country("Cuba", false, 42).unwrap();
        assert_eq!(a.len(), 1461);
        assert_eq!(a, b);
        assert_eq!(a.rows()[0].date, first_day());
        assert_eq!(a.latest_date("Cuba"), Some(last_day()));

        let c = generate_country("Cuba", false, 7).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn series_is_non_negative_with_consistent_totals() {
        let table = generate_country("US", true, 1).unwrap();
        let mut running = 0.0;
        for row in table.rows() {
            assert!(row.new_cases >= 0.0);
            assert!(row.new_deaths <= row.new_cases);
            running += row.new_cases;
            assert_eq!(row.total_cases, running);
        }
    }

    #[test]
    fn country_seed_is_a_fixed_fold_of_name_bytes() {
        assert_eq!(country_seed(0, ""), 0xcbf2_9ce4_8422_2325);
        assert_eq!(country_seed(0, "a"), 0xaf63_dc4c_8601_ec8c);
        assert_eq!(country_seed(42, "Cuba"), country_seed(42, "Cuba"));
        assert_ne!(country_seed(42, "Cuba"), country_seed(42, "Peru"));
        assert_ne!(country_seed(42, "Cuba"), country_seed(7, "Cuba"));
    }

    #[test]
    fn enhanced_countries_get_larger_curves() {
        assert_eq!(CurveShape::for_country("US", true).multiplier, 2000.0);
        assert_eq!(CurveShape::for_country("France", true).multiplier, 1000.0);
        assert_eq!(CurveShape::for_country("Cuba", false).midpoint_day, 150.0);
    }
}
