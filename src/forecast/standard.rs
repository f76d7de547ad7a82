//! Iterative single-step forecasting.
//!
//! Each day the model sees the rolled-forward feature row; its output becomes
//! the next day's state. A failed call is replaced by a +5% estimate on the
//! previous day and flagged, so the forecast always has the requested length.

use chrono::{Days, NaiveDate};
use tracing::warn;

use crate::domain::PredictionPoint;
use crate::error::{ErrorDetail, ServiceError};
use crate::forecast::features::FeatureRow;
use crate::models::Artifact;

/// Symmetric relative half-width of the confidence band.
pub const BAND: f64 = 0.2;
/// Day-over-day factor used when the model call fails.
pub const ESTIMATE_GROWTH: f64 = 1.05;
/// Weight kept by the smoothed 7-day average on each step.
const AVG_DECAY: f64 = 0.85;

pub fn forecast(artifact: &Artifact, history: &[FeatureRow], days: usize) -> Result<Vec<PredictionPoint>, ServiceError> {
    let last = history.last().ok_or_else(empty_history)?;
    let mut state = last.clone();
    let mut out = Vec::with_capacity(days);

    for step in 1..=days {
        let date = day_after(last.date, step)?;
        let row = state.at(date);

        let (value, estimation) = match artifact.predict(&row) {
            Ok(v) => (v.max(0.0), false),
            Err(e) => {
                warn!(day = step, %date, error = %e, "model call failed, substituting estimate");
                (state.new_cases * ESTIMATE_GROWTH, true)
            }
        };

        let previous = state.new_cases;
        state = FeatureRow {
            new_cases: value,
            total_cases: state.total_cases + value,
            new_cases_7d_avg: state.new_cases_7d_avg * AVG_DECAY + value * (1.0 - AVG_DECAY),
            growth_rate: if value > 0.0 && previous > 0.0 {
                (value - previous) / previous
            } else {
                state.growth_rate
            },
            ..row
        };

        out.push(point(date, value, state.total_cases, BAND, estimation));
    }
    Ok(out)
}

/// `start + n` days.
pub(crate) fn day_after(start: NaiveDate, n: usize) -> Result<NaiveDate, ServiceError> {
    u64::try_from(n)
        .ok()
        .and_then(|n| start.checked_add_days(Days::new(n)))
        .ok_or_else(|| {
            ServiceError::prediction(
                format!("Forecast date overflow after {start}."),
                vec![ErrorDetail::new("Date out of range", "date_overflow")],
            )
        })
}

pub(crate) fn point(date: NaiveDate, value: f64, total: f64, band: f64, estimation: bool) -> PredictionPoint {
    PredictionPoint {
        date,
        new_cases: to_count(value),
        total_cases: to_count(total),
        lower_bound: to_count(value * (1.0 - band)),
        upper_bound: to_count(value * (1.0 + band)),
        estimation,
    }
}

fn to_count(v: f64) -> u64 {
    if v.is_finite() && v > 0.0 { v.round() as u64 } else { 0 }
}

pub(crate) fn empty_history() -> ServiceError {
    ServiceError::prediction(
        "Cannot forecast from an empty history.",
        vec![ErrorDetail::new("Empty feature set", "feature_preparation")],
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::models::LinearModel;

    pub(crate) fn history(n: usize) -> Vec<FeatureRow> {
        (0..n)
            .map(|i| FeatureRow {
                date: NaiveDate::from_ymd_opt(2020, 1, 1).unwrap() + Days::new(i as u64),
                new_cases: 100.0,
                total_cases: 1000.0 + 100.0 * i as f64,
                new_deaths: 1.0,
                total_deaths: 10.0,
                new_cases_7d_avg: 100.0,
                growth_rate: 0.0,
                growth_7d_avg: 0.0,
                mortality_rate: 0.01,
            })
            .collect()
    }

    fn linear(coefficients: &[(&str, f64)]) -> Artifact {
        Artifact::Linear(LinearModel {
            intercept: 0.0,
            coefficients: coefficients.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>(),
        })
    }

    #[test]
    fn dates_follow_the_last_known_day() {
        let rows = history(10);
        let out = forecast(&linear(&[("new_cases", 1.0)]), &rows, 7).unwrap();
        assert_eq!(out.len(), 7);
        assert_eq!(out[0].date, NaiveDate::from_ymd_opt(2020, 1, 11).unwrap());
        assert!(out.windows(2).all(|w| w[1].date == w[0].date + Days::new(1)));
        assert!(out.iter().all(|p| p.new_cases == 100 && !p.estimation));
        assert_eq!(out[6].total_cases, 1900 + 700);
        assert_eq!((out[0].lower_bound, out[0].upper_bound), (80, 120));
    }

    #[test]
    fn negative_outputs_floor_at_zero() {
        let model = Artifact::Linear(LinearModel {
            intercept: -50.0,
            coefficients: BTreeMap::new(),
        });
        let out = forecast(&model, &history(3), 2).unwrap();
        assert!(out.iter().all(|p| p.new_cases == 0 && p.upper_bound == 0));
    }

    #[test]
    fn failing_day_is_estimated_not_fatal() {
        // `dow_9` never resolves, so every call fails.
        let model = linear(&[("dow_9", 1.0)]);
        let out = forecast(&model, &history(5), 3).unwrap();
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|p| p.estimation));
        assert_eq!(out[0].new_cases, 105);
        assert_eq!(out[1].new_cases, 110);
    }

    #[test]
    fn only_the_failing_day_is_flagged() {
        use crate::models::{Aggregation, Tree, TreeEnsemble, TreeNode};

        // Mondays route to a split on a feature no row provides.
        let model = Artifact::TreeEnsemble(TreeEnsemble {
            trees: vec![Tree {
                nodes: vec![
                    TreeNode::Split {
                        feature: "dow_0".to_string(),
                        threshold: 0.5,
                        left: 1,
                        right: 2,
                    },
                    TreeNode::Leaf { leaf: 200.0 },
                    TreeNode::Split {
                        feature: "hosp_patients".to_string(),
                        threshold: 1.0,
                        left: 1,
                        right: 1,
                    },
                ],
            }],
            aggregation: Aggregation::Sum,
            base_score: 0.0,
        });
        // History ends on Sunday 2020-01-05.
        let out = forecast(&model, &history(5), 3).unwrap();
        let flags: Vec<bool> = out.iter().map(|p| p.estimation).collect();
        assert_eq!(flags, vec![true, false, false]);
        assert_eq!(out[0].new_cases, 105);
        assert_eq!(out[1].new_cases, 200);
        assert_eq!(out[2].total_cases, 1400 + 105 + 400);
    }

    #[test]
    fn smoothed_average_decays_toward_prediction() {
        let out = forecast(&linear(&[("new_cases_7d_avg", 0.5)]), &history(1), 2).unwrap();
        // 100 -> 50, avg 0.85*100 + 0.15*50 = 92.5 -> 46.25
        assert_eq!(out[0].new_cases, 50);
        assert_eq!(out[1].new_cases, 46);
    }
}
