//! Sequence-model forecasting.
//!
//! Multi-step models forecast the new-case history directly. Recurrent models
//! get the last [`SEQUENCE_WINDOW`] days as one normalized batch and are
//! invoked once. The band widens with the horizon.

use crate::domain::PredictionPoint;
use crate::forecast::features::FeatureRow;
use crate::forecast::standard::{day_after, empty_history, point};
use crate::models::{Artifact, ModelError, SEQUENCE_FEATURES};

pub const SEQUENCE_WINDOW: usize = 14;
const BAND_BASE: f64 = 0.1;
const BAND_STEP: f64 = 0.01;

/// Why the enhanced path gave up (the caller falls back to the standard path).
#[derive(Debug, thiserror::Error)]
pub enum EnhancedError {
    #[error("{0} artifacts have no sequence capability")]
    NotSequenceCapable(&'static str),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("{0}")]
    Service(#[from] crate::error::ServiceError),
}

/// Band half-width for the zero-based horizon index.
pub fn band_at(index: usize) -> f64 {
    BAND_BASE + BAND_STEP * index as f64
}

pub fn forecast(artifact: &Artifact, history: &[FeatureRow], days: usize) -> Result<Vec<PredictionPoint>, EnhancedError> {
    let last = history.last().ok_or_else(empty_history)?;
    let window = &history[history.len().saturating_sub(SEQUENCE_WINDOW)..];

    let values = if artifact.is_multi_step() {
        let series: Vec<f64> = window.iter().map(|r| r.new_cases).collect();
        artifact.predict_sequence(&series, days)?
    } else if artifact.is_sequence() {
        let (batch, scale) = normalized_batch(window);
        artifact
            .predict_batch(&batch, days)?
            .into_iter()
            .map(|v| v * scale)
            .collect()
    } else {
        return Err(EnhancedError::NotSequenceCapable(artifact.family()));
    };

    if values.len() != days {
        return Err(ModelError::ShapeMismatch {
            expected: days,
            got: values.len(),
        }
        .into());
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite.into());
    }

    let mut total = last.total_cases;
    let mut out = Vec::with_capacity(days);
    for (i, v) in values.into_iter().enumerate() {
        let value = v.max(0.0);
        total += value;
        out.push(point(day_after(last.date, i + 1)?, value, total, band_at(i), false));
    }
    Ok(out)
}

/// Columns new_cases, total_cases, 7-day average, growth; each divided by its
/// maximum when positive. Returns the new-case scale for denormalizing.
fn normalized_batch(window: &[FeatureRow]) -> (Vec<[f64; SEQUENCE_FEATURES]>, f64) {
    let raw: Vec<[f64; SEQUENCE_FEATURES]> = window
        .iter()
        .map(|r| [r.new_cases, r.total_cases, r.new_cases_7d_avg, r.growth_rate])
        .collect();

    let mut max = [0.0_f64; SEQUENCE_FEATURES];
    for step in &raw {
        for (m, v) in max.iter_mut().zip(step) {
            *m = m.max(*v);
        }
    }
    let batch = raw
        .iter()
        .map(|step| {
            let mut out = *step;
            for (v, m) in out.iter_mut().zip(max) {
                if m > 0.0 {
                    *v /= m;
                }
            }
            out
        })
        .collect();
    let scale = if max[0] > 0.0 { max[0] } else { 1.0 };
    (batch, scale)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forecast::standard::tests::history;
    use crate::models::{RecurrentModel, SmoothingModel};

    #[test]
    fn smoothing_model_forecasts_with_widening_band() {
        let model = Artifact::Smoothing(SmoothingModel {
            alpha: 0.5,
            beta: 0.1,
            phi: 0.9,
        });
        let rows = history(20);
        let out = forecast(&model, &rows, 5).unwrap();
        assert_eq!(out.len(), 5);
        assert_eq!(out[0].date, rows[19].date + chrono::Days::new(1));
        // Flat history stays flat.
        assert!(out.iter().all(|p| p.new_cases == 100));
        assert_eq!((out[0].lower_bound, out[0].upper_bound), (90, 110));
        assert_eq!((out[4].lower_bound, out[4].upper_bound), (86, 114));
        assert!(out.iter().all(|p| !p.estimation));
    }

    #[test]
    fn recurrent_output_is_denormalized_by_new_case_max() {
        // Identity-like cell: y = tanh(x_new_cases) scaled back up.
        let model = Artifact::Recurrent(RecurrentModel {
            w_input: vec![vec![1.0, 0.0, 0.0, 0.0]],
            w_hidden: vec![vec![0.0]],
            bias: vec![0.0],
            w_output: vec![1.0],
            bias_output: 0.0,
        });
        let out = forecast(&model, &history(20), 2).unwrap();
        let expected = (1.0f64.tanh() * 100.0).round() as u64;
        assert_eq!(out[0].new_cases, expected);
    }

    #[test]
    fn scalar_only_models_are_rejected() {
        let model = Artifact::Linear(crate::models::LinearModel {
            intercept: 1.0,
            coefficients: Default::default(),
        });
        assert!(matches!(
            forecast(&model, &history(3), 2),
            Err(EnhancedError::NotSequenceCapable("linear"))
        ));
    }

    #[test]
    fn band_grows_one_point_per_day() {
        assert!((band_at(0) - 0.1).abs() < 1e-12);
        assert!((band_at(10) - 0.2).abs() < 1e-12);
    }
}
