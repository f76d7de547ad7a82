//! Forecast orchestration: kind selection, model and data resolution, path choice.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::data::DataResolutionManager;
use crate::domain::{ForecastPath, ForecastResponse};
use crate::error::{ErrorDetail, ServiceError};
use crate::forecast::features::prepare_features;
use crate::forecast::{enhanced, standard};
use crate::models::ModelRegistry;

pub const MIN_DAYS: usize = 1;
pub const MAX_DAYS: usize = 60;

/// Kind requested when the enhanced pipeline is honoured.
pub const ENHANCED_KIND: &str = "enhanced";

#[derive(Debug, Clone)]
pub struct Predictor {
    data: Arc<DataResolutionManager>,
    registry: Arc<ModelRegistry>,
}

impl Predictor {
    pub fn new(data: Arc<DataResolutionManager>, registry: Arc<ModelRegistry>) -> Self {
        Self { data, registry }
    }

    /// Kind to resolve: `enhanced` when asked for and available, otherwise `kind`.
    pub fn effective_kind(&self, country: &str, kind: &str, use_enhanced: bool) -> String {
        if !use_enhanced {
            return kind.to_string();
        }
        if self.registry.is_enhanced_capable(country) {
            ENHANCED_KIND.to_string()
        } else {
            warn!(country, kind, "no enhanced model for country, using requested kind");
            kind.to_string()
        }
    }

    pub fn predict(
        &self,
        country: &str,
        days: usize,
        kind: &str,
        use_enhanced: bool,
    ) -> Result<ForecastResponse, ServiceError> {
        if !(MIN_DAYS..=MAX_DAYS).contains(&days) {
            return Err(ServiceError::data_validation(
                format!("days must be between {MIN_DAYS} and {MAX_DAYS}, got {days}."),
                vec![ErrorDetail::new("Out of range", "value_error").at(&["query", "days"])],
            ));
        }

        let effective = self.effective_kind(country, kind, use_enhanced);
        let resolved = self.registry.get_model(country, &effective)?;

        let table = self.data.get_historical(country, None, None, &[])?;
        let features = prepare_features(&table, country)?;

        let artifact = resolved.artifact.as_ref();
        let try_enhanced = effective == ENHANCED_KIND || artifact.is_sequence() || artifact.is_multi_step();
        let enhanced_run = if try_enhanced {
            match enhanced::forecast(artifact, &features, days) {
                Ok(points) => Some(points),
                Err(e) => {
                    warn!(country, kind = %resolved.kind, error = %e, "enhanced forecast failed, using standard path");
                    None
                }
            }
        } else {
            None
        };

        let (predictions, pipeline) = match enhanced_run {
            Some(points) => (points, ForecastPath::Enhanced),
            None => (standard::forecast(artifact, &features, days)?, ForecastPath::Standard),
        };

        let estimated = predictions.iter().filter(|p| p.estimation).count();
        info!(
            country,
            model_used = %effective,
            resolved_model = %resolved.kind,
            pipeline = pipeline.as_str(),
            days,
            estimated,
            "forecast generated"
        );

        Ok(ForecastResponse {
            country: country.to_string(),
            predictions,
            metrics: self.registry.metrics_for(country, &resolved.kind),
            model_used: effective,
            resolved_model: resolved.kind,
            prediction_days: days,
            pipeline,
            generated_at: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::data::DataSource;
    use crate::models::registry::tests::{linear, put};
    use crate::models::{Artifact, SmoothingModel};

    fn fixture(dir: &Path) -> Predictor {
        let raw = dir.join("raw.csv");
        let mut body = String::from("country,date,total_cases\n");
        for d in 1..=20 {
            body.push_str(&format!("A,2020-01-{d:02},{}\n", d * 10));
            body.push_str(&format!("B,2020-01-{d:02},{}\n", d * 5));
        }
        std::fs::write(&raw, body).unwrap();

        let models = dir.join("models");
        put(&models, "A", "xgboost", &linear(0.0));
        put(
            &models,
            "A",
            "enhanced",
            &Artifact::Smoothing(SmoothingModel {
                alpha: 0.5,
                beta: 0.2,
                phi: 0.9,
            }),
        );
        put(&models, "B", "random_forest", &linear(1.0));

        Predictor::new(
            Arc::new(DataResolutionManager::new(vec![DataSource::raw(&raw, false)])),
            Arc::new(ModelRegistry::discover(&models, &[], false)),
        )
    }

    #[test]
    fn enhanced_request_uses_enhanced_pipeline_when_available() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = fixture(dir.path());
        let out = predictor.predict("A", 10, "xgboost", true).unwrap();
        assert_eq!(out.model_used, "enhanced");
        assert_eq!(out.pipeline, ForecastPath::Enhanced);
        assert_eq!(out.predictions.len(), 10);
        assert_eq!(out.predictions[0].date.to_string(), "2020-01-21");
    }

    #[test]
    fn enhanced_request_degrades_to_plain_kind() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = fixture(dir.path());
        let out = predictor.predict("B", 5, "xgboost", true).unwrap();
        assert_eq!(out.model_used, "xgboost");
        assert_eq!(out.resolved_model, "random_forest");
        assert_eq!(out.pipeline, ForecastPath::Standard);
        // new_cases_7d_avg starts at 5 and the linear model adds 1.
        assert_eq!(out.predictions[0].new_cases, 6);
        assert!(out.predictions.iter().all(|p| !p.estimation));
    }

    #[test]
    fn days_out_of_range_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = fixture(dir.path());
        for days in [0, 61] {
            let err = predictor.predict("A", days, "xgboost", false).unwrap_err();
            assert_eq!(err.status_code(), 422);
        }
    }

    #[test]
    fn unknown_country_fails_on_model_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let predictor = fixture(dir.path());
        let err = predictor.predict("Atlantis", 5, "xgboost", false).unwrap_err();
        assert_eq!(err.code(), "MODEL_NOT_FOUND");
    }
}
