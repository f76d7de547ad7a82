//! Request-level operations over the data manager, registry and predictor.
//!
//! Each method corresponds to one endpoint of the request surface and returns
//! its success payload or a typed [`ServiceError`].

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use crate::config::Settings;
use crate::data::DataResolutionManager;
use crate::domain::{
    ComparePoint, CompareResponse, CountryInfo, DEFAULT_METRICS, DataContext, DataQuality, ForecastResponse, HistoryResponse,
    LatestResponse, ModelsResponse, SeriesRecord, SortOrder,
};
use crate::error::{ErrorDetail, ServiceError};
use crate::forecast::Predictor;
use crate::models::{ModelMetadata, ModelRegistry};

/// Ordering and pagination for history lookups.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: Option<usize>,
    /// Column to sort by; date order per country when unset.
    pub sort_by: Option<String>,
    pub order: SortOrder,
}

#[derive(Debug)]
pub struct ForecastService {
    settings: Settings,
    data: Arc<DataResolutionManager>,
    registry: Arc<ModelRegistry>,
    predictor: Predictor,
}

impl ForecastService {
    pub fn new(settings: Settings) -> Self {
        let data = Arc::new(DataResolutionManager::from_settings(&settings));
        let registry = Arc::new(ModelRegistry::discover(
            &settings.paths.models_dir,
            &settings.enhanced_countries,
            settings.cache_revalidate,
        ));
        let predictor = Predictor::new(Arc::clone(&data), Arc::clone(&registry));
        Self {
            settings,
            data,
            registry,
            predictor,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn data(&self) -> &DataResolutionManager {
        &self.data
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Every country some source can serve, with model and data-quality metadata.
    pub fn countries(&self) -> Vec<CountryInfo> {
        let enhanced = self.registry.enhanced_countries();
        self.data
            .available_countries()
            .into_iter()
            .map(|name| CountryInfo {
                has_enhanced_model: enhanced.contains(&name),
                available_models: self.registry.available_kinds(&name),
                data_quality: self.data.quality_for(&name).unwrap_or(DataQuality::Standard),
                name,
            })
            .collect()
    }

    pub fn history(
        &self,
        country: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        metrics: &[String],
        page: Page,
    ) -> Result<HistoryResponse, ServiceError> {
        let limit = self.page_limit(page.limit)?;
        let metric_names: Vec<&str> = if metrics.is_empty() {
            DEFAULT_METRICS.to_vec()
        } else {
            metrics.iter().map(String::as_str).collect()
        };

        let mut builder = DataContext::builder()
            .country(country)
            .date_range(start, end)
            .metrics(metric_names.iter().copied());
        if let Some(key) = &page.sort_by {
            builder = builder.sort(key.as_str(), page.order);
        }
        let table = self.data.get_data(&builder.build())?;
        let (first, last) = (table.rows().iter().map(|r| r.date).min(), table.rows().iter().map(|r| r.date).max());
        let total_records = table.len();
        let data = table
            .rows()
            .iter()
            .skip(page.offset)
            .take(limit)
            .map(|r| SeriesRecord::from_record(r, metric_names.iter().copied()))
            .collect();

        Ok(HistoryResponse {
            country: country.to_string(),
            data,
            total_records,
            start_date: first,
            end_date: last,
        })
    }

    pub fn compare(
        &self,
        countries: &[String],
        metric: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<CompareResponse, ServiceError> {
        if countries.is_empty() {
            return Err(ServiceError::data_validation(
                "At least one country is required for a comparison.",
                vec![ErrorDetail::new("Empty country list", "value_error").at(&["query", "countries"])],
            ));
        }
        let table = self.data.get_comparison(countries, metric, start, end)?;

        let mut data: BTreeMap<String, Vec<ComparePoint>> = BTreeMap::new();
        for row in table.rows() {
            if let Some(value) = row.value(metric) {
                data.entry(row.country.clone())
                    .or_default()
                    .push(ComparePoint { date: row.date, value });
            }
        }

        Ok(CompareResponse {
            metric: metric.to_string(),
            countries: countries.to_vec(),
            data,
            start_date: start,
            end_date: end,
        })
    }

    pub fn latest(&self, countries: &[String]) -> Result<LatestResponse, ServiceError> {
        let table = self.data.get_latest(countries)?;
        let data: Vec<SeriesRecord> = table
            .rows()
            .iter()
            .map(|r| SeriesRecord::from_record(r, DEFAULT_METRICS))
            .collect();
        Ok(LatestResponse {
            timestamp: Utc::now(),
            countries: data.len(),
            data,
        })
    }

    /// Forecast `days` ahead; `kind` defaults to the configured model kind.
    pub fn predict(
        &self,
        country: &str,
        days: usize,
        kind: Option<&str>,
        use_enhanced: bool,
    ) -> Result<ForecastResponse, ServiceError> {
        let kind = kind.unwrap_or(self.settings.default_model.as_str());
        self.predictor.predict(country, days, kind, use_enhanced)
    }

    pub fn models(&self, country: &str) -> Result<ModelsResponse, ServiceError> {
        let models = self.registry.available_kinds(country);
        if models.is_empty() {
            return Err(ServiceError::model_not_found(
                format!("No models registered for '{country}'."),
                vec![ErrorDetail::new(format!("Country: {country}"), "model_not_found").at(&["path", "country"])],
            ));
        }
        Ok(ModelsResponse {
            country: country.to_string(),
            has_enhanced_model: self.registry.is_enhanced_capable(country),
            models,
        })
    }

    pub fn metrics(&self, country: &str, kind: Option<&str>) -> Result<BTreeMap<String, ModelMetadata>, ServiceError> {
        self.registry.get_model_metrics(country, kind)
    }

    fn page_limit(&self, requested: Option<usize>) -> Result<usize, ServiceError> {
        let limit = requested.unwrap_or(self.settings.default_page_size);
        if limit == 0 || limit > self.settings.max_page_size {
            return Err(ServiceError::data_validation(
                format!("limit must be between 1 and {}.", self.settings.max_page_size),
                vec![ErrorDetail::new("Out of range", "value_error").at(&["query", "limit"])],
            ));
        }
        Ok(limit)
    }
}
