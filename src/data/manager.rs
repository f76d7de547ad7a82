//! Priority-ordered data resolution.
//!
//! Sources are tried from highest to lowest priority; the first successful load
//! wins and nothing is merged across sources.

use std::collections::BTreeSet;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::config::{FallbackStrategy, Settings};
use crate::data::source::DataSource;
use crate::domain::{CaseTable, DEFAULT_METRICS, DataContext, DataQuality};
use crate::error::{ErrorDetail, ServiceError};

/// Why one source did not produce data.
#[derive(Debug, Clone)]
pub struct SourceFailure {
    pub source: &'static str,
    pub reason: String,
}

#[derive(Debug)]
pub struct DataResolutionManager {
    sources: Vec<DataSource>,
}

impl DataResolutionManager {
    pub fn new(mut sources: Vec<DataSource>) -> Self {
        sources.sort_by_key(|s| std::cmp::Reverse(s.priority()));
        Self { sources }
    }

    /// Enhanced and raw file sources, plus the synthetic fallback when enabled.
    pub fn from_settings(settings: &Settings) -> Self {
        let paths = &settings.paths;
        let mut sources = vec![
            DataSource::enhanced(&paths.enhanced_dir, settings.cache_revalidate),
            DataSource::raw(&paths.data_file, settings.cache_revalidate),
        ];
        if settings.fallback == FallbackStrategy::Simulate {
            sources.push(DataSource::synthetic(settings.simulation_seed, &settings.enhanced_countries));
        }
        let manager = Self::new(sources);
        info!(
            sources = ?manager.sources.iter().map(DataSource::name).collect::<Vec<_>>(),
            "data sources registered"
        );
        manager
    }

    pub fn sources(&self) -> &[DataSource] {
        &self.sources
    }

    pub fn get_data(&self, ctx: &DataContext) -> Result<CaseTable, ServiceError> {
        let mut failures: Vec<SourceFailure> = Vec::new();

        for source in &self.sources {
            if !source.can_handle(ctx) {
                debug!(source = source.name(), %ctx, "source cannot handle context");
                continue;
            }
            match source.load(ctx) {
                Ok(table) => {
                    debug!(source = source.name(), rows = table.len(), "data resolved");
                    return Ok(table);
                }
                Err(e) => {
                    warn!(source = source.name(), error = %e, "source failed, trying next");
                    failures.push(SourceFailure {
                        source: source.name(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        let details = failures
            .iter()
            .map(|f| ErrorDetail::new(format!("{}: {}", f.source, f.reason), "source_failure").at(&["source", f.source]))
            .collect();
        Err(ServiceError::data_not_found(
            format!("No data source could satisfy {ctx} ({} attempted).", failures.len()),
            details,
        ))
    }

    /// One country's series restricted to `metrics` (the four core metrics when empty).
    pub fn get_historical(
        &self,
        country: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        metrics: &[String],
    ) -> Result<CaseTable, ServiceError> {
        let builder = DataContext::builder().country(country).date_range(start, end);
        let ctx = if metrics.is_empty() {
            builder.metrics(DEFAULT_METRICS)
        } else {
            builder.metrics(metrics.iter().cloned())
        }
        .build();
        self.get_data(&ctx)
    }

    /// Several countries, one metric.
    pub fn get_comparison(
        &self,
        countries: &[String],
        metric: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<CaseTable, ServiceError> {
        let ctx = DataContext::builder()
            .countries(countries.iter().cloned())
            .metric(metric)
            .date_range(start, end)
            .require(["country", "date", metric])
            .build();
        self.get_data(&ctx)
    }

    /// Most recent row per country.
    pub fn get_latest(&self, countries: &[String]) -> Result<CaseTable, ServiceError> {
        let ctx = DataContext::builder()
            .countries(countries.iter().cloned())
            .metrics(DEFAULT_METRICS)
            .build();
        Ok(self.get_data(&ctx)?.latest_per_country())
    }

    /// Union of the countries every usable source knows.
    pub fn available_countries(&self) -> BTreeSet<String> {
        let ctx = DataContext::unfiltered();
        let mut out = BTreeSet::new();
        for source in self.sources.iter().filter(|s| s.can_handle(&ctx)) {
            match source.known_countries() {
                Ok(known) => out.extend(known),
                Err(e) => warn!(source = source.name(), error = %e, "failed to list countries"),
            }
        }
        out
    }

    /// Quality of the highest-priority source that knows `country`.
    pub fn quality_for(&self, country: &str) -> Option<DataQuality> {
        let ctx = DataContext::builder().country(country).build();
        self.sources
            .iter()
            .find(|s| s.can_handle(&ctx))
            .map(DataSource::quality)
    }
}
