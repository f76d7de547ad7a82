//! Data source variants.
//!
//! The set of sources is closed: curated per-country files (`Enhanced`), the
//! primary ingest file (`Raw`) and generated series (`Synthetic`). Each owns a
//! priority and a per-country table cache that lives as long as the source.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::cache::{self, Cached, FileStamp};
use crate::config::ENHANCED_COMBINED_FILE;
use crate::data::derive::build_table;
use crate::data::sample::{SYNTHETIC_COUNTRIES, generate_country};
use crate::domain::{CaseRecord, CaseTable, DataContext, DataQuality};
use crate::error::{ErrorDetail, ServiceError};
use crate::io::{country_from_stem, read_case_csv, read_country_column, stem_from_country};

pub const ENHANCED_PRIORITY: i32 = 100;
pub const RAW_PRIORITY: i32 = 80;
pub const SYNTHETIC_PRIORITY: i32 = 10;

const ENHANCED_SUFFIX: &str = "_enhanced.csv";

#[derive(Debug)]
pub enum DataSource {
    Enhanced(FileSource),
    Raw(FileSource),
    Synthetic(SyntheticSource),
}

impl DataSource {
    pub fn enhanced(dir: &Path, revalidate: bool) -> Self {
        DataSource::Enhanced(FileSource::new(
            FileLayout::PerCountry { dir: dir.to_path_buf() },
            revalidate,
        ))
    }

    pub fn raw(data_file: &Path, revalidate: bool) -> Self {
        DataSource::Raw(FileSource::new(
            FileLayout::Single {
                path: data_file.to_path_buf(),
            },
            revalidate,
        ))
    }

    pub fn synthetic(seed: u64, enhanced_countries: &[String]) -> Self {
        DataSource::Synthetic(SyntheticSource::new(seed, enhanced_countries))
    }

    pub fn name(&self) -> &'static str {
        match self {
            DataSource::Enhanced(_) => "enhanced",
            DataSource::Raw(_) => "raw",
            DataSource::Synthetic(_) => "synthetic",
        }
    }

    /// Higher wins.
    pub fn priority(&self) -> i32 {
        match self {
            DataSource::Enhanced(_) => ENHANCED_PRIORITY,
            DataSource::Raw(_) => RAW_PRIORITY,
            DataSource::Synthetic(_) => SYNTHETIC_PRIORITY,
        }
    }

    pub fn quality(&self) -> DataQuality {
        match self {
            DataSource::Enhanced(_) => DataQuality::Enhanced,
            DataSource::Raw(_) => DataQuality::Standard,
            DataSource::Synthetic(_) => DataQuality::Simulated,
        }
    }

    /// Countries this source can currently serve.
    pub fn known_countries(&self) -> Result<BTreeSet<String>, ServiceError> {
        match self {
            DataSource::Enhanced(s) | DataSource::Raw(s) => s.known_countries(),
            DataSource::Synthetic(s) => Ok(s.countries.clone()),
        }
    }

    /// False when storage is absent, nothing is known, or every requested
    /// country is unknown.
    pub fn can_handle(&self, ctx: &DataContext) -> bool {
        if let DataSource::Enhanced(s) | DataSource::Raw(s) = self {
            if !s.storage_exists() {
                debug!(source = self.name(), "storage absent");
                return false;
            }
        }
        let known = match self.known_countries() {
            Ok(k) => k,
            Err(e) => {
                warn!(source = self.name(), error = %e, "failed to list countries");
                return false;
            }
        };
        if known.is_empty() {
            return false;
        }
        ctx.countries().is_empty() || ctx.countries().iter().any(|c| known.contains(c))
    }

    pub fn load(&self, ctx: &DataContext) -> Result<CaseTable, ServiceError> {
        let known = self.known_countries()?;
        let wanted: Vec<&String> = if ctx.countries().is_empty() {
            known.iter().collect()
        } else {
            ctx.countries().iter().filter(|c| known.contains(*c)).collect()
        };

        let mut tables = Vec::with_capacity(wanted.len());
        for country in wanted {
            let table = match self {
                DataSource::Enhanced(s) | DataSource::Raw(s) => s.country_table(country)?,
                DataSource::Synthetic(s) => s.country_table(country)?,
            };
            tables.push(CaseTable::clone(&table));
        }
        let table = CaseTable::concat(tables);

        validate(self.name(), &table, ctx)?;
        Ok(table.apply_context(ctx))
    }
}

/// Required columns present and at least one row for the requested countries.
fn validate(source: &str, table: &CaseTable, ctx: &DataContext) -> Result<(), ServiceError> {
    let missing: Vec<&String> = ctx
        .required_columns()
        .iter()
        .chain(ctx.metrics())
        .filter(|c| !table.has_column(c))
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::data_validation(
            format!("Source '{source}' lacks required columns."),
            missing
                .iter()
                .map(|c| ErrorDetail::new(format!("Missing column: {c}"), "missing_column").at(&["query", c.as_str()]))
                .collect(),
        ));
    }
    if table.is_empty() {
        return Err(ServiceError::data_not_found(
            format!("Source '{source}' has no rows for {ctx}."),
            Vec::new(),
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub enum FileLayout {
    /// One CSV holding every country.
    Single { path: PathBuf },
    /// `{Country}_enhanced.csv` per country plus an optional combined file.
    PerCountry { dir: PathBuf },
}

#[derive(Debug)]
pub struct FileSource {
    layout: FileLayout,
    revalidate: bool,
    tables: RwLock<HashMap<String, Cached<CaseTable>>>,
    known: RwLock<Option<Cached<BTreeSet<String>>>>,
}

impl FileSource {
    pub fn new(layout: FileLayout, revalidate: bool) -> Self {
        Self {
            layout,
            revalidate,
            tables: RwLock::new(HashMap::new()),
            known: RwLock::new(None),
        }
    }

    fn storage_exists(&self) -> bool {
        match &self.layout {
            FileLayout::Single { path } => path.is_file(),
            FileLayout::PerCountry { dir } => dir.is_dir(),
        }
    }

    fn known_countries(&self) -> Result<BTreeSet<String>, ServiceError> {
        if let Some(hit) = cache::read(&self.known).as_ref().and_then(|c| c.get(self.revalidate)) {
            return Ok(BTreeSet::clone(&hit));
        }
        if !self.storage_exists() {
            return Ok(BTreeSet::new());
        }

        let (countries, stamps) = match &self.layout {
            FileLayout::Single { path } => (read_country_column(path)?, vec![FileStamp::capture(path)]),
            FileLayout::PerCountry { dir } => {
                let mut countries = per_country_files(dir)?;
                let mut stamps = vec![FileStamp::capture(dir)];
                let combined = dir.join(ENHANCED_COMBINED_FILE);
                if combined.is_file() {
                    countries.extend(read_country_column(&combined)?);
                    stamps.push(FileStamp::capture(&combined));
                }
                (countries, stamps)
            }
        };

        *cache::write(&self.known) = Some(Cached::new(countries.clone(), stamps));
        Ok(countries)
    }

    fn country_table(&self, country: &str) -> Result<Arc<CaseTable>, ServiceError> {
        if let Some(hit) = cache::read(&self.tables).get(country).and_then(|c| c.get(self.revalidate)) {
            debug!(country, "table cache hit");
            return Ok(hit);
        }

        match &self.layout {
            FileLayout::Single { path } => {
                // One read fills the cache for every country in the file.
                let table = build_table(read_case_csv(path, None)?)?;
                let columns = table.columns().clone();
                let mut by_country: HashMap<String, Vec<CaseRecord>> = HashMap::new();
                for row in table.into_rows() {
                    by_country.entry(row.country.clone()).or_default().push(row);
                }

                let stamp = FileStamp::capture(path);
                let mut tables = cache::write(&self.tables);
                for (name, rows) in by_country {
                    let single = CaseTable::new(columns.clone(), rows);
                    tables.insert(name, Cached::new(single, vec![stamp.clone()]));
                }
                info!(path = %path.display(), countries = tables.len(), "loaded raw data");
                tables
                    .get(country)
                    .map(|c| c.value())
                    .ok_or_else(|| country_missing(country, path))
            }
            FileLayout::PerCountry { dir } => {
                let own = dir.join(format!("{}{ENHANCED_SUFFIX}", stem_from_country(country)));
                // Only a country's own file may omit the country column.
                let (path, default_country) = if own.is_file() {
                    (own, Some(country))
                } else {
                    (dir.join(ENHANCED_COMBINED_FILE), None)
                };
                let table = build_table(read_case_csv(&path, default_country)?)?
                    .retain_countries(&BTreeSet::from([country.to_string()]));
                if table.is_empty() {
                    return Err(country_missing(country, &path));
                }
                info!(country, path = %path.display(), rows = table.len(), "loaded enhanced data");
                let cached = Cached::new(table, vec![FileStamp::capture(&path)]);
                let value = cached.value();
                cache::write(&self.tables).insert(country.to_string(), cached);
                Ok(value)
            }
        }
    }
}

/// Countries with their own `*_enhanced.csv` in a directory.
fn per_country_files(dir: &Path) -> Result<BTreeSet<String>, ServiceError> {
    let entries = std::fs::read_dir(dir).map_err(|e| {
        ServiceError::data_not_found(
            format!("Failed to list '{}': {e}", dir.display()),
            vec![ErrorDetail::new(dir.display().to_string(), "directory_unreadable")],
        )
    })?;

    let mut out = BTreeSet::new();
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if name == ENHANCED_COMBINED_FILE {
            continue;
        }
        if let Some(stem) = name.strip_suffix(ENHANCED_SUFFIX) {
            out.insert(country_from_stem(stem));
        }
    }
    Ok(out)
}

fn country_missing(country: &str, path: &Path) -> ServiceError {
    ServiceError::data_not_found(
        format!("No rows for '{country}' in '{}'.", path.display()),
        vec![ErrorDetail::new(format!("Unknown country: {country}"), "country_not_found").at(&["path", "country"])],
    )
}

/// Generated series for a fixed list of countries.
#[derive(Debug)]
pub struct SyntheticSource {
    seed: u64,
    countries: BTreeSet<String>,
    enhanced: BTreeSet<String>,
    tables: RwLock<HashMap<String, Arc<CaseTable>>>,
}

impl SyntheticSource {
    pub fn new(seed: u64, enhanced_countries: &[String]) -> Self {
        Self {
            seed,
            countries: SYNTHETIC_COUNTRIES.iter().map(|c| c.to_string()).collect(),
            enhanced: enhanced_countries.iter().cloned().collect(),
            tables: RwLock::new(HashMap::new()),
        }
    }

    fn country_table(&self, country: &str) -> Result<Arc<CaseTable>, ServiceError> {
        warn!(country, "serving simulated data");
        if let Some(hit) = cache::read(&self.tables).get(country) {
            return Ok(Arc::clone(hit));
        }
        let table = Arc::new(generate_country(country, self.enhanced.contains(country), self.seed)?);
        cache::write(&self.tables).insert(country.to_string(), Arc::clone(&table));
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, body: &str) {
        std::fs::write(path, body).unwrap();
    }

    #[test]
    fn raw_source_handles_known_countries_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        write(&path, "country,date,total_cases\nFrance,2020-01-01,1\nFrance,2020-01-02,3\nUS,2020-01-01,5\n");
        let source = DataSource::raw(&path, false);

        assert!(source.can_handle(&DataContext::unfiltered()));
        assert!(source.can_handle(&DataContext::builder().countries(["Atlantis", "US"]).build()));
        assert!(!source.can_handle(&DataContext::builder().country("Atlantis").build()));

        let table = source.load(&DataContext::builder().country("France").build()).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[1].new_cases, 2.0);
        assert_eq!(table.rows()[1].total_deaths, 0.0);
    }

    #[test]
    fn absent_storage_is_not_handled() {
        let dir = tempfile::tempdir().unwrap();
        let raw = DataSource::raw(&dir.path().join("missing.csv"), false);
        let enhanced = DataSource::enhanced(&dir.path().join("missing"), false);
        assert!(!raw.can_handle(&DataContext::unfiltered()));
        assert!(!enhanced.can_handle(&DataContext::unfiltered()));
    }

    #[test]
    fn enhanced_prefers_own_file_then_combined() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join("United_Kingdom_enhanced.csv"),
            "date,new_cases\n2020-01-01,4\n2020-01-02,6\n",
        );
        write(
            &dir.path().join(ENHANCED_COMBINED_FILE),
            "country,date,new_cases\nItaly,2020-01-01,7\nUnited Kingdom,2020-01-01,999\n",
        );
        let source = DataSource::enhanced(dir.path(), false);
        let known = source.known_countries().unwrap();
        assert!(known.contains("United Kingdom") && known.contains("Italy"));

        let uk = source.load(&DataContext::builder().country("United Kingdom").build()).unwrap();
        assert_eq!(uk.rows()[1].total_cases, 10.0);

        let italy = source.load(&DataContext::builder().country("Italy").build()).unwrap();
        assert_eq!(italy.len(), 1);
        assert_eq!(italy.rows()[0].country, "Italy");
    }

    #[test]
    fn combined_file_skips_rows_without_country() {
        let dir = tempfile::tempdir().unwrap();
        write(
            &dir.path().join(ENHANCED_COMBINED_FILE),
            "country,date,new_cases\nItaly,2020-01-01,7\nSpain,2020-01-01,3\n,2020-01-02,99999\n",
        );
        let source = DataSource::enhanced(dir.path(), false);

        for (country, cases) in [("Italy", 7.0), ("Spain", 3.0)] {
            let table = source.load(&DataContext::builder().country(country).build()).unwrap();
            assert_eq!(table.len(), 1, "{country}");
            assert_eq!(table.rows()[0].new_cases, cases);
        }
    }

    #[test]
    fn missing_required_metric_is_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        write(&path, "country,date,total_cases\nFrance,2020-01-01,1\n");
        let source = DataSource::raw(&path, false);
        let ctx = DataContext::builder().country("France").metric("hosp_patients").build();
        let err = source.load(&ctx).unwrap_err();
        assert_eq!(err.status_code(), 422);
    }

    #[test]
    fn revalidation_reloads_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.csv");
        write(&path, "country,date,total_cases\nFrance,2020-01-01,1\n");
        let ctx = DataContext::builder().country("France").build();

        let stale = DataSource::raw(&path, false);
        let fresh = DataSource::raw(&path, true);
        assert_eq!(stale.load(&ctx).unwrap().len(), 1);
        assert_eq!(fresh.load(&ctx).unwrap().len(), 1);

        std::fs::remove_file(&path).unwrap();
        write(&path, "country,date,total_cases\nFrance,2020-01-01,1\nFrance,2020-01-02,2\n");
        // Stamps compare modification times; force a visible change.
        let later = std::time::SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(&path)
            .unwrap()
            .set_modified(later)
            .unwrap();

        assert_eq!(stale.load(&ctx).unwrap().len(), 1);
        assert_eq!(fresh.load(&ctx).unwrap().len(), 2);
    }

    #[test]
    fn synthetic_source_is_lowest_priority_and_simulated() {
        let source = DataSource::synthetic(42, &["France".to_string()]);
        assert_eq!(source.priority(), SYNTHETIC_PRIORITY);
        assert_eq!(source.quality(), DataQuality::Simulated);
        assert!(source.can_handle(&DataContext::builder().country("India").build()));
        let table = source.load(&DataContext::builder().country("India").build()).unwrap();
        assert_eq!(table.countries().len(), 1);
    }
}
