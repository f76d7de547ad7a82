//! Environment-driven settings and storage path resolution.
//!
//! Settings come from process env (after loading an optional `.env` file).
//! Parsing goes through an injectable lookup so tests never mutate the real
//! environment.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::ServiceError;

pub const RAW_DATA_FILE: &str = "data_to_train_covid19.csv";
pub const ENHANCED_COMBINED_FILE: &str = "data_to_train_covid19_enhanced.csv";

const DEFAULT_ENHANCED_COUNTRIES: [&str; 8] = [
    "France",
    "US",
    "Brazil",
    "Germany",
    "Italy",
    "Spain",
    "United Kingdom",
    "China",
];

/// What to do when no real data source knows a country.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackStrategy {
    /// Register the synthetic data source as the lowest-priority fallback.
    Simulate,
    /// Real data only.
    None,
}

impl FallbackStrategy {
    fn parse(raw: &str) -> Result<Self, ServiceError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simulate" => Ok(FallbackStrategy::Simulate),
            "none" | "off" => Ok(FallbackStrategy::None),
            other => Err(ServiceError::configuration(format!(
                "Unknown EPICAST_FALLBACK_STRATEGY '{other}'. Expected `simulate` or `none`."
            ))),
        }
    }
}

/// Resolved storage locations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub base_dir: PathBuf,
    /// Primary raw CSV.
    pub data_file: PathBuf,
    /// Directory holding `{country}_enhanced.csv` files and the combined file.
    pub enhanced_dir: PathBuf,
    /// Root of `{country}/{kind}.model` artifacts.
    pub models_dir: PathBuf,
    /// Locations where no candidate existed, as `(label, kept path)`.
    pub unresolved: Vec<(String, PathBuf)>,
}

impl Paths {
    /// Resolve each location from explicit overrides or the first existing candidate.
    pub fn resolve(
        base_dir: &Path,
        data_file: Option<PathBuf>,
        enhanced_dir: Option<PathBuf>,
        models_dir: Option<PathBuf>,
    ) -> Result<Paths, ServiceError> {
        if !base_dir.is_dir() {
            return Err(ServiceError::configuration(format!(
                "Base directory '{}' does not exist.",
                base_dir.display()
            )));
        }

        let mut unresolved = Vec::new();
        let data_file = match data_file {
            Some(path) => require_existing(path, "EPICAST_DATA_FILE")?,
            None => first_existing(
                "raw data file",
                vec![base_dir.join("data").join(RAW_DATA_FILE), base_dir.join(RAW_DATA_FILE)],
                &mut unresolved,
            ),
        };
        let enhanced_dir = match enhanced_dir {
            Some(path) => require_existing(path, "EPICAST_ENHANCED_DIR")?,
            None => first_existing(
                "enhanced data directory",
                vec![base_dir.join("enhanced_data")],
                &mut unresolved,
            ),
        };
        let models_dir = match models_dir {
            Some(path) => require_existing(path, "EPICAST_MODELS_DIR")?,
            None => first_existing(
                "models directory",
                vec![
                    base_dir.join("models"),
                    base_dir.join("trained_models"),
                    base_dir.join("api").join("models"),
                ],
                &mut unresolved,
            ),
        };

        Ok(Paths {
            base_dir: base_dir.to_path_buf(),
            data_file,
            enhanced_dir,
            models_dir,
            unresolved,
        })
    }
}

fn require_existing(path: PathBuf, var: &str) -> Result<PathBuf, ServiceError> {
    if path.exists() {
        Ok(path)
    } else {
        Err(ServiceError::configuration(format!(
            "{var} points to '{}', which does not exist.",
            path.display()
        )))
    }
}

/// First existing candidate, else the preferred one recorded in `unresolved`.
///
/// The owning source reports itself unavailable for a location that is missing.
fn first_existing(label: &str, candidates: Vec<PathBuf>, unresolved: &mut Vec<(String, PathBuf)>) -> PathBuf {
    if let Some(found) = candidates.iter().find(|p| p.exists()) {
        return found.clone();
    }
    let fallback = candidates.into_iter().next().unwrap_or_default();
    unresolved.push((label.to_string(), fallback.clone()));
    fallback
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub environment: String,
    pub debug: bool,
    pub log_level: String,
    pub paths: Paths,
    pub default_model: String,
    pub fallback: FallbackStrategy,
    pub simulation_seed: u64,
    pub enhanced_countries: Vec<String>,
    /// Reload cached tables/artifacts whose backing file changed on disk.
    pub cache_revalidate: bool,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Settings {
    /// Load `.env` (if any) and read settings from the process environment.
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_env_with_base(None)
    }

    /// Like [`Settings::from_env`], with `base_dir` taking precedence over `EPICAST_BASE_DIR`.
    pub fn from_env_with_base(base_dir: Option<&Path>) -> Result<Self, ServiceError> {
        dotenvy::dotenv().ok();
        let base = base_dir.map(|p| p.display().to_string());
        Self::from_lookup(|key| match (key, &base) {
            ("EPICAST_BASE_DIR", Some(b)) => Some(b.clone()),
            _ => std::env::var(key).ok(),
        })
    }

    /// Read settings through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_dir = PathBuf::from(get("EPICAST_BASE_DIR").unwrap_or_else(|| ".".to_string()));
        let paths = Paths::resolve(
            &base_dir,
            get("EPICAST_DATA_FILE").map(PathBuf::from),
            get("EPICAST_ENHANCED_DIR").map(PathBuf::from),
            get("EPICAST_MODELS_DIR").map(PathBuf::from),
        )?;

        let fallback = match get("EPICAST_FALLBACK_STRATEGY") {
            Some(raw) => FallbackStrategy::parse(&raw)?,
            None => FallbackStrategy::Simulate,
        };

        let enhanced_countries = match get("EPICAST_ENHANCED_COUNTRIES") {
            Some(raw) => split_list(&raw),
            None => DEFAULT_ENHANCED_COUNTRIES.iter().map(|c| c.to_string()).collect(),
        };

        let default_page_size = parse_or("DEFAULT_PAGE_SIZE", get("DEFAULT_PAGE_SIZE"), 100usize)?;
        let max_page_size = parse_or("MAX_PAGE_SIZE", get("MAX_PAGE_SIZE"), 1000usize)?;
        if default_page_size == 0 || default_page_size > max_page_size {
            return Err(ServiceError::configuration(
                "DEFAULT_PAGE_SIZE must be > 0 and <= MAX_PAGE_SIZE.",
            ));
        }

        let settings = Settings {
            environment: get("ENVIRONMENT").unwrap_or_else(|| "development".to_string()),
            debug: parse_bool("DEBUG", get("DEBUG"), false)?,
            log_level: get("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            paths,
            default_model: get("EPICAST_DEFAULT_MODEL").unwrap_or_else(|| "xgboost".to_string()),
            fallback,
            simulation_seed: parse_or("EPICAST_SIMULATION_SEED", get("EPICAST_SIMULATION_SEED"), 42u64)?,
            enhanced_countries,
            cache_revalidate: parse_bool("EPICAST_CACHE_REVALIDATE", get("EPICAST_CACHE_REVALIDATE"), false)?,
            default_page_size,
            max_page_size,
        };

        Ok(settings)
    }

    /// Settings rooted at `base_dir` with every other value at its default.
    pub fn for_base_dir(base_dir: &Path) -> Result<Self, ServiceError> {
        let base = base_dir.display().to_string();
        Self::from_lookup(|key| (key == "EPICAST_BASE_DIR").then(|| base.clone()))
    }

    pub fn log_summary(&self) {
        info!(
            target: "epicast::config",
            environment = %self.environment,
            data_file = %self.paths.data_file.display(),
            enhanced_dir = %self.paths.enhanced_dir.display(),
            models_dir = %self.paths.models_dir.display(),
            fallback = ?self.fallback,
            debug = self.debug,
            "settings loaded"
        );
        for (label, path) in &self.paths.unresolved {
            warn!(target: "epicast::config", "no {label} found, expected at {}", path.display());
        }
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T, ServiceError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .parse::<T>()
            .map_err(|_| ServiceError::configuration(format!("Invalid value for {key}: '{v}'."))),
    }
}

fn parse_bool(key: &str, raw: Option<String>, default: bool) -> Result<bool, ServiceError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(ServiceError::configuration(format!(
            "Invalid boolean for {key}: '{other}'."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, String)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn missing_base_dir_is_configuration_error() {
        let err = Settings::from_lookup(lookup_from(&[(
            "EPICAST_BASE_DIR",
            "/definitely/not/here".to_string(),
        )]))
        .unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[test]
    fn candidates_prefer_first_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("trained_models")).unwrap();
        std::fs::write(dir.path().join(RAW_DATA_FILE), "country,date\n").unwrap();

        let settings = Settings::for_base_dir(dir.path()).unwrap();
        assert_eq!(settings.paths.models_dir, dir.path().join("trained_models"));
        assert_eq!(settings.paths.data_file, dir.path().join(RAW_DATA_FILE));
        // Nothing exists for enhanced data: the preferred location is kept and reported.
        assert_eq!(settings.paths.enhanced_dir, dir.path().join("enhanced_data"));
        assert_eq!(
            settings.paths.unresolved,
            vec![("enhanced data directory".to_string(), dir.path().join("enhanced_data"))]
        );
    }

    #[test]
    fn defaults_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().display().to_string();

        let settings = Settings::for_base_dir(dir.path()).unwrap();
        assert_eq!(settings.default_model, "xgboost");
        assert_eq!(settings.fallback, FallbackStrategy::Simulate);
        assert_eq!(settings.enhanced_countries.len(), 8);
        assert!(!settings.cache_revalidate);

        let settings = Settings::from_lookup(lookup_from(&[
            ("EPICAST_BASE_DIR", base.clone()),
            ("EPICAST_FALLBACK_STRATEGY", "none".to_string()),
            ("EPICAST_ENHANCED_COUNTRIES", "France, Cuba".to_string()),
            ("EPICAST_CACHE_REVALIDATE", "true".to_string()),
        ]))
        .unwrap();
        assert_eq!(settings.fallback, FallbackStrategy::None);
        assert_eq!(settings.enhanced_countries, vec!["France", "Cuba"]);
        assert!(settings.cache_revalidate);

        let err = Settings::from_lookup(lookup_from(&[
            ("EPICAST_BASE_DIR", base),
            ("DEBUG", "maybe".to_string()),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("DEBUG"));
    }

    #[test]
    fn explicit_override_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let err = Settings::from_lookup(lookup_from(&[
            ("EPICAST_BASE_DIR", dir.path().display().to_string()),
            ("EPICAST_MODELS_DIR", dir.path().join("nope").display().to_string()),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("EPICAST_MODELS_DIR"));
    }
}
