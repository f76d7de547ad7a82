//! Model discovery, loading and resolution.
//!
//! Discovery scans `models_root/{country}/` once. Artifacts are parsed on first
//! request and kept until explicitly cleared.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracing::{debug, info, warn};

use crate::cache::{self, Cached, FileStamp};
use crate::error::{ErrorDetail, ServiceError};
use crate::io::{ARTIFACT_EXTENSION, COMPARISON_FILE, country_from_stem, read_artifact, read_comparison_csv, read_metadata_json};
use crate::models::alternatives::{DEFAULT_KIND, ENHANCED_KINDS, alternatives};
use crate::models::{Artifact, ModelMetadata};

/// A loaded artifact together with the kind it was found under.
#[derive(Debug, Clone)]
pub struct ResolvedModel {
    pub country: String,
    pub requested: String,
    pub kind: String,
    pub artifact: Arc<Artifact>,
}

impl ResolvedModel {
    pub fn is_substitute(&self) -> bool {
        self.kind != self.requested
    }
}

type LoadedKey = (String, String);

#[derive(Debug)]
pub struct ModelRegistry {
    revalidate: bool,
    configured_enhanced: BTreeSet<String>,
    entries: BTreeMap<String, BTreeMap<String, PathBuf>>,
    metadata: BTreeMap<String, BTreeMap<String, ModelMetadata>>,
    loaded: RwLock<HashMap<LoadedKey, Cached<Artifact>>>,
}

impl ModelRegistry {
    /// Scan `root` for `{country}/{kind}.model` files.
    ///
    /// A missing root yields an empty registry.
    pub fn discover(root: &Path, enhanced_countries: &[String], revalidate: bool) -> Self {
        let mut entries: BTreeMap<String, BTreeMap<String, PathBuf>> = BTreeMap::new();
        let mut metadata = BTreeMap::new();

        match std::fs::read_dir(root) {
            Ok(dirs) => {
                for dir in dirs.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
                    let Some(name) = dir.file_name().and_then(|n| n.to_str()) else {
                        continue;
                    };
                    let country = country_from_stem(name);
                    let kinds = scan_country_dir(&dir);
                    if kinds.is_empty() {
                        continue;
                    }
                    metadata.insert(country.clone(), load_metadata(&dir, kinds.keys()));
                    entries.insert(country, kinds);
                }
            }
            Err(e) => warn!(root = %root.display(), error = %e, "models directory unreadable"),
        }

        let artifacts: usize = entries.values().map(BTreeMap::len).sum();
        info!(
            root = %root.display(),
            countries = entries.len(),
            artifacts,
            "model discovery complete"
        );

        Self {
            revalidate,
            configured_enhanced: enhanced_countries.iter().cloned().collect(),
            entries,
            metadata,
            loaded: RwLock::new(HashMap::new()),
        }
    }

    pub fn available_countries(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn available_kinds(&self, country: &str) -> Vec<String> {
        self.entries
            .get(country)
            .map(|kinds| kinds.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn has_model(&self, country: &str, kind: &str) -> bool {
        self.entries.get(country).is_some_and(|kinds| kinds.contains_key(kind))
    }

    /// Countries with an enhanced-family artifact, plus configured countries that have any artifact.
    pub fn enhanced_countries(&self) -> BTreeSet<String> {
        self.entries
            .iter()
            .filter(|(country, kinds)| {
                ENHANCED_KINDS.iter().any(|k| kinds.contains_key(*k)) || self.configured_enhanced.contains(*country)
            })
            .map(|(country, _)| country.clone())
            .collect()
    }

    pub fn is_enhanced_capable(&self, country: &str) -> bool {
        self.enhanced_countries().contains(country)
    }

    /// Resolve `(country, kind)` to a loaded artifact.
    ///
    /// Order: the requested kind (cached or on disk), then the first
    /// alternative on disk, then `default`.
    pub fn get_model(&self, country: &str, kind: &str) -> Result<ResolvedModel, ServiceError> {
        let chosen = if self.is_loaded(country, kind) || self.has_model(country, kind) {
            kind
        } else if let Some(alt) = alternatives(kind).iter().copied().find(|a| self.has_model(country, a)) {
            info!(country, requested = kind, resolved = alt, "using alternative model kind");
            alt
        } else if self.has_model(country, DEFAULT_KIND) {
            info!(country, requested = kind, "using default model");
            DEFAULT_KIND
        } else {
            return Err(ServiceError::model_not_found(
                format!("No '{kind}' model (or alternative) available for '{country}'."),
                vec![
                    ErrorDetail::new(format!("Country: {country}"), "model_not_found").at(&["path", "country"]),
                    ErrorDetail::new(format!("Requested kind: {kind}"), "model_not_found").at(&["query", "model_type"]),
                ],
            ));
        };

        let artifact = self.load(country, chosen)?;
        Ok(ResolvedModel {
            country: country.to_string(),
            requested: kind.to_string(),
            kind: chosen.to_string(),
            artifact,
        })
    }

    fn is_loaded(&self, country: &str, kind: &str) -> bool {
        cache::read(&self.loaded).contains_key(&(country.to_string(), kind.to_string()))
    }

    fn load(&self, country: &str, kind: &str) -> Result<Arc<Artifact>, ServiceError> {
        let key = (country.to_string(), kind.to_string());
        if let Some(hit) = cache::read(&self.loaded).get(&key).and_then(|c| c.get(self.revalidate)) {
            debug!(country, kind, "artifact cache hit");
            return Ok(hit);
        }

        let path = self
            .entries
            .get(country)
            .and_then(|kinds| kinds.get(kind))
            .ok_or_else(|| {
                ServiceError::model_not_found(
                    format!("Artifact for '{country}/{kind}' is no longer registered."),
                    vec![ErrorDetail::new(format!("{country}/{kind}"), "model_loading_error")],
                )
            })?;
        let cached = Cached::new(read_artifact(path)?, vec![FileStamp::capture(path)]);
        let artifact = cached.value();
        cache::write(&self.loaded).insert(key, cached);
        info!(country, kind, family = artifact.family(), "artifact loaded");
        Ok(artifact)
    }

    /// Metadata for one kind, or every kind of a country.
    pub fn get_model_metrics(
        &self,
        country: &str,
        kind: Option<&str>,
    ) -> Result<BTreeMap<String, ModelMetadata>, ServiceError> {
        let Some(kinds) = self.entries.get(country) else {
            return Err(ServiceError::model_not_found(
                format!("No models registered for '{country}'."),
                vec![ErrorDetail::new(format!("Country: {country}"), "model_not_found").at(&["path", "country"])],
            ));
        };
        let meta = self.metadata.get(country);
        let lookup = |k: &str| meta.and_then(|m| m.get(k)).cloned().unwrap_or_default();

        match kind {
            Some(k) if kinds.contains_key(k) => Ok(BTreeMap::from([(k.to_string(), lookup(k))])),
            Some(k) => Err(ServiceError::model_not_found(
                format!("No '{k}' model registered for '{country}'."),
                vec![ErrorDetail::new(format!("Requested kind: {k}"), "model_not_found").at(&["query", "model_type"])],
            )),
            None => Ok(kinds.keys().map(|k| (k.clone(), lookup(k))).collect()),
        }
    }

    /// Metrics of one kind; empty when unknown.
    pub fn metrics_for(&self, country: &str, kind: &str) -> BTreeMap<String, f64> {
        self.metadata
            .get(country)
            .and_then(|m| m.get(kind))
            .map(|m| m.metrics.clone())
            .unwrap_or_default()
    }

    /// Drop loaded artifacts matching the filters; returns how many were dropped.
    pub fn clear_cache(&self, country: Option<&str>, kind: Option<&str>) -> usize {
        let mut loaded = cache::write(&self.loaded);
        let before = loaded.len();
        loaded.retain(|(c, k), _| {
            let matches = country.is_none_or(|want| want == c.as_str()) && kind.is_none_or(|want| want == k.as_str());
            !matches
        });
        let cleared = before - loaded.len();
        info!(?country, ?kind, cleared, "model cache cleared");
        cleared
    }
}

fn scan_country_dir(dir: &Path) -> BTreeMap<String, PathBuf> {
    let Ok(entries) = std::fs::read_dir(dir) else {
        warn!(dir = %dir.display(), "model directory unreadable");
        return BTreeMap::new();
    };
    entries
        .flatten()
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().and_then(|e| e.to_str()) == Some(ARTIFACT_EXTENSION))
        .filter_map(|p| {
            let kind = p.file_stem()?.to_str()?.to_string();
            Some((kind, p))
        })
        .collect()
}

/// `{kind}.json` first, then the comparison table, then empty.
fn load_metadata<'a>(dir: &Path, kinds: impl Iterator<Item = &'a String>) -> BTreeMap<String, ModelMetadata> {
    let comparison_path = dir.join(COMPARISON_FILE);
    let comparison = if comparison_path.is_file() {
        read_comparison_csv(&comparison_path).unwrap_or_else(|e| {
            warn!(path = %comparison_path.display(), error = %e, "ignoring unreadable comparison table");
            BTreeMap::new()
        })
    } else {
        BTreeMap::new()
    };

    kinds
        .map(|kind| {
            let json = dir.join(format!("{kind}.json"));
            let from_json = if json.is_file() {
                match read_metadata_json(&json) {
                    Ok(meta) => Some(meta),
                    Err(e) => {
                        warn!(path = %json.display(), error = %e, "ignoring unreadable metadata");
                        None
                    }
                }
            } else {
                None
            };
            let meta = from_json.unwrap_or_else(|| ModelMetadata {
                created_at: None,
                metrics: comparison.get(kind).cloned().unwrap_or_default(),
            });
            (kind.clone(), meta)
        })
        .collect()
}
