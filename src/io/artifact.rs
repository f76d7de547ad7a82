//! Read/write model artifact and metadata files.
//!
//! Layout under the models root:
//!
//! - `{country}/{kind}.model`: artifact JSON (see `models::Artifact`)
//! - `{country}/{kind}.json`: optional metadata (`created_at`, `metrics`)
//! - `{country}/models_comparison.csv`: optional shared metrics table

use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

use crate::error::{ErrorDetail, ServiceError};
use crate::io::ingest::normalize_header_name;
use crate::models::{Artifact, ModelMetadata};

pub const ARTIFACT_EXTENSION: &str = "model";
pub const COMPARISON_FILE: &str = "models_comparison.csv";

/// Read and validate an artifact.
pub fn read_artifact(path: &Path) -> Result<Artifact, ServiceError> {
    let file = File::open(path).map_err(|e| loading_error(path, format!("Failed to open artifact: {e}")))?;
    let artifact: Artifact =
        serde_json::from_reader(file).map_err(|e| loading_error(path, format!("Invalid artifact JSON: {e}")))?;
    artifact
        .validate()
        .map_err(|e| loading_error(path, format!("Invalid {} artifact: {e}", artifact.family())))?;
    Ok(artifact)
}

/// Write an artifact as pretty JSON.
pub fn write_artifact(path: &Path, artifact: &Artifact) -> Result<(), ServiceError> {
    let file = File::create(path).map_err(|e| loading_error(path, format!("Failed to create artifact: {e}")))?;
    serde_json::to_writer_pretty(file, artifact)
        .map_err(|e| loading_error(path, format!("Failed to write artifact JSON: {e}")))?;
    Ok(())
}

pub fn read_metadata_json(path: &Path) -> Result<ModelMetadata, ServiceError> {
    let file = File::open(path).map_err(|e| loading_error(path, format!("Failed to open metadata: {e}")))?;
    serde_json::from_reader(file).map_err(|e| loading_error(path, format!("Invalid metadata JSON: {e}")))
}

/// Per-kind metrics from a comparison table.
///
/// The model name comes from a `model` column (or the first column) and is
/// normalized to a kind (`Random Forest` -> `random_forest`); every other
/// numeric cell becomes a metric.
pub fn read_comparison_csv(path: &Path) -> Result<BTreeMap<String, BTreeMap<String, f64>>, ServiceError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_path(path)
        .map_err(|e| loading_error(path, format!("Failed to open comparison CSV: {e}")))?;
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| loading_error(path, format!("Failed to read comparison headers: {e}")))?
        .iter()
        .map(normalize_header_name)
        .collect();
    let name_idx = headers.iter().position(|h| h == "model").unwrap_or(0);

    let mut out = BTreeMap::new();
    for record in reader.records().flatten() {
        let Some(name) = record.get(name_idx).filter(|s| !s.is_empty()) else {
            continue;
        };
        let metrics = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != name_idx)
            .filter_map(|(i, h)| {
                let v = record.get(i)?.parse::<f64>().ok()?;
                v.is_finite().then(|| (h.clone(), v))
            })
            .collect();
        out.insert(normalize_header_name(name), metrics);
    }
    Ok(out)
}

fn loading_error(path: &Path, message: String) -> ServiceError {
    ServiceError::model_not_found(
        message,
        vec![ErrorDetail::new(path.display().to_string(), "model_loading_error")],
    )
}
