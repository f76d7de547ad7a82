//! Trained model artifacts.
//!
//! An artifact is a JSON document tagged by `type`. Four families exist:
//!
//! - `linear`: intercept + named coefficients
//! - `tree_ensemble`: flat node arrays, summed or averaged
//! - `recurrent`: a small Elman cell run over a normalized window (sequence model)
//! - `smoothing`: damped Holt trend with native multi-step output
//!
//! All families answer a scalar one-day prediction from a [`FeatureRow`]; the
//! recurrent and smoothing families additionally answer multi-step requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::forecast::features::FeatureRow;

/// Width of one recurrent input step: new_cases, total_cases, 7-day average, growth.
pub const SEQUENCE_FEATURES: usize = 4;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModelError {
    #[error("missing feature `{0}`")]
    MissingFeature(String),
    #[error("{0} models do not support this call")]
    Unsupported(&'static str),
    #[error("malformed artifact: {0}")]
    Malformed(String),
    #[error("model produced a non-finite value")]
    NonFinite,
    #[error("expected {expected} values, got {got}")]
    ShapeMismatch { expected: usize, got: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Artifact {
    Linear(LinearModel),
    TreeEnsemble(TreeEnsemble),
    Recurrent(RecurrentModel),
    Smoothing(SmoothingModel),
}

impl Artifact {
    pub fn family(&self) -> &'static str {
        match self {
            Artifact::Linear(_) => "linear",
            Artifact::TreeEnsemble(_) => "tree_ensemble",
            Artifact::Recurrent(_) => "recurrent",
            Artifact::Smoothing(_) => "smoothing",
        }
    }

    /// Produces a whole horizon from the raw history.
    pub fn is_multi_step(&self) -> bool {
        matches!(self, Artifact::Smoothing(_))
    }

    /// Consumes a normalized window of [`SEQUENCE_FEATURES`]-wide steps.
    pub fn is_sequence(&self) -> bool {
        matches!(self, Artifact::Recurrent(_))
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        match self {
            Artifact::Linear(m) => m.validate(),
            Artifact::TreeEnsemble(m) => m.validate(),
            Artifact::Recurrent(m) => m.validate(),
            Artifact::Smoothing(m) => m.validate(),
        }
    }

    /// One-day prediction of new cases.
    pub fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        let v = match self {
            Artifact::Linear(m) => m.predict(row)?,
            Artifact::TreeEnsemble(m) => m.predict(row)?,
            Artifact::Recurrent(_) => return Err(ModelError::Unsupported("recurrent")),
            Artifact::Smoothing(m) => m.predict(row),
        };
        if v.is_finite() { Ok(v) } else { Err(ModelError::NonFinite) }
    }

    /// Native multi-step forecast from a daily new-case history.
    pub fn predict_sequence(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        match self {
            Artifact::Smoothing(m) => m.forecast(history, horizon),
            other => Err(ModelError::Unsupported(other.family())),
        }
    }

    /// Run a normalized window through a sequence model and roll it forward `horizon` steps.
    pub fn predict_batch(&self, window: &[[f64; SEQUENCE_FEATURES]], horizon: usize) -> Result<Vec<f64>, ModelError> {
        match self {
            Artifact::Recurrent(m) => m.predict_batch(window, horizon),
            other => Err(ModelError::Unsupported(other.family())),
        }
    }
}

fn feature(row: &FeatureRow, name: &str) -> Result<f64, ModelError> {
    row.value(name).ok_or_else(|| ModelError::MissingFeature(name.to_string()))
}

fn check_finite(values: impl IntoIterator<Item = f64>, what: &str) -> Result<(), ModelError> {
    if values.into_iter().all(f64::is_finite) {
        Ok(())
    } else {
        Err(ModelError::Malformed(format!("non-finite {what}")))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    pub intercept: f64,
    pub coefficients: BTreeMap<String, f64>,
}

impl LinearModel {
    fn validate(&self) -> Result<(), ModelError> {
        check_finite(
            std::iter::once(self.intercept).chain(self.coefficients.values().copied()),
            "coefficient",
        )
    }

    fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        let mut acc = self.intercept;
        for (name, coef) in &self.coefficients {
            acc += coef * feature(row, name)?;
        }
        Ok(acc)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Aggregation {
    /// Boosted ensembles.
    #[default]
    Sum,
    /// Bagged ensembles (random forests).
    Mean,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TreeNode {
    Split {
        feature: String,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        leaf: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

impl Tree {
    /// Walk from the root; `value < threshold` goes left.
    fn evaluate(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        let mut idx = 0;
        // A valid tree reaches a leaf in fewer steps than it has nodes.
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { leaf }) => return Ok(*leaf),
                Some(TreeNode::Split {
                    feature: name,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if feature(row, name)? < *threshold { *left } else { *right };
                }
                None => return Err(ModelError::Malformed(format!("node index {idx} out of range"))),
            }
        }
        Err(ModelError::Malformed("tree contains a cycle".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub trees: Vec<Tree>,
    #[serde(default)]
    pub aggregation: Aggregation,
    #[serde(default)]
    pub base_score: f64,
}

impl TreeEnsemble {
    fn validate(&self) -> Result<(), ModelError> {
        if self.trees.is_empty() {
            return Err(ModelError::Malformed("ensemble has no trees".to_string()));
        }
        for (t, tree) in self.trees.iter().enumerate() {
            if tree.nodes.is_empty() {
                return Err(ModelError::Malformed(format!("tree {t} has no nodes")));
            }
            for node in &tree.nodes {
                match node {
                    TreeNode::Split {
                        threshold, left, right, ..
                    } => {
                        if *left >= tree.nodes.len() || *right >= tree.nodes.len() {
                            return Err(ModelError::Malformed(format!("tree {t} has a dangling child")));
                        }
                        check_finite([*threshold], "threshold")?;
                    }
                    TreeNode::Leaf { leaf } => check_finite([*leaf], "leaf")?,
                }
            }
        }
        check_finite([self.base_score], "base score")
    }

    fn predict(&self, row: &FeatureRow) -> Result<f64, ModelError> {
        let mut sum = 0.0;
        for tree in &self.trees {
            sum += tree.evaluate(row)?;
        }
        let combined = match self.aggregation {
            Aggregation::Sum => sum,
            Aggregation::Mean => sum / self.trees.len().max(1) as f64,
        };
        Ok(self.base_score + combined)
    }
}

/// Elman recurrent cell with a linear read-out.
///
/// `h' = tanh(W_in x + W_h h + b)`, `y = w_out . h' + b_out`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentModel {
    pub w_input: Vec<Vec<f64>>,
    pub w_hidden: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    pub w_output: Vec<f64>,
    #[serde(default)]
    pub bias_output: f64,
}

impl RecurrentModel {
    pub fn hidden_size(&self) -> usize {
        self.bias.len()
    }

    fn validate(&self) -> Result<(), ModelError> {
        let h = self.hidden_size();
        if h == 0 {
            return Err(ModelError::Malformed("hidden size is zero".to_string()));
        }
        let shape_ok = self.w_input.len() == h
            && self.w_input.iter().all(|r| r.len() == SEQUENCE_FEATURES)
            && self.w_hidden.len() == h
            && self.w_hidden.iter().all(|r| r.len() == h)
            && self.w_output.len() == h;
        if !shape_ok {
            return Err(ModelError::Malformed(format!(
                "weights do not match hidden size {h} and input width {SEQUENCE_FEATURES}"
            )));
        }
        check_finite(
            self.w_input
                .iter()
                .chain(&self.w_hidden)
                .flatten()
                .chain(&self.bias)
                .chain(&self.w_output)
                .copied()
                .chain([self.bias_output]),
            "weight",
        )
    }

    fn step(&self, hidden: &[f64], x: &[f64; SEQUENCE_FEATURES]) -> Vec<f64> {
        (0..self.hidden_size())
            .map(|j| {
                let input: f64 = self.w_input[j].iter().zip(x).map(|(w, v)| w * v).sum();
                let recur: f64 = self.w_hidden[j].iter().zip(hidden).map(|(w, v)| w * v).sum();
                (input + recur + self.bias[j]).tanh()
            })
            .collect()
    }

    fn read_out(&self, hidden: &[f64]) -> f64 {
        self.w_output.iter().zip(hidden).map(|(w, v)| w * v).sum::<f64>() + self.bias_output
    }

    /// Encode the window, then feed each output back into the new-case slot.
    fn predict_batch(&self, window: &[[f64; SEQUENCE_FEATURES]], horizon: usize) -> Result<Vec<f64>, ModelError> {
        let Some(last) = window.last() else {
            return Err(ModelError::ShapeMismatch { expected: 1, got: 0 });
        };
        let mut hidden = vec![0.0; self.hidden_size()];
        for x in window {
            hidden = self.step(&hidden, x);
        }

        let mut input = *last;
        let mut out = Vec::with_capacity(horizon);
        for i in 0..horizon {
            if i > 0 {
                hidden = self.step(&hidden, &input);
            }
            let y = self.read_out(&hidden);
            if !y.is_finite() {
                return Err(ModelError::NonFinite);
            }
            out.push(y);
            input[0] = y;
        }
        Ok(out)
    }
}

/// Damped additive trend (Holt) smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SmoothingModel {
    pub alpha: f64,
    pub beta: f64,
    #[serde(default = "default_phi")]
    pub phi: f64,
}

fn default_phi() -> f64 {
    0.98
}

impl SmoothingModel {
    fn validate(&self) -> Result<(), ModelError> {
        let ok = self.alpha > 0.0 && self.alpha <= 1.0 && (0.0..=1.0).contains(&self.beta) && self.phi > 0.0 && self.phi <= 1.0;
        if ok {
            Ok(())
        } else {
            Err(ModelError::Malformed(format!(
                "smoothing parameters out of range (alpha={}, beta={}, phi={})",
                self.alpha, self.beta, self.phi
            )))
        }
    }

    /// One step ahead from the smoothed level and recent growth.
    fn predict(&self, row: &FeatureRow) -> f64 {
        let level = row.new_cases_7d_avg;
        level + self.phi * level * row.growth_7d_avg
    }

    fn forecast(&self, history: &[f64], horizon: usize) -> Result<Vec<f64>, ModelError> {
        let (first, rest) = history
            .split_first()
            .ok_or(ModelError::ShapeMismatch { expected: 1, got: 0 })?;
        let mut level = *first;
        let mut trend = rest.first().map(|second| second - first).unwrap_or(0.0);
        for &y in rest {
            let prev_level = level;
            level = self.alpha * y + (1.0 - self.alpha) * (level + self.phi * trend);
            trend = self.beta * (level - prev_level) + (1.0 - self.beta) * self.phi * trend;
        }

        let mut out = Vec::with_capacity(horizon);
        let mut damp = 0.0;
        let mut phi_h = 1.0;
        for _ in 0..horizon {
            phi_h *= self.phi;
            damp += phi_h;
            let y = level + damp * trend;
            if !y.is_finite() {
                return Err(ModelError::NonFinite);
            }
            out.push(y);
        }
        Ok(out)
    }
}

/// Creation stamp and accuracy metrics attached to an artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub metrics: BTreeMap<String, f64>,
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;

    fn row() -> FeatureRow {
        FeatureRow {
            date: NaiveDate::from_ymd_opt(2020, 3, 2).unwrap(),
            new_cases: 100.0,
            total_cases: 1000.0,
            new_deaths: 2.0,
            total_deaths: 20.0,
            new_cases_7d_avg: 80.0,
            growth_rate: 0.1,
            growth_7d_avg: 0.05,
            mortality_rate: 0.02,
        }
    }

    #[test]
    fn parses_tagged_families() {
        let linear: Artifact =
            serde_json::from_str(r#"{"type":"linear","intercept":1.0,"coefficients":{"new_cases":0.5,"dow_0":10}}"#)
                .unwrap();
        assert_eq!(linear.family(), "linear");
        // Monday
        assert_eq!(linear.predict(&row()).unwrap(), 61.0);

        let forest: Artifact = serde_json::from_str(
            r#"{"type":"tree_ensemble","aggregation":"mean","trees":[
                {"nodes":[{"feature":"new_cases","threshold":50,"left":1,"right":2},{"leaf":1},{"leaf":3}]},
                {"nodes":[{"leaf":5}]}
            ]}"#,
        )
        .unwrap();
        forest.validate().unwrap();
        assert_eq!(forest.predict(&row()).unwrap(), 4.0);
    }

    #[test]
    fn missing_feature_is_reported() {
        let model = Artifact::Linear(LinearModel {
            intercept: 0.0,
            coefficients: BTreeMap::from([("hosp_patients".to_string(), 1.0)]),
        });
        assert_eq!(
            model.predict(&row()),
            Err(ModelError::MissingFeature("hosp_patients".to_string()))
        );
    }

    #[test]
    fn malformed_trees_are_rejected() {
        let dangling = TreeEnsemble {
            trees: vec![Tree {
                nodes: vec![TreeNode::Split {
                    feature: "new_cases".to_string(),
                    threshold: 1.0,
                    left: 4,
                    right: 0,
                }],
            }],
            aggregation: Aggregation::Sum,
            base_score: 0.0,
        };
        assert!(Artifact::TreeEnsemble(dangling).validate().is_err());

        let cyclic = Tree {
            nodes: vec![TreeNode::Split {
                feature: "new_cases".to_string(),
                threshold: 1.0,
                left: 0,
                right: 0,
            }],
        };
        assert!(matches!(cyclic.evaluate(&row()), Err(ModelError::Malformed(_))));
    }

    #[test]
    fn recurrent_rolls_forward_and_refuses_scalar_calls() {
        let model = Artifact::Recurrent(RecurrentModel {
            w_input: vec![vec![1.0, 0.0, 0.0, 0.0]],
            w_hidden: vec![vec![0.0]],
            bias: vec![0.0],
            w_output: vec![1.0],
            bias_output: 0.0,
        });
        model.validate().unwrap();
        assert!(model.is_sequence());
        assert_eq!(model.predict(&row()), Err(ModelError::Unsupported("recurrent")));

        let out = model.predict_batch(&[[0.0; 4], [0.5, 0.0, 0.0, 0.0]], 3).unwrap();
        assert_eq!(out.len(), 3);
        assert!((out[0] - 0.5f64.tanh()).abs() < 1e-12);
        assert!((out[1] - out[0].tanh()).abs() < 1e-12);
    }

    #[test]
    fn smoothing_extends_a_linear_trend() {
        let model = Artifact::Smoothing(SmoothingModel {
            alpha: 1.0,
            beta: 1.0,
            phi: 1.0,
        });
        model.validate().unwrap();
        assert!(model.is_multi_step());
        let out = model.predict_sequence(&[10.0, 20.0, 30.0], 3).unwrap();
        assert_eq!(out, vec![40.0, 50.0, 60.0]);
        assert!(model.predict_sequence(&[], 3).is_err());
        assert!(model.predict_batch(&[[0.0; 4]], 1).is_err());
    }
}
