//! Attribution Explainer.
//!
//! Decomposes one gradient-boosted prediction into signed per-feature
//! contributions with exact TreeSHAP over the fitted trees:
//!
//! prediction = baseline + Σ contributions
//!
//! The baseline is the ensemble's expected output under the node covers derived
//! from the background rows captured at training time.

pub mod tree_shap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::gradient_boosted::{BoostedTrees, GradientBoostedModel};
use tree_shap::{expected_value, node_covers, tree_shap};

/// Number of reasons reported when the caller does not choose.
pub const DEFAULT_TOP_N: usize = 3;

#[derive(Debug, Error, PartialEq)]
pub enum ExplainError {
    #[error("model is not trained")]
    NotTrained,

    #[error("feature mismatch: explainer built for [{expected}], got [{actual}]")]
    FeatureMismatch { expected: String, actual: String },

    #[error("row has {actual} values, expected {expected}")]
    RowLength { expected: usize, actual: usize },

    #[error("feature '{feature}' is not finite")]
    NonFinite { feature: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Upward,
    Downward,
    Neutral,
}

impl Direction {
    pub fn of(contribution: f64) -> Self {
        if contribution > 0.0 {
            Self::Upward
        } else if contribution < 0.0 {
            Self::Downward
        } else {
            Self::Neutral
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Upward => "upward",
            Self::Downward => "downward",
            Self::Neutral => "neutral",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    pub feature: String,
    pub contribution: f64,
    /// The feature's value in the explained row.
    pub value: f64,
    pub direction: Direction,
}

impl Contribution {
    /// Short human-readable form, e.g. `rsi (upward)`.
    pub fn describe(&self) -> String {
        format!("{} ({})", self.feature, self.direction.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub baseline: f64,
    pub prediction: f64,
    /// Every feature, sorted by |contribution| descending.
    pub contributions: Vec<Contribution>,
    /// The first `top_n` of `contributions`.
    pub reasons: Vec<Contribution>,
}

/// Explainer bound to one trained gradient-boosted model.
#[derive(Debug, Clone)]
pub struct TreeExplainer {
    feature_names: Vec<String>,
    ensemble: BoostedTrees,
    covers: Vec<Vec<f64>>,
    baseline: f64,
}

impl TreeExplainer {
    /// Build against explicit background rows.
    pub fn new(
        model: &GradientBoostedModel,
        background: &[Vec<f64>],
    ) -> Result<Self, ExplainError> {
        let fit = model.fitted().ok_or(ExplainError::NotTrained)?;
        let width = fit.feature_names.len();
        if let Some(row) = background.iter().find(|r| r.len() != width) {
            return Err(ExplainError::RowLength {
                expected: width,
                actual: row.len(),
            });
        }

        let ensemble = fit.ensemble.clone();
        let covers: Vec<Vec<f64>> = ensemble
            .trees
            .iter()
            .map(|t| node_covers(t, background))
            .collect();
        let expectation: f64 = ensemble
            .trees
            .iter()
            .zip(&covers)
            .map(|(t, c)| expected_value(t, c))
            .sum();
        let baseline = ensemble.base_score + ensemble.learning_rate * expectation;

        Ok(Self {
            feature_names: fit.feature_names.clone(),
            ensemble,
            covers,
            baseline,
        })
    }

    /// Build against the background rows the model kept at training time.
    pub fn from_model(model: &GradientBoostedModel) -> Result<Self, ExplainError> {
        let fit = model.fitted().ok_or(ExplainError::NotTrained)?;
        Self::new(model, &fit.background)
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn explain(
        &self,
        feature_names: &[String],
        row: &[f64],
        top_n: usize,
    ) -> Result<Explanation, ExplainError> {
        if feature_names != self.feature_names.as_slice() {
            return Err(ExplainError::FeatureMismatch {
                expected: self.feature_names.join(","),
                actual: feature_names.join(","),
            });
        }
        if row.len() != self.feature_names.len() {
            return Err(ExplainError::RowLength {
                expected: self.feature_names.len(),
                actual: row.len(),
            });
        }
        if let Some(i) = row.iter().position(|v| !v.is_finite()) {
            return Err(ExplainError::NonFinite {
                feature: self.feature_names[i].clone(),
            });
        }

        let mut phi = vec![0.0; row.len()];
        for (tree, covers) in self.ensemble.trees.iter().zip(&self.covers) {
            tree_shap(tree, covers, row, &mut phi);
        }

        let mut contributions: Vec<Contribution> = self
            .feature_names
            .iter()
            .zip(phi)
            .zip(row)
            .map(|((name, raw), value)| {
                let contribution = raw * self.ensemble.learning_rate;
                Contribution {
                    feature: name.clone(),
                    contribution,
                    value: *value,
                    direction: Direction::of(contribution),
                }
            })
            .collect();
        contributions.sort_by(|a, b| b.contribution.abs().total_cmp(&a.contribution.abs()));
        let reasons = contributions.iter().take(top_n).cloned().collect();

        Ok(Explanation {
            baseline: self.baseline,
            prediction: self.ensemble.predict(row),
            contributions,
            reasons,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureEngineer;
    use crate::indicators::make_bars;
    use crate::models::{ForecastModel, GbmParams, ModelInput};

    fn trained() -> (GradientBoostedModel, crate::features::FeatureTable) {
        let closes: Vec<f64> = (0..140)
            .map(|i| 100.0 + (i as f64 * 0.15).sin() * 6.0 + (i as f64 * 0.05).cos() * 3.0)
            .collect();
        let bars = make_bars(&closes);
        let table = FeatureEngineer::default().create_features(&bars).unwrap();
        let mut model = GradientBoostedModel::new(GbmParams {
            n_estimators: 15,
            max_depth: 3,
            ..GbmParams::default()
        });
        model
            .train(&ModelInput::new(&bars, &table), "close")
            .unwrap();
        (model, table)
    }

    #[test]
    fn baseline_plus_contributions_equals_prediction() {
        let (model, table) = trained();
        let explainer = TreeExplainer::from_model(&model).unwrap();
        let latest = table.latest().unwrap();
        let explanation = explainer
            .explain(table.names(), &latest.values, DEFAULT_TOP_N)
            .unwrap();

        let total: f64 = explanation.contributions.iter().map(|c| c.contribution).sum();
        assert!((explanation.baseline + total - explanation.prediction).abs() < 1e-6);
        assert!((explanation.prediction - model.predict_row(&latest.values).unwrap()).abs() < 1e-9);
        assert_eq!(explanation.contributions.len(), table.names().len());
        assert_eq!(explanation.reasons.len(), 3);
    }

    #[test]
    fn contributions_sorted_by_magnitude() {
        let (model, table) = trained();
        let explainer = TreeExplainer::from_model(&model).unwrap();
        let row = &table.rows()[10].values;
        let explanation = explainer.explain(table.names(), row, 5).unwrap();
        for pair in explanation.contributions.windows(2) {
            assert!(pair[0].contribution.abs() >= pair[1].contribution.abs());
        }
        for c in &explanation.contributions {
            assert_eq!(c.direction, Direction::of(c.contribution));
        }
    }

    #[test]
    fn mismatched_names_rejected() {
        let (model, table) = trained();
        let explainer = TreeExplainer::from_model(&model).unwrap();
        let mut names = table.names().to_vec();
        names.swap(0, 1);
        let latest = table.latest().unwrap();
        assert!(matches!(
            explainer.explain(&names, &latest.values, 3),
            Err(ExplainError::FeatureMismatch { .. })
        ));
    }

    #[test]
    fn untrained_model_rejected() {
        let model = GradientBoostedModel::new(GbmParams::default());
        assert_eq!(
            TreeExplainer::from_model(&model).unwrap_err(),
            ExplainError::NotTrained
        );
    }

    #[test]
    fn direction_labels() {
        assert_eq!(Direction::of(0.3), Direction::Upward);
        assert_eq!(Direction::of(-0.3), Direction::Downward);
        assert_eq!(Direction::of(0.0), Direction::Neutral);
        let c = Contribution {
            feature: "rsi".into(),
            contribution: 1.0,
            value: 55.0,
            direction: Direction::Upward,
        };
        assert_eq!(c.describe(), "rsi (upward)");
    }
}
