//! Gradient-boosted regression trees on the feature table.
//!
//! Squared-error boosting: start from the mean target, then fit each tree to the
//! residuals of the running prediction and add it scaled by the learning rate.
//! Row and column subsampling draw from a `StdRng` seeded with `seed`, so a fit is
//! a pure function of (params, data).

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::search::{randomized_search, SearchGrid};
use super::tree::{RegressionTree, TreeParams};
use super::{
    decode_envelope, encode_envelope, parse_target, rmse, ForecastModel, ModelError, ModelInput,
    TrainReport,
};
use crate::domain::{future_dates, Forecast, ForecastPoint, ModelKind};
use crate::fingerprint::DatasetHash;

/// Minimum number of labelled feature rows.
pub const MIN_TRAINING_ROWS: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbmParams {
    pub n_estimators: usize,
    pub max_depth: usize,
    pub learning_rate: f64,
    /// Fraction of rows sampled (without replacement) per tree.
    pub subsample: f64,
    /// Fraction of columns sampled per tree.
    pub colsample: f64,
    pub min_samples_leaf: usize,
    pub seed: u64,
    /// Most recent training rows kept for the attribution explainer.
    pub background_rows: usize,
}

impl Default for GbmParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: 5,
            learning_rate: 0.1,
            subsample: 1.0,
            colsample: 1.0,
            min_samples_leaf: 1,
            seed: 42,
            background_rows: 200,
        }
    }
}

/// An additive ensemble: `base_score + learning_rate * Σ tree(x)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostedTrees {
    pub base_score: f64,
    pub learning_rate: f64,
    pub trees: Vec<RegressionTree>,
}

impl BoostedTrees {
    pub fn predict(&self, row: &[f64]) -> f64 {
        self.base_score
            + self.learning_rate * self.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

/// Fit a boosted ensemble on `x`/`y`.
pub fn boost(params: &GbmParams, x: &[Vec<f64>], y: &[f64]) -> BoostedTrees {
    let n = y.len();
    let n_features = x.first().map_or(0, Vec::len);
    let base_score = if n == 0 {
        0.0
    } else {
        y.iter().sum::<f64>() / n as f64
    };

    let mut rng = StdRng::seed_from_u64(params.seed);
    let tree_params = TreeParams {
        max_depth: params.max_depth,
        min_samples_leaf: params.min_samples_leaf,
    };
    let mut running = vec![base_score; n];
    let mut trees = Vec::with_capacity(params.n_estimators);

    for _ in 0..params.n_estimators {
        let residuals: Vec<f64> = y.iter().zip(&running).map(|(t, p)| t - p).collect();
        let rows = sample_indices(&mut rng, n, params.subsample);
        let features = sample_indices(&mut rng, n_features, params.colsample);
        let tree = RegressionTree::fit(x, &residuals, &rows, &features, tree_params);
        for (pred, row) in running.iter_mut().zip(x) {
            *pred += params.learning_rate * tree.predict(row);
        }
        trees.push(tree);
    }

    BoostedTrees {
        base_score,
        learning_rate: params.learning_rate,
        trees,
    }
}

/// Sorted sample of `ceil(fraction * n)` indices out of `0..n`; all of them when
/// `fraction >= 1`.
fn sample_indices(rng: &mut StdRng, n: usize, fraction: f64) -> Vec<usize> {
    if fraction >= 1.0 || n == 0 {
        return (0..n).collect();
    }
    let amount = ((fraction * n as f64).ceil() as usize).clamp(1, n);
    let mut picked = rand::seq::index::sample(rng, n, amount).into_vec();
    picked.sort_unstable();
    picked
}

/// Fitted state persisted in the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbmFit {
    pub target: String,
    pub feature_names: Vec<String>,
    pub ensemble: BoostedTrees,
    /// Most recent training rows, oldest first.
    pub background: Vec<Vec<f64>>,
    pub last_training_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct GradientBoostedModel {
    params: GbmParams,
    search: Option<SearchGrid>,
    fit: Option<GbmFit>,
    fingerprint: String,
}

impl GradientBoostedModel {
    pub fn new(params: GbmParams) -> Self {
        Self {
            params,
            search: None,
            fit: None,
            fingerprint: String::new(),
        }
    }

    /// Run a randomized hyperparameter search before the final fit.
    pub fn with_search(mut self, grid: SearchGrid) -> Self {
        self.search = Some(grid);
        self
    }

    pub fn params(&self) -> &GbmParams {
        &self.params
    }

    pub fn fitted(&self) -> Option<&GbmFit> {
        self.fit.as_ref()
    }

    /// Raw model output for one feature row.
    pub fn predict_row(&self, row: &[f64]) -> Result<f64, ModelError> {
        let fit = self.fit.as_ref().ok_or(ModelError::NotTrained(self.kind()))?;
        Ok(fit.ensemble.predict(row))
    }
}

impl ForecastModel for GradientBoostedModel {
    fn kind(&self) -> ModelKind {
        ModelKind::GradientBoosted
    }

    fn is_trained(&self) -> bool {
        self.fit.is_some()
    }

    fn train(&mut self, input: &ModelInput<'_>, target: &str) -> Result<TrainReport, ModelError> {
        let field = parse_target(target)?;
        let table = input.features;
        let set = table
            .supervised(field.as_str())
            .ok_or_else(|| ModelError::UnknownColumn(target.to_string()))?;
        if set.len() < MIN_TRAINING_ROWS {
            return Err(ModelError::InsufficientData {
                kind: self.kind(),
                required: MIN_TRAINING_ROWS,
                actual: set.len(),
            });
        }

        if let Some(grid) = &self.search {
            let outcome = randomized_search(&self.params, grid, &set.x, &set.y)?;
            info!(
                score = outcome.best_score,
                n_estimators = outcome.best.n_estimators,
                max_depth = outcome.best.max_depth,
                learning_rate = outcome.best.learning_rate,
                "hyperparameter search finished"
            );
            self.params = outcome.best;
        }

        let ensemble = boost(&self.params, &set.x, &set.y);
        let fitted: Vec<f64> = set.x.iter().map(|r| ensemble.predict(r)).collect();
        let in_sample = rmse(&set.y, &fitted);
        debug!(rows = set.len(), trees = ensemble.trees.len(), rmse = in_sample, "boosting done");

        let keep = self.params.background_rows.min(set.len());
        let background = set.x[set.len() - keep..].to_vec();
        let last_training_date = table
            .latest()
            .map(|r| r.date)
            .ok_or_else(|| ModelError::Fit("feature table is empty".into()))?;

        self.fingerprint = DatasetHash::of_history(input.history).0;
        self.fit = Some(GbmFit {
            target: field.as_str().to_string(),
            feature_names: table.names().to_vec(),
            ensemble,
            background,
            last_training_date,
        });

        Ok(TrainReport {
            kind: self.kind(),
            samples: set.len(),
            in_sample_rmse: Some(in_sample),
            convergence: None,
            fingerprint: self.fingerprint.clone(),
        })
    }

    fn predict(&self, input: &ModelInput<'_>, steps: usize) -> Result<Forecast, ModelError> {
        let fit = self.fit.as_ref().ok_or(ModelError::NotTrained(self.kind()))?;
        if steps != 1 {
            return Err(ModelError::UnsupportedSteps {
                kind: self.kind(),
                steps,
            });
        }
        let table = input.features;
        if table.names() != fit.feature_names.as_slice() {
            return Err(ModelError::feature_mismatch(
                &fit.feature_names,
                table.names(),
            ));
        }
        let latest = table.latest().ok_or(ModelError::InsufficientData {
            kind: self.kind(),
            required: 1,
            actual: 0,
        })?;

        let estimate = fit.ensemble.predict(&latest.values);
        Ok(Forecast {
            kind: self.kind(),
            points: future_dates(latest.date, 1)
                .into_iter()
                .map(|target_date| ForecastPoint {
                    target_date,
                    point_estimate: estimate,
                    interval: None,
                })
                .collect(),
        })
    }

    fn to_blob(&self) -> Result<Vec<u8>, ModelError> {
        let fit = self.fit.as_ref().ok_or(ModelError::NotTrained(self.kind()))?;
        encode_envelope(self.kind(), &self.params, fit, &self.fingerprint)
    }

    fn load_blob(&mut self, blob: &[u8]) -> Result<(), ModelError> {
        let envelope = decode_envelope::<GbmParams, GbmFit>(self.kind(), blob)?;
        self.params = envelope.hyperparameters;
        self.fit = Some(envelope.params);
        self.fingerprint = envelope.fingerprint;
        Ok(())
    }
}
