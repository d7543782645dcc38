//! Forecast models.
//!
//! Three concrete models share the `ForecastModel` trait:
//! - `GradientBoostedModel`: next-period price level from the feature table
//! - `DecompositionModel`: trend + seasonality + holidays on the raw target series
//! - `VolatilityModel`: GARCH(1,1) conditional volatility of percentage returns
//!
//! Every model persists through a deterministic JSON envelope (`ModelEnvelope`):
//! no timestamps, no hash-map ordering. Identical training input yields byte-identical
//! blobs.

pub mod decomposition;
pub mod gradient_boosted;
pub mod holidays;
pub mod optimize;
pub mod search;
pub mod tree;
pub mod volatility;

pub use decomposition::{DecompositionModel, DecompositionParams};
pub use gradient_boosted::{GradientBoostedModel, GbmParams};
pub use search::{SearchGrid, SearchOutcome};
pub use volatility::{VolatilityModel, VolatilityParams};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::domain::{Forecast, ModelKind, PriceBar, PriceField};
use crate::features::FeatureTable;

/// Envelope layout version. Bump when a model's persisted fields change shape.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("{0} model is not trained")]
    NotTrained(ModelKind),

    #[error("{kind} needs at least {required} points, got {actual}")]
    InsufficientData {
        kind: ModelKind,
        required: usize,
        actual: usize,
    },

    #[error("{kind} cannot forecast {steps} steps ahead")]
    UnsupportedSteps { kind: ModelKind, steps: usize },

    #[error("unknown target column '{0}'")]
    UnknownColumn(String),

    #[error("feature mismatch: trained on [{expected}], got [{actual}]")]
    FeatureMismatch { expected: String, actual: String },

    #[error("blob holds a {found} model, expected {expected}")]
    KindMismatch { expected: ModelKind, found: ModelKind },

    #[error("fit failed: {0}")]
    Fit(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("model I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for ModelError {
    fn from(e: serde_json::Error) -> Self {
        ModelError::Serialization(e.to_string())
    }
}

impl ModelError {
    pub(crate) fn feature_mismatch(expected: &[String], actual: &[String]) -> Self {
        ModelError::FeatureMismatch {
            expected: expected.join(","),
            actual: actual.join(","),
        }
    }
}

/// Everything a model may read during train/predict. Each model picks what it needs:
/// the gradient-boosted model reads the feature table, the other two the raw history.
#[derive(Debug, Clone, Copy)]
pub struct ModelInput<'a> {
    pub history: &'a [PriceBar],
    pub features: &'a FeatureTable,
}

impl<'a> ModelInput<'a> {
    pub fn new(history: &'a [PriceBar], features: &'a FeatureTable) -> Self {
        Self { history, features }
    }
}

/// Result of a maximum-likelihood fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceStatus {
    pub converged: bool,
    pub iterations: usize,
    pub log_likelihood: f64,
    /// alpha + beta for GARCH(1,1); below 1 means the variance mean-reverts.
    pub persistence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainReport {
    pub kind: ModelKind,
    pub samples: usize,
    /// In-sample root mean squared error, where the model defines one.
    pub in_sample_rmse: Option<f64>,
    pub convergence: Option<ConvergenceStatus>,
    pub fingerprint: String,
}

/// Common contract of the three forecast models.
///
/// Object-safe so the orchestrator can hold `Box<dyn ForecastModel>`.
pub trait ForecastModel: Send + Sync {
    fn kind(&self) -> ModelKind;

    fn is_trained(&self) -> bool;

    /// Fit on `input`. `target` names a price field (`open|high|low|close|volume`).
    fn train(&mut self, input: &ModelInput<'_>, target: &str) -> Result<TrainReport, ModelError>;

    fn predict(&self, input: &ModelInput<'_>, steps: usize) -> Result<Forecast, ModelError>;

    /// Serialize the trained state into a deterministic JSON envelope.
    fn to_blob(&self) -> Result<Vec<u8>, ModelError>;

    /// Replace this model's state with the contents of `blob`.
    fn load_blob(&mut self, blob: &[u8]) -> Result<(), ModelError>;

    /// Atomic write: `{path}.tmp`, then rename into place.
    fn save(&self, path: &Path) -> Result<(), ModelError> {
        let blob = self.to_blob()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &blob)?;
        fs::rename(&tmp, path).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            ModelError::Io(e)
        })
    }

    fn load(&mut self, path: &Path) -> Result<(), ModelError> {
        let blob = fs::read(path)?;
        self.load_blob(&blob)
    }
}

/// Build an empty (untrained) model of the given kind with default hyperparameters.
pub fn default_model(kind: ModelKind) -> Box<dyn ForecastModel> {
    match kind {
        ModelKind::GradientBoosted => Box::new(GradientBoostedModel::new(GbmParams::default())),
        ModelKind::Decomposition => {
            Box::new(DecompositionModel::new(DecompositionParams::default()))
        }
        ModelKind::ConditionalVolatility => {
            Box::new(VolatilityModel::new(VolatilityParams::default()))
        }
    }
}

// ── Persisted envelope ──

/// `{schema_version, kind, hyperparameters, params, fingerprint}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEnvelope<H, P> {
    pub schema_version: u32,
    pub kind: ModelKind,
    pub hyperparameters: H,
    pub params: P,
    pub fingerprint: String,
}

#[derive(Deserialize)]
struct EnvelopeHeader {
    schema_version: u32,
    kind: ModelKind,
}

pub(crate) fn encode_envelope<H: Serialize, P: Serialize>(
    kind: ModelKind,
    hyperparameters: &H,
    params: &P,
    fingerprint: &str,
) -> Result<Vec<u8>, ModelError> {
    let envelope = ModelEnvelope {
        schema_version: SCHEMA_VERSION,
        kind,
        hyperparameters,
        params,
        fingerprint: fingerprint.to_string(),
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

pub(crate) fn decode_envelope<H: DeserializeOwned, P: DeserializeOwned>(
    expected: ModelKind,
    blob: &[u8],
) -> Result<ModelEnvelope<H, P>, ModelError> {
    let header: EnvelopeHeader = serde_json::from_slice(blob)?;
    if header.kind != expected {
        return Err(ModelError::KindMismatch {
            expected,
            found: header.kind,
        });
    }
    if header.schema_version != SCHEMA_VERSION {
        return Err(ModelError::Serialization(format!(
            "unsupported schema version {} (expected {SCHEMA_VERSION})",
            header.schema_version
        )));
    }
    Ok(serde_json::from_slice(blob)?)
}

/// Resolve a target column name to a price field.
pub(crate) fn parse_target(target: &str) -> Result<PriceField, ModelError> {
    PriceField::parse(target).ok_or_else(|| ModelError::UnknownColumn(target.to_string()))
}

/// Root mean squared error of paired series.
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let sse: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    (sse / actual.len() as f64).sqrt()
}
