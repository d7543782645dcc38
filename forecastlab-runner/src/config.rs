//! Pipeline configuration, loaded from TOML.
//!
//! Every section is `#[serde(default)]`, so a partial file (or an empty one) is
//! valid and falls back to the stock settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use forecastlab_core::domain::PriceField;
use forecastlab_core::ensemble::{default_weights, EnsembleCombiner, SignalThresholds};
use forecastlab_core::explain::DEFAULT_TOP_N;
use forecastlab_core::models::holidays::calendar;
use forecastlab_core::models::{
    DecompositionModel, DecompositionParams, GbmParams, GradientBoostedModel, SearchGrid,
    VolatilityModel, VolatilityParams,
};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub data: DataConfig,
    pub store: StoreConfig,
    pub ensemble: EnsembleConfig,
    pub signal: SignalThresholds,
    pub gradient_boosted: GradientBoostedConfig,
    pub decomposition: DecompositionParams,
    pub volatility: VolatilityParams,
    pub explain: ExplainConfig,
    pub validation: ValidationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory of `{SYMBOL}.csv` files.
    pub dir: PathBuf,
    /// Serve a seeded random walk instead of reading files.
    pub synthetic: bool,
    /// Bars generated per symbol in synthetic mode.
    pub synthetic_bars: usize,
    /// Price column every model forecasts.
    pub target: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data"),
            synthetic: false,
            synthetic_bars: 500,
            target: "close".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub dir: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("models"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    /// Model name (`xgboost`, `prophet`) → blend weight.
    pub weights: BTreeMap<String, f64>,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            weights: default_weights(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostedConfig {
    #[serde(flatten)]
    pub params: GbmParams,
    /// Run the randomized search before the final fit.
    pub optimize: bool,
    pub search: SearchGrid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    pub top_n: usize,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Share of labelled rows used for training in the hold-out report.
    pub train_fraction: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            train_fraction: 0.8,
        }
    }
}

impl PipelineConfig {
    /// Load and validate a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if PriceField::parse(&self.data.target).is_none() {
            return invalid(format!("unknown target column '{}'", self.data.target));
        }
        if self.data.synthetic && self.data.synthetic_bars == 0 {
            return invalid("synthetic_bars must be positive");
        }

        if self.ensemble.weights.values().any(|w| !w.is_finite() || *w < 0.0) {
            return invalid("ensemble weights must be finite and non-negative");
        }

        let s = &self.signal;
        if !(s.buy_threshold_pct.is_finite() && s.sell_threshold_pct.is_finite()) {
            return invalid("signal thresholds must be finite");
        }
        if s.sell_threshold_pct > s.buy_threshold_pct {
            return invalid("sell_threshold_pct must not exceed buy_threshold_pct");
        }
        if !(s.risky_volatility >= 0.0) {
            return invalid("risky_volatility must be non-negative");
        }

        let g = &self.gradient_boosted.params;
        if g.n_estimators == 0 {
            return invalid("n_estimators must be positive");
        }
        if g.max_depth == 0 {
            return invalid("max_depth must be positive");
        }
        if !(g.learning_rate > 0.0 && g.learning_rate <= 1.0) {
            return invalid("learning_rate must be in (0, 1]");
        }
        if !in_unit_interval(g.subsample) || !in_unit_interval(g.colsample) {
            return invalid("subsample and colsample must be in (0, 1]");
        }
        if g.min_samples_leaf == 0 {
            return invalid("min_samples_leaf must be positive");
        }
        if self.gradient_boosted.optimize {
            let grid = &self.gradient_boosted.search;
            if grid.n_estimators.is_empty()
                || grid.learning_rate.is_empty()
                || grid.max_depth.is_empty()
                || grid.subsample.is_empty()
                || grid.colsample.is_empty()
            {
                return invalid("search grid lists must not be empty");
            }
            if grid.candidates == 0 || grid.folds == 0 {
                return invalid("search candidates and folds must be positive");
            }
            if grid.learning_rate.iter().any(|lr| !(*lr > 0.0 && *lr <= 1.0)) {
                return invalid("search learning rates must be in (0, 1]");
            }
        }

        let d = &self.decomposition;
        if !in_unit_interval(d.changepoint_range) {
            return invalid("changepoint_range must be in (0, 1]");
        }
        if !(d.changepoint_prior_scale > 0.0
            && d.seasonality_prior_scale > 0.0
            && d.holidays_prior_scale > 0.0)
        {
            return invalid("decomposition prior scales must be positive");
        }
        if !(d.interval_width > 0.0 && d.interval_width < 1.0) {
            return invalid("interval_width must be in (0, 1)");
        }
        if calendar(&d.country).is_none() {
            return invalid(format!("no holiday calendar for country '{}'", d.country));
        }

        if self.volatility.max_iterations == 0 {
            return invalid("volatility max_iterations must be positive");
        }
        if !(self.volatility.tolerance > 0.0) {
            return invalid("volatility tolerance must be positive");
        }

        if self.explain.top_n == 0 {
            return invalid("explain top_n must be positive");
        }
        let f = self.validation.train_fraction;
        if !(f > 0.0 && f < 1.0) {
            return invalid("train_fraction must be in (0, 1)");
        }
        Ok(())
    }

    pub fn combiner(&self) -> EnsembleCombiner {
        EnsembleCombiner::new(self.ensemble.weights.clone(), self.signal.clone())
    }

    pub fn gradient_boosted_model(&self) -> GradientBoostedModel {
        let model = GradientBoostedModel::new(self.gradient_boosted.params.clone());
        if self.gradient_boosted.optimize {
            model.with_search(self.gradient_boosted.search.clone())
        } else {
            model
        }
    }

    pub fn decomposition_model(&self) -> DecompositionModel {
        DecompositionModel::new(self.decomposition.clone())
    }

    pub fn volatility_model(&self) -> VolatilityModel {
        VolatilityModel::new(self.volatility.clone())
    }
}

fn in_unit_interval(v: f64) -> bool {
    v > 0.0 && v <= 1.0
}

fn invalid(msg: impl Into<String>) -> Result<(), ConfigError> {
    Err(ConfigError::Invalid(msg.into()))
}
