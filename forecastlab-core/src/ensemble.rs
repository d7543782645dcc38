//! Ensemble Combiner — blends price forecasts and derives the trade signal.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::domain::Signal;

#[derive(Debug, Error, PartialEq)]
pub enum EnsembleError {
    #[error("no predictions to combine")]
    NoPredictions,

    #[error("prediction from '{model}' is not finite: {value}")]
    NonFinite { model: String, value: f64 },

    #[error("current price must be positive, got {0}")]
    InvalidPrice(f64),
}

/// Percent-change thresholds for the signal rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalThresholds {
    /// BUY when the expected change is strictly above this.
    pub buy_threshold_pct: f64,
    /// SELL when the expected change is strictly below this.
    pub sell_threshold_pct: f64,
    /// Directional signals become RISKY_* when volatility is strictly above this.
    pub risky_volatility: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            buy_threshold_pct: 1.5,
            sell_threshold_pct: -1.5,
            risky_volatility: 2.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnsembleCombiner {
    weights: BTreeMap<String, f64>,
    thresholds: SignalThresholds,
}

/// `xgboost` 0.6, `prophet` 0.4.
pub fn default_weights() -> BTreeMap<String, f64> {
    BTreeMap::from([("xgboost".to_string(), 0.6), ("prophet".to_string(), 0.4)])
}

impl Default for EnsembleCombiner {
    fn default() -> Self {
        Self::new(default_weights(), SignalThresholds::default())
    }
}

impl EnsembleCombiner {
    pub fn new(weights: BTreeMap<String, f64>, thresholds: SignalThresholds) -> Self {
        Self {
            weights,
            thresholds,
        }
    }

    pub fn weights(&self) -> &BTreeMap<String, f64> {
        &self.weights
    }

    pub fn thresholds(&self) -> &SignalThresholds {
        &self.thresholds
    }

    /// Weighted average, renormalized by the weights actually used. When no
    /// configured weight covers any given model (or they sum to zero), falls back
    /// to the unweighted mean.
    pub fn combine_predictions(
        &self,
        predictions: &BTreeMap<String, f64>,
    ) -> Result<f64, EnsembleError> {
        if predictions.is_empty() {
            return Err(EnsembleError::NoPredictions);
        }
        if let Some((model, value)) = predictions.iter().find(|(_, v)| !v.is_finite()) {
            return Err(EnsembleError::NonFinite {
                model: model.clone(),
                value: *value,
            });
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for (model, value) in predictions {
            if let Some(w) = self.weights.get(model) {
                weighted_sum += value * w;
                total_weight += w;
            }
        }

        if total_weight == 0.0 {
            return Ok(predictions.values().sum::<f64>() / predictions.len() as f64);
        }
        Ok(weighted_sum / total_weight)
    }

    /// Returns the signal and the expected percent change.
    pub fn generate_signal(
        &self,
        current_price: f64,
        predicted_price: f64,
        volatility: f64,
    ) -> Result<(Signal, f64), EnsembleError> {
        if !(current_price > 0.0) || !current_price.is_finite() {
            return Err(EnsembleError::InvalidPrice(current_price));
        }
        if !predicted_price.is_finite() {
            return Err(EnsembleError::NonFinite {
                model: "ensemble".into(),
                value: predicted_price,
            });
        }

        let change_pct = (predicted_price - current_price) / current_price * 100.0;
        let mut signal = if change_pct > self.thresholds.buy_threshold_pct {
            Signal::Buy
        } else if change_pct < self.thresholds.sell_threshold_pct {
            Signal::Sell
        } else {
            Signal::Hold
        };
        if volatility > self.thresholds.risky_volatility {
            signal = signal.risky();
        }
        Ok((signal, change_pct))
    }
}
