//! Hold-out validation — chronological train/test split and out-of-sample metrics.
//!
//! Trains a gradient-boosted model on the first `train_fraction` of the labelled
//! feature rows and scores its next-day predictions on the rest. Every metric is a
//! pure function of the paired series.

use serde::{Deserialize, Serialize};
use tracing::info;

use forecastlab_core::domain::{PriceBar, PriceField};
use forecastlab_core::features::FeatureEngineer;
use forecastlab_core::models::gradient_boosted::{boost, MIN_TRAINING_ROWS};
use forecastlab_core::models::search::randomized_search;
use forecastlab_core::models::{rmse, GbmParams, ModelError};

use crate::config::PipelineConfig;
use crate::pipeline::PipelineError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub train_rows: usize,
    pub test_rows: usize,
    pub params: GbmParams,
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Mean absolute percentage error, in percent, over non-zero actuals.
    pub mape: f64,
    /// Share of test rows (percent) where the predicted move from the current
    /// close has the same sign as the actual move.
    pub directional_accuracy: f64,
    /// Long-or-cash: hold for the next bar only when the prediction exceeds the
    /// current close. Cumulative fractional return.
    pub strategy_return: f64,
    pub buy_and_hold_return: f64,
}

/// Chronological hold-out evaluation of the gradient-boosted model.
pub fn validate_symbol(
    history: &[PriceBar],
    config: &PipelineConfig,
) -> Result<ValidationReport, PipelineError> {
    let target = PriceField::parse(&config.data.target)
        .ok_or_else(|| ModelError::UnknownColumn(config.data.target.clone()))?
        .as_str();
    let table = FeatureEngineer::default().create_features(history)?;
    let set = table
        .supervised(target)
        .ok_or_else(|| ModelError::UnknownColumn(target.to_string()))?;
    let current_col = table
        .column_index(target)
        .ok_or_else(|| ModelError::UnknownColumn(target.to_string()))?;

    let split = (set.len() as f64 * config.validation.train_fraction).floor() as usize;
    if split < MIN_TRAINING_ROWS || split >= set.len() {
        return Err(PipelineError::InsufficientData {
            what: "hold-out validation".to_string(),
            required: MIN_TRAINING_ROWS + 1,
            actual: set.len(),
        });
    }
    let train = set.slice(0..split);
    let test = set.slice(split..set.len());

    let mut params = config.gradient_boosted.params.clone();
    if config.gradient_boosted.optimize {
        params = randomized_search(&params, &config.gradient_boosted.search, &train.x, &train.y)?
            .best;
    }
    let ensemble = boost(&params, &train.x, &train.y);
    let predicted: Vec<f64> = test.x.iter().map(|row| ensemble.predict(row)).collect();
    let current: Vec<f64> = test.x.iter().map(|row| row[current_col]).collect();

    let report = ValidationReport {
        train_rows: train.len(),
        test_rows: test.len(),
        params,
        rmse: rmse(&test.y, &predicted),
        mae: mae(&test.y, &predicted),
        r2: r_squared(&test.y, &predicted),
        mape: mape(&test.y, &predicted),
        directional_accuracy: directional_accuracy(&current, &test.y, &predicted),
        strategy_return: long_or_cash_return(&current, &test.y, &predicted),
        buy_and_hold_return: buy_and_hold_return(&current, &test.y),
    };
    info!(
        train = report.train_rows,
        test = report.test_rows,
        rmse = report.rmse,
        directional_accuracy = report.directional_accuracy,
        "hold-out validation finished"
    );
    Ok(report)
}

// ─── Individual metric functions ────────────────────────────────────

/// Mean absolute error.
pub fn mae(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).abs())
        .sum::<f64>()
        / actual.len() as f64
}

/// Coefficient of determination. 0.0 for a constant actual series.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    if actual.is_empty() {
        return 0.0;
    }
    let mean = actual.iter().sum::<f64>() / actual.len() as f64;
    let ss_tot: f64 = actual.iter().map(|a| (a - mean).powi(2)).sum();
    if ss_tot == 0.0 {
        return 0.0;
    }
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(a, p)| (a - p).powi(2))
        .sum();
    1.0 - ss_res / ss_tot
}

/// Mean absolute percentage error in percent, skipping zero actuals.
pub fn mape(actual: &[f64], predicted: &[f64]) -> f64 {
    let terms: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .filter(|(a, _)| **a != 0.0)
        .map(|(a, p)| ((a - p) / a).abs())
        .collect();
    if terms.is_empty() {
        return 0.0;
    }
    terms.iter().sum::<f64>() / terms.len() as f64 * 100.0
}

/// Percent of rows where sign(predicted - current) == sign(actual - current).
pub fn directional_accuracy(current: &[f64], actual: &[f64], predicted: &[f64]) -> f64 {
    if current.is_empty() {
        return 0.0;
    }
    let hits = current
        .iter()
        .zip(actual)
        .zip(predicted)
        .filter(|((c, a), p)| sign(**a - **c) == sign(**p - **c))
        .count();
    hits as f64 / current.len() as f64 * 100.0
}

/// Cumulative return of holding for the next bar only when `predicted > current`.
pub fn long_or_cash_return(current: &[f64], actual: &[f64], predicted: &[f64]) -> f64 {
    let log_sum: f64 = current
        .iter()
        .zip(actual)
        .zip(predicted)
        .filter(|((c, _), p)| **p > **c)
        .map(|((c, a), _)| (a / c).ln())
        .sum();
    log_sum.exp() - 1.0
}

/// Cumulative return of holding through every test bar.
pub fn buy_and_hold_return(current: &[f64], actual: &[f64]) -> f64 {
    let log_sum: f64 = current.iter().zip(actual).map(|(c, a)| (a / c).ln()).sum();
    log_sum.exp() - 1.0
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}
