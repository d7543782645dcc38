//! GARCH(1,1) conditional volatility with a constant mean.
//!
//! Fitted on percentage returns (×100) of the target series:
//!
//! r_t = mu + e_t,  e_t ~ N(0, s2_t)
//! s2_t = omega + alpha * e_{t-1}^2 + beta * s2_{t-1}
//!
//! Parameters come from Gaussian maximum likelihood via Nelder–Mead over an
//! unconstrained re-parameterization (omega = exp(u), alpha + beta = logistic(v),
//! alpha share = logistic(w)), which keeps omega > 0, alpha, beta >= 0 and
//! alpha + beta < 1. The variance recursion starts from the sample variance.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, warn};

use super::optimize::{nelder_mead, NelderMeadConfig};
use super::{
    decode_envelope, encode_envelope, parse_target, ConvergenceStatus, ForecastModel, ModelError,
    ModelInput, TrainReport,
};
use crate::domain::{future_dates, series, Forecast, ForecastPoint, ModelKind};
use crate::fingerprint::DatasetHash;

pub const MIN_RETURNS: usize = 30;

/// Starting persistence and ARCH share for the optimizer.
const START_PERSISTENCE: f64 = 0.95;
const START_ALPHA: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolatilityParams {
    pub max_iterations: usize,
    pub tolerance: f64,
}

impl Default for VolatilityParams {
    fn default() -> Self {
        Self {
            max_iterations: 2000,
            tolerance: 1e-9,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolatilityFit {
    pub target: String,
    pub mu: f64,
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    /// One-step-ahead variance at the end of the training sample.
    pub next_variance: f64,
    pub last_training_date: NaiveDate,
    pub convergence: ConvergenceStatus,
}

impl VolatilityFit {
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    /// Long-run (unconditional) variance.
    pub fn long_run_variance(&self) -> f64 {
        self.omega / (1.0 - self.persistence())
    }

    /// Standard deviation forecasts for steps 1..=h, mean-reverting to the
    /// long-run variance.
    pub fn forecast_std(&self, steps: usize) -> Vec<f64> {
        let long_run = self.long_run_variance();
        let persistence = self.persistence();
        (0..steps)
            .map(|k| {
                let var = long_run + persistence.powi(k as i32) * (self.next_variance - long_run);
                var.max(0.0).sqrt()
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Garch {
    mu: f64,
    omega: f64,
    alpha: f64,
    beta: f64,
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}

impl Garch {
    fn from_raw(theta: &[f64]) -> Self {
        let persistence = logistic(theta[2]);
        let share = logistic(theta[3]);
        Self {
            mu: theta[0],
            omega: theta[1].exp(),
            alpha: persistence * share,
            beta: persistence * (1.0 - share),
        }
    }

    fn to_raw(self) -> Vec<f64> {
        let persistence = self.alpha + self.beta;
        vec![
            self.mu,
            self.omega.ln(),
            logit(persistence),
            logit(self.alpha / persistence),
        ]
    }

    /// Conditional variances s2_0..s2_{n-1} plus the one-step-ahead s2_n.
    fn variances(&self, returns: &[f64], backcast: f64) -> Vec<f64> {
        let mut s2 = Vec::with_capacity(returns.len() + 1);
        let mut prev = backcast;
        s2.push(prev);
        for r in returns {
            let e = r - self.mu;
            prev = self.omega + self.alpha * e * e + self.beta * prev;
            s2.push(prev);
        }
        s2
    }

    fn log_likelihood(&self, returns: &[f64], backcast: f64) -> f64 {
        let s2 = self.variances(returns, backcast);
        let mut ll = 0.0;
        for (r, var) in returns.iter().zip(&s2) {
            let e = r - self.mu;
            ll -= 0.5 * ((2.0 * PI).ln() + var.ln() + e * e / var);
        }
        ll
    }
}

/// Percentage returns ×100 of a price series.
pub fn percent_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .map(|w| 100.0 * (w[1] / w[0] - 1.0))
        .collect()
}

#[derive(Debug, Clone)]
pub struct VolatilityModel {
    params: VolatilityParams,
    fit: Option<VolatilityFit>,
    fingerprint: String,
}

impl VolatilityModel {
    pub fn new(params: VolatilityParams) -> Self {
        Self {
            params,
            fit: None,
            fingerprint: String::new(),
        }
    }

    pub fn fitted(&self) -> Option<&VolatilityFit> {
        self.fit.as_ref()
    }
}

impl ForecastModel for VolatilityModel {
    fn kind(&self) -> ModelKind {
        ModelKind::ConditionalVolatility
    }

    fn is_trained(&self) -> bool {
        self.fit.is_some()
    }

    fn train(&mut self, input: &ModelInput<'_>, target: &str) -> Result<TrainReport, ModelError> {
        let field = parse_target(target)?;
        let history = input.history;
        let returns = percent_returns(&series(history, field));
        if returns.len() < MIN_RETURNS {
            return Err(ModelError::InsufficientData {
                kind: self.kind(),
                required: MIN_RETURNS,
                actual: returns.len(),
            });
        }
        if returns.iter().any(|r| !r.is_finite()) {
            return Err(ModelError::Fit("returns contain non-finite values".into()));
        }

        let n = returns.len() as f64;
        let mean = returns.iter().sum::<f64>() / n;
        let sample_var = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
        if sample_var <= 0.0 {
            return Err(ModelError::Fit("returns have zero variance".into()));
        }

        let start = Garch {
            mu: mean,
            omega: sample_var * (1.0 - START_PERSISTENCE),
            alpha: START_ALPHA,
            beta: START_PERSISTENCE - START_ALPHA,
        };
        let config = NelderMeadConfig {
            max_iterations: self.params.max_iterations,
            tolerance: self.params.tolerance,
            initial_step: 0.1,
        };
        let minimum = nelder_mead(
            |theta| -Garch::from_raw(theta).log_likelihood(&returns, sample_var),
            &start.to_raw(),
            config,
        );
        let garch = Garch::from_raw(&minimum.point);
        let log_likelihood = -minimum.value;
        if !log_likelihood.is_finite() {
            return Err(ModelError::Fit("likelihood is not finite at the optimum".into()));
        }

        let convergence = ConvergenceStatus {
            converged: minimum.converged,
            iterations: minimum.iterations,
            log_likelihood,
            persistence: garch.alpha + garch.beta,
        };
        if convergence.converged {
            debug!(
                iterations = convergence.iterations,
                log_likelihood,
                omega = garch.omega,
                alpha = garch.alpha,
                beta = garch.beta,
                "GARCH fit converged"
            );
        } else {
            warn!(
                iterations = convergence.iterations,
                log_likelihood, "GARCH fit did not converge; using best parameters found"
            );
        }

        let variances = garch.variances(&returns, sample_var);
        let next_variance = variances[variances.len() - 1];
        let last_training_date = history
            .last()
            .map(|b| b.date)
            .ok_or_else(|| ModelError::Fit("empty history".into()))?;

        self.fingerprint = DatasetHash::of_history(history).0;
        self.fit = Some(VolatilityFit {
            target: field.as_str().to_string(),
            mu: garch.mu,
            omega: garch.omega,
            alpha: garch.alpha,
            beta: garch.beta,
            next_variance,
            last_training_date,
            convergence: convergence.clone(),
        });

        Ok(TrainReport {
            kind: self.kind(),
            samples: returns.len(),
            in_sample_rmse: None,
            convergence: Some(convergence),
            fingerprint: self.fingerprint.clone(),
        })
    }

    /// Forward standard deviation (percent) for each of `steps` calendar days
    /// after the training sample. The feature table is ignored.
    fn predict(&self, _input: &ModelInput<'_>, steps: usize) -> Result<Forecast, ModelError> {
        let fit = self.fit.as_ref().ok_or(ModelError::NotTrained(self.kind()))?;
        let points = future_dates(fit.last_training_date, steps)
            .into_iter()
            .zip(fit.forecast_std(steps))
            .map(|(target_date, point_estimate)| ForecastPoint {
                target_date,
                point_estimate,
                interval: None,
            })
            .collect();
        Ok(Forecast {
            kind: self.kind(),
            points,
        })
    }

    fn to_blob(&self) -> Result<Vec<u8>, ModelError> {
        let fit = self.fit.as_ref().ok_or(ModelError::NotTrained(self.kind()))?;
        encode_envelope(self.kind(), &self.params, fit, &self.fingerprint)
    }

    fn load_blob(&mut self, blob: &[u8]) -> Result<(), ModelError> {
        let envelope = decode_envelope::<VolatilityParams, VolatilityFit>(self.kind(), blob)?;
        self.params = envelope.hyperparameters;
        self.fit = Some(envelope.params);
        self.fingerprint = envelope.fingerprint;
        Ok(())
    }
}
