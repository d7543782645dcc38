//! Additive trend/seasonality/holiday decomposition.
//!
//! y(t) = trend(t) + weekly(t) + yearly(t) + holidays(t)
//!
//! - Trend: piecewise linear in scaled time, with potential changepoints spread
//!   over the first `changepoint_range` of the history. Each changepoint adds a
//!   slope delta `(t - s_j)+`; deltas carry a ridge penalty of
//!   `1 / changepoint_prior_scale`.
//! - Seasonality: Fourier series of order `daily_order` (period 1 day),
//!   `weekly_order` (period 7 days) and `yearly_order` (period 365.25 days).
//!   Daily bars sample the daily series at phase zero, so its terms are
//!   constant and end up folded into the intercept.
//! - Holidays: one indicator per fixed-date holiday seen in the training window.
//!
//! All coefficients come from one ridge-regularized least-squares solve on the
//! target divided by its absolute maximum: `(XᵀX + diag(penalties)) β = Xᵀy`
//! by Cholesky factorization. The forecast interval is
//! `point ± z * residual_std` with z the normal quantile for `interval_width`.

use chrono::{Datelike, NaiveDate};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::debug;

use super::holidays::{calendar, holiday_on};
use super::{
    decode_envelope, encode_envelope, parse_target, rmse, ForecastModel, ModelError, ModelInput,
    TrainReport,
};
use crate::domain::{future_dates, series, Forecast, ForecastPoint, Interval, ModelKind};
use crate::fingerprint::DatasetHash;

pub const MIN_TRAINING_BARS: usize = 30;

const DAILY_PERIOD: f64 = 1.0;
const WEEKLY_PERIOD: f64 = 7.0;
const YEARLY_PERIOD: f64 = 365.25;
/// Penalty on the intercept and base slope, for numerical stability only.
const BASE_PENALTY: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionParams {
    pub n_changepoints: usize,
    pub changepoint_range: f64,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    pub holidays_prior_scale: f64,
    pub daily_order: usize,
    pub weekly_order: usize,
    pub yearly_order: usize,
    /// ISO country code for the holiday calendar; empty disables holidays.
    pub country: String,
    pub interval_width: f64,
}

impl Default for DecompositionParams {
    fn default() -> Self {
        Self {
            n_changepoints: 25,
            changepoint_range: 0.8,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            holidays_prior_scale: 10.0,
            daily_order: 4,
            weekly_order: 3,
            yearly_order: 10,
            country: "TR".to_string(),
            interval_width: 0.8,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionFit {
    pub target: String,
    /// Day number (days from CE) of the first training date.
    pub start_day: i32,
    /// Days between the first and last training date.
    pub span_days: f64,
    pub y_scale: f64,
    /// Changepoint locations in scaled time.
    pub changepoints: Vec<f64>,
    pub holidays: Vec<String>,
    pub coefficients: Vec<f64>,
    pub residual_std: f64,
    pub last_training_date: NaiveDate,
}

#[derive(Debug, Clone)]
pub struct DecompositionModel {
    params: DecompositionParams,
    fit: Option<DecompositionFit>,
    fingerprint: String,
}

impl DecompositionModel {
    pub fn new(params: DecompositionParams) -> Self {
        Self {
            params,
            fit: None,
            fingerprint: String::new(),
        }
    }

    pub fn params(&self) -> &DecompositionParams {
        &self.params
    }

    pub fn fitted(&self) -> Option<&DecompositionFit> {
        self.fit.as_ref()
    }

    /// Point estimate for an arbitrary date using the fitted components.
    pub fn estimate(&self, date: NaiveDate) -> Result<f64, ModelError> {
        let fit = self.fit.as_ref().ok_or(ModelError::NotTrained(self.kind()))?;
        let x = design_matrix(&self.params, fit, &[date])?;
        Ok(evaluate(&x, fit)[0])
    }
}

fn scaled_time(fit: &DecompositionFit, date: NaiveDate) -> f64 {
    (date.num_days_from_ce() - fit.start_day) as f64 / fit.span_days
}

/// Changepoint locations: evenly spaced training rows over the first
/// `range` of history, excluding the first row.
fn place_changepoints(t: &[f64], n_changepoints: usize, range: f64) -> Vec<f64> {
    let hist = ((t.len() as f64) * range).floor() as usize;
    if hist < 2 {
        return Vec::new();
    }
    let count = n_changepoints.min(hist - 1);
    if count == 0 {
        return Vec::new();
    }
    (1..=count)
        .map(|j| {
            let idx = ((j as f64) * (hist - 1) as f64 / count as f64).round() as usize;
            t[idx]
        })
        .collect()
}

fn fourier_terms(day: f64, period: f64, order: usize, out: &mut Vec<f64>) {
    for k in 1..=order {
        let angle = 2.0 * PI * k as f64 * day / period;
        out.push(angle.sin());
        out.push(angle.cos());
    }
}

/// `[1, t, (t - s_j)+ ..., daily..., weekly..., yearly..., holiday indicators...]`
fn design_row(
    params: &DecompositionParams,
    fit: &DecompositionFit,
    date: NaiveDate,
) -> Result<Vec<f64>, ModelError> {
    let cal = calendar(&params.country)
        .ok_or_else(|| ModelError::Fit(format!("no holiday calendar for '{}'", params.country)))?;
    let t = scaled_time(fit, date);
    let day = date.num_days_from_ce() as f64;

    let mut row = Vec::with_capacity(fit.coefficients.len().max(2));
    row.push(1.0);
    row.push(t);
    row.extend(fit.changepoints.iter().map(|s| (t - s).max(0.0)));
    fourier_terms(day, DAILY_PERIOD, params.daily_order, &mut row);
    fourier_terms(day, WEEKLY_PERIOD, params.weekly_order, &mut row);
    fourier_terms(day, YEARLY_PERIOD, params.yearly_order, &mut row);
    let today = holiday_on(cal, date);
    row.extend(
        fit.holidays
            .iter()
            .map(|name| if today == Some(name.as_str()) { 1.0 } else { 0.0 }),
    );
    Ok(row)
}

/// One design row per date, stacked.
fn design_matrix(
    params: &DecompositionParams,
    fit: &DecompositionFit,
    dates: &[NaiveDate],
) -> Result<DMatrix<f64>, ModelError> {
    let rows = dates
        .iter()
        .map(|&date| design_row(params, fit, date))
        .collect::<Result<Vec<_>, _>>()?;
    let width = rows.first().map_or(fit.coefficients.len(), Vec::len);
    let data: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(DMatrix::from_row_slice(dates.len(), width, &data))
}

/// Solve `(XᵀX + diag(penalties)) β = Xᵀy`.
///
/// `None` when the regularized normal matrix is not positive definite (a zero
/// column without penalty).
fn ridge_solve(x: &DMatrix<f64>, y: &DVector<f64>, penalties: &[f64]) -> Option<DVector<f64>> {
    let penalty = DMatrix::from_diagonal(&DVector::from_vec(penalties.to_vec()));
    let xtx = x.transpose() * x + penalty;
    let xty = x.transpose() * y;
    xtx.cholesky().map(|c| c.solve(&xty))
}

/// Fitted values in target units.
fn evaluate(x: &DMatrix<f64>, fit: &DecompositionFit) -> Vec<f64> {
    let beta = DVector::from_vec(fit.coefficients.clone());
    (x * beta).iter().map(|v| v * fit.y_scale).collect()
}

/// Inverse standard normal CDF (Acklam's rational approximation, |rel err| < 1.2e-9).
pub fn normal_quantile(p: f64) -> f64 {
    const A: [f64; 6] = [
        -3.969683028665376e1,
        2.209460984245205e2,
        -2.759285104469687e2,
        1.383577518672690e2,
        -3.066479806614716e1,
        2.506628277459239e0,
    ];
    const B: [f64; 5] = [
        -5.447609879822406e1,
        1.615858368580409e2,
        -1.556989798598866e2,
        6.680131188771972e1,
        -1.328068155288572e1,
    ];
    const C: [f64; 6] = [
        -7.784894002430293e-3,
        -3.223964580411365e-1,
        -2.400758277161838e0,
        -2.549732539343734e0,
        4.374664141464968e0,
        2.938163982698783e0,
    ];
    const D: [f64; 4] = [
        7.784695709041462e-3,
        3.224671290700398e-1,
        2.445134137142996e0,
        3.754408661907416e0,
    ];
    const P_LOW: f64 = 0.02425;

    if p <= 0.0 {
        return f64::NEG_INFINITY;
    }
    if p >= 1.0 {
        return f64::INFINITY;
    }
    let tail = |q: f64| {
        (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
            / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
    };
    if p < P_LOW {
        tail((-2.0 * p.ln()).sqrt())
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        -tail((-2.0 * (1.0 - p).ln()).sqrt())
    }
}

impl ForecastModel for DecompositionModel {
    fn kind(&self) -> ModelKind {
        ModelKind::Decomposition
    }

    fn is_trained(&self) -> bool {
        self.fit.is_some()
    }

    fn train(&mut self, input: &ModelInput<'_>, target: &str) -> Result<TrainReport, ModelError> {
        let field = parse_target(target)?;
        let history = input.history;
        if history.len() < MIN_TRAINING_BARS {
            return Err(ModelError::InsufficientData {
                kind: self.kind(),
                required: MIN_TRAINING_BARS,
                actual: history.len(),
            });
        }
        let cal = calendar(&self.params.country).ok_or_else(|| {
            ModelError::Fit(format!("no holiday calendar for '{}'", self.params.country))
        })?;

        let y = series(history, field);
        let y_scale = y.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        if y_scale == 0.0 || !y_scale.is_finite() {
            return Err(ModelError::Fit("target series is all zero".into()));
        }

        let first = history[0].date;
        let last = history[history.len() - 1].date;
        let start_day = first.num_days_from_ce();
        let span_days = ((last.num_days_from_ce() - start_day) as f64).max(1.0);
        let t: Vec<f64> = history
            .iter()
            .map(|b| (b.date.num_days_from_ce() - start_day) as f64 / span_days)
            .collect();

        let mut holidays: Vec<String> = Vec::new();
        for (_, _, name) in cal {
            if history.iter().any(|b| holiday_on(cal, b.date) == Some(*name)) {
                holidays.push(name.to_string());
            }
        }

        let changepoints = place_changepoints(
            &t,
            self.params.n_changepoints,
            self.params.changepoint_range,
        );
        let mut fit = DecompositionFit {
            target: field.as_str().to_string(),
            start_day,
            span_days,
            y_scale,
            changepoints,
            holidays,
            coefficients: Vec::new(),
            residual_std: 0.0,
            last_training_date: last,
        };

        let mut penalties = vec![BASE_PENALTY, BASE_PENALTY];
        penalties.extend(vec![
            1.0 / self.params.changepoint_prior_scale;
            fit.changepoints.len()
        ]);
        let seasonal_terms =
            2 * (self.params.daily_order + self.params.weekly_order + self.params.yearly_order);
        penalties.extend(vec![
            1.0 / self.params.seasonality_prior_scale.powi(2);
            seasonal_terms
        ]);
        penalties.extend(vec![
            1.0 / self.params.holidays_prior_scale.powi(2);
            fit.holidays.len()
        ]);

        let dates: Vec<NaiveDate> = history.iter().map(|b| b.date).collect();
        let x = design_matrix(&self.params, &fit, &dates)?;
        let scaled = DVector::from_vec(y.iter().map(|v| v / y_scale).collect());
        let beta = ridge_solve(&x, &scaled, &penalties)
            .ok_or_else(|| ModelError::Fit("normal equations are singular".into()))?;
        fit.coefficients = beta.iter().copied().collect();

        let fitted = evaluate(&x, &fit);
        let in_sample = rmse(&y, &fitted);
        fit.residual_std = in_sample;
        debug!(
            bars = history.len(),
            changepoints = fit.changepoints.len(),
            holidays = fit.holidays.len(),
            rmse = in_sample,
            "decomposition fitted"
        );

        self.fingerprint = DatasetHash::of_history(history).0;
        self.fit = Some(fit);

        Ok(TrainReport {
            kind: self.kind(),
            samples: history.len(),
            in_sample_rmse: Some(in_sample),
            convergence: None,
            fingerprint: self.fingerprint.clone(),
        })
    }

    /// Forecast `steps` consecutive calendar days after the last training date.
    /// The feature table is ignored.
    fn predict(&self, _input: &ModelInput<'_>, steps: usize) -> Result<Forecast, ModelError> {
        let fit = self.fit.as_ref().ok_or(ModelError::NotTrained(self.kind()))?;
        let z = normal_quantile(0.5 + self.params.interval_width / 2.0);
        let half_width = z * fit.residual_std;

        let dates = future_dates(fit.last_training_date, steps);
        let estimates = evaluate(&design_matrix(&self.params, fit, &dates)?, fit);
        let points = dates
            .into_iter()
            .zip(estimates)
            .map(|(target_date, point_estimate)| ForecastPoint {
                target_date,
                point_estimate,
                interval: Some(Interval {
                    lower: point_estimate - half_width,
                    upper: point_estimate + half_width,
                }),
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
        let envelope =
            decode_envelope::<DecompositionParams, DecompositionFit>(self.kind(), blob)?;
        self.params = envelope.hyperparameters;
        self.fit = Some(envelope.params);
        self.fingerprint = envelope.fingerprint;
        Ok(())
    }
}
