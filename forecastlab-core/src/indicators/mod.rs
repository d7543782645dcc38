//! Technical indicators used by the feature engineer.
//!
//! Indicators are pure functions: bar history in, numeric series out. Every
//! output series has the same length as its input, with `f64::NAN` during the
//! warm-up period.
//!
//! Multi-series indicators (Bollinger, MACD) are exposed as separate named
//! instances per line, keeping the single-series `Indicator` trait unchanged.

pub mod atr;
pub mod bollinger;
pub mod cci;
pub mod ema;
pub mod macd;
pub mod obv;
pub mod rsi;
pub mod sma;
pub mod vwap;

pub use atr::Atr;
pub use bollinger::{Bollinger, BollingerBand};
pub use cci::Cci;
pub use ema::Ema;
pub use macd::{Macd, MacdLine};
pub use obv::Obv;
pub use rsi::Rsi;
pub use sma::Sma;
pub use vwap::Vwap;

use crate::domain::PriceBar;

/// Trait for indicators.
///
/// # Look-ahead contamination guard
/// No indicator value at bar t may depend on price data from bar t+1 or later.
/// Every indicator must pass the truncated-vs-full series test.
pub trait Indicator: Send + Sync {
    /// Column name in the feature table (e.g., "sma_20", "atr").
    fn name(&self) -> &str;

    /// Number of bars before the first valid output value.
    fn lookback(&self) -> usize;

    /// Compute the indicator for the entire bar series.
    fn compute(&self, bars: &[PriceBar]) -> Vec<f64>;
}

/// Shift a series forward by `k` periods (value at t is the input at t-k).
pub fn lag(values: &[f64], k: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];
    for i in k..n {
        result[i] = values[i - k];
    }
    result
}

/// Create synthetic bars from close prices for testing.
///
/// Generates plausible OHLV: open = prev_close (or close for first bar),
/// high = max(open,close) + 1.0, low = min(open,close) - 1.0, volume = 1000.
#[cfg(test)]
pub fn make_bars(closes: &[f64]) -> Vec<PriceBar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 1.0,
                low: open.min(close) - 1.0,
                close,
                volume: 1000,
            }
        })
        .collect()
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;
