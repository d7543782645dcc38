//! Average True Range (ATR).
//!
//! True Range: max(high-low, |high-prev_close|, |low-prev_close|)
//! ATR uses Wilder smoothing (alpha = 1/period), seeded with the mean of the first
//! `period` proper true ranges.
//! Lookback: period.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Atr {
    period: usize,
}

impl Atr {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "ATR period must be >= 1");
        Self { period }
    }
}

/// True Range series. TR[0] is NaN because bar 0 has no previous close.
pub fn true_range(bars: &[PriceBar]) -> Vec<f64> {
    let mut tr = vec![f64::NAN; bars.len()];
    for (i, pair) in bars.windows(2).enumerate() {
        let prev_close = pair[0].close;
        let bar = &pair[1];
        tr[i + 1] = (bar.high - bar.low)
            .max((bar.high - prev_close).abs())
            .max((bar.low - prev_close).abs());
    }
    tr
}

/// Wilder smoothing. The seed window starts at the first non-NaN value.
pub fn wilder_smooth(values: &[f64], period: usize) -> Vec<f64> {
    let n = values.len();
    let mut result = vec![f64::NAN; n];

    if period == 0 {
        return result;
    }
    let start = match values.iter().position(|v| !v.is_nan()) {
        Some(s) => s,
        None => return result,
    };
    let seed_end = start + period;
    if seed_end > n || values[start..seed_end].iter().any(|v| v.is_nan()) {
        return result;
    }

    let mut prev = values[start..seed_end].iter().sum::<f64>() / period as f64;
    result[seed_end - 1] = prev;

    let alpha = 1.0 / period as f64;
    for i in seed_end..n {
        if values[i].is_nan() {
            return result;
        }
        prev = alpha * values[i] + (1.0 - alpha) * prev;
        result[i] = prev;
    }

    result
}

impl Indicator for Atr {
    fn name(&self) -> &str {
        "atr"
    }

    fn lookback(&self) -> usize {
        self.period
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        wilder_smooth(&true_range(bars), self.period)
    }
}
