//! Rolling Volume-Weighted Average Price (VWAP).
//!
//! sum(TP * volume) / sum(volume) over the trailing window. A window with no
//! traded volume falls back to the plain mean of the typical price.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone)]
pub struct Vwap {
    period: usize,
}

impl Vwap {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "VWAP period must be >= 1");
        Self { period }
    }
}

impl Indicator for Vwap {
    fn name(&self) -> &str {
        "vwap"
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let mut result = vec![f64::NAN; bars.len()];

        for (offset, window) in bars.windows(self.period).enumerate() {
            let volume: f64 = window.iter().map(|b| b.volume as f64).sum();
            result[offset + self.period - 1] = if volume > 0.0 {
                window
                    .iter()
                    .map(|b| b.typical_price() * b.volume as f64)
                    .sum::<f64>()
                    / volume
            } else {
                window.iter().map(PriceBar::typical_price).sum::<f64>() / self.period as f64
            };
        }

        result
    }
}
