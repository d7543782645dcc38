//! Commodity Channel Index (CCI).
//!
//! CCI = (TP - SMA(TP)) / (0.015 * MAD(TP)), where TP is the typical price and
//! MAD the mean absolute deviation around the window mean.
//! A flat window (MAD == 0) yields 0.
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::PriceBar;

pub const CCI_CONSTANT: f64 = 0.015;

#[derive(Debug, Clone)]
pub struct Cci {
    period: usize,
}

impl Cci {
    pub fn new(period: usize) -> Self {
        assert!(period >= 1, "CCI period must be >= 1");
        Self { period }
    }
}

impl Indicator for Cci {
    fn name(&self) -> &str {
        "cci"
    }

    fn lookback(&self) -> usize {
        self.period - 1
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let typical: Vec<f64> = bars.iter().map(PriceBar::typical_price).collect();
        let mut result = vec![f64::NAN; typical.len()];

        for (offset, window) in typical.windows(self.period).enumerate() {
            let mean = window.iter().sum::<f64>() / self.period as f64;
            let mad = window.iter().map(|tp| (tp - mean).abs()).sum::<f64>() / self.period as f64;
            let current = window[self.period - 1];
            result[offset + self.period - 1] = if mad == 0.0 {
                0.0
            } else {
                (current - mean) / (CCI_CONSTANT * mad)
            };
        }

        result
    }
}
