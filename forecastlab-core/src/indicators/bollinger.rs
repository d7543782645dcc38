//! Bollinger Bands — moving average +/- standard deviation multiplier.
//!
//! One instance per band:
//! - High: SMA(close, period) + mult * stddev(close, period)
//! - Low: SMA(close, period) - mult * stddev(close, period)
//!
//! Uses population stddev (divide by N).
//! Lookback: period - 1.

use super::Indicator;
use crate::domain::PriceBar;

/// Which band of the Bollinger Bands to compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BollingerBand {
    High,
    Low,
}

#[derive(Debug, Clone)]
pub struct Bollinger {
    period: usize,
    multiplier: f64,
    band: BollingerBand,
}

impl Bollinger {
    pub fn new(band: BollingerBand, period: usize, multiplier: f64) -> Self {
        assert!(period >= 1, "Bollinger period must be >= 1");
        Self {
            period,
            multiplier,
            band,
        }
    }

    pub fn high(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::High, period, multiplier)
    }

    pub fn low(period: usize, multiplier: f64) -> Self {
        Self::new(BollingerBand::Low, period, multiplier)
    }
}

impl Indicator for Bollinger {
    fn name(&self) -> &str {
        match self.band {
            BollingerBand::High => "bb_high",
            BollingerBand::Low => "bb_low",
        }
    }

    fn lookback(&self) -> usize {
        self.period.saturating_sub(1)
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let n = bars.len();
        let mut result = vec![f64::NAN; n];

        if n < self.period {
            return result;
        }

        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        for (offset, window) in closes.windows(self.period).enumerate() {
            let mean = window.iter().sum::<f64>() / self.period as f64;
            if mean.is_nan() {
                continue;
            }
            let variance = window.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / self.period as f64;
            let width = self.multiplier * variance.sqrt();

            result[offset + self.period - 1] = match self.band {
                BollingerBand::High => mean + width,
                BollingerBand::Low => mean - width,
            };
        }

        result
    }
}
