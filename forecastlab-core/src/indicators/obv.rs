//! On-Balance Volume (OBV).
//!
//! Cumulative volume, subtracted on bars that close below the previous close and
//! added otherwise. The first bar adds its volume.
//! Lookback: 0.

use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone, Default)]
pub struct Obv;

impl Obv {
    pub fn new() -> Self {
        Self
    }
}

impl Indicator for Obv {
    fn name(&self) -> &str {
        "obv"
    }

    fn lookback(&self) -> usize {
        0
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let mut result = Vec::with_capacity(bars.len());
        let mut running = 0.0;
        for (i, bar) in bars.iter().enumerate() {
            let volume = bar.volume as f64;
            if i > 0 && bar.close < bars[i - 1].close {
                running -= volume;
            } else {
                running += volume;
            }
            result.push(running);
        }
        result
    }
}
