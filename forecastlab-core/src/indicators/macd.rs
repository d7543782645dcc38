//! Moving Average Convergence Divergence (MACD).
//!
//! - MACD line: EMA(fast) - EMA(slow)
//! - Signal line: EMA(signal) of the MACD line
//! - Diff (histogram): MACD - signal
//!
//! Lookback: slow - 1 for the MACD line, slow + signal - 2 for signal and diff.

use super::ema::ema_of_series;
use super::Indicator;
use crate::domain::PriceBar;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacdLine {
    Macd,
    Signal,
    Diff,
}

#[derive(Debug, Clone)]
pub struct Macd {
    fast: usize,
    slow: usize,
    signal: usize,
    line: MacdLine,
}

impl Macd {
    pub fn new(line: MacdLine, fast: usize, slow: usize, signal: usize) -> Self {
        assert!(fast >= 1 && signal >= 1, "MACD periods must be >= 1");
        assert!(fast < slow, "MACD fast period must be shorter than slow");
        Self {
            fast,
            slow,
            signal,
            line,
        }
    }

    /// The conventional 12/26/9 configuration.
    pub fn standard(line: MacdLine) -> Self {
        Self::new(line, 12, 26, 9)
    }
}

impl Indicator for Macd {
    fn name(&self) -> &str {
        match self.line {
            MacdLine::Macd => "macd",
            MacdLine::Signal => "macd_signal",
            MacdLine::Diff => "macd_diff",
        }
    }

    fn lookback(&self) -> usize {
        match self.line {
            MacdLine::Macd => self.slow - 1,
            MacdLine::Signal | MacdLine::Diff => self.slow + self.signal - 2,
        }
    }

    fn compute(&self, bars: &[PriceBar]) -> Vec<f64> {
        let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let fast = ema_of_series(&closes, self.fast);
        let slow = ema_of_series(&closes, self.slow);
        let macd: Vec<f64> = fast.iter().zip(&slow).map(|(f, s)| f - s).collect();

        match self.line {
            MacdLine::Macd => macd,
            MacdLine::Signal => ema_of_series(&macd, self.signal),
            MacdLine::Diff => {
                let signal = ema_of_series(&macd, self.signal);
                macd.iter().zip(&signal).map(|(m, s)| m - s).collect()
            }
        }
    }
}
