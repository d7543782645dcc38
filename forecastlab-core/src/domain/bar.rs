//! PriceBar — the fundamental market data unit — and history validation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Daily OHLCV bar for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
}

impl PriceBar {
    /// Typical price: (high + low + close) / 3.
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    /// Returns true if any OHLC field is NaN or infinite.
    pub fn is_void(&self) -> bool {
        !(self.open.is_finite()
            && self.high.is_finite()
            && self.low.is_finite()
            && self.close.is_finite())
    }

    /// Basic OHLC sanity check: finite, positive, high >= low.
    pub fn is_sane(&self) -> bool {
        !self.is_void()
            && self.high >= self.low
            && self.open > 0.0
            && self.high > 0.0
            && self.low > 0.0
            && self.close > 0.0
    }

    /// Read a named price field. Names match the engineered feature columns.
    pub fn field(&self, field: PriceField) -> f64 {
        match field {
            PriceField::Open => self.open,
            PriceField::High => self.high,
            PriceField::Low => self.low,
            PriceField::Close => self.close,
            PriceField::Volume => self.volume as f64,
        }
    }
}

/// A raw column of a price history, addressable by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceField {
    Open,
    High,
    Low,
    Close,
    Volume,
}

impl PriceField {
    /// Parse a column name (case-insensitive): `open`, `high`, `low`, `close`, `volume`.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "open" => Some(Self::Open),
            "high" => Some(Self::High),
            "low" => Some(Self::Low),
            "close" => Some(Self::Close),
            "volume" => Some(Self::Volume),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::High => "high",
            Self::Low => "low",
            Self::Close => "close",
            Self::Volume => "volume",
        }
    }
}

/// Errors raised while loading or validating a price history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("malformed history: {0}")]
    Malformed(String),

    #[error("no history for symbol '{symbol}'")]
    NotFound { symbol: String },

    #[error("history I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("history parse error: {0}")]
    Parse(String),
}

/// Validate a history against the provider contract.
///
/// Dates must be strictly increasing (which also rules out duplicate dates) and every
/// bar must pass [`PriceBar::is_sane`]. Fails fast on the first violation.
pub fn validate_history(bars: &[PriceBar]) -> Result<(), HistoryError> {
    for (i, bar) in bars.iter().enumerate() {
        if !bar.is_sane() {
            return Err(HistoryError::Malformed(format!(
                "bar {i} ({}) has invalid prices: open={} high={} low={} close={}",
                bar.date, bar.open, bar.high, bar.low, bar.close
            )));
        }
        if i > 0 && bar.date <= bars[i - 1].date {
            return Err(HistoryError::Malformed(format!(
                "dates not strictly increasing at bar {i}: {} follows {}",
                bar.date,
                bars[i - 1].date
            )));
        }
    }
    Ok(())
}

/// Extract one field of a history as a series.
pub fn series(bars: &[PriceBar], field: PriceField) -> Vec<f64> {
    bars.iter().map(|b| b.field(field)).collect()
}
