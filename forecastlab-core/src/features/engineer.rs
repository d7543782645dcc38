//! Feature Engineer.
//!
//! Builds the feature table from validated history. Every column is computed with
//! indicators that only look backward, then rows with any undefined value
//! (indicator warm-up) are dropped.

use tracing::debug;

use super::table::{FeatureRow, FeatureTable};
use crate::domain::{validate_history, HistoryError, PriceBar};
use crate::indicators::{
    lag, Atr, Bollinger, Cci, Ema, Indicator, Macd, MacdLine, Obv, Rsi, Sma, Vwap,
};

/// Longest indicator window; histories shorter than this produce an empty table.
pub const WARMUP_BARS: usize = 50;

const RSI_PERIOD: usize = 14;
const CCI_PERIOD: usize = 20;
const BOLLINGER_PERIOD: usize = 20;
const BOLLINGER_MULTIPLIER: f64 = 2.0;
const ATR_PERIOD: usize = 14;
const VWAP_PERIOD: usize = 14;

#[derive(Debug, Clone)]
pub struct FeatureEngineer {
    use_lags: bool,
}

impl Default for FeatureEngineer {
    fn default() -> Self {
        Self { use_lags: true }
    }
}

/// Column builder preserving insertion order.
struct Columns {
    names: Vec<String>,
    values: Vec<Vec<f64>>,
}

impl Columns {
    fn push(&mut self, name: &str, values: Vec<f64>) {
        self.names.push(name.to_string());
        self.values.push(values);
    }

    fn push_indicator(&mut self, indicator: &dyn Indicator, bars: &[PriceBar]) -> Vec<f64> {
        let values = indicator.compute(bars);
        self.push(indicator.name(), values.clone());
        values
    }
}

impl FeatureEngineer {
    /// `use_lags = false` omits the lag/return block.
    pub fn new(use_lags: bool) -> Self {
        Self { use_lags }
    }

    /// Column names produced by `create_features`, in order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<&str> = vec![
            "open", "high", "low", "close", "volume", "sma_20", "sma_50", "ema_12", "ema_26",
            "macd", "macd_signal", "macd_diff", "rsi", "cci", "bb_high", "bb_low", "bb_width",
            "atr", "obv", "vwap",
        ];
        if self.use_lags {
            names.extend([
                "lag_close_1",
                "lag_close_2",
                "lag_close_5",
                "lag_vol_1",
                "lag_rsi_1",
                "pct_change",
                "log_return",
            ]);
        }
        names.into_iter().map(String::from).collect()
    }

    pub fn create_features(&self, history: &[PriceBar]) -> Result<FeatureTable, HistoryError> {
        validate_history(history)?;

        let n = history.len();
        let mut cols = Columns {
            names: Vec::new(),
            values: Vec::new(),
        };

        // ── Raw ──
        let closes: Vec<f64> = history.iter().map(|b| b.close).collect();
        let volumes: Vec<f64> = history.iter().map(|b| b.volume as f64).collect();
        cols.push("open", history.iter().map(|b| b.open).collect());
        cols.push("high", history.iter().map(|b| b.high).collect());
        cols.push("low", history.iter().map(|b| b.low).collect());
        cols.push("close", closes.clone());
        cols.push("volume", volumes.clone());

        // ── Trend ──
        cols.push_indicator(&Sma::new(20), history);
        cols.push_indicator(&Sma::new(WARMUP_BARS), history);
        cols.push_indicator(&Ema::new(12), history);
        cols.push_indicator(&Ema::new(26), history);
        cols.push_indicator(&Macd::standard(MacdLine::Macd), history);
        cols.push_indicator(&Macd::standard(MacdLine::Signal), history);
        cols.push_indicator(&Macd::standard(MacdLine::Diff), history);

        // ── Momentum ──
        let rsi = cols.push_indicator(&Rsi::new(RSI_PERIOD), history);
        cols.push_indicator(&Cci::new(CCI_PERIOD), history);

        // ── Volatility ──
        let bb_high = cols.push_indicator(
            &Bollinger::high(BOLLINGER_PERIOD, BOLLINGER_MULTIPLIER),
            history,
        );
        let bb_low = cols.push_indicator(
            &Bollinger::low(BOLLINGER_PERIOD, BOLLINGER_MULTIPLIER),
            history,
        );
        let bb_width = (0..n).map(|i| (bb_high[i] - bb_low[i]) / closes[i]).collect();
        cols.push("bb_width", bb_width);
        cols.push_indicator(&Atr::new(ATR_PERIOD), history);

        // ── Volume ──
        cols.push_indicator(&Obv::new(), history);
        cols.push_indicator(&Vwap::new(VWAP_PERIOD), history);

        // ── Lags and returns ──
        if self.use_lags {
            cols.push("lag_close_1", lag(&closes, 1));
            cols.push("lag_close_2", lag(&closes, 2));
            cols.push("lag_close_5", lag(&closes, 5));
            cols.push("lag_vol_1", lag(&volumes, 1));
            cols.push("lag_rsi_1", lag(&rsi, 1));
            let prev = lag(&closes, 1);
            cols.push(
                "pct_change",
                (0..n).map(|i| closes[i] / prev[i] - 1.0).collect(),
            );
            cols.push(
                "log_return",
                (0..n).map(|i| (closes[i] / prev[i]).ln()).collect(),
            );
        }

        let rows: Vec<FeatureRow> = (0..n)
            .filter_map(|i| {
                let values: Vec<f64> = cols.values.iter().map(|c| c[i]).collect();
                values.iter().all(|v| v.is_finite()).then(|| FeatureRow {
                    date: history[i].date,
                    bar_index: i,
                    values,
                })
            })
            .collect();

        debug!(
            bars = n,
            rows = rows.len(),
            columns = cols.names.len(),
            "feature table built"
        );

        Ok(FeatureTable::new(cols.names, rows))
    }
}
