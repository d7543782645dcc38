//! History providers: where price bars come from.
//!
//! - `CsvHistoryProvider`: a directory of `{SYMBOL}.csv` files
//! - `InMemoryHistoryProvider`: fixed histories for tests and embedding
//! - `SyntheticHistoryProvider`: seeded random walk, development only
//!
//! Every provider returns bars sorted by date and checked with
//! [`validate_history`].

use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use forecastlab_core::domain::{validate_history, HistoryError, PriceBar};

/// Source of daily history for a symbol.
pub trait HistoryProvider: Send + Sync {
    /// Human-readable name of this provider.
    fn name(&self) -> &str;

    fn load_data(&self, symbol: &str) -> Result<Vec<PriceBar>, HistoryError>;

    /// True when the bars are fabricated; results should be tagged.
    fn is_synthetic(&self) -> bool {
        false
    }
}

impl<P: HistoryProvider + ?Sized> HistoryProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn load_data(&self, symbol: &str) -> Result<Vec<PriceBar>, HistoryError> {
        (**self).load_data(symbol)
    }

    fn is_synthetic(&self) -> bool {
        (**self).is_synthetic()
    }
}

// ── CSV ──

/// Reads `{dir}/{SYMBOL}.csv`.
///
/// Headers are matched case-insensitively; English (`Date,Open,High,Low,Close,Volume`)
/// and Turkish (`Tarih,Açılış,Yüksek,Düşük,Kapanış,Hacim`) names are accepted and
/// extra columns are ignored. Dates may be `YYYY-MM-DD` or day-first `DD/MM/YYYY`
/// (also `DD.MM.YYYY`). Blank price cells are filled from the previous row; rows
/// that cannot be filled are dropped.
#[derive(Debug, Clone)]
pub struct CsvHistoryProvider {
    dir: PathBuf,
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    date: usize,
    open: usize,
    high: usize,
    low: usize,
    close: usize,
    volume: usize,
}

impl CsvHistoryProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, symbol: &str) -> PathBuf {
        self.dir.join(format!("{symbol}.csv"))
    }

    /// Parse CSV content already read into memory.
    pub fn parse(content: &str) -> Result<Vec<PriceBar>, HistoryError> {
        let content = content.trim_start_matches('\u{feff}');
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let headers = reader
            .headers()
            .map_err(|e| HistoryError::Parse(format!("header row: {e}")))?
            .clone();
        let columns = map_columns(&headers)?;

        let mut bars: Vec<PriceBar> = Vec::new();
        for (line, record) in reader.records().enumerate() {
            let record = record.map_err(|e| HistoryError::Parse(format!("row {}: {e}", line + 2)))?;
            let raw_date = record.get(columns.date).unwrap_or("");
            if raw_date.is_empty() {
                continue;
            }
            let date = parse_date(raw_date).ok_or_else(|| {
                HistoryError::Parse(format!("row {}: unrecognized date '{raw_date}'", line + 2))
            })?;

            let prev = bars.last();
            let field = |idx: usize, fallback: Option<f64>| -> Result<Option<f64>, HistoryError> {
                match record.get(idx).unwrap_or("") {
                    "" => Ok(fallback),
                    text => parse_number(text).map(Some).ok_or_else(|| {
                        HistoryError::Parse(format!("row {}: bad number '{text}'", line + 2))
                    }),
                }
            };
            let open = field(columns.open, prev.map(|b| b.open))?;
            let high = field(columns.high, prev.map(|b| b.high))?;
            let low = field(columns.low, prev.map(|b| b.low))?;
            let close = field(columns.close, prev.map(|b| b.close))?;
            let volume = field(columns.volume, prev.map(|b| b.volume as f64))?;

            let (Some(open), Some(high), Some(low), Some(close), Some(volume)) =
                (open, high, low, close, volume)
            else {
                continue;
            };
            if !(volume >= 0.0) {
                return Err(HistoryError::Malformed(format!(
                    "row {}: negative volume {volume}",
                    line + 2
                )));
            }
            bars.push(PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume: volume.round() as u64,
            });
        }

        bars.sort_by_key(|b| b.date);
        validate_history(&bars)?;
        Ok(bars)
    }
}

impl HistoryProvider for CsvHistoryProvider {
    fn name(&self) -> &str {
        "csv"
    }

    fn load_data(&self, symbol: &str) -> Result<Vec<PriceBar>, HistoryError> {
        let path = self.path_for(symbol);
        if !path.exists() {
            return Err(HistoryError::NotFound {
                symbol: symbol.to_string(),
            });
        }
        let content = fs::read_to_string(&path)?;
        let bars = Self::parse(&content)?;
        debug!(symbol, bars = bars.len(), path = %path.display(), "history loaded");
        Ok(bars)
    }
}

fn map_columns(headers: &csv::StringRecord) -> Result<ColumnMap, HistoryError> {
    let find = |aliases: &[&str], label: &str| -> Result<usize, HistoryError> {
        headers
            .iter()
            .position(|h| {
                let h = h.trim().to_lowercase();
                aliases.iter().any(|a| h == *a)
            })
            .ok_or_else(|| HistoryError::Malformed(format!("missing column '{label}'")))
    };
    Ok(ColumnMap {
        date: find(&["date", "tarih"], "Date")?,
        open: find(&["open", "açılış"], "Open")?,
        high: find(&["high", "yüksek"], "High")?,
        low: find(&["low", "düşük"], "Low")?,
        close: find(&["close", "kapanış"], "Close")?,
        volume: find(&["volume", "hacim"], "Volume")?,
    })
}

fn parse_date(text: &str) -> Option<NaiveDate> {
    // A trailing time component ("2024-01-02 00:00:00") is ignored.
    let day = text.split_whitespace().next()?;
    ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(day, fmt).ok())
}

fn parse_number(text: &str) -> Option<f64> {
    text.replace('_', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

// ── In-memory ──

#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryProvider {
    histories: HashMap<String, Vec<PriceBar>>,
}

impl InMemoryHistoryProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_history(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.insert(symbol, bars);
        self
    }

    pub fn insert(&mut self, symbol: &str, bars: Vec<PriceBar>) {
        self.histories.insert(symbol.to_string(), bars);
    }
}

impl HistoryProvider for InMemoryHistoryProvider {
    fn name(&self) -> &str {
        "memory"
    }

    fn load_data(&self, symbol: &str) -> Result<Vec<PriceBar>, HistoryError> {
        let bars = self
            .histories
            .get(symbol)
            .cloned()
            .ok_or_else(|| HistoryError::NotFound {
                symbol: symbol.to_string(),
            })?;
        validate_history(&bars)?;
        Ok(bars)
    }
}

// ── Synthetic ──

/// Seeded daily random walk starting at 100.0.
///
/// The seed is derived from the symbol name, so each symbol always gets the same
/// history. Weekends are skipped. Bars end on `end` (default 2024-12-31).
#[derive(Debug, Clone)]
pub struct SyntheticHistoryProvider {
    bars: usize,
    end: NaiveDate,
}

impl SyntheticHistoryProvider {
    pub fn new(bars: usize) -> Self {
        Self {
            bars,
            end: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap_or_default(),
        }
    }

    pub fn ending_on(mut self, end: NaiveDate) -> Self {
        self.end = end;
        self
    }
}

impl HistoryProvider for SyntheticHistoryProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn is_synthetic(&self) -> bool {
        true
    }

    fn load_data(&self, symbol: &str) -> Result<Vec<PriceBar>, HistoryError> {
        warn!(symbol, "generating synthetic history; results are not real market data");
        Ok(generate_synthetic_bars(symbol, self.bars, self.end))
    }
}

/// Random walk of `count` weekday bars ending on (or before) `end`.
pub fn generate_synthetic_bars(symbol: &str, count: usize, end: NaiveDate) -> Vec<PriceBar> {
    use chrono::{Datelike, Weekday};

    let seed: [u8; 32] = *blake3::hash(symbol.as_bytes()).as_bytes();
    let mut rng = StdRng::from_seed(seed);

    let mut dates = Vec::with_capacity(count);
    let mut current = end;
    while dates.len() < count {
        if !matches!(current.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(current);
        }
        current -= chrono::Duration::days(1);
    }
    dates.reverse();

    let mut price = 100.0_f64;
    dates
        .into_iter()
        .map(|date| {
            let daily_return: f64 = rng.gen_range(-0.03..0.03);
            let open = price;
            let close = (price * (1.0 + daily_return)).max(0.01);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(500_000..5_000_000u64);
            price = close;
            PriceBar {
                date,
                open,
                high,
                low,
                close,
                volume,
            }
        })
        .collect()
}
