//! Domain types for ForecastLab

pub mod bar;
pub mod forecast;
pub mod signal;

pub use bar::{series, validate_history, HistoryError, PriceBar, PriceField};
pub use forecast::{future_dates, Forecast, ForecastPoint, Interval, ModelKind};
pub use signal::{MarketRegime, Signal};
