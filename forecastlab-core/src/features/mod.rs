//! Feature engineering: raw OHLCV history → model-ready feature table.

pub mod engineer;
pub mod table;

pub use engineer::{FeatureEngineer, WARMUP_BARS};
pub use table::{FeatureRow, FeatureTable, SupervisedSet};
