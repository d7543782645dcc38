//! ForecastLab Runner — pipeline orchestration on top of `forecastlab-core`.
//!
//! This crate provides:
//! - History providers (CSV directory, in-memory, seeded synthetic walk)
//! - Model store with atomic writes and digest sidecars
//! - TOML pipeline configuration
//! - The orchestrator: train, predict next day, single train-then-retry fallback
//! - Hold-out validation with out-of-sample metrics

pub mod config;
pub mod history;
pub mod pipeline;
pub mod store;
pub mod validation;

pub use config::{ConfigError, PipelineConfig};
pub use history::{
    generate_synthetic_bars, CsvHistoryProvider, HistoryProvider, InMemoryHistoryProvider,
    SyntheticHistoryProvider,
};
pub use pipeline::{
    Pipeline, PipelineContext, PipelineError, PredictionReport, SymbolModels, SymbolStatus,
    TrainingSummary,
};
pub use store::{BlobMeta, FileModelStore, InMemoryModelStore, ModelStore, StoreError};
pub use validation::{validate_symbol, ValidationReport};
