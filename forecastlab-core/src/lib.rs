//! ForecastLab Core — price bars, indicators, features, forecast models, ensemble, attribution.
//!
//! This crate holds the pure, I/O-light half of the forecasting pipeline:
//! - Domain types (price bars, forecasts, signals, model kinds)
//! - Technical indicators with NaN warm-up
//! - Feature engineering into a finite, date-ordered feature table
//! - Three forecast models behind one object-safe trait
//! - Ensemble blending and signal rules
//! - Exact TreeSHAP attribution for the gradient-boosted model

pub mod domain;
pub mod ensemble;
pub mod explain;
pub mod features;
pub mod fingerprint;
pub mod indicators;
pub mod models;
