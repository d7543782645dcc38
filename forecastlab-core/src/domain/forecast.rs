//! Forecast output types and the model kind tag.

use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which forecast model produced a value.
///
/// The short names (`xgboost`, `prophet`, `garch`) are the keys used by the ensemble
/// weights, the model store and the prediction report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelKind {
    GradientBoosted,
    Decomposition,
    ConditionalVolatility,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::GradientBoosted,
        ModelKind::Decomposition,
        ModelKind::ConditionalVolatility,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GradientBoosted => "xgboost",
            Self::Decomposition => "prophet",
            Self::ConditionalVolatility => "garch",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == name)
    }

    /// True for models whose output is a price level (ensemble inputs).
    pub fn forecasts_price(&self) -> bool {
        !matches!(self, Self::ConditionalVolatility)
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lower/upper bounds around a point estimate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interval {
    pub lower: f64,
    pub upper: f64,
}

/// One forecast step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub target_date: NaiveDate,
    pub point_estimate: f64,
    pub interval: Option<Interval>,
}

/// A model's forecast: one point per requested step, in date order.
///
/// Produced fresh on every predict call and never persisted by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forecast {
    pub kind: ModelKind,
    pub points: Vec<ForecastPoint>,
}

impl Forecast {
    /// The first step's point estimate, if any.
    pub fn first_estimate(&self) -> Option<f64> {
        self.points.first().map(|p| p.point_estimate)
    }
}

/// Consecutive calendar days following `last`.
pub fn future_dates(last: NaiveDate, steps: usize) -> Vec<NaiveDate> {
    (1..=steps as i64).map(|d| last + Duration::days(d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_roundtrip() {
        for kind in ModelKind::ALL {
            assert_eq!(ModelKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(ModelKind::parse("lstm"), None);
    }

    #[test]
    fn only_price_models_feed_the_ensemble() {
        assert!(ModelKind::GradientBoosted.forecasts_price());
        assert!(ModelKind::Decomposition.forecasts_price());
        assert!(!ModelKind::ConditionalVolatility.forecasts_price());
    }

    #[test]
    fn future_dates_are_consecutive() {
        let last = NaiveDate::from_ymd_opt(2024, 2, 28).unwrap();
        let dates = future_dates(last, 3);
        assert_eq!(
            dates,
            vec![
                NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 3, 2).unwrap(),
            ]
        );
        assert!(future_dates(last, 0).is_empty());
    }
}
