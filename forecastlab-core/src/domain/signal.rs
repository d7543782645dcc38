//! Trade signal and market regime labels.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Discrete trade recommendation derived from a blended forecast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
    RiskyBuy,
    RiskySell,
}

impl Signal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Buy => "BUY",
            Self::Sell => "SELL",
            Self::Hold => "HOLD",
            Self::RiskyBuy => "RISKY_BUY",
            Self::RiskySell => "RISKY_SELL",
        }
    }

    /// Downgrade a directional signal to its risky variant. HOLD is unaffected.
    pub fn risky(self) -> Self {
        match self {
            Self::Buy => Self::RiskyBuy,
            Self::Sell => Self::RiskySell,
            other => other,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse label for a volatility forecast (percent daily standard deviation).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    Stable,
    Normal,
    HighVolatility,
}

impl MarketRegime {
    /// < 1.0 stable, < 2.5 normal, otherwise high volatility.
    pub fn from_volatility(volatility: f64) -> Self {
        if volatility < 1.0 {
            Self::Stable
        } else if volatility < 2.5 {
            Self::Normal
        } else {
            Self::HighVolatility
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn risky_only_touches_directional_signals() {
        assert_eq!(Signal::Buy.risky(), Signal::RiskyBuy);
        assert_eq!(Signal::Sell.risky(), Signal::RiskySell);
        assert_eq!(Signal::Hold.risky(), Signal::Hold);
    }

    #[test]
    fn signal_serializes_screaming_snake() {
        let json = serde_json::to_string(&Signal::RiskySell).unwrap();
        assert_eq!(json, "\"RISKY_SELL\"");
        assert_eq!(Signal::RiskyBuy.to_string(), "RISKY_BUY");
    }

    #[test]
    fn regime_boundaries() {
        assert_eq!(MarketRegime::from_volatility(0.99), MarketRegime::Stable);
        assert_eq!(MarketRegime::from_volatility(1.0), MarketRegime::Normal);
        assert_eq!(MarketRegime::from_volatility(2.49), MarketRegime::Normal);
        assert_eq!(
            MarketRegime::from_volatility(2.5),
            MarketRegime::HighVolatility
        );
    }
}
