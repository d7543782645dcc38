//! Property tests for forecasting invariants.
//!
//! Uses proptest to verify:
//! 1. Signal rules — direction follows the thresholds, risk only downgrades
//! 2. Ensemble bounds — a blend never leaves the range of its inputs
//! 3. TreeSHAP additivity — baseline + contributions reproduces the prediction
//! 4. Indicator shape — output length always matches input length

use proptest::prelude::*;
use std::collections::BTreeMap;

use forecastlab_core::domain::{PriceBar, Signal};
use forecastlab_core::ensemble::EnsembleCombiner;
use forecastlab_core::explain::tree_shap::{expected_value, node_covers, tree_shap};
use forecastlab_core::indicators::*;
use forecastlab_core::models::gradient_boosted::{boost, GbmParams};
use forecastlab_core::models::tree::{RegressionTree, TreeParams};

// ── Strategies (proptest) ────────────────────────────────────────────

fn arb_price() -> impl Strategy<Value = f64> {
    (10.0..500.0_f64).prop_map(|p| (p * 100.0).round() / 100.0)
}

fn arb_rows() -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
    prop::collection::vec((0.0..10.0_f64, -5.0..5.0_f64, 0.0..1.0_f64), 12..40)
}

fn bars_from(closes: &[f64]) -> Vec<PriceBar> {
    let base = chrono::NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let open = if i == 0 { close } else { closes[i - 1] };
            PriceBar {
                date: base + chrono::Duration::days(i as i64),
                open,
                high: open.max(close) + 0.5,
                low: open.min(close) - 0.5,
                close,
                volume: 10_000 + i as u64 * 7,
            }
        })
        .collect()
}

// ── 1. Signal rules ──────────────────────────────────────────────────

proptest! {
    #[test]
    fn signal_follows_thresholds(
        current in arb_price(),
        move_pct in -10.0..10.0_f64,
        volatility in 0.0..6.0_f64,
    ) {
        let combiner = EnsembleCombiner::default();
        let predicted = current * (1.0 + move_pct / 100.0);
        let (signal, change) = combiner.generate_signal(current, predicted, volatility).unwrap();
        let t = combiner.thresholds();

        let risky = volatility > t.risky_volatility;
        let expected = if change > t.buy_threshold_pct {
            if risky { Signal::RiskyBuy } else { Signal::Buy }
        } else if change < t.sell_threshold_pct {
            if risky { Signal::RiskySell } else { Signal::Sell }
        } else {
            Signal::Hold
        };
        prop_assert_eq!(signal, expected);
        prop_assert!((change - move_pct).abs() < 1e-6);
    }
}

// ── 2. Ensemble bounds ───────────────────────────────────────────────

proptest! {
    #[test]
    fn blend_stays_within_inputs(
        xgb in arb_price(),
        prophet in arb_price(),
        extra in prop::option::of(arb_price()),
    ) {
        let combiner = EnsembleCombiner::default();
        let mut preds = BTreeMap::from([
            ("xgboost".to_string(), xgb),
            ("prophet".to_string(), prophet),
        ]);
        if let Some(v) = extra {
            preds.insert("lstm".to_string(), v);
        }
        let blended = combiner.combine_predictions(&preds).unwrap();
        let lo = xgb.min(prophet);
        let hi = xgb.max(prophet);
        prop_assert!(blended >= lo - 1e-9 && blended <= hi + 1e-9);
    }
}

// ── 3. TreeSHAP additivity ───────────────────────────────────────────

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    #[test]
    fn single_tree_attributions_are_additive(rows in arb_rows(), depth in 1usize..5) {
        let x: Vec<Vec<f64>> = rows.iter().map(|(a, b, c)| vec![*a, *b, *c]).collect();
        let y: Vec<f64> = x.iter().map(|r| r[0] * 2.0 - r[1].abs() + if r[2] > 0.5 { 3.0 } else { 0.0 }).collect();
        let idx: Vec<usize> = (0..x.len()).collect();
        let tree = RegressionTree::fit(&x, &y, &idx, &[0, 1, 2], TreeParams { max_depth: depth, min_samples_leaf: 1 });
        let covers = node_covers(&tree, &x);
        let base = expected_value(&tree, &covers);

        for row in &x {
            let mut phi = vec![0.0; 3];
            tree_shap(&tree, &covers, row, &mut phi);
            let total: f64 = phi.iter().sum();
            prop_assert!((base + total - tree.predict(row)).abs() < 1e-8);
        }
    }

    #[test]
    fn ensemble_attributions_are_additive(rows in arb_rows(), seed in 0u64..1000) {
        let x: Vec<Vec<f64>> = rows.iter().map(|(a, b, c)| vec![*a, *b, *c]).collect();
        let y: Vec<f64> = x.iter().map(|r| (r[0] - 5.0) * r[1] + r[2]).collect();
        let params = GbmParams {
            n_estimators: 8,
            max_depth: 3,
            subsample: 0.8,
            seed,
            ..GbmParams::default()
        };
        let ensemble = boost(&params, &x, &y);

        let covers: Vec<Vec<f64>> = ensemble.trees.iter().map(|t| node_covers(t, &x)).collect();
        let expectation: f64 = ensemble.trees.iter().zip(&covers).map(|(t, c)| expected_value(t, c)).sum();
        let baseline = ensemble.base_score + ensemble.learning_rate * expectation;

        let row = &x[x.len() - 1];
        let mut phi = vec![0.0; 3];
        for (tree, c) in ensemble.trees.iter().zip(&covers) {
            tree_shap(tree, c, row, &mut phi);
        }
        let total: f64 = phi.iter().map(|p| p * ensemble.learning_rate).sum();
        prop_assert!((baseline + total - ensemble.predict(row)).abs() < 1e-8);
    }
}

// ── 4. Indicator shape ───────────────────────────────────────────────

proptest! {
    #[test]
    fn indicators_preserve_length(closes in prop::collection::vec(arb_price(), 1..120)) {
        let bars = bars_from(&closes);
        let indicators: Vec<Box<dyn Indicator>> = vec![
            Box::new(Sma::new(20)),
            Box::new(Ema::new(12)),
            Box::new(Rsi::new(14)),
            Box::new(Atr::new(14)),
            Box::new(Bollinger::high(20, 2.0)),
            Box::new(Macd::standard(MacdLine::Signal)),
            Box::new(Cci::new(20)),
            Box::new(Obv::new()),
            Box::new(Vwap::new(14)),
        ];
        for ind in &indicators {
            let out = ind.compute(&bars);
            prop_assert_eq!(out.len(), bars.len(), "{}", ind.name());
            // Warm-up region is exactly NaN, never a stray number.
            for v in out.iter().take(ind.lookback().min(bars.len())) {
                prop_assert!(v.is_nan(), "{} produced a value during warm-up", ind.name());
            }
        }
    }

    #[test]
    fn rsi_is_bounded(closes in prop::collection::vec(arb_price(), 20..100)) {
        let bars = bars_from(&closes);
        for v in Rsi::new(14).compute(&bars).into_iter().filter(|v| !v.is_nan()) {
            prop_assert!((0.0..=100.0).contains(&v));
        }
    }
}
