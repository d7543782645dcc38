//! Criterion benchmarks for ForecastLab hot paths.
//!
//! Benchmarks:
//! 1. Feature engineering (indicator columns + NaN row filter)
//! 2. Gradient boosting (tree growth on the feature table)
//! 3. TreeSHAP attribution of one row
//! 4. GARCH(1,1) maximum-likelihood fit

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use forecastlab_core::domain::PriceBar;
use forecastlab_core::explain::TreeExplainer;
use forecastlab_core::features::FeatureEngineer;
use forecastlab_core::models::gradient_boosted::boost;
use forecastlab_core::models::{
    ForecastModel, GbmParams, GradientBoostedModel, ModelInput, VolatilityModel,
    VolatilityParams,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_bars(n: usize) -> Vec<PriceBar> {
    let base_date = chrono::NaiveDate::from_ymd_opt(2020, 1, 2).unwrap();
    (0..n)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.1).sin() * 10.0 + (i as f64 * 0.013).cos() * 4.0;
            let open = close - 0.3;
            PriceBar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: close + 1.5,
                low: close - 1.5,
                close,
                volume: 1_000_000 + (i as u64 % 500_000),
            }
        })
        .collect()
}

fn bench_params() -> GbmParams {
    GbmParams {
        n_estimators: 50,
        max_depth: 4,
        ..GbmParams::default()
    }
}

// ── 1. Feature Engineering ───────────────────────────────────────────

fn bench_features(c: &mut Criterion) {
    let mut group = c.benchmark_group("feature_engineering");
    let engineer = FeatureEngineer::default();

    for &bar_count in &[252, 1260, 2520] {
        let bars = make_bars(bar_count);
        group.bench_with_input(
            BenchmarkId::new("create_features", bar_count),
            &bar_count,
            |b, _| b.iter(|| engineer.create_features(black_box(&bars))),
        );
    }

    group.finish();
}

// ── 2. Boosting ──────────────────────────────────────────────────────

fn bench_boosting(c: &mut Criterion) {
    let mut group = c.benchmark_group("gradient_boosting");
    group.sample_size(10);

    for &bar_count in &[252, 1260] {
        let bars = make_bars(bar_count);
        let table = FeatureEngineer::default().create_features(&bars).unwrap();
        let set = table.supervised("close").unwrap();
        let params = bench_params();
        group.bench_with_input(
            BenchmarkId::new("boost_50_trees", bar_count),
            &bar_count,
            |b, _| b.iter(|| boost(black_box(&params), black_box(&set.x), black_box(&set.y))),
        );
    }

    group.finish();
}

// ── 3. Attribution ───────────────────────────────────────────────────

fn bench_tree_shap(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree_shap");

    let bars = make_bars(1260);
    let table = FeatureEngineer::default().create_features(&bars).unwrap();
    let mut model = GradientBoostedModel::new(bench_params());
    model
        .train(&ModelInput::new(&bars, &table), "close")
        .unwrap();
    let latest = table.latest().unwrap().values.clone();

    group.bench_function("build_explainer", |b| {
        b.iter(|| TreeExplainer::from_model(black_box(&model)))
    });

    let explainer = TreeExplainer::from_model(&model).unwrap();
    group.bench_function("explain_latest_row", |b| {
        b.iter(|| explainer.explain(black_box(table.names()), black_box(&latest), 3))
    });

    group.finish();
}

// ── 4. GARCH fit ─────────────────────────────────────────────────────

fn bench_garch(c: &mut Criterion) {
    let mut group = c.benchmark_group("garch_fit");
    group.sample_size(10);

    let bars = make_bars(1260);
    let table = FeatureEngineer::default().create_features(&bars).unwrap();
    group.bench_function("fit_1260_bars", |b| {
        b.iter(|| {
            let mut model = VolatilityModel::new(VolatilityParams::default());
            model.train(&ModelInput::new(black_box(&bars), &table), "close")
        })
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_features,
    bench_boosting,
    bench_tree_shap,
    bench_garch
);
criterion_main!(benches);
