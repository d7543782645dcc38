//! Orchestrator behaviour end to end.
//!
//! Covers the train → predict flow, the single train-then-retry fallback,
//! idempotent retraining, restoring from a file store in a fresh pipeline and
//! best-effort persistence of the volatility model.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::NaiveDate;
use forecastlab_core::domain::{HistoryError, ModelKind, PriceBar, Signal};
use forecastlab_runner::{
    BlobMeta, CsvHistoryProvider, FileModelStore, HistoryProvider, InMemoryHistoryProvider,
    InMemoryModelStore, ModelStore, Pipeline, PipelineConfig, PipelineError, StoreError,
    SymbolStatus, SyntheticHistoryProvider,
};

// ── Helpers ──────────────────────────────────────────────────────────

fn make_history(n: usize) -> Vec<PriceBar> {
    let base_date = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
    let mut price = 40.0;
    (0..n)
        .map(|i| {
            let seed = (i as u64)
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            let shock = ((seed >> 33) % 1000) as f64 / 1000.0 - 0.5;
            price = (price * (1.0 + shock * 0.04)).max(5.0);
            let open = price * 1.002;
            PriceBar {
                date: base_date + chrono::Duration::days(i as i64),
                open,
                high: price.max(open) * 1.01,
                low: price.min(open) * 0.99,
                close: price,
                volume: 250_000 + (seed % 90_000),
            }
        })
        .collect()
}

fn quick_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.gradient_boosted.params.n_estimators = 20;
    config.gradient_boosted.params.max_depth = 3;
    config.decomposition.yearly_order = 4;
    config
}

/// Counts `load_data` calls.
struct CountingProvider {
    inner: InMemoryHistoryProvider,
    loads: Arc<AtomicUsize>,
}

impl CountingProvider {
    fn new(symbol: &str, bars: Vec<PriceBar>) -> (Self, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        let provider = Self {
            inner: InMemoryHistoryProvider::new().with_history(symbol, bars),
            loads: Arc::clone(&loads),
        };
        (provider, loads)
    }
}

impl HistoryProvider for CountingProvider {
    fn name(&self) -> &str {
        "counting"
    }

    fn load_data(&self, symbol: &str) -> Result<Vec<PriceBar>, HistoryError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_data(symbol)
    }
}

/// File store that refuses volatility blobs and counts gradient-boosted saves
/// (one per training run).
struct NoVolatilityStore {
    inner: FileModelStore,
    trainings: Arc<AtomicUsize>,
}

impl NoVolatilityStore {
    fn new(root: &Path, trainings: &Arc<AtomicUsize>) -> Self {
        Self {
            inner: FileModelStore::new(root),
            trainings: Arc::clone(trainings),
        }
    }
}

impl ModelStore for NoVolatilityStore {
    fn save(&self, kind: ModelKind, symbol: &str, blob: &[u8]) -> Result<BlobMeta, StoreError> {
        match kind {
            ModelKind::ConditionalVolatility => {
                return Err(StoreError::Io(std::io::Error::new(
                    std::io::ErrorKind::PermissionDenied,
                    "read-only volume",
                )))
            }
            ModelKind::GradientBoosted => {
                self.trainings.fetch_add(1, Ordering::SeqCst);
            }
            ModelKind::Decomposition => {}
        }
        self.inner.save(kind, symbol, blob)
    }

    fn load(&self, kind: ModelKind, symbol: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.load(kind, symbol)
    }

    fn meta(&self, kind: ModelKind, symbol: &str) -> Result<Option<BlobMeta>, StoreError> {
        self.inner.meta(kind, symbol)
    }
}

// ── Train → predict ──────────────────────────────────────────────────

#[test]
fn train_then_predict() {
    let history = InMemoryHistoryProvider::new().with_history("KCHOL", make_history(240));
    let mut pipeline = Pipeline::new(quick_config(), history, InMemoryModelStore::new());

    let summary = pipeline.train_full_pipeline("KCHOL").unwrap();
    assert_eq!(summary.reports.len(), 3);
    assert_eq!(
        summary.reports.iter().map(|r| r.kind).collect::<Vec<_>>(),
        ModelKind::ALL.to_vec()
    );
    assert!(summary.reports[2].convergence.is_some());
    assert_eq!(summary.persisted.len(), 3);

    let report = pipeline.predict_next_day("KCHOL").unwrap();
    assert_eq!(report.symbol, "KCHOL");
    assert_eq!(report.as_of, make_history(240).last().unwrap().date);
    assert_eq!(report.target_date, report.as_of + chrono::Duration::days(1));
    assert!(report.predicted_price.is_finite());
    assert!(report.ranked_reasons.len() <= 3);
    assert!(!report.ranked_reasons.is_empty());
    for pair in report.ranked_reasons.windows(2) {
        assert!(pair[0].contribution.abs() >= pair[1].contribution.abs());
    }

    let json = serde_json::to_value(&report).unwrap();
    assert!(json.get("signal").is_some());
    assert!(json["model_predictions"].get("xgboost").is_some());
    assert!(json["model_predictions"].get("garch").is_none());
}

#[test]
fn signal_matches_percent_change() {
    let history = InMemoryHistoryProvider::new().with_history("EREGL", make_history(220));
    let config = quick_config();
    let thresholds = config.signal.clone();
    let mut pipeline = Pipeline::new(config, history, InMemoryModelStore::new());
    let report = pipeline.predict_next_day("EREGL").unwrap();

    let base = if report.percent_change > thresholds.buy_threshold_pct {
        Signal::Buy
    } else if report.percent_change < thresholds.sell_threshold_pct {
        Signal::Sell
    } else {
        Signal::Hold
    };
    let expected = if report.volatility > thresholds.risky_volatility {
        base.risky()
    } else {
        base
    };
    assert_eq!(report.signal, expected);
}

// ── Fallback ─────────────────────────────────────────────────────────

#[test]
fn untrained_symbol_trains_exactly_once() {
    let (provider, loads) = CountingProvider::new("TUPRS", make_history(220));
    let mut pipeline = Pipeline::new(quick_config(), provider, InMemoryModelStore::new());
    assert_eq!(pipeline.status("TUPRS"), SymbolStatus::Untrained);

    pipeline.predict_next_day("TUPRS").unwrap();

    // One load for training, one for the retried prediction.
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(pipeline.store().len(), 3);
    assert_eq!(pipeline.status("TUPRS"), SymbolStatus::Trained);

    // Already trained: no second fallback.
    pipeline.predict_next_day("TUPRS").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 3);
}

#[test]
fn failing_fallback_propagates_without_retry() {
    let (provider, loads) = CountingProvider::new("SISE", make_history(40));
    let mut pipeline = Pipeline::new(quick_config(), provider, InMemoryModelStore::new());

    let err = pipeline.predict_next_day("SISE").unwrap_err();
    assert!(
        matches!(err, PipelineError::InsufficientData { .. }),
        "unexpected error: {err}"
    );
    assert_eq!(loads.load(Ordering::SeqCst), 1);
    assert!(pipeline.store().is_empty());
    assert_eq!(pipeline.status("SISE"), SymbolStatus::Untrained);
}

// ── Persistence ──────────────────────────────────────────────────────

#[test]
fn retraining_writes_identical_blobs() {
    let dir = tempfile::tempdir().unwrap();
    let history = InMemoryHistoryProvider::new().with_history("GARAN", make_history(200));
    let mut pipeline = Pipeline::new(quick_config(), history, FileModelStore::new(dir.path()));

    pipeline.train_full_pipeline("GARAN").unwrap();
    let first: Vec<Vec<u8>> = ModelKind::ALL
        .iter()
        .map(|k| pipeline.store().load(*k, "GARAN").unwrap())
        .collect();

    pipeline.train_full_pipeline("GARAN").unwrap();
    let second: Vec<Vec<u8>> = ModelKind::ALL
        .iter()
        .map(|k| pipeline.store().load(*k, "GARAN").unwrap())
        .collect();

    assert_eq!(first, second);
}

#[test]
fn fresh_pipeline_predicts_from_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let bars = make_history(220);

    let mut trainer = Pipeline::new(
        quick_config(),
        InMemoryHistoryProvider::new().with_history("BIMAS", bars.clone()),
        FileModelStore::new(dir.path()),
    );
    trainer.train_full_pipeline("BIMAS").unwrap();
    let expected = trainer.predict_next_day("BIMAS").unwrap();

    let (provider, loads) = CountingProvider::new("BIMAS", bars);
    let mut fresh = Pipeline::new(quick_config(), provider, FileModelStore::new(dir.path()));
    assert_eq!(fresh.status("BIMAS"), SymbolStatus::Untrained);
    let report = fresh.predict_next_day("BIMAS").unwrap();

    assert_eq!(loads.load(Ordering::SeqCst), 1, "restored models must not retrain");
    assert_eq!(report.predicted_price, expected.predicted_price);
    assert_eq!(report.model_predictions, expected.model_predictions);
    assert_eq!(report.ranked_reasons, expected.ranked_reasons);
}

#[test]
fn newer_history_is_flagged_stale() {
    let dir = tempfile::tempdir().unwrap();
    let bars = make_history(230);

    let mut trainer = Pipeline::new(
        quick_config(),
        InMemoryHistoryProvider::new().with_history("PGSUS", bars[..200].to_vec()),
        FileModelStore::new(dir.path()),
    );
    trainer.train_full_pipeline("PGSUS").unwrap();

    let mut later = Pipeline::new(
        quick_config(),
        InMemoryHistoryProvider::new().with_history("PGSUS", bars),
        FileModelStore::new(dir.path()),
    );
    let report = later.predict_next_day("PGSUS").unwrap();
    assert!(
        report.warnings.iter().any(|w| w.contains("trained through")),
        "{:?}",
        report.warnings
    );
}

#[test]
fn volatility_persistence_is_best_effort() {
    let dir = tempfile::tempdir().unwrap();
    let trainings = Arc::new(AtomicUsize::new(0));
    let history = InMemoryHistoryProvider::new().with_history("FROTO", make_history(220));
    let store = NoVolatilityStore::new(dir.path(), &trainings);
    let mut pipeline = Pipeline::new(quick_config(), history, store);

    let summary = pipeline.train_full_pipeline("FROTO").unwrap();
    assert_eq!(summary.persisted.len(), 2);
    assert!(summary
        .persisted
        .iter()
        .all(|m| m.kind != ModelKind::ConditionalVolatility));
    assert!(summary
        .warnings
        .iter()
        .any(|w| w.contains("volatility model not persisted")));

    // Cached models still serve predictions.
    let report = pipeline.predict_next_day("FROTO").unwrap();
    assert!(!report.warnings.iter().any(|w| w.contains("refitted")));
    assert_eq!(trainings.load(Ordering::SeqCst), 1);
}

#[test]
fn missing_volatility_blob_is_refitted_not_retrained() {
    let dir = tempfile::tempdir().unwrap();
    let trainings = Arc::new(AtomicUsize::new(0));
    let bars = make_history(220);

    let mut first = Pipeline::new(
        quick_config(),
        InMemoryHistoryProvider::new().with_history("TOASO", bars.clone()),
        NoVolatilityStore::new(dir.path(), &trainings),
    );
    let expected = first.predict_next_day("TOASO").unwrap();
    assert_eq!(trainings.load(Ordering::SeqCst), 1);

    for _ in 0..2 {
        let mut fresh = Pipeline::new(
            quick_config(),
            InMemoryHistoryProvider::new().with_history("TOASO", bars.clone()),
            NoVolatilityStore::new(dir.path(), &trainings),
        );
        let report = fresh.predict_next_day("TOASO").unwrap();
        assert!(
            report.warnings.iter().any(|w| w.contains("refitted")),
            "{:?}",
            report.warnings
        );
        assert_eq!(report.predicted_price, expected.predicted_price);
        assert_eq!(report.volatility, expected.volatility);
    }
    assert_eq!(trainings.load(Ordering::SeqCst), 1);
}

#[test]
fn corrupt_stored_model_is_retrained_once() {
    let dir = tempfile::tempdir().unwrap();
    let bars = make_history(220);
    let mut trainer = Pipeline::new(
        quick_config(),
        InMemoryHistoryProvider::new().with_history("ULKER", bars.clone()),
        FileModelStore::new(dir.path()),
    );
    trainer.train_full_pipeline("ULKER").unwrap();
    let gbm_path = trainer.store().blob_path(ModelKind::GradientBoosted, "ULKER");
    std::fs::write(&gbm_path, b"{\"truncated\":").unwrap();

    let (provider, loads) = CountingProvider::new("ULKER", bars);
    let mut fresh = Pipeline::new(quick_config(), provider, FileModelStore::new(dir.path()));
    fresh.predict_next_day("ULKER").unwrap();

    // One load for the fallback training, one for the retried prediction.
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert!(fresh
        .store()
        .load(ModelKind::GradientBoosted, "ULKER")
        .is_ok());
}

#[test]
fn partially_stored_symbol_falls_back_to_training() {
    let store = InMemoryModelStore::new();
    store
        .save(ModelKind::ConditionalVolatility, "AKBNK", b"{}")
        .unwrap();
    let (provider, loads) = CountingProvider::new("AKBNK", make_history(220));
    let mut pipeline = Pipeline::new(quick_config(), provider, store);

    // No stored gradient-boosted model: the fallback trains and overwrites the
    // leftover blob.
    pipeline.predict_next_day("AKBNK").unwrap();
    assert_eq!(loads.load(Ordering::SeqCst), 2);
    assert_eq!(pipeline.store().len(), 3);
}

// ── Providers ────────────────────────────────────────────────────────

#[test]
fn synthetic_history_is_tagged() {
    let mut pipeline = Pipeline::new(
        quick_config(),
        SyntheticHistoryProvider::new(260),
        InMemoryModelStore::new(),
    );
    let summary = pipeline.train_full_pipeline("DEMO").unwrap();
    assert!(summary.synthetic);
    let report = pipeline.predict_next_day("DEMO").unwrap();
    assert!(report.synthetic);
    assert!(report.warnings.iter().any(|w| w.contains("synthetic")));
}

#[test]
fn csv_directory_feeds_the_pipeline() {
    let data = tempfile::tempdir().unwrap();
    let mut csv = String::from("Date,Open,High,Low,Close,Volume\n");
    for bar in make_history(210) {
        csv.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.date, bar.open, bar.high, bar.low, bar.close, bar.volume
        ));
    }
    std::fs::write(data.path().join("THYAO.csv"), csv).unwrap();

    let mut pipeline = Pipeline::new(
        quick_config(),
        CsvHistoryProvider::new(data.path()),
        InMemoryModelStore::new(),
    );
    let report = pipeline.predict_next_day("THYAO").unwrap();
    assert_eq!(report.as_of, make_history(210).last().unwrap().date);

    assert!(matches!(
        pipeline.predict_next_day("MISSING"),
        Err(PipelineError::History(HistoryError::NotFound { .. }))
    ));
}
