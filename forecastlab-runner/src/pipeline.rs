//! Pipeline Orchestrator — sequences training and next-day inference per symbol.
//!
//! Two entry points:
//! - `train_full_pipeline()`: load history, build features, fit all three models,
//!   rebuild the explainer and persist the blobs.
//! - `predict_next_day()`: restore models (context, else store), forecast one step,
//!   blend, derive the signal and attribute the gradient-boosted prediction.
//!
//! Trained models live in a `PipelineContext` owned by the pipeline. A symbol with
//! no usable stored price models is trained once on demand and the prediction
//! retried once. A volatility model missing from the store is refitted on the
//! history being forecast.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{info, warn};

use forecastlab_core::domain::{
    Forecast, ForecastPoint, HistoryError, MarketRegime, ModelKind, PriceBar, PriceField, Signal,
};
use forecastlab_core::ensemble::{EnsembleCombiner, EnsembleError};
use forecastlab_core::explain::{Contribution, ExplainError, TreeExplainer};
use forecastlab_core::features::{FeatureEngineer, FeatureTable, WARMUP_BARS};
use forecastlab_core::models::{
    DecompositionModel, ForecastModel, GradientBoostedModel, ModelError, ModelInput, TrainReport,
    VolatilityModel,
};

use crate::config::{ConfigError, PipelineConfig};
use crate::history::HistoryProvider;
use crate::store::{BlobMeta, ModelStore, StoreError};
use crate::validation::{validate_symbol, ValidationReport};

/// Errors from the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("history error: {0}")]
    History(#[from] HistoryError),

    #[error("no trained {kind} model for '{symbol}'")]
    NotTrained { symbol: String, kind: ModelKind },

    #[error("not enough data for {what}: need {required}, got {actual}")]
    InsufficientData {
        what: String,
        required: usize,
        actual: usize,
    },

    #[error("model error: {0}")]
    Model(ModelError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("ensemble error: {0}")]
    Ensemble(#[from] EnsembleError),

    #[error("attribution error: {0}")]
    Explain(#[from] ExplainError),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<ModelError> for PipelineError {
    fn from(e: ModelError) -> Self {
        match e {
            ModelError::InsufficientData {
                kind,
                required,
                actual,
            } => PipelineError::InsufficientData {
                what: format!("{kind} training"),
                required,
                actual,
            },
            other => PipelineError::Model(other),
        }
    }
}

// ── Context ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolStatus {
    Untrained,
    Trained,
}

/// The three fitted models of one symbol plus the explainer built on the
/// gradient-boosted one.
#[derive(Debug, Clone)]
pub struct SymbolModels {
    pub gradient_boosted: GradientBoostedModel,
    pub decomposition: DecompositionModel,
    pub volatility: VolatilityModel,
    /// `None` when the explainer could not be built; predictions then carry no reasons.
    pub explainer: Option<TreeExplainer>,
}

impl SymbolModels {
    /// Last date covered by the gradient-boosted training data.
    pub fn last_training_date(&self) -> Option<NaiveDate> {
        self.gradient_boosted
            .fitted()
            .map(|fit| fit.last_training_date)
    }
}

/// Per-symbol trained state, owned by a `Pipeline`.
#[derive(Debug, Default)]
pub struct PipelineContext {
    symbols: BTreeMap<String, SymbolModels>,
}

impl PipelineContext {
    pub fn status(&self, symbol: &str) -> SymbolStatus {
        if self.symbols.contains_key(symbol) {
            SymbolStatus::Trained
        } else {
            SymbolStatus::Untrained
        }
    }

    pub fn models(&self, symbol: &str) -> Option<&SymbolModels> {
        self.symbols.get(symbol)
    }

    pub fn insert(&mut self, symbol: &str, models: SymbolModels) {
        self.symbols.insert(symbol.to_string(), models);
    }

    /// Drop cached models so the next prediction reloads from the store.
    pub fn evict(&mut self, symbol: &str) -> Option<SymbolModels> {
        self.symbols.remove(symbol)
    }

    pub fn trained_symbols(&self) -> impl Iterator<Item = &str> {
        self.symbols.keys().map(String::as_str)
    }
}

// ── Reports ──

#[derive(Debug, Clone, Serialize)]
pub struct TrainingSummary {
    pub symbol: String,
    pub history_bars: usize,
    pub feature_rows: usize,
    pub reports: Vec<TrainReport>,
    /// Blobs written to the store in this run.
    pub persisted: Vec<BlobMeta>,
    pub warnings: Vec<String>,
    pub synthetic: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PredictionReport {
    pub symbol: String,
    /// Date of the latest bar the prediction is based on.
    pub as_of: NaiveDate,
    pub target_date: NaiveDate,
    pub current_price: f64,
    pub predicted_price: f64,
    pub percent_change: f64,
    /// GARCH one-step standard deviation of daily returns, in percent.
    pub volatility: f64,
    pub signal: Signal,
    pub market_regime: MarketRegime,
    /// Price forecast of each blended model, keyed by model name.
    pub model_predictions: BTreeMap<String, f64>,
    pub ranked_reasons: Vec<Contribution>,
    pub warnings: Vec<String>,
    pub synthetic: bool,
}

// ── Pipeline ──

pub struct Pipeline<H, S> {
    config: PipelineConfig,
    history: H,
    store: S,
    engineer: FeatureEngineer,
    combiner: EnsembleCombiner,
    context: PipelineContext,
}

impl<H: HistoryProvider, S: ModelStore> Pipeline<H, S> {
    pub fn new(config: PipelineConfig, history: H, store: S) -> Self {
        let combiner = config.combiner();
        Self {
            config,
            history,
            store,
            engineer: FeatureEngineer::default(),
            combiner,
            context: PipelineContext::default(),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn history(&self) -> &H {
        &self.history
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn context_mut(&mut self) -> &mut PipelineContext {
        &mut self.context
    }

    pub fn status(&self, symbol: &str) -> SymbolStatus {
        self.context.status(symbol)
    }

    /// Fit all three models on the full history of `symbol` and persist them.
    ///
    /// Both price models must persist; the volatility model is best-effort and a
    /// failure only adds a warning to the summary.
    pub fn train_full_pipeline(&mut self, symbol: &str) -> Result<TrainingSummary, PipelineError> {
        info!(symbol, provider = self.history.name(), "training started");
        let history = self.history.load_data(symbol)?;
        let synthetic = self.history.is_synthetic();
        let table = self.build_features(&history)?;
        let input = ModelInput::new(&history, &table);
        let target = self.config.data.target.as_str();

        let mut warnings = Vec::new();
        if synthetic {
            warnings.push("trained on synthetic history".to_string());
        }

        let mut gradient_boosted = self.config.gradient_boosted_model();
        let mut decomposition = self.config.decomposition_model();
        let mut volatility = self.config.volatility_model();

        let mut reports = Vec::with_capacity(3);
        reports.push(train_model(&mut gradient_boosted, &input, target, symbol)?);
        reports.push(train_model(&mut decomposition, &input, target, symbol)?);
        let vol_report = train_model(&mut volatility, &input, target, symbol)?;
        if let Some(status) = vol_report.convergence.as_ref().filter(|c| !c.converged) {
            warnings.push(format!(
                "volatility fit did not converge after {} iterations",
                status.iterations
            ));
        }
        reports.push(vol_report);

        let explainer = match TreeExplainer::from_model(&gradient_boosted) {
            Ok(explainer) => Some(explainer),
            Err(e) => {
                warn!(symbol, error = %e, "explainer unavailable");
                warnings.push(format!("explainer unavailable: {e}"));
                None
            }
        };

        let mut persisted = Vec::with_capacity(3);
        persisted.push(
            self.store
                .save(ModelKind::GradientBoosted, symbol, &gradient_boosted.to_blob()?)?,
        );
        persisted.push(
            self.store
                .save(ModelKind::Decomposition, symbol, &decomposition.to_blob()?)?,
        );
        let vol_saved = volatility
            .to_blob()
            .map_err(PipelineError::from)
            .and_then(|blob| {
                self.store
                    .save(ModelKind::ConditionalVolatility, symbol, &blob)
                    .map_err(PipelineError::from)
            });
        match vol_saved {
            Ok(meta) => persisted.push(meta),
            Err(e) => {
                warn!(symbol, error = %e, "volatility model not persisted");
                warnings.push(format!("volatility model not persisted: {e}"));
            }
        }

        self.context.insert(
            symbol,
            SymbolModels {
                gradient_boosted,
                decomposition,
                volatility,
                explainer,
            },
        );
        info!(
            symbol,
            bars = history.len(),
            rows = table.len(),
            persisted = persisted.len(),
            "training finished"
        );

        Ok(TrainingSummary {
            symbol: symbol.to_string(),
            history_bars: history.len(),
            feature_rows: table.len(),
            reports,
            persisted,
            warnings,
            synthetic,
        })
    }

    /// Next-day forecast, signal and attribution for `symbol`.
    ///
    /// A symbol with no usable price models (neither cached nor stored intact)
    /// is trained once and the prediction retried once. Any failure of that fallback, or of
    /// the retry, is returned as is.
    pub fn predict_next_day(&mut self, symbol: &str) -> Result<PredictionReport, PipelineError> {
        match self.try_predict(symbol) {
            Err(PipelineError::NotTrained { kind, .. }) => {
                info!(symbol, missing = %kind, "no trained models, training before prediction");
                self.train_full_pipeline(symbol)?;
                self.try_predict(symbol)
            }
            other => other,
        }
    }

    /// Hold-out validation on the current history of `symbol`.
    pub fn validate(&self, symbol: &str) -> Result<ValidationReport, PipelineError> {
        let history = self.history.load_data(symbol)?;
        validate_symbol(&history, &self.config)
    }

    fn try_predict(&mut self, symbol: &str) -> Result<PredictionReport, PipelineError> {
        self.ensure_models(symbol)?;
        let history = self.history.load_data(symbol)?;
        let synthetic = self.history.is_synthetic();
        let table = self.build_features(&history)?;

        let mut warnings = Vec::new();
        if let Some(note) = self.refit_missing_volatility(symbol, &history, &table)? {
            warnings.push(note);
        }

        let models = self
            .context
            .models(symbol)
            .ok_or_else(|| PipelineError::NotTrained {
                symbol: symbol.to_string(),
                kind: ModelKind::GradientBoosted,
            })?;

        let field = PriceField::parse(&self.config.data.target)
            .ok_or_else(|| ModelError::UnknownColumn(self.config.data.target.clone()))?;
        let last_bar = history
            .last()
            .ok_or_else(|| PipelineError::InsufficientData {
                what: "history".to_string(),
                required: WARMUP_BARS,
                actual: 0,
            })?;
        let current_price = last_bar.field(field);

        let input = ModelInput::new(&history, &table);
        let gbm = first_point(models.gradient_boosted.predict(&input, 1)?)?;
        let decomposition = first_point(models.decomposition.predict(&input, 1)?)?;
        let volatility = first_point(models.volatility.predict(&input, 1)?)?.point_estimate;

        let model_predictions = BTreeMap::from([
            (
                ModelKind::GradientBoosted.as_str().to_string(),
                gbm.point_estimate,
            ),
            (
                ModelKind::Decomposition.as_str().to_string(),
                decomposition.point_estimate,
            ),
        ]);
        let predicted_price = self.combiner.combine_predictions(&model_predictions)?;
        let (signal, percent_change) =
            self.combiner
                .generate_signal(current_price, predicted_price, volatility)?;

        if synthetic {
            warnings.push("prediction based on synthetic history".to_string());
        }
        if let Some(trained_through) = models.last_training_date() {
            if last_bar.date > trained_through {
                warnings.push(format!(
                    "models trained through {trained_through}, history extends to {}",
                    last_bar.date
                ));
            }
        }

        let ranked_reasons = match explain_latest(models, &table, self.config.explain.top_n) {
            Ok(reasons) => reasons,
            Err(e) => {
                warn!(symbol, error = %e, "attribution failed, reporting without reasons");
                warnings.push(format!("attribution unavailable: {e}"));
                Vec::new()
            }
        };

        info!(
            symbol,
            predicted_price,
            percent_change,
            signal = %signal,
            "prediction ready"
        );
        Ok(PredictionReport {
            symbol: symbol.to_string(),
            as_of: last_bar.date,
            target_date: gbm.target_date,
            current_price,
            predicted_price,
            percent_change,
            volatility,
            signal,
            market_regime: MarketRegime::from_volatility(volatility),
            model_predictions,
            ranked_reasons,
            warnings,
            synthetic,
        })
    }

    /// Populate the context for `symbol` from the store when it is not cached.
    ///
    /// Both price models are required. A missing or corrupt volatility blob
    /// leaves that model untrained for `refit_missing_volatility`.
    fn ensure_models(&mut self, symbol: &str) -> Result<(), PipelineError> {
        if self.context.status(symbol) == SymbolStatus::Trained {
            return Ok(());
        }
        let mut gradient_boosted = self.config.gradient_boosted_model();
        let mut decomposition = self.config.decomposition_model();
        let mut volatility = self.config.volatility_model();
        restore(&self.store, &mut gradient_boosted, symbol)?;
        restore(&self.store, &mut decomposition, symbol)?;
        match restore(&self.store, &mut volatility, symbol) {
            Ok(()) => {}
            Err(PipelineError::NotTrained { .. }) => {
                info!(symbol, "no stored volatility model, refitting before forecast");
                volatility = self.config.volatility_model();
            }
            Err(e) => return Err(e),
        }

        let explainer = TreeExplainer::from_model(&gradient_boosted)
            .map_err(|e| warn!(symbol, error = %e, "explainer unavailable"))
            .ok();
        self.context.insert(
            symbol,
            SymbolModels {
                gradient_boosted,
                decomposition,
                volatility,
                explainer,
            },
        );
        info!(symbol, "models restored from store");
        Ok(())
    }

    /// Fit the cached volatility model on `history` when it was not restored,
    /// then try to persist it.
    fn refit_missing_volatility(
        &mut self,
        symbol: &str,
        history: &[PriceBar],
        table: &FeatureTable,
    ) -> Result<Option<String>, PipelineError> {
        let Some(models) = self.context.symbols.get_mut(symbol) else {
            return Ok(None);
        };
        if models.volatility.is_trained() {
            return Ok(None);
        }
        let input = ModelInput::new(history, table);
        train_model(&mut models.volatility, &input, &self.config.data.target, symbol)?;
        let saved = models
            .volatility
            .to_blob()
            .map_err(PipelineError::from)
            .and_then(|blob| {
                self.store
                    .save(ModelKind::ConditionalVolatility, symbol, &blob)
                    .map_err(PipelineError::from)
            });
        if let Err(e) = saved {
            warn!(symbol, error = %e, "refitted volatility model not persisted");
        }
        Ok(Some("volatility model refitted on current history".to_string()))
    }

    fn build_features(&self, history: &[PriceBar]) -> Result<FeatureTable, PipelineError> {
        let table = self.engineer.create_features(history)?;
        if table.is_empty() {
            return Err(PipelineError::InsufficientData {
                what: "feature table".to_string(),
                required: WARMUP_BARS,
                actual: history.len(),
            });
        }
        Ok(table)
    }
}

fn train_model(
    model: &mut dyn ForecastModel,
    input: &ModelInput<'_>,
    target: &str,
    symbol: &str,
) -> Result<TrainReport, PipelineError> {
    let kind = model.kind();
    info!(symbol, model = %kind, "model training started");
    let report = model.train(input, target)?;
    info!(
        symbol,
        model = %kind,
        samples = report.samples,
        rmse = report.in_sample_rmse,
        "model training finished"
    );
    Ok(report)
}

fn restore<S: ModelStore>(
    store: &S,
    model: &mut dyn ForecastModel,
    symbol: &str,
) -> Result<(), PipelineError> {
    let blob = store.load(model.kind(), symbol).map_err(|e| match e {
        StoreError::NotFound { kind, symbol } => PipelineError::NotTrained { symbol, kind },
        StoreError::Corrupt {
            kind,
            symbol,
            reason,
        } => {
            warn!(
                symbol = %symbol,
                model = %kind,
                reason = %reason,
                "stored model is corrupt, treating as untrained"
            );
            PipelineError::NotTrained { symbol, kind }
        }
        other => PipelineError::Store(other),
    })?;
    model.load_blob(&blob)?;
    Ok(())
}

fn first_point(forecast: Forecast) -> Result<ForecastPoint, PipelineError> {
    let kind = forecast.kind;
    forecast
        .points
        .into_iter()
        .next()
        .ok_or_else(|| ModelError::Fit(format!("{kind} returned an empty forecast")).into())
}

fn explain_latest(
    models: &SymbolModels,
    table: &FeatureTable,
    top_n: usize,
) -> Result<Vec<Contribution>, ExplainError> {
    let explainer = models.explainer.as_ref().ok_or(ExplainError::NotTrained)?;
    let latest = table.latest().ok_or(ExplainError::RowLength {
        expected: table.names().len(),
        actual: 0,
    })?;
    Ok(explainer.explain(table.names(), &latest.values, top_n)?.reasons)
}
