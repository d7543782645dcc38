//! ForecastLab CLI — train, predict, validate and model store commands.
//!
//! Commands:
//! - `train` — fit and persist all three models for one or more symbols
//! - `predict` — next-day forecast, signal and top reasons (trains on demand)
//! - `validate` — chronological hold-out report for the gradient-boosted model
//! - `models status` — stored blobs per symbol with size, digest and write time

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use forecastlab_core::domain::ModelKind;
use forecastlab_runner::{
    CsvHistoryProvider, FileModelStore, HistoryProvider, ModelStore, Pipeline, PipelineConfig,
    PredictionReport, SyntheticHistoryProvider, TrainingSummary, ValidationReport,
};

#[derive(Parser)]
#[command(
    name = "forecastlab",
    about = "ForecastLab CLI — next-day price forecasts, signals and explanations"
)]
struct Cli {
    /// Path to a TOML config file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory of {SYMBOL}.csv files. Overrides [data] dir.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Model store directory. Overrides [store] dir.
    #[arg(long, global = true)]
    model_dir: Option<PathBuf>,

    /// Use a seeded synthetic random walk instead of CSV files.
    #[arg(long, global = true, default_value_t = false)]
    synthetic: bool,

    /// Debug-level logging (otherwise RUST_LOG, default info).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train and persist all models for the given symbols.
    Train {
        /// Symbols to train (e.g., THYAO ASELS).
        #[arg(required = true)]
        symbols: Vec<String>,
    },
    /// Forecast the next day for a symbol.
    Predict {
        symbol: String,

        /// Print the full report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Hold-out validation of the gradient-boosted model.
    Validate {
        symbol: String,

        /// Print the report as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Model store commands.
    Models {
        #[command(subcommand)]
        action: ModelsAction,
    },
}

#[derive(Subcommand)]
enum ModelsAction {
    /// List stored models per symbol.
    Status,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(&cli)?;

    match cli.command {
        Commands::Train { symbols } => run_train(config, &symbols),
        Commands::Predict { symbol, json } => run_predict(config, &symbol, json),
        Commands::Validate { symbol, json } => run_validate(config, &symbol, json),
        Commands::Models { action } => match action {
            ModelsAction::Status => run_models_status(&config),
        },
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data.dir = dir.clone();
    }
    if let Some(dir) = &cli.model_dir {
        config.store.dir = dir.clone();
    }
    if cli.synthetic {
        config.data.synthetic = true;
    }
    config.validate()?;
    debug!(
        data_dir = %config.data.dir.display(),
        model_dir = %config.store.dir.display(),
        synthetic = config.data.synthetic,
        "configuration loaded"
    );
    Ok(config)
}

fn build_pipeline(config: PipelineConfig) -> Pipeline<Box<dyn HistoryProvider>, FileModelStore> {
    let history: Box<dyn HistoryProvider> = if config.data.synthetic {
        Box::new(SyntheticHistoryProvider::new(config.data.synthetic_bars))
    } else {
        Box::new(CsvHistoryProvider::new(&config.data.dir))
    };
    let store = FileModelStore::new(&config.store.dir);
    Pipeline::new(config, history, store)
}

fn run_train(config: PipelineConfig, symbols: &[String]) -> Result<()> {
    let mut pipeline = build_pipeline(config);
    let mut failures = Vec::new();

    for symbol in symbols {
        match pipeline.train_full_pipeline(symbol) {
            Ok(summary) => print_training(&summary),
            Err(e) => {
                eprintln!("Error for {symbol}: {e}");
                failures.push(symbol.as_str());
            }
        }
    }

    if !failures.is_empty() {
        eprintln!("Training failed for: {}", failures.join(", "));
        std::process::exit(1);
    }
    Ok(())
}

fn run_predict(config: PipelineConfig, symbol: &str, json: bool) -> Result<()> {
    let mut pipeline = build_pipeline(config);
    let report = pipeline.predict_next_day(symbol)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_prediction(&report);
    }
    Ok(())
}

fn run_validate(config: PipelineConfig, symbol: &str, json: bool) -> Result<()> {
    let pipeline = build_pipeline(config);
    let report = pipeline.validate(symbol)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_validation(symbol, &report);
    }
    Ok(())
}

fn run_models_status(config: &PipelineConfig) -> Result<()> {
    let store = FileModelStore::new(&config.store.dir);
    let symbols = store.symbols()?;
    if symbols.is_empty() {
        println!("Model store is empty: {}", store.root().display());
        return Ok(());
    }

    println!("Model store: {}", store.root().display());
    println!("Symbols: {}", symbols.len());
    println!();
    println!(
        "{:<8} {:<8} {:>10} {:<14} {:<20}",
        "Symbol", "Model", "Size", "Digest", "Written"
    );
    println!("{}", "-".repeat(64));
    for symbol in &symbols {
        for kind in ModelKind::ALL {
            match store.meta(kind, symbol) {
                Ok(Some(meta)) => println!(
                    "{:<8} {:<8} {:>10} {:<14} {:<20}",
                    symbol,
                    kind.as_str(),
                    format_size(meta.bytes as u64),
                    &meta.digest[..meta.digest.len().min(12)],
                    meta.written_at.format("%Y-%m-%d %H:%M:%S"),
                ),
                Ok(None) => println!("{:<8} {:<8} {:>10}", symbol, kind.as_str(), "(missing)"),
                Err(e) => println!("{:<8} {:<8} {:>10} {e}", symbol, kind.as_str(), "(corrupt)"),
            }
        }
    }
    Ok(())
}

fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{bytes} B")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

fn print_training(summary: &TrainingSummary) {
    println!();
    println!("=== Trained {} ===", summary.symbol);
    println!(
        "Bars:           {} ({} feature rows)",
        summary.history_bars, summary.feature_rows
    );
    for report in &summary.reports {
        let rmse = report
            .in_sample_rmse
            .map(|r| format!("rmse {r:.4}"))
            .unwrap_or_default();
        let convergence = report
            .convergence
            .as_ref()
            .map(|c| {
                format!(
                    "converged={} persistence={:.3}",
                    c.converged, c.persistence
                )
            })
            .unwrap_or_default();
        println!(
            "{:<15} {} samples {rmse}{convergence}",
            format!("{}:", report.kind),
            report.samples
        );
    }
    println!("Persisted:      {} model(s)", summary.persisted.len());
    if summary.synthetic {
        println!("WARNING: Trained on SYNTHETIC data");
    }
    for warn in &summary.warnings {
        println!("WARNING: {warn}");
    }
}

fn print_prediction(report: &PredictionReport) {
    println!();
    println!("=== {} → {} ===", report.symbol, report.target_date);
    println!("Current:        {:.4} (as of {})", report.current_price, report.as_of);
    println!("Predicted:      {:.4}", report.predicted_price);
    println!("Change:         {:+.2}%", report.percent_change);
    println!("Volatility:     {:.2}%", report.volatility);
    println!("Regime:         {:?}", report.market_regime);
    println!("Signal:         {}", report.signal);
    println!();
    println!("--- Models ---");
    for (model, price) in &report.model_predictions {
        println!("{:<15} {price:.4}", format!("{model}:"));
    }
    if !report.ranked_reasons.is_empty() {
        println!();
        println!("--- Reasons ---");
        for (i, reason) in report.ranked_reasons.iter().enumerate() {
            println!(
                "{}. {:<28} {:+.4} (value {:.4})",
                i + 1,
                reason.describe(),
                reason.contribution,
                reason.value
            );
        }
    }
    for warn in &report.warnings {
        println!("WARNING: {warn}");
    }
    println!();
}

fn print_validation(symbol: &str, report: &ValidationReport) {
    println!();
    println!("=== Hold-out validation: {symbol} ===");
    println!(
        "Rows:           {} train / {} test",
        report.train_rows, report.test_rows
    );
    println!("RMSE:           {:.4}", report.rmse);
    println!("MAE:            {:.4}", report.mae);
    println!("MAPE:           {:.2}%", report.mape);
    println!("R²:             {:.4}", report.r2);
    println!("Direction:      {:.1}%", report.directional_accuracy);
    println!();
    println!("--- Long-or-cash ---");
    println!("Strategy:       {:+.2}%", report.strategy_return * 100.0);
    println!("Buy & hold:     {:+.2}%", report.buy_and_hold_return * 100.0);
    println!();
}
