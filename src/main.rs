// Finance Insight - Command-line front end

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use finance_insight::{
    train_categorizer, AnalysisReport, AnalysisRequest, AnalysisSession, AnalyticsConfig,
    AnomalyDetector, AnomalyOutcome, ComponentResult, DatasetNormalizer, Forecast, Forecaster,
    ModelStore, NormalizedDataset, RawDataset, SyntheticGenerator, TableFilter, TrainingOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Personal-finance analytics: clean, flag, categorize, forecast
#[derive(Parser, Debug)]
#[command(name = "finance-insight", author, version, about)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Output directory for artifacts (overrides the config file)
    #[arg(short, long, global = true)]
    out: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every component on a CSV export and write all artifacts
    Analyze {
        csv: PathBuf,

        /// Months to forecast
        #[arg(long)]
        horizon: Option<u32>,

        /// Forecast interval width, strictly between 0 and 1
        #[arg(long)]
        interval: Option<f64>,

        /// First day to include (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Only include these categories (repeatable)
        #[arg(long = "category")]
        categories: Vec<String>,

        /// Also retrain the categorizer
        #[arg(long)]
        train: bool,
    },

    /// Normalize a CSV export and write the canonical table
    Clean { csv: PathBuf },

    /// Train the categorizer on a CSV export
    Train { csv: PathBuf },

    /// Predict the category of a description with the trained model
    Predict { description: String },

    /// Flag unusual amounts and write the anomaly CSV
    Anomalies { csv: PathBuf },

    /// Forecast monthly expenses and write the forecast CSV
    Forecast {
        csv: PathBuf,

        #[arg(long)]
        horizon: Option<u32>,

        #[arg(long)]
        interval: Option<f64>,
    },

    /// Write a seeded synthetic transaction CSV
    Sample {
        /// Destination file
        output: PathBuf,

        #[arg(long, default_value_t = 500)]
        rows: usize,

        #[arg(long)]
        from: Option<NaiveDate>,

        #[arg(long)]
        to: Option<NaiveDate>,

        #[arg(long, default_value_t = 42)]
        seed: u64,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = load_config(args.config.as_deref(), args.out)?;

    match args.command {
        Command::Analyze {
            csv,
            horizon,
            interval,
            from,
            to,
            categories,
            train,
        } => {
            let filter = TableFilter {
                start: from,
                end: to,
                categories,
            };
            let request = AnalysisRequest::from_config(&config)
                .with_filter(filter)
                .with_horizon(horizon.unwrap_or(config.forecast.horizon))
                .with_interval_width(interval.unwrap_or(config.forecast.interval_width))
                .with_training(train)
                .with_artifacts(true);
            run_analyze(&config, &csv, &request)
        }
        Command::Clean { csv } => run_clean(&config, &csv),
        Command::Train { csv } => run_train(&config, &csv),
        Command::Predict { description } => run_predict(&config, &description),
        Command::Anomalies { csv } => run_anomalies(&config, &csv),
        Command::Forecast {
            csv,
            horizon,
            interval,
        } => run_forecast(
            &config,
            &csv,
            horizon.unwrap_or(config.forecast.horizon),
            interval.unwrap_or(config.forecast.interval_width),
        ),
        Command::Sample {
            output,
            rows,
            from,
            to,
            seed,
        } => run_sample(&output, rows, from, to, seed),
    }
}

fn load_config(path: Option<&Path>, out: Option<PathBuf>) -> Result<AnalyticsConfig> {
    let mut config = match path {
        Some(path) => AnalyticsConfig::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => AnalyticsConfig::default(),
    };
    if let Some(out) = out {
        config.output.base_dir = out;
    }
    Ok(config)
}

fn load_dataset(csv: &Path) -> Result<NormalizedDataset> {
    println!("📂 Loading {}...", csv.display());
    let raw = RawDataset::from_path(csv)?;
    let dataset = DatasetNormalizer::new().normalize(&raw)?;

    println!("✓ Columns: {}", dataset.report.mapping.summary());
    println!("✓ {}", dataset.report.summary());
    for warning in &dataset.report.warnings {
        println!("  ⚠ {}: {}", warning.field, warning.message);
    }
    Ok(dataset)
}

// ============================================================================
// COMMANDS
// ============================================================================

fn run_analyze(config: &AnalyticsConfig, csv: &Path, request: &AnalysisRequest) -> Result<()> {
    println!("🔍 Finance Insight - Analysis");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let dataset = load_dataset(csv)?;
    let session = AnalysisSession::new(config.clone(), Arc::new(dataset));
    let store = ModelStore::new(config.layout().model_path());
    let report = session.run(request, &store);

    print_report(&report);
    Ok(())
}

fn print_report(report: &AnalysisReport) {
    println!("\n📊 Summary ({} rows after filters)", report.rows_analyzed);
    println!("✓ {}", report.summary.summary());
    for entry in &report.summary.top_categories {
        println!("  {:<20} {:>12.2}", entry.name, entry.amount);
    }

    println!("\n🚨 Anomalies");
    match &report.anomalies {
        ComponentResult::Ready(anomalies) => println!("✓ {}", anomalies.summary()),
        other => println!("✗ {}", other.status()),
    }

    println!("\n🏷️  Categorizer");
    match &report.categorizer {
        ComponentResult::Ready(training) => println!("✓ Trained: {}", training.summary()),
        other => println!("- {}", other.status()),
    }

    println!("\n📈 Forecast");
    match &report.forecast {
        ComponentResult::Ready(forecast) => print_forecast(forecast),
        other => println!("✗ {}", other.status()),
    }

    if !report.artifacts.is_empty() {
        println!("\n💾 Artifacts");
        for path in &report.artifacts {
            println!("  {}", path.display());
        }
    }
}

fn print_forecast(forecast: &Forecast) {
    println!("✓ {}", forecast.summary());
    for p in &forecast.points {
        println!(
            "  {}  {:>12.2}  [{:.2}, {:.2}]",
            p.month, p.yhat, p.yhat_lower, p.yhat_upper
        );
    }
}

fn run_clean(config: &AnalyticsConfig, csv: &Path) -> Result<()> {
    let dataset = load_dataset(csv)?;
    let layout = config.layout();
    layout.ensure_dirs()?;

    let path = layout.clean_csv();
    dataset.table.write_csv(&path)?;
    println!("✓ Clean dataset saved at {} with {} rows", path.display(), dataset.table.len());
    Ok(())
}

fn run_train(config: &AnalyticsConfig, csv: &Path) -> Result<()> {
    let dataset = load_dataset(csv)?;
    let store = ModelStore::new(config.layout().model_path());

    match train_categorizer(&dataset.table, config, &store)? {
        TrainingOutcome::Trained { summary, .. } => {
            println!("✓ Model trained: {}", summary.summary());
            println!("✓ Saved at {}", store.path().display());
        }
        TrainingOutcome::Skipped { reason } => println!("- Training skipped: {}", reason),
    }
    Ok(())
}

fn run_predict(config: &AnalyticsConfig, description: &str) -> Result<()> {
    let store = ModelStore::new(config.layout().model_path());
    let model = store.load()?;

    println!("✓ {} → {}", description, model.predict(description));
    for (label, p) in model.predict_proba(description) {
        println!("  {:<20} {:>6.1}%", label, p * 100.0);
    }
    Ok(())
}

fn run_anomalies(config: &AnalyticsConfig, csv: &Path) -> Result<()> {
    let dataset = load_dataset(csv)?;

    match AnomalyDetector::new(config.anomaly.clone()).detect(&dataset.table) {
        AnomalyOutcome::Labeled(report) => {
            let layout = config.layout();
            layout.ensure_dirs()?;
            let path = layout.anomalies_csv();
            report.write_csv(&path)?;

            println!("✓ {}", report.summary());
            for tx in report.anomalies() {
                println!("  {}  {:>12.2}  {}", tx.date, tx.amount, tx.description);
            }
            println!("✓ Anomalies saved at {}", path.display());
        }
        AnomalyOutcome::NoData => println!("- No transactions to score"),
    }
    Ok(())
}

fn run_forecast(config: &AnalyticsConfig, csv: &Path, horizon: u32, interval: f64) -> Result<()> {
    let dataset = load_dataset(csv)?;
    let forecast =
        Forecaster::new(config.forecast.clone()).forecast(&dataset.table, horizon, interval)?;

    let layout = config.layout();
    layout.ensure_dirs()?;
    let path = layout.forecast_csv(horizon);
    forecast.write_csv(&path)?;

    print_forecast(&forecast);
    println!("✓ Forecast saved at {}", path.display());
    Ok(())
}

fn run_sample(
    output: &Path,
    rows: usize,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    seed: u64,
) -> Result<()> {
    let mut generator = SyntheticGenerator::new().with_rows(rows).with_seed(seed);
    if let (Some(from), Some(to)) = (from, to) {
        generator = generator.with_range(from, to);
    }

    let table = generator.generate();
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    table.write_csv(output)?;
    println!("✓ Synthetic dataset created at {} with {} rows", output.display(), table.len());
    Ok(())
}
