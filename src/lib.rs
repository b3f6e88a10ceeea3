// Finance Insight - Core Library
// Exposes the analytics pipeline for the CLI, the API server, and tests

pub mod error;
pub mod config;
pub mod dataset;
pub mod columns;        // Column discovery (keyword precedence)
pub mod table;          // Canonical transaction table + filters
pub mod normalizer;     // Raw dataset -> canonical table
pub mod series;         // Monthly aggregation
pub mod anomaly;        // Isolation forest over amounts
pub mod classifier;     // TF-IDF + logistic regression categorizer
pub mod forecast;       // Monthly expense forecast with intervals
pub mod summary;        // KPI numbers for reports
pub mod cache;          // Explicit dataset cache
pub mod pipeline;       // Analysis sessions
pub mod synthetic;      // Seeded demo data

// Re-export commonly used types
pub use error::{AnalyticsError, Result};
pub use config::{
    AnalyticsConfig, AnomalyConfig, CacheConfig, ClassifierConfig, ForecastConfig, OutputConfig,
    OutputLayout,
};
pub use dataset::RawDataset;
pub use columns::{detect_column, discover_columns, AmountSource, ColumnMapping, Discovery};
pub use table::{TableFilter, Transaction, TransactionTable, TransactionType};
pub use normalizer::{
    parse_amount, parse_date, DataWarning, DatasetNormalizer, NormalizationReport,
    NormalizedDataset, Severity,
};
pub use series::{MonthlySeries, YearMonth};
pub use anomaly::{AnomalyDetector, AnomalyLabel, AnomalyOutcome, AnomalyReport, IsolationForest};
pub use classifier::{
    CategoryModel, ModelStore, TfidfVectorizer, TrainingOutcome, TrainingSummary,
};
pub use forecast::{Forecast, ForecastPoint, Forecaster};
pub use summary::FinancialSummary;
pub use cache::{DatasetCache, DatasetKey};
pub use pipeline::{
    train_categorizer, AnalysisReport, AnalysisRequest, AnalysisSession, ComponentResult,
};
pub use synthetic::SyntheticGenerator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
