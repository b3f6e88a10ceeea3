// 🔄 Analysis Pipeline - one session, four components, isolated failures
//
// A session owns the normalized table. Each run filters it, then hands a
// read-only view to the summary, the anomaly detector, the categorizer
// trainer and the forecaster. A failing component is reported on its own
// and never hides the others.

use crate::anomaly::{AnomalyDetector, AnomalyOutcome, AnomalyReport};
use crate::classifier::{CategoryModel, ModelStore, TrainingOutcome, TrainingSummary};
use crate::config::{AnalyticsConfig, OutputLayout};
use crate::dataset::RawDataset;
use crate::error::{AnalyticsError, Result};
use crate::forecast::{Forecast, Forecaster};
use crate::normalizer::{DatasetNormalizer, NormalizationReport, NormalizedDataset};
use crate::summary::FinancialSummary;
use crate::table::{TableFilter, TransactionTable};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

// ============================================================================
// COMPONENT RESULT
// ============================================================================

/// Outcome of one optional component
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ComponentResult<T> {
    Ready(T),
    /// Input was empty or insufficient; the caller can retry with more data
    Unavailable { reason: String },
    /// Something unexpected went wrong
    Failed { error: String },
}

impl<T> ComponentResult<T> {
    pub fn from_result(component: &str, result: Result<T>) -> Self {
        match result {
            Ok(value) => ComponentResult::Ready(value),
            Err(e) if e.is_recoverable() => {
                info!(component, reason = %e, "component unavailable");
                ComponentResult::Unavailable {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                warn!(component, error = %e, "component failed");
                ComponentResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        ComponentResult::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_ready(&self) -> bool {
        matches!(self, ComponentResult::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            ComponentResult::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn status(&self) -> String {
        match self {
            ComponentResult::Ready(_) => "ready".to_string(),
            ComponentResult::Unavailable { reason } => format!("unavailable: {}", reason),
            ComponentResult::Failed { error } => format!("failed: {}", error),
        }
    }
}

// ============================================================================
// REQUEST / REPORT
// ============================================================================

#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub filter: TableFilter,
    pub horizon: u32,
    pub interval_width: f64,
    pub train_categorizer: bool,
    pub write_artifacts: bool,
}

impl AnalysisRequest {
    /// Forecast parameters taken from the configured defaults
    pub fn from_config(config: &AnalyticsConfig) -> Self {
        AnalysisRequest {
            filter: TableFilter::default(),
            horizon: config.forecast.horizon,
            interval_width: config.forecast.interval_width,
            train_categorizer: false,
            write_artifacts: false,
        }
    }

    pub fn with_filter(mut self, filter: TableFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_horizon(mut self, horizon: u32) -> Self {
        self.horizon = horizon;
        self
    }

    pub fn with_interval_width(mut self, interval_width: f64) -> Self {
        self.interval_width = interval_width;
        self
    }

    pub fn with_training(mut self, train: bool) -> Self {
        self.train_categorizer = train;
        self
    }

    pub fn with_artifacts(mut self, write: bool) -> Self {
        self.write_artifacts = write;
        self
    }
}

impl Default for AnalysisRequest {
    fn default() -> Self {
        Self::from_config(&AnalyticsConfig::default())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisReport {
    pub session_id: Uuid,
    pub normalization: NormalizationReport,
    /// Rows left after filtering
    pub rows_analyzed: usize,
    pub summary: FinancialSummary,
    pub anomalies: ComponentResult<AnomalyReport>,
    pub categorizer: ComponentResult<TrainingSummary>,
    pub forecast: ComponentResult<Forecast>,
    /// Files written during this run
    pub artifacts: Vec<PathBuf>,
}

impl AnalysisReport {
    pub fn anomaly_count(&self) -> usize {
        self.anomalies.ready().map(|r| r.count()).unwrap_or(0)
    }
}

// ============================================================================
// SESSION
// ============================================================================

pub struct AnalysisSession {
    id: Uuid,
    config: AnalyticsConfig,
    dataset: Arc<NormalizedDataset>,
}

impl AnalysisSession {
    pub fn new(config: AnalyticsConfig, dataset: Arc<NormalizedDataset>) -> Self {
        AnalysisSession {
            id: Uuid::new_v4(),
            config,
            dataset,
        }
    }

    /// Normalize a raw dataset; schema errors end the session before it starts
    pub fn from_raw(config: AnalyticsConfig, raw: &RawDataset) -> Result<Self> {
        let dataset = DatasetNormalizer::new().normalize(raw)?;
        Ok(Self::new(config, Arc::new(dataset)))
    }

    pub fn from_path(config: AnalyticsConfig, path: &Path) -> Result<Self> {
        Self::from_raw(config, &RawDataset::from_path(path)?)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn table(&self) -> &TransactionTable {
        &self.dataset.table
    }

    pub fn normalization(&self) -> &NormalizationReport {
        &self.dataset.report
    }

    /// Categories available for filtering
    pub fn categories(&self) -> Vec<String> {
        self.dataset.table.categories()
    }

    pub fn run(&self, request: &AnalysisRequest, store: &ModelStore) -> AnalysisReport {
        let table = self.dataset.table.filter(&request.filter);
        let layout = self.config.layout();
        let mut artifacts = Vec::new();

        info!(session = %self.id, rows = table.len(), "analysis started");

        if request.write_artifacts {
            let clean = layout.clean_csv();
            match layout.ensure_dirs().and_then(|_| table.write_csv(&clean)) {
                Ok(()) => artifacts.push(clean),
                Err(e) => warn!(error = %e, "could not write clean dataset"),
            }
        }

        let summary = FinancialSummary::from_table(&table);
        let anomalies = self.run_anomalies(&table, request, &layout, &mut artifacts);
        let categorizer = self.run_categorizer(&table, request, store, &mut artifacts);
        let forecast = self.run_forecast(&table, request, &layout, &mut artifacts);

        info!(
            session = %self.id,
            anomalies = %anomalies.status(),
            categorizer = %categorizer.status(),
            forecast = %forecast.status(),
            "analysis complete"
        );

        AnalysisReport {
            session_id: self.id,
            normalization: self.dataset.report.clone(),
            rows_analyzed: table.len(),
            summary,
            anomalies,
            categorizer,
            forecast,
            artifacts,
        }
    }

    fn run_anomalies(
        &self,
        table: &TransactionTable,
        request: &AnalysisRequest,
        layout: &OutputLayout,
        artifacts: &mut Vec<PathBuf>,
    ) -> ComponentResult<AnomalyReport> {
        let report = match AnomalyDetector::new(self.config.anomaly.clone()).detect(table) {
            AnomalyOutcome::Labeled(report) => report,
            AnomalyOutcome::NoData => return ComponentResult::unavailable("no transactions to score"),
        };

        let written = if request.write_artifacts {
            let path = layout.anomalies_csv();
            layout
                .ensure_dirs()
                .and_then(|_| report.write_csv(&path))
                .map(|_| Some(path))
        } else {
            Ok(None)
        };

        ComponentResult::from_result(
            "anomalies",
            written.map(|path| {
                artifacts.extend(path);
                report
            }),
        )
    }

    fn run_categorizer(
        &self,
        table: &TransactionTable,
        request: &AnalysisRequest,
        store: &ModelStore,
        artifacts: &mut Vec<PathBuf>,
    ) -> ComponentResult<TrainingSummary> {
        if !request.train_categorizer {
            return ComponentResult::unavailable("training not requested");
        }

        match CategoryModel::train(table, &self.config.classifier) {
            TrainingOutcome::Trained { model, summary } => {
                let saved = store.save(&model).map(|_| {
                    artifacts.push(store.path().to_path_buf());
                    summary
                });
                ComponentResult::from_result("categorizer", saved)
            }
            TrainingOutcome::Skipped { reason } => ComponentResult::unavailable(reason),
        }
    }

    fn run_forecast(
        &self,
        table: &TransactionTable,
        request: &AnalysisRequest,
        layout: &OutputLayout,
        artifacts: &mut Vec<PathBuf>,
    ) -> ComponentResult<Forecast> {
        let result = Forecaster::new(self.config.forecast.clone())
            .forecast(table, request.horizon, request.interval_width)
            .and_then(|forecast| {
                if request.write_artifacts {
                    let path = layout.forecast_csv(request.horizon);
                    layout.ensure_dirs()?;
                    forecast.write_csv(&path)?;
                    artifacts.push(path);
                }
                Ok(forecast)
            });

        ComponentResult::from_result("forecast", result)
    }
}

/// Train and persist the categorizer outside a full analysis
pub fn train_categorizer(
    table: &TransactionTable,
    config: &AnalyticsConfig,
    store: &ModelStore,
) -> Result<TrainingOutcome> {
    let outcome = CategoryModel::train(table, &config.classifier);
    if let TrainingOutcome::Trained { model, .. } = &outcome {
        store.save(model)?;
    }
    Ok(outcome)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticGenerator;
    use crate::table::TransactionType;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    const SCENARIO: &str = "Date,Amount,Category,Description\n\
                            2024-01-05,-50,Food,McDonalds\n\
                            2024-01-10,1000,Income,Salary\n\
                            2024-02-05,-60,Food,KFC\n";

    fn setup() -> (TempDir, AnalyticsConfig, ModelStore) {
        let temp = TempDir::new().unwrap();
        let config = AnalyticsConfig::with_base_dir(temp.path());
        let store = ModelStore::new(config.layout().model_path());
        (temp, config, store)
    }

    fn session(config: &AnalyticsConfig, csv: &str) -> AnalysisSession {
        let raw = RawDataset::from_bytes(csv.as_bytes()).unwrap();
        AnalysisSession::from_raw(config.clone(), &raw).unwrap()
    }

    /// Twelve months of synthetic activity written as CSV text
    fn year_of_data(temp: &TempDir) -> PathBuf {
        let table = SyntheticGenerator::new()
            .with_rows(600)
            .with_range(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
            )
            .generate();
        let path = temp.path().join("year.csv");
        table.write_csv(&path).unwrap();
        path
    }

    #[test]
    fn test_end_to_end_scenario() {
        let (_temp, config, store) = setup();
        let session = session(&config, SCENARIO);
        let report = session.run(&AnalysisRequest::from_config(&config), &store);

        let types: Vec<TransactionType> = session
            .table()
            .transactions()
            .iter()
            .map(|t| t.transaction_type)
            .collect();
        assert_eq!(
            types,
            vec![TransactionType::Expense, TransactionType::Income, TransactionType::Expense]
        );

        assert_eq!(report.rows_analyzed, 3);
        assert_eq!(report.summary.total_income, 1000.0);
        assert_eq!(report.summary.total_expenses, 110.0);
        assert_eq!(report.summary.savings_rate.round(), 89.0);

        assert!(report.anomalies.is_ready());
        assert!(matches!(report.categorizer, ComponentResult::Unavailable { .. }));
        // Two months of expenses cannot be forecast, but nothing else is affected
        match &report.forecast {
            ComponentResult::Unavailable { reason } => assert!(reason.contains("2 month(s)")),
            other => panic!("expected unavailable forecast, got {:?}", other.status()),
        }
    }

    #[test]
    fn test_debit_credit_dataset_runs() {
        let (_temp, config, store) = setup();
        let session = session(
            &config,
            "TxnDate,Debit,Credit\n2024-01-05,50,\n2024-01-10,,1000\n2024-02-05,60,\n",
        );
        let report = session.run(&AnalysisRequest::from_config(&config), &store);

        assert_eq!(report.rows_analyzed, 3);
        assert_eq!(report.summary.total_expenses, 110.0);
    }

    #[test]
    fn test_schema_error_halts_session() {
        let (_temp, config, _store) = setup();
        let raw = RawDataset::from_bytes(b"Memo,Amount\ncoffee,-3\n").unwrap();
        assert!(matches!(
            AnalysisSession::from_raw(config, &raw),
            Err(AnalyticsError::NoDateColumnFound)
        ));
    }

    #[test]
    fn test_full_run_writes_artifacts() {
        let (temp, config, store) = setup();
        let session = AnalysisSession::from_path(config.clone(), &year_of_data(&temp)).unwrap();

        let request = AnalysisRequest::from_config(&config)
            .with_horizon(6)
            .with_training(true)
            .with_artifacts(true);
        let report = session.run(&request, &store);

        let forecast = report.forecast.ready().unwrap();
        assert_eq!(forecast.points.len(), 6);
        assert!(report.categorizer.is_ready());
        assert!(report.anomalies.is_ready());

        let layout = config.layout();
        assert!(layout.anomalies_csv().is_file());
        assert!(layout.forecast_csv(6).is_file());
        assert!(layout.model_path().is_file());
        assert!(layout.clean_csv().is_file());
        assert_eq!(report.artifacts.len(), 4);

        assert_eq!(store.predict("Netflix").unwrap(), "Entertainment");
    }

    #[test]
    fn test_filter_is_applied_before_components() {
        let (temp, config, store) = setup();
        let session = AnalysisSession::from_path(config.clone(), &year_of_data(&temp)).unwrap();

        let filter = TableFilter::new()
            .with_start(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
            .with_end(NaiveDate::from_ymd_opt(2024, 3, 31).unwrap())
            .with_categories(vec!["Food".to_string()]);
        let report = session.run(&AnalysisRequest::from_config(&config).with_filter(filter), &store);

        let expected = session
            .table()
            .transactions()
            .iter()
            .filter(|t| t.category == "Food" && t.date.format("%Y-%m").to_string() == "2024-03")
            .count();
        assert_eq!(report.rows_analyzed, expected);
        assert!(report.summary.top_categories.iter().all(|c| c.name == "Food"));
        // a single month is not enough history
        assert!(matches!(report.forecast, ComponentResult::Unavailable { .. }));
    }

    #[test]
    fn test_bad_interval_only_affects_forecast() {
        let (temp, config, store) = setup();
        let session = AnalysisSession::from_path(config.clone(), &year_of_data(&temp)).unwrap();
        let report = session.run(
            &AnalysisRequest::from_config(&config).with_interval_width(1.5),
            &store,
        );

        assert!(matches!(report.forecast, ComponentResult::Unavailable { .. }));
        assert!(report.anomalies.is_ready());
        assert!(report.summary.total_income > 0.0);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let (temp, config, store) = setup();
        let session = AnalysisSession::from_path(config.clone(), &year_of_data(&temp)).unwrap();
        let request = AnalysisRequest::from_config(&config);

        let a = session.run(&request, &store);
        let b = session.run(&request, &store);

        assert_eq!(
            a.anomalies.ready().unwrap().labels,
            b.anomalies.ready().unwrap().labels
        );
        assert_eq!(
            a.forecast.ready().unwrap().points,
            b.forecast.ready().unwrap().points
        );
    }

    #[test]
    fn test_train_categorizer_persists_model() {
        let (temp, config, store) = setup();
        assert!(matches!(store.predict("Uber"), Err(AnalyticsError::ModelNotTrained)));

        let table = TransactionTable::read_canonical(&year_of_data(&temp)).unwrap();
        let outcome = train_categorizer(&table, &config, &store).unwrap();

        assert!(matches!(outcome, TrainingOutcome::Trained { .. }));
        assert_eq!(store.predict("Spotify").unwrap(), "Entertainment");
    }

    #[test]
    fn test_component_result_classification() {
        let unavailable: ComponentResult<()> =
            ComponentResult::from_result("test", Err(AnalyticsError::NoExpenseData));
        assert!(matches!(unavailable, ComponentResult::Unavailable { .. }));

        let failed: ComponentResult<()> = ComponentResult::from_result(
            "test",
            Err(AnalyticsError::Io(std::io::Error::new(std::io::ErrorKind::Other, "disk"))),
        );
        assert!(matches!(failed, ComponentResult::Failed { .. }));
        assert!(failed.status().starts_with("failed"));
    }

    #[test]
    fn test_report_serializes() {
        let (_temp, config, store) = setup();
        let report = session(&config, SCENARIO).run(&AnalysisRequest::from_config(&config), &store);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["forecast"]["status"], "unavailable");
        assert_eq!(json["anomalies"]["status"], "ready");
        assert_eq!(json["summary"]["total_income"], 1000.0);
    }
}
