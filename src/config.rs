// ⚙️ Configuration - passed explicitly into every component
//
// Nothing in the pipeline reads a compiled-in path. Callers build an
// AnalyticsConfig (defaults, TOML file, or by hand) and hand it down.

use crate::error::{AnalyticsError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// ============================================================================
// TOP-LEVEL CONFIG
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub output: OutputConfig,
    pub anomaly: AnomalyConfig,
    pub classifier: ClassifierConfig,
    pub forecast: ForecastConfig,
    pub cache: CacheConfig,
}

impl AnalyticsConfig {
    /// Load configuration from a TOML file. Missing sections fall back to defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AnalyticsConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Default configuration writing artifacts under `base_dir`
    pub fn with_base_dir<P: Into<PathBuf>>(base_dir: P) -> Self {
        AnalyticsConfig {
            output: OutputConfig {
                base_dir: base_dir.into(),
            },
            ..Default::default()
        }
    }

    pub fn layout(&self) -> OutputLayout {
        OutputLayout::new(self.output.base_dir.clone())
    }

    pub fn validate(&self) -> Result<()> {
        let a = &self.anomaly;
        if !(a.contamination > 0.0 && a.contamination <= 0.5) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "anomaly.contamination must be in (0, 0.5], got {}",
                a.contamination
            )));
        }
        if a.n_trees == 0 || a.max_samples == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "anomaly.n_trees and anomaly.max_samples must be positive".to_string(),
            ));
        }

        let c = &self.classifier;
        if c.regularization <= 0.0 || c.max_iter == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "classifier.regularization and classifier.max_iter must be positive".to_string(),
            ));
        }

        let f = &self.forecast;
        if !(f.interval_width > 0.0 && f.interval_width < 1.0) {
            return Err(AnalyticsError::InvalidIntervalWidth(f.interval_width));
        }
        if f.horizon == 0 || f.horizon > f.max_horizon {
            return Err(AnalyticsError::InvalidHorizon(f.horizon));
        }
        if f.uncertainty_samples == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "forecast.uncertainty_samples must be positive".to_string(),
            ));
        }
        if f.max_horizon == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "forecast.max_horizon must be positive".to_string(),
            ));
        }
        if !(f.changepoint_range > 0.0 && f.changepoint_range <= 1.0) {
            return Err(AnalyticsError::InvalidConfig(format!(
                "forecast.changepoint_range must be in (0, 1], got {}",
                f.changepoint_range
            )));
        }

        if self.cache.max_datasets == 0 {
            return Err(AnalyticsError::InvalidConfig(
                "cache.max_datasets must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

// ============================================================================
// SECTIONS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root for every derived artifact (anomaly CSV, forecast CSV, model file)
    pub base_dir: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            base_dir: PathBuf::from("outputs"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnomalyConfig {
    /// Expected fraction of outliers
    pub contamination: f64,
    pub seed: u64,
    pub n_trees: usize,
    /// Sub-sample size per tree (capped by row count)
    pub max_samples: usize,
}

impl Default for AnomalyConfig {
    fn default() -> Self {
        AnomalyConfig {
            contamination: 0.05,
            seed: 42,
            n_trees: 100,
            max_samples: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Inverse L2 regularization strength
    pub regularization: f64,
    pub max_iter: usize,
    /// Stop once the gradient norm falls below this
    pub tolerance: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        ClassifierConfig {
            regularization: 1.0,
            max_iter: 1000,
            tolerance: 1e-6,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Horizon used when the caller doesn't pick one
    pub horizon: u32,
    /// Largest horizon a caller may request
    pub max_horizon: u32,
    pub interval_width: f64,
    pub uncertainty_samples: usize,
    pub seed: u64,
    /// Share of history eligible for trend changepoints
    pub changepoint_range: f64,
    pub max_changepoints: usize,
    pub changepoint_prior_scale: f64,
    pub seasonality_prior_scale: f64,
    /// Fourier order of the yearly component
    pub yearly_order: usize,
    /// Months of span required before yearly seasonality is fitted
    pub yearly_min_months: usize,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        ForecastConfig {
            horizon: 3,
            max_horizon: 120,
            interval_width: 0.95,
            uncertainty_samples: 1000,
            seed: 42,
            changepoint_range: 0.8,
            max_changepoints: 25,
            changepoint_prior_scale: 0.05,
            seasonality_prior_scale: 10.0,
            yearly_order: 3,
            yearly_min_months: 24,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Normalized datasets kept in memory before the least useful is evicted
    pub max_datasets: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { max_datasets: 16 }
    }
}

// ============================================================================
// OUTPUT LAYOUT
// ============================================================================

/// Filesystem layout for derived artifacts under the configured base dir.
#[derive(Debug, Clone)]
pub struct OutputLayout {
    root: PathBuf,
}

impl OutputLayout {
    pub fn new(root: PathBuf) -> Self {
        OutputLayout { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn anomalies_dir(&self) -> PathBuf {
        self.root.join("anomalies")
    }

    pub fn forecast_dir(&self) -> PathBuf {
        self.root.join("forecast")
    }

    pub fn models_dir(&self) -> PathBuf {
        self.root.join("models")
    }

    pub fn clean_dir(&self) -> PathBuf {
        self.root.join("clean")
    }

    pub fn anomalies_csv(&self) -> PathBuf {
        self.anomalies_dir().join("anomalies.csv")
    }

    pub fn forecast_csv(&self, horizon: u32) -> PathBuf {
        self.forecast_dir().join(format!("forecast_{}m.csv", horizon))
    }

    pub fn model_path(&self) -> PathBuf {
        self.models_dir().join("categorizer.json")
    }

    pub fn clean_csv(&self) -> PathBuf {
        self.clean_dir().join("clean_transactions.csv")
    }

    pub fn ensure_dirs(&self) -> Result<()> {
        fs::create_dir_all(self.anomalies_dir())?;
        fs::create_dir_all(self.forecast_dir())?;
        fs::create_dir_all(self.models_dir())?;
        fs::create_dir_all(self.clean_dir())?;
        Ok(())
    }
}
