// 📈 Forecaster - monthly expense projection with uncertainty bounds
//
// Additive model over the monthly expense series:
//
//   y(t) = k·t + m + Σ δ_j·(t − s_j)₊ + Σ [a_r·sin(2πr·p/12) + b_r·cos(2πr·p/12)]
//
// with t the month position scaled to [0, 1] over the history, s_j the
// trend changepoints (first part of the history only) and p the calendar
// month. Parameters are the penalized least-squares (MAP) estimate under
// Gaussian priors. Intervals come from simulating future trend changes
// and observation noise, then reading off sample quantiles.

use crate::anomaly::quantile;
use crate::config::ForecastConfig;
use crate::error::{AnalyticsError, Result};
use crate::series::{MonthlySeries, YearMonth};
use crate::table::{TransactionTable, TransactionType};
use anyhow::{anyhow, Context};
use chrono::NaiveDate;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Exp, Normal, Poisson};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::path::Path;
use tracing::info;

/// Fewer distinct months than this cannot support a trend fit
pub const MIN_HISTORY_MONTHS: usize = 3;

/// Reference noise level of the max-scaled series; converts prior scales
/// into ridge penalties (penalty = NOISE_SCALE² / prior_sd²).
const NOISE_SCALE: f64 = 0.1;

/// Near-flat prior on base slope and offset
const BASE_PENALTY: f64 = 1e-6;

// ============================================================================
// OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub month: YearMonth,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

impl ForecastPoint {
    /// Month timestamp (first day of the month)
    pub fn ds(&self) -> NaiveDate {
        self.month.first_day()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSummary {
    pub changepoints: usize,
    pub yearly_seasonality: bool,
    /// Residual standard deviation, in currency units
    pub sigma: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub horizon: u32,
    pub interval_width: f64,
    pub points: Vec<ForecastPoint>,
    /// The monthly expense history the model was fitted on
    pub history: MonthlySeries,
    pub model: ModelSummary,
}

impl Forecast {
    pub fn summary(&self) -> String {
        let total: f64 = self.points.iter().map(|p| p.yhat).sum();
        format!(
            "{} month(s) from {} months of history, {:.0}% interval, projected spend {:.2}",
            self.points.len(),
            self.history.len(),
            self.interval_width * 100.0,
            total
        )
    }

    /// Write `ds,yhat,yhat_lower,yhat_upper`, one row per forecast month
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create forecast CSV: {}", path.display()))?;
        writer.write_record(["ds", "yhat", "yhat_lower", "yhat_upper"])?;
        for p in &self.points {
            writer.write_record([
                p.ds().format("%Y-%m-%d").to_string(),
                p.yhat.to_string(),
                p.yhat_lower.to_string(),
                p.yhat_upper.to_string(),
            ])?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = self.points.len(), "wrote forecast CSV");
        Ok(())
    }
}

// ============================================================================
// FORECASTER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Forecaster { config }
    }

    pub fn forecast(
        &self,
        table: &TransactionTable,
        horizon: u32,
        interval_width: f64,
    ) -> Result<Forecast> {
        if horizon == 0 || horizon > self.config.max_horizon {
            return Err(AnalyticsError::InvalidHorizon(horizon));
        }
        if !(interval_width > 0.0 && interval_width < 1.0) {
            return Err(AnalyticsError::InvalidIntervalWidth(interval_width));
        }

        let history = MonthlySeries::expenses(table);
        if history.is_empty() {
            return Err(AnalyticsError::NoExpenseData);
        }
        if history.len() < MIN_HISTORY_MONTHS {
            return Err(AnalyticsError::InsufficientHistory {
                months: history.len(),
                required: MIN_HISTORY_MONTHS,
            });
        }

        let observations = history.values(TransactionType::Expense);
        let model = AdditiveModel::fit(&observations, &self.config)?;
        let points = model.predict(horizon, interval_width, &self.config)?;

        let summary = ModelSummary {
            changepoints: model.changepoints.len(),
            yearly_seasonality: model.yearly_order > 0,
            sigma: model.sigma * model.y_scale,
        };
        info!(
            months = history.len(),
            horizon,
            changepoints = summary.changepoints,
            yearly = summary.yearly_seasonality,
            sigma = summary.sigma,
            "fitted expense forecast"
        );

        Ok(Forecast {
            horizon,
            interval_width,
            points,
            history,
            model: summary,
        })
    }
}

// ============================================================================
// MODEL
// ============================================================================

#[derive(Debug, Clone)]
struct AdditiveModel {
    first: YearMonth,
    last: YearMonth,
    /// Months between first and last observation
    span: f64,
    y_scale: f64,
    changepoints: Vec<f64>,
    yearly_order: usize,
    /// [k, m, δ..., seasonal...]
    beta: Vec<f64>,
    /// Residual sd on the scaled series
    sigma: f64,
}

impl AdditiveModel {
    fn fit(observations: &[(YearMonth, f64)], config: &ForecastConfig) -> Result<Self> {
        let (first, last) = match (observations.first(), observations.last()) {
            (Some(f), Some(l)) => (f.0, l.0),
            _ => return Err(AnalyticsError::NoExpenseData),
        };
        let span = first.months_until(&last).max(1) as f64;

        let y_scale = observations
            .iter()
            .map(|(_, y)| y.abs())
            .fold(0.0, f64::max);
        let y_scale = if y_scale > 0.0 { y_scale } else { 1.0 };

        let t: Vec<f64> = observations
            .iter()
            .map(|(m, _)| first.months_until(m) as f64 / span)
            .collect();
        let y: Vec<f64> = observations.iter().map(|(_, v)| v / y_scale).collect();

        // Changepoints evenly spread over the first part of the history
        let n = observations.len();
        let hist_size = ((config.changepoint_range * n as f64).floor() as usize).min(n);
        let n_changepoints = config.max_changepoints.min(hist_size.saturating_sub(1));
        let changepoints: Vec<f64> = (1..=n_changepoints)
            .map(|i| {
                let idx = (i as f64 * (hist_size - 1) as f64 / n_changepoints as f64).round();
                t[idx as usize]
            })
            .collect();

        let yearly_order = if span as usize + 1 >= config.yearly_min_months {
            config.yearly_order
        } else {
            0
        };

        let mut model = AdditiveModel {
            first,
            last,
            span,
            y_scale,
            changepoints,
            yearly_order,
            beta: Vec::new(),
            sigma: 0.0,
        };

        let design: Vec<Vec<f64>> = observations
            .iter()
            .zip(&t)
            .map(|((month, _), &ti)| model.features(ti, month))
            .collect();
        let p = 2 + model.changepoints.len() + 2 * model.yearly_order;

        let mut penalty = vec![BASE_PENALTY; p];
        // Laplace(0, b) has variance 2b²
        let delta_sd2 = 2.0 * config.changepoint_prior_scale.powi(2);
        for j in 0..model.changepoints.len() {
            penalty[2 + j] = NOISE_SCALE.powi(2) / delta_sd2;
        }
        for j in 2 + model.changepoints.len()..p {
            penalty[j] = NOISE_SCALE.powi(2) / config.seasonality_prior_scale.powi(2);
        }

        // Normal equations: (XᵀX + Λ) β = Xᵀy
        let mut xtx = vec![vec![0.0; p]; p];
        let mut xty = vec![0.0; p];
        for (row, yi) in design.iter().zip(&y) {
            for a in 0..p {
                xty[a] += row[a] * yi;
                for b in 0..p {
                    xtx[a][b] += row[a] * row[b];
                }
            }
        }
        for (j, lambda) in penalty.iter().enumerate() {
            xtx[j][j] += lambda;
        }

        model.beta = solve_linear_system(xtx, xty)?;

        let sse: f64 = design
            .iter()
            .zip(&y)
            .map(|(row, yi)| {
                let fitted: f64 = row.iter().zip(&model.beta).map(|(x, b)| x * b).sum();
                (yi - fitted).powi(2)
            })
            .sum();
        model.sigma = (sse / n as f64).sqrt();

        Ok(model)
    }

    fn features(&self, t: f64, month: &YearMonth) -> Vec<f64> {
        let mut row = Vec::with_capacity(2 + self.changepoints.len() + 2 * self.yearly_order);
        row.push(t);
        row.push(1.0);
        row.extend(self.changepoints.iter().map(|s| (t - s).max(0.0)));
        let phase = (month.month - 1) as f64;
        for r in 1..=self.yearly_order {
            let x = 2.0 * PI * r as f64 * phase / 12.0;
            row.push(x.sin());
            row.push(x.cos());
        }
        row
    }

    fn deltas(&self) -> &[f64] {
        &self.beta[2..2 + self.changepoints.len()]
    }

    fn predict(
        &self,
        horizon: u32,
        interval_width: f64,
        config: &ForecastConfig,
    ) -> Result<Vec<ForecastPoint>> {
        let months: Vec<YearMonth> = (1..=horizon as i64).map(|h| self.last.add_months(h)).collect();
        let t: Vec<f64> = months
            .iter()
            .map(|m| self.first.months_until(m) as f64 / self.span)
            .collect();
        let point: Vec<f64> = months
            .iter()
            .zip(&t)
            .map(|(m, &ti)| {
                self.features(ti, m)
                    .iter()
                    .zip(&self.beta)
                    .map(|(x, b)| x * b)
                    .sum()
            })
            .collect();

        let samples = self.simulate(&t, &point, config)?;

        let lower_q = (1.0 - interval_width) / 2.0;
        let upper_q = 1.0 - lower_q;

        Ok(months
            .into_iter()
            .enumerate()
            .map(|(h, month)| {
                let yhat = point[h] * self.y_scale;
                let lower = quantile(&samples[h], lower_q) * self.y_scale;
                let upper = quantile(&samples[h], upper_q) * self.y_scale;
                ForecastPoint {
                    month,
                    yhat,
                    yhat_lower: lower.min(yhat),
                    yhat_upper: upper.max(yhat),
                }
            })
            .collect())
    }

    /// Simulated scaled values, `samples[h][s]`.
    ///
    /// Future changepoints arrive at the historical rate (changepoints per
    /// unit t) with Laplace slope changes of the historical mean magnitude,
    /// plus Gaussian observation noise of the residual sd.
    fn simulate(
        &self,
        t: &[f64],
        point: &[f64],
        config: &ForecastConfig,
    ) -> Result<Vec<Vec<f64>>> {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let t_max = t.iter().copied().fold(1.0, f64::max);

        let deltas = self.deltas();
        let laplace_scale = if deltas.is_empty() {
            1e-8
        } else {
            deltas.iter().map(|d| d.abs()).sum::<f64>() / deltas.len() as f64 + 1e-8
        };
        let rate = self.changepoints.len() as f64 * (t_max - 1.0);

        let noise = Normal::new(0.0, self.sigma)
            .map_err(|e| anyhow!("invalid residual sd {}: {}", self.sigma, e))?;
        let magnitude = Exp::new(1.0 / laplace_scale)
            .map_err(|e| anyhow!("invalid changepoint scale {}: {}", laplace_scale, e))?;
        let arrivals = if rate > 0.0 {
            let poisson = Poisson::new(rate)
                .map_err(|e| anyhow!("invalid changepoint rate {}: {}", rate, e))?;
            Some(poisson)
        } else {
            None
        };

        let mut samples = vec![Vec::with_capacity(config.uncertainty_samples); t.len()];
        for _ in 0..config.uncertainty_samples {
            let n_new = arrivals
                .as_ref()
                .map(|p| rng.sample::<f64, _>(p) as usize)
                .unwrap_or(0);
            let new_changes: Vec<(f64, f64)> = (0..n_new)
                .map(|_| {
                    let at = 1.0 + rng.gen::<f64>() * (t_max - 1.0);
                    // Laplace: exponential magnitude, fair sign
                    let size = rng.sample(&magnitude);
                    let delta = if rng.gen::<bool>() { size } else { -size };
                    (at, delta)
                })
                .collect();

            for (h, &ti) in t.iter().enumerate() {
                let trend_shift: f64 = new_changes
                    .iter()
                    .map(|(at, delta)| delta * (ti - at).max(0.0))
                    .sum();
                samples[h].push(point[h] + trend_shift + rng.sample(&noise));
            }
        }
        Ok(samples)
    }
}

// ============================================================================
// NUMERICS
// ============================================================================

/// Gaussian elimination with partial pivoting
fn solve_linear_system(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() < 1e-12 {
            return Err(anyhow!("singular system while fitting forecast model").into());
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
