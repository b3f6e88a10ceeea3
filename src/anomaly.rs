// 🚨 Anomaly Detector - isolation forest over transaction amounts
//
// Each tree splits random sub-samples at uniform random thresholds until
// points are isolated. Outliers isolate in few splits, so a short average
// path means a high score. The top `contamination` share of scores is
// labeled Anomaly.

use crate::config::AnomalyConfig;
use crate::error::Result;
use crate::table::{Transaction, TransactionTable, CANONICAL_COLUMNS};
use anyhow::Context;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::{debug, info};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

pub const ANOMALY_COLUMN: &str = "Anomaly";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AnomalyLabel {
    Normal,
    Anomaly,
}

impl AnomalyLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyLabel::Normal => "Normal",
            AnomalyLabel::Anomaly => "Anomaly",
        }
    }
}

impl fmt::Display for AnomalyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ISOLATION FOREST
// ============================================================================

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// Average path length of an unsuccessful BST search over `n` points
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fit on finite values. `max_samples` is capped by the number of values.
    pub fn fit(values: &[f64], n_trees: usize, max_samples: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let sample_size = max_samples.min(values.len());
        let max_depth = (sample_size.max(2) as f64).log2().ceil() as usize;

        let mut trees = Vec::with_capacity(n_trees);
        for _ in 0..n_trees {
            let mut sample: Vec<f64> =
                rand::seq::index::sample(&mut rng, values.len(), sample_size)
                    .into_iter()
                    .map(|i| values[i])
                    .collect();
            trees.push(Self::grow(&mut sample, 0, max_depth, &mut rng));
        }

        IsolationForest { trees, sample_size }
    }

    fn grow(data: &mut [f64], depth: usize, max_depth: usize, rng: &mut StdRng) -> Node {
        if depth >= max_depth || data.len() <= 1 {
            return Node::Leaf { size: data.len() };
        }

        let min = data.iter().copied().fold(f64::INFINITY, f64::min);
        let max = data.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if min >= max {
            return Node::Leaf { size: data.len() };
        }

        let threshold = rng.gen_range(min..max);
        // Partition in place: [< threshold | >= threshold]
        let mut boundary = 0;
        for i in 0..data.len() {
            if data[i] < threshold {
                data.swap(i, boundary);
                boundary += 1;
            }
        }
        let (left, right) = data.split_at_mut(boundary);

        Node::Split {
            threshold,
            left: Box::new(Self::grow(left, depth + 1, max_depth, rng)),
            right: Box::new(Self::grow(right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(node: &Node, x: f64, depth: usize) -> f64 {
        match node {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Split {
                threshold,
                left,
                right,
            } => {
                if x < *threshold {
                    Self::path_length(left, x, depth + 1)
                } else {
                    Self::path_length(right, x, depth + 1)
                }
            }
        }
    }

    /// Anomaly score in (0, 1]; higher = more isolated
    pub fn score(&self, x: f64) -> f64 {
        let norm = average_path_length(self.sample_size);
        if self.trees.is_empty() || norm <= 0.0 {
            return 0.5;
        }
        let mean_path = self
            .trees
            .iter()
            .map(|t| Self::path_length(t, x, 0))
            .sum::<f64>()
            / self.trees.len() as f64;
        2f64.powf(-mean_path / norm)
    }
}

/// Linear-interpolated quantile of an unsorted sample
pub(crate) fn quantile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

// ============================================================================
// DETECTOR
// ============================================================================

/// Table plus one label per row
#[derive(Debug, Clone, Serialize)]
pub struct AnomalyReport {
    #[serde(skip)]
    table: TransactionTable,
    pub labels: Vec<AnomalyLabel>,
    /// None for rows excluded from fitting (non-finite amount)
    pub scores: Vec<Option<f64>>,
    pub threshold: f64,
    pub anomaly_count: usize,
}

impl AnomalyReport {
    pub fn table(&self) -> &TransactionTable {
        &self.table
    }

    pub fn count(&self) -> usize {
        self.anomaly_count
    }

    /// Flagged rows in table order
    pub fn anomalies(&self) -> Vec<&Transaction> {
        self.table
            .transactions()
            .iter()
            .zip(&self.labels)
            .filter(|(_, l)| **l == AnomalyLabel::Anomaly)
            .map(|(t, _)| t)
            .collect()
    }

    pub fn summary(&self) -> String {
        format!(
            "{} of {} transaction(s) flagged (score threshold {:.4})",
            self.anomaly_count,
            self.labels.len(),
            self.threshold
        )
    }

    /// Write source columns + canonical columns + `Anomaly`.
    /// Source columns whose names clash with those are left out.
    pub fn write_csv(&self, path: &Path) -> Result<()> {
        let reserved: Vec<&str> = CANONICAL_COLUMNS
            .iter()
            .copied()
            .chain(std::iter::once(ANOMALY_COLUMN))
            .collect();
        let kept: Vec<usize> = self
            .table
            .source_headers()
            .iter()
            .enumerate()
            .filter(|(_, h)| !reserved.contains(&h.as_str()))
            .map(|(i, _)| i)
            .collect();

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create anomaly CSV: {}", path.display()))?;

        let mut header: Vec<&str> = kept
            .iter()
            .map(|&i| self.table.source_headers()[i].as_str())
            .collect();
        header.extend(reserved.iter());
        writer.write_record(&header)?;

        for (idx, (tx, label)) in self.table.transactions().iter().zip(&self.labels).enumerate() {
            let source = self.table.source_row(idx);
            let mut record: Vec<String> = kept
                .iter()
                .map(|&i| source.get(i).cloned().flatten().unwrap_or_default())
                .collect();
            record.push(tx.date.format("%Y-%m-%d").to_string());
            record.push(tx.amount.to_string());
            record.push(tx.category.clone());
            record.push(tx.description.clone());
            record.push(tx.transaction_type.as_str().to_string());
            record.push(label.as_str().to_string());
            writer.write_record(&record)?;
        }
        writer.flush()?;

        info!(path = %path.display(), rows = self.labels.len(), "wrote anomaly CSV");
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum AnomalyOutcome {
    Labeled(AnomalyReport),
    /// Empty table or no usable amount: nothing was labeled
    NoData,
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyDetector {
    config: AnomalyConfig,
}

impl AnomalyDetector {
    pub fn new(config: AnomalyConfig) -> Self {
        AnomalyDetector { config }
    }

    pub fn detect(&self, table: &TransactionTable) -> AnomalyOutcome {
        let amounts = table.amounts();
        let finite: Vec<f64> = amounts.iter().copied().filter(|a| a.is_finite()).collect();
        if finite.is_empty() {
            debug!(rows = table.len(), "no usable amounts, skipping anomaly detection");
            return AnomalyOutcome::NoData;
        }

        let forest = IsolationForest::fit(
            &finite,
            self.config.n_trees,
            self.config.max_samples,
            self.config.seed,
        );

        let scores: Vec<Option<f64>> = amounts
            .iter()
            .map(|&a| if a.is_finite() { Some(forest.score(a)) } else { None })
            .collect();
        let fitted: Vec<f64> = scores.iter().flatten().copied().collect();
        let threshold = quantile(&fitted, 1.0 - self.config.contamination);

        let labels: Vec<AnomalyLabel> = scores
            .iter()
            .map(|s| match s {
                Some(s) if *s > threshold => AnomalyLabel::Anomaly,
                _ => AnomalyLabel::Normal,
            })
            .collect();
        let anomaly_count = labels.iter().filter(|l| **l == AnomalyLabel::Anomaly).count();

        info!(
            rows = labels.len(),
            anomalies = anomaly_count,
            threshold,
            "anomaly detection complete"
        );

        AnomalyOutcome::Labeled(AnomalyReport {
            table: table.clone(),
            labels,
            scores,
            threshold,
            anomaly_count,
        })
    }
}
