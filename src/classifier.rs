// 🏷️ Category Classifier - TF-IDF features + multinomial logistic regression
//
// Training replaces the model wholesale; there is no incremental update.
// The vocabulary and the label set are kept sorted so the same table
// always produces the same model.

use crate::config::ClassifierConfig;
use crate::error::{AnalyticsError, Result};
use crate::table::{TransactionTable, DEFAULT_CATEGORY, DEFAULT_DESCRIPTION};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

// ============================================================================
// TF-IDF VECTORIZER
// ============================================================================

/// Lowercased alphanumeric runs of at least two characters
pub fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(|t| t.to_string())
        .collect()
}

/// Sparse row: (feature index, value), indices ascending
pub type SparseVector = Vec<(usize, f64)>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    /// Smooth idf: ln((1 + n) / (1 + df)) + 1
    pub fn fit(documents: &[&str]) -> Self {
        let mut document_frequency: BTreeMap<String, usize> = BTreeMap::new();
        for doc in documents {
            let unique: BTreeSet<String> = tokenize(doc).into_iter().collect();
            for token in unique {
                *document_frequency.entry(token).or_default() += 1;
            }
        }

        let n = documents.len() as f64;
        let mut vocabulary = BTreeMap::new();
        let mut idf = Vec::with_capacity(document_frequency.len());
        for (idx, (token, df)) in document_frequency.into_iter().enumerate() {
            vocabulary.insert(token, idx);
            idf.push(((1.0 + n) / (1.0 + df as f64)).ln() + 1.0);
        }

        TfidfVectorizer { vocabulary, idf }
    }

    pub fn vocabulary_size(&self) -> usize {
        self.idf.len()
    }

    fn check_shape(&self) -> Result<()> {
        let out_of_range = self.vocabulary.iter().find(|(_, idx)| **idx >= self.idf.len());
        if let Some((token, idx)) = out_of_range {
            return Err(AnalyticsError::CorruptModel(format!(
                "term '{}' points at idf slot {} of {}",
                token,
                idx,
                self.idf.len()
            )));
        }
        Ok(())
    }

    /// L2-normalized tf-idf vector; tokens outside the vocabulary are ignored
    pub fn transform(&self, text: &str) -> SparseVector {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for token in tokenize(text) {
            if let Some(&idx) = self.vocabulary.get(&token) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }

        let mut row: SparseVector = counts
            .into_iter()
            .map(|(idx, tf)| (idx, tf * self.idf[idx]))
            .collect();
        let norm = row.iter().map(|(_, v)| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            for (_, v) in row.iter_mut() {
                *v /= norm;
            }
        }
        row
    }
}

// ============================================================================
// LOGISTIC REGRESSION
// ============================================================================

/// Multinomial (softmax) logistic regression with L2 penalty on weights.
///
/// Minimizes mean cross-entropy + ||W||² / (2·C·n) with Nesterov-accelerated
/// full-batch gradient descent; the intercept is not penalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    n_features: usize,
    n_classes: usize,
    /// Row-major: class k owns params[k*(n_features+1) ..], intercept last
    params: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitStats {
    pub iterations: usize,
    pub converged: bool,
}

impl LogisticRegression {
    pub fn fit(
        rows: &[SparseVector],
        targets: &[usize],
        n_features: usize,
        n_classes: usize,
        config: &ClassifierConfig,
    ) -> (Self, FitStats) {
        let stride = n_features + 1;
        let n = rows.len().max(1) as f64;
        let lambda = 1.0 / (config.regularization * n);

        // Rows are unit length, so ||[x, 1]||² <= 2 and the softmax loss
        // gradient is (1 + lambda)-Lipschitz.
        let step = 1.0 / (1.0 + lambda);

        let mut model = LogisticRegression {
            n_features,
            n_classes,
            params: vec![0.0; n_classes * stride],
        };
        let mut lookahead = model.params.clone();
        let mut momentum = 1.0_f64;
        let mut stats = FitStats {
            iterations: 0,
            converged: false,
        };

        for iter in 0..config.max_iter {
            let grad = Self::gradient(&lookahead, rows, targets, n_features, n_classes, lambda);
            let grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
            stats.iterations = iter + 1;
            if grad_norm < config.tolerance {
                stats.converged = true;
                model.params = lookahead;
                break;
            }

            let next: Vec<f64> = lookahead
                .iter()
                .zip(&grad)
                .map(|(p, g)| p - step * g)
                .collect();
            let next_momentum = (1.0 + (1.0 + 4.0 * momentum * momentum).sqrt()) / 2.0;
            let beta = (momentum - 1.0) / next_momentum;

            lookahead = next
                .iter()
                .zip(&model.params)
                .map(|(x, prev)| x + beta * (x - prev))
                .collect();
            model.params = next;
            momentum = next_momentum;
        }

        (model, stats)
    }

    fn gradient(
        params: &[f64],
        rows: &[SparseVector],
        targets: &[usize],
        n_features: usize,
        n_classes: usize,
        lambda: f64,
    ) -> Vec<f64> {
        let stride = n_features + 1;
        let n = rows.len().max(1) as f64;
        let mut grad = vec![0.0; params.len()];

        for (row, &target) in rows.iter().zip(targets) {
            let probs = softmax(&logits(params, row, n_features, n_classes));
            for (k, p) in probs.iter().enumerate() {
                let residual = (p - if k == target { 1.0 } else { 0.0 }) / n;
                let base = k * stride;
                for &(j, x) in row {
                    grad[base + j] += residual * x;
                }
                grad[base + n_features] += residual;
            }
        }

        for k in 0..n_classes {
            let base = k * stride;
            for j in 0..n_features {
                grad[base + j] += lambda * params[base + j];
            }
        }
        grad
    }

    /// Class probabilities for one row
    pub fn predict_proba(&self, row: &SparseVector) -> Vec<f64> {
        softmax(&logits(&self.params, row, self.n_features, self.n_classes))
    }
}

impl LogisticRegression {
    fn check_shape(&self) -> Result<()> {
        let expected = self.n_classes * (self.n_features + 1);
        if self.n_classes == 0 || self.params.len() != expected {
            return Err(AnalyticsError::CorruptModel(format!(
                "{} parameter(s) for {} class(es) x {} feature(s)",
                self.params.len(),
                self.n_classes,
                self.n_features
            )));
        }
        Ok(())
    }
}

fn logits(params: &[f64], row: &SparseVector, n_features: usize, n_classes: usize) -> Vec<f64> {
    let stride = n_features + 1;
    (0..n_classes)
        .map(|k| {
            let base = k * stride;
            params[base + n_features]
                + row
                    .iter()
                    .filter(|(j, _)| *j < n_features)
                    .map(|&(j, x)| params[base + j] * x)
                    .sum::<f64>()
        })
        .collect()
}

fn softmax(z: &[f64]) -> Vec<f64> {
    let max = z.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exp: Vec<f64> = z.iter().map(|v| (v - max).exp()).collect();
    let total: f64 = exp.iter().sum();
    exp.into_iter().map(|e| e / total).collect()
}

// ============================================================================
// CATEGORY MODEL
// ============================================================================

/// Vectorizer + classifier pair, persisted as one JSON artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryModel {
    vectorizer: TfidfVectorizer,
    classifier: LogisticRegression,
    labels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub rows: usize,
    pub labels: Vec<String>,
    pub vocabulary_size: usize,
    pub iterations: usize,
    pub converged: bool,
}

impl TrainingSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} row(s), {} label(s), {} term(s), {} iteration(s){}",
            self.rows,
            self.labels.len(),
            self.vocabulary_size,
            self.iterations,
            if self.converged { "" } else { " (not converged)" }
        )
    }
}

#[derive(Debug, Clone)]
pub enum TrainingOutcome {
    Trained {
        model: CategoryModel,
        summary: TrainingSummary,
    },
    /// Nothing to learn from; not an error
    Skipped { reason: String },
}

impl CategoryModel {
    /// Train on Expense rows that carry both a real description and a real
    /// category (placeholders from normalization do not count).
    pub fn train(table: &TransactionTable, config: &ClassifierConfig) -> TrainingOutcome {
        let eligible: Vec<(&str, &str)> = table
            .transactions()
            .iter()
            .filter(|t| t.is_expense())
            .filter(|t| t.description != DEFAULT_DESCRIPTION && t.category != DEFAULT_CATEGORY)
            .map(|t| (t.description.as_str(), t.category.as_str()))
            .collect();

        if eligible.is_empty() {
            let reason = "no expense rows with both description and category".to_string();
            debug!(rows = table.len(), "{}", reason);
            return TrainingOutcome::Skipped { reason };
        }

        let labels: Vec<String> = eligible
            .iter()
            .map(|(_, c)| c.to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let label_index: BTreeMap<&str, usize> = labels
            .iter()
            .enumerate()
            .map(|(i, l)| (l.as_str(), i))
            .collect();

        let documents: Vec<&str> = eligible.iter().map(|(d, _)| *d).collect();
        let vectorizer = TfidfVectorizer::fit(&documents);
        let rows: Vec<SparseVector> = documents.iter().map(|d| vectorizer.transform(d)).collect();
        let targets: Vec<usize> = eligible.iter().map(|(_, c)| label_index[c]).collect();

        let (classifier, stats) = LogisticRegression::fit(
            &rows,
            &targets,
            vectorizer.vocabulary_size(),
            labels.len(),
            config,
        );

        let summary = TrainingSummary {
            rows: rows.len(),
            labels: labels.clone(),
            vocabulary_size: vectorizer.vocabulary_size(),
            iterations: stats.iterations,
            converged: stats.converged,
        };
        info!(
            rows = summary.rows,
            labels = labels.len(),
            vocabulary = summary.vocabulary_size,
            iterations = stats.iterations,
            "trained category model"
        );

        TrainingOutcome::Trained {
            model: CategoryModel {
                vectorizer,
                classifier,
                labels,
            },
            summary,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Consistency of a deserialized model; every index used by `predict`
    /// must be in range.
    fn check_shape(&self) -> Result<()> {
        self.vectorizer.check_shape()?;
        self.classifier.check_shape()?;
        if self.labels.len() != self.classifier.n_classes {
            return Err(AnalyticsError::CorruptModel(format!(
                "{} label(s) for {} class(es)",
                self.labels.len(),
                self.classifier.n_classes
            )));
        }
        if self.vectorizer.vocabulary_size() != self.classifier.n_features {
            return Err(AnalyticsError::CorruptModel(format!(
                "vocabulary of {} term(s) for {} feature(s)",
                self.vectorizer.vocabulary_size(),
                self.classifier.n_features
            )));
        }
        Ok(())
    }

    /// Most probable label; ties go to the label that sorts first
    pub fn predict(&self, description: &str) -> String {
        let probs = self.classifier.predict_proba(&self.vectorizer.transform(description));
        let mut best = 0;
        for (i, p) in probs.iter().enumerate() {
            if *p > probs[best] {
                best = i;
            }
        }
        self.labels[best].clone()
    }

    /// (label, probability) for every label, in label order
    pub fn predict_proba(&self, description: &str) -> Vec<(String, f64)> {
        let probs = self.classifier.predict_proba(&self.vectorizer.transform(description));
        self.labels.iter().cloned().zip(probs).collect()
    }
}

// ============================================================================
// MODEL STORE
// ============================================================================

/// On-disk home of the single category model.
///
/// Writers hold the lock exclusively and replace the file by renaming a
/// fully written temp file over it; readers hold it shared. A reader in
/// another process sees either the old or the new file, never a partial one.
#[derive(Debug)]
pub struct ModelStore {
    path: PathBuf,
    lock: RwLock<()>,
}

impl ModelStore {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        ModelStore {
            path: path.into(),
            lock: RwLock::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        self.path.is_file()
    }

    pub fn save(&self, model: &CategoryModel) -> Result<()> {
        let _guard = self.lock.write().unwrap_or_else(|e| e.into_inner());

        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create model directory: {}", dir.display()))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "model".to_string());
        let tmp = dir.join(format!(".{}.tmp-{}", file_name, uuid::Uuid::new_v4()));

        let written = (|| -> Result<()> {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, model)?;
            writer.flush()?;
            writer.get_ref().sync_all()?;
            Ok(())
        })();
        if let Err(e) = written {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }

        fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace model: {}", self.path.display()))?;
        info!(path = %self.path.display(), "saved category model");
        Ok(())
    }

    pub fn load(&self) -> Result<CategoryModel> {
        let _guard = self.lock.read().unwrap_or_else(|e| e.into_inner());
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(AnalyticsError::ModelNotTrained),
            Err(e) => return Err(e.into()),
        };
        let model: CategoryModel = serde_json::from_slice(&bytes)?;
        model.check_shape()?;
        Ok(model)
    }

    pub fn predict(&self, description: &str) -> Result<String> {
        Ok(self.load()?.predict(description))
    }
}
