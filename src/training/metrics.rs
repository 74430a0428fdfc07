//! Evaluation metrics

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::features::FEATURE_NAMES;
use crate::model::LogisticRegression;

const CALIBRATION_BINS: usize = 10;
const LOG_LOSS_EPS: f64 = 1e-15;

/// Metrics for one partition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub samples: usize,
    pub accuracy: f64,
    /// None when the partition holds a single class
    pub auc: Option<f64>,
    pub log_loss: f64,
    pub brier: f64,
    /// Expected calibration error over equal-width probability bins
    pub ece: f64,
}

impl EvaluationMetrics {
    pub fn compute(probs: &[f64], labels: &[u8]) -> Self {
        EvaluationMetrics {
            samples: probs.len(),
            accuracy: accuracy(probs, labels),
            auc: roc_auc(probs, labels),
            log_loss: log_loss(probs, labels),
            brier: brier_score(probs, labels),
            ece: expected_calibration_error(probs, labels, CALIBRATION_BINS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub fold_accuracies: Vec<f64>,
    pub accuracy_mean: f64,
    pub accuracy_std: f64,
}

impl CrossValidation {
    pub fn from_folds(fold_accuracies: Vec<f64>) -> Self {
        let n = fold_accuracies.len().max(1) as f64;
        let mean = fold_accuracies.iter().sum::<f64>() / n;
        let var = fold_accuracies
            .iter()
            .map(|a| (a - mean) * (a - mean))
            .sum::<f64>()
            / n;
        CrossValidation {
            fold_accuracies,
            accuracy_mean: mean,
            accuracy_std: var.sqrt(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfaceMetrics {
    pub samples: usize,
    pub accuracy: f64,
    pub auc: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub name: String,
    /// Coefficient on the standardised feature
    pub coefficient: f64,
    pub importance: f64,
}

/// Everything recorded about a training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub train: EvaluationMetrics,
    pub test: EvaluationMetrics,
    pub cross_validation: CrossValidation,
    /// Test partition broken down by surface name
    pub per_surface: BTreeMap<String, SurfaceMetrics>,
    /// Sorted by importance, largest first
    pub feature_importance: Vec<FeatureImportance>,
}

pub fn accuracy(probs: &[f64], labels: &[u8]) -> f64 {
    if probs.is_empty() {
        return 0.0;
    }
    let correct = probs
        .iter()
        .zip(labels)
        .filter(|(p, &y)| (**p >= 0.5) == (y == 1))
        .count();
    correct as f64 / probs.len() as f64
}

/// Area under the ROC curve from average ranks (ties share their rank)
pub fn roc_auc(probs: &[f64], labels: &[u8]) -> Option<f64> {
    let positives = labels.iter().filter(|&&y| y == 1).count();
    let negatives = labels.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[a].total_cmp(&probs[b]));

    let mut ranks = vec![0.0; probs.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && probs[order[j + 1]] == probs[order[i]] {
            j += 1;
        }
        // 1-based average rank of the tie group
        let rank = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = rank;
        }
        i = j + 1;
    }

    let positive_rank_sum: f64 = ranks
        .iter()
        .zip(labels)
        .filter(|(_, &y)| y == 1)
        .map(|(r, _)| r)
        .sum();
    let p = positives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * negatives as f64))
}

pub fn log_loss(probs: &[f64], labels: &[u8]) -> f64 {
    if probs.is_empty() {
        return 0.0;
    }
    let total: f64 = probs
        .iter()
        .zip(labels)
        .map(|(&p, &y)| {
            let p = p.clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS);
            if y == 1 {
                -p.ln()
            } else {
                -(1.0 - p).ln()
            }
        })
        .sum();
    total / probs.len() as f64
}

pub fn brier_score(probs: &[f64], labels: &[u8]) -> f64 {
    if probs.is_empty() {
        return 0.0;
    }
    let total: f64 = probs
        .iter()
        .zip(labels)
        .map(|(&p, &y)| (p - y as f64).powi(2))
        .sum();
    total / probs.len() as f64
}

pub fn expected_calibration_error(probs: &[f64], labels: &[u8], bins: usize) -> f64 {
    if probs.is_empty() || bins == 0 {
        return 0.0;
    }
    let mut count = vec![0usize; bins];
    let mut confidence = vec![0.0; bins];
    let mut observed = vec![0.0; bins];
    for (&p, &y) in probs.iter().zip(labels) {
        let bin = ((p * bins as f64) as usize).min(bins - 1);
        count[bin] += 1;
        confidence[bin] += p;
        observed[bin] += y as f64;
    }

    let n = probs.len() as f64;
    (0..bins)
        .filter(|&b| count[b] > 0)
        .map(|b| {
            let c = count[b] as f64;
            (confidence[b] / c - observed[b] / c).abs() * c / n
        })
        .sum()
}

pub fn feature_importance(classifier: &LogisticRegression) -> Vec<FeatureImportance> {
    let mut importance: Vec<FeatureImportance> = FEATURE_NAMES
        .iter()
        .zip(&classifier.coefficients)
        .map(|(name, &coefficient)| FeatureImportance {
            name: name.to_string(),
            coefficient,
            importance: coefficient.abs(),
        })
        .collect();
    importance.sort_by(|a, b| b.importance.total_cmp(&a.importance));
    importance
}

fn fmt_auc(auc: Option<f64>) -> String {
    auc.map_or_else(|| "n/a".to_string(), |a| format!("{:.3}", a))
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={}, accuracy={:.1}%, auc={}, log_loss={:.4}, brier={:.4}, ece={:.4}",
            self.samples,
            self.accuracy * 100.0,
            fmt_auc(self.auc),
            self.log_loss,
            self.brier,
            self.ece
        )
    }
}

impl fmt::Display for TrainingMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Train: {}", self.train)?;
        writeln!(f, "Test:  {}", self.test)?;
        writeln!(
            f,
            "Cross-validation accuracy: {:.1}% (+/- {:.1}%) over {} folds",
            self.cross_validation.accuracy_mean * 100.0,
            self.cross_validation.accuracy_std * 100.0,
            self.cross_validation.fold_accuracies.len()
        )?;
        for (surface, m) in &self.per_surface {
            writeln!(
                f,
                "  {:<6} n={:<6} accuracy={:.1}% auc={}",
                surface,
                m.samples,
                m.accuracy * 100.0,
                fmt_auc(m.auc)
            )?;
        }
        writeln!(f, "Top features:")?;
        for fi in self.feature_importance.iter().take(10) {
            writeln!(f, "  {:<24} {:+.4}", fi.name, fi.coefficient)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accuracy_threshold() {
        let probs = [0.9, 0.5, 0.2, 0.4];
        let labels = [1, 1, 0, 1];
        assert_eq!(accuracy(&probs, &labels), 0.75);
    }

    #[test]
    fn test_auc() {
        assert_eq!(roc_auc(&[0.1, 0.4, 0.35, 0.8], &[0, 0, 1, 1]), Some(0.75));
        assert_eq!(roc_auc(&[0.5, 0.5], &[0, 1]), Some(0.5));
        assert_eq!(roc_auc(&[0.2, 0.9], &[1, 1]), None);
    }

    #[test]
    fn test_log_loss_and_brier() {
        let loss = log_loss(&[0.5, 0.5], &[0, 1]);
        assert!((loss - 2f64.ln()).abs() < 1e-12);
        // Clipping keeps a confident miss finite
        assert!(log_loss(&[0.0], &[1]).is_finite());
        assert_eq!(brier_score(&[1.0, 0.0], &[1, 1]), 0.5);
    }

    #[test]
    fn test_calibration_error() {
        // Perfectly calibrated bins
        let probs = [0.25, 0.25, 0.25, 0.25];
        assert_eq!(expected_calibration_error(&probs, &[1, 0, 0, 0], 10), 0.0);
        // All predicted 0.95, none happened
        let ece = expected_calibration_error(&[0.95, 0.95], &[0, 0], 10);
        assert!((ece - 0.95).abs() < 1e-12);
        // p = 1.0 goes in the top bin
        assert_eq!(expected_calibration_error(&[1.0], &[1], 10), 0.0);
    }

    #[test]
    fn test_cross_validation_summary() {
        let cv = CrossValidation::from_folds(vec![0.6, 0.7]);
        assert!((cv.accuracy_mean - 0.65).abs() < 1e-12);
        assert!((cv.accuracy_std - 0.05).abs() < 1e-12);
    }

    #[test]
    fn test_feature_importance_sorted() {
        let mut classifier = LogisticRegression::zeros(FEATURE_NAMES.len());
        classifier.coefficients[3] = -2.0;
        classifier.coefficients[0] = 1.0;
        let importance = feature_importance(&classifier);
        assert_eq!(importance[0].name, FEATURE_NAMES[3]);
        assert_eq!(importance[0].importance, 2.0);
        assert_eq!(importance[1].name, "surface_elo_diff");
    }
}
