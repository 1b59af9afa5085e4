//! Classification metrics.

use crate::model::labels::LabelMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Precision, recall and F1 of one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class metrics plus aggregates for one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationReport {
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub weighted_f1: f64,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    }
}

impl ClassificationReport {
    /// Score predictions against true class indices. Undefined ratios are 0.
    pub fn new(y_true: &[usize], y_pred: &[usize], labels: &LabelMap) -> Self {
        let n_classes = labels.len();
        let mut tp = vec![0usize; n_classes];
        let mut predicted = vec![0usize; n_classes];
        let mut support = vec![0usize; n_classes];

        for (&t, &p) in y_true.iter().zip(y_pred) {
            if t < n_classes {
                support[t] += 1;
            }
            if p < n_classes {
                predicted[p] += 1;
            }
            if t == p && t < n_classes {
                tp[t] += 1;
            }
        }

        let classes: Vec<ClassMetrics> = labels
            .classes()
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let precision = ratio(tp[i], predicted[i]);
                let recall = ratio(tp[i], support[i]);
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1: f1(precision, recall),
                    support: support[i],
                }
            })
            .collect();

        let total: usize = support.iter().sum();
        let weighted_f1 = if total == 0 {
            0.0
        } else {
            classes
                .iter()
                .map(|c| c.f1 * c.support as f64)
                .sum::<f64>()
                / total as f64
        };

        Self {
            classes,
            accuracy: ratio(tp.iter().sum(), y_true.len()),
            weighted_f1,
        }
    }

    /// Plain-text table in the usual precision/recall/f1/support layout.
    pub fn to_text(&self) -> String {
        let width = self
            .classes
            .iter()
            .map(|c| c.label.len())
            .max()
            .unwrap_or(0)
            .max("weighted avg".len());
        let support: usize = self.classes.iter().map(|c| c.support).sum();

        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        );
        for c in &self.classes {
            let _ = writeln!(
                out,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            );
        }
        let _ = writeln!(out);
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, support
        );
        let _ = writeln!(
            out,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "weighted avg", "", "", self.weighted_f1, support
        );
        out
    }
}

/// Weighted F1 without building the full report.
pub fn weighted_f1(y_true: &[usize], y_pred: &[usize], labels: &LabelMap) -> f64 {
    ClassificationReport::new(y_true, y_pred, labels).weighted_f1
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> LabelMap {
        LabelMap::from_labels(["Fist", "Pinch", "Rest"])
    }

    #[test]
    fn test_perfect_predictions() {
        let y = vec![0, 1, 2, 2];
        let report = ClassificationReport::new(&y, &y, &labels());
        assert_eq!(report.accuracy, 1.0);
        assert_eq!(report.weighted_f1, 1.0);
        assert!(report.classes.iter().all(|c| c.f1 == 1.0));
    }

    #[test]
    fn test_per_class_values() {
        let y_true = vec![0, 0, 1, 1, 2, 2];
        let y_pred = vec![0, 1, 1, 1, 2, 0];
        let report = ClassificationReport::new(&y_true, &y_pred, &labels());

        let fist = &report.classes[0];
        assert_eq!(fist.precision, 0.5);
        assert_eq!(fist.recall, 0.5);
        let pinch = &report.classes[1];
        assert!((pinch.precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(pinch.recall, 1.0);
        assert!((report.accuracy - 4.0 / 6.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_division_is_zero() {
        // Rest is never predicted and never present
        let y_true = vec![0, 1];
        let y_pred = vec![1, 0];
        let report = ClassificationReport::new(&y_true, &y_pred, &labels());
        let rest = &report.classes[2];
        assert_eq!(rest.precision, 0.0);
        assert_eq!(rest.recall, 0.0);
        assert_eq!(rest.f1, 0.0);
        assert_eq!(report.weighted_f1, 0.0);
    }

    #[test]
    fn test_text_report_lists_classes() {
        let y = vec![0, 1, 2];
        let text = ClassificationReport::new(&y, &y, &labels()).to_text();
        assert!(text.contains("precision"));
        assert!(text.contains("Pinch"));
        assert!(text.contains("weighted avg"));
        assert_eq!(weighted_f1(&y, &y, &labels()), 1.0);
    }
}
