//! Confusion matrix and classification report.
//!
//! Metrics follow the usual multi-class report arithmetic: per-class
//! precision, recall, F1 and support, overall accuracy, and the macro
//! (unweighted) and weighted (by support) averages. Divisions by zero yield
//! `0.0`.

use std::fmt;

use serde::Serialize;

use crate::error::{FinsentError, Result};
use crate::types::Sentiment;

/// 3×3 confusion matrix, rows are ground truth, columns are predictions,
/// both in [`Sentiment::ALL`] order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConfusionMatrix {
    counts: [[usize; 3]; 3],
}

impl ConfusionMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from parallel slices of ground truth and predictions.
    pub fn from_labels(truth: &[Sentiment], predicted: &[Sentiment]) -> Result<Self> {
        if truth.len() != predicted.len() {
            return Err(FinsentError::InvalidInput(format!(
                "{} ground-truth labels but {} predictions",
                truth.len(),
                predicted.len()
            )));
        }
        let mut matrix = Self::new();
        for (&t, &p) in truth.iter().zip(predicted) {
            matrix.record(t, p);
        }
        Ok(matrix)
    }

    pub fn record(&mut self, truth: Sentiment, predicted: Sentiment) {
        self.counts[truth.index()][predicted.index()] += 1;
    }

    pub fn count(&self, truth: Sentiment, predicted: Sentiment) -> usize {
        self.counts[truth.index()][predicted.index()]
    }

    pub fn total(&self) -> usize {
        self.counts.iter().flatten().sum()
    }

    /// Ground-truth occurrences of `class` (row sum).
    pub fn support(&self, class: Sentiment) -> usize {
        self.counts[class.index()].iter().sum()
    }

    /// Predicted occurrences of `class` (column sum).
    pub fn predicted(&self, class: Sentiment) -> usize {
        self.counts.iter().map(|row| row[class.index()]).sum()
    }

    pub fn correct(&self) -> usize {
        (0..3).map(|i| self.counts[i][i]).sum()
    }
}

/// Precision, recall and F1 for one class or one average.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-class metrics tagged with their class.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassReport {
    pub label: Sentiment,
    #[serde(flatten)]
    pub metrics: ClassMetrics,
}

/// Full classification report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    /// One entry per class in [`Sentiment::ALL`] order.
    pub classes: [ClassReport; 3],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion: ConfusionMatrix,
}

impl ClassificationReport {
    /// Compute the report from parallel ground truth and predictions.
    pub fn from_labels(truth: &[Sentiment], predicted: &[Sentiment]) -> Result<Self> {
        Ok(Self::from_confusion(ConfusionMatrix::from_labels(truth, predicted)?))
    }

    pub fn from_confusion(confusion: ConfusionMatrix) -> Self {
        let classes = Sentiment::ALL.map(|label| {
            let tp = confusion.count(label, label);
            let precision = ratio(tp, confusion.predicted(label));
            let recall = ratio(tp, confusion.support(label));
            ClassReport {
                label,
                metrics: ClassMetrics {
                    precision,
                    recall,
                    f1: f1(precision, recall),
                    support: confusion.support(label),
                },
            }
        });

        let total = confusion.total();
        let n_classes = classes.len() as f64;
        let mean = |get: fn(&ClassMetrics) -> f64| {
            classes.iter().map(|c| get(&c.metrics)).sum::<f64>() / n_classes
        };
        let weighted = |get: fn(&ClassMetrics) -> f64| {
            if total == 0 {
                return 0.0;
            }
            classes
                .iter()
                .map(|c| get(&c.metrics) * c.metrics.support as f64)
                .sum::<f64>()
                / total as f64
        };

        let macro_avg = ClassMetrics {
            precision: mean(|m| m.precision),
            recall: mean(|m| m.recall),
            f1: mean(|m| m.f1),
            support: total,
        };
        let weighted_avg = ClassMetrics {
            precision: weighted(|m| m.precision),
            recall: weighted(|m| m.recall),
            f1: weighted(|m| m.f1),
            support: total,
        };

        Self {
            classes,
            accuracy: ratio(confusion.correct(), total),
            macro_avg,
            weighted_avg,
            confusion,
        }
    }

    /// Metrics for one class.
    pub fn class(&self, label: Sentiment) -> &ClassMetrics {
        &self.classes[label.index()].metrics
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}

fn f1(precision: f64, recall: f64) -> f64 {
    if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    }
}

const NAME_WIDTH: usize = 12;

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>NAME_WIDTH$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for class in &self.classes {
            write_row(f, class.label.as_str(), &class.metrics)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>NAME_WIDTH$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy",
            "",
            "",
            self.accuracy,
            self.confusion.total()
        )?;
        write_row(f, "macro avg", &self.macro_avg)?;
        write_row(f, "weighted avg", &self.weighted_avg)
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, name: &str, m: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>NAME_WIDTH$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        name, m.precision, m.recall, m.f1, m.support
    )
}
