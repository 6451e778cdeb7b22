//! Capability traits for the external model boundary.
//!
//! A `Classifier` is a loaded sequence-classification model: it reports its
//! own label table and turns a batch of (already normalized) texts into raw
//! `(label, score)` pairs. A `Trainer` fine-tunes the model behind a
//! classifier and leaves a checkpoint directory behind.
//!
//! Backends own loading (`HuggingFaceClassifier::load`, `OnnxClassifier::load`);
//! `pipeline::load_classifier` picks one from configuration.

use std::sync::Arc;

use async_trait::async_trait;

use crate::Result;
use crate::labels::ModelLabelTable;
use crate::model::ModelSource;
use crate::training::{Checkpoint, TrainingParams, TrainingSet};
use crate::types::RawPrediction;

/// A loaded classifier, shareable across the pipeline.
pub type ClassifierHandle = Arc<dyn Classifier>;

// ============================================================================
// Classifier
// ============================================================================

/// A loaded sequence-classification model.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Backend name for logging/metrics.
    fn name(&self) -> &str;

    /// Where the model was loaded from.
    fn source(&self) -> &ModelSource;

    /// The model's own id→label table, inspected at load time.
    fn labels(&self) -> &ModelLabelTable;

    /// Classify a batch of texts.
    ///
    /// Returns one prediction per input, in input order.
    async fn predict(&self, texts: &[&str]) -> Result<Vec<RawPrediction>>;
}

// ============================================================================
// Trainer
// ============================================================================

/// Fine-tuning through an external training framework.
#[async_trait]
pub trait Trainer: Send + Sync {
    /// Trainer name for logging/debugging.
    fn name(&self) -> &str;

    /// Fine-tune the model behind `base` on `data`.
    ///
    /// Labels in `data` are already expressed in `base`'s id scheme.
    async fn fit(
        &self,
        base: &dyn Classifier,
        data: &TrainingSet,
        params: &TrainingParams,
    ) -> Result<Checkpoint>;
}

// ============================================================================
// Tests
// ============================================================================
