//! Normalize → classify → align → evaluate, plus fine-tuning orchestration.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::{Backend, BackendConfig};
use crate::dataset::{Dataset, DatasetSplit};
use crate::error::{FinsentError, ModelStage, Result};
use crate::labels::LabelAligner;
use crate::normalize::Normalizer;
use crate::providers::{ClassifierHandle, Trainer};
use crate::report::ClassificationReport;
use crate::telemetry;
use crate::training::{Checkpoint, TrainingParams, TrainingSet};
use crate::types::{Prediction, Sentiment};

/// Default number of texts per `predict` call.
pub const DEFAULT_BATCH_SIZE: usize = 32;

/// Result of evaluating a classifier against a labeled dataset.
#[derive(Debug, Clone, Serialize)]
pub struct Evaluation {
    pub report: ClassificationReport,
    /// One prediction per post, in dataset order.
    pub predictions: Vec<Prediction>,
}

/// A loaded classifier together with the label alignment derived from it.
pub struct SentimentPipeline {
    classifier: ClassifierHandle,
    normalizer: Normalizer,
    aligner: LabelAligner,
    batch_size: usize,
}

impl SentimentPipeline {
    /// Build a pipeline around a loaded classifier.
    ///
    /// Fails with `UnrecognizedLabel` if the classifier's label table is not
    /// a three-way sentiment table.
    pub fn new(classifier: ClassifierHandle) -> Result<Self> {
        let aligner = LabelAligner::from_model_table(classifier.labels())?;
        debug!(
            classifier = classifier.name(),
            remap = ?aligner.dataset_to_model_map(),
            "derived label alignment"
        );
        Ok(Self {
            classifier,
            normalizer: Normalizer::new(),
            aligner,
            batch_size: DEFAULT_BATCH_SIZE,
        })
    }

    /// Texts per `predict` call (at least 1).
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn classifier(&self) -> &ClassifierHandle {
        &self.classifier
    }

    pub fn aligner(&self) -> &LabelAligner {
        &self.aligner
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Normalize and classify raw texts, one prediction per text.
    ///
    /// Texts that normalize to nothing (only emoji or symbols) are never sent
    /// to the model; they come back as [`Sentiment::Neutral`] with score 0.
    #[instrument(skip_all, fields(classifier = self.classifier.name(), texts = texts.len()))]
    pub async fn classify(&self, texts: &[&str]) -> Result<Vec<Prediction>> {
        let normalized = self.normalizer.normalize_batch(texts);
        let pending: Vec<(usize, &str)> = normalized
            .iter()
            .enumerate()
            .filter(|(_, text)| !text.is_empty())
            .map(|(i, text)| (i, text.as_str()))
            .collect();
        if pending.len() < texts.len() {
            debug!(
                empty = texts.len() - pending.len(),
                "skipping texts with no content after normalization"
            );
        }

        let mut predictions = vec![NO_CONTENT; texts.len()];
        for batch in pending.chunks(self.batch_size) {
            let refs: Vec<&str> = batch.iter().map(|(_, text)| *text).collect();
            let batch_predictions = self.predict_batch(&refs).await?;
            for ((i, _), prediction) in batch.iter().zip(batch_predictions) {
                predictions[*i] = prediction;
            }
        }
        Ok(predictions)
    }

    async fn predict_batch(&self, batch: &[&str]) -> Result<Vec<Prediction>> {
        let name = self.classifier.name().to_owned();
        let start = Instant::now();
        let result = self.classifier.predict(batch).await;
        metrics::histogram!(telemetry::PREDICT_DURATION_SECONDS, "classifier" => name.clone())
            .record(start.elapsed().as_secs_f64());

        let raw = result.inspect_err(|e| record_external_error(&name, e))?;
        if raw.len() != batch.len() {
            let err = FinsentError::external(
                ModelStage::Infer,
                format!("expected {} predictions, got {}", batch.len(), raw.len()),
            );
            record_external_error(&name, &err);
            return Err(err);
        }

        raw.iter()
            .map(|r| {
                let prediction = self.aligner.align(r).inspect_err(|_| {
                    warn!(classifier = %name, label = %r.label, "model emitted an unrecognized label");
                    metrics::counter!(telemetry::UNRECOGNIZED_LABELS_TOTAL, "classifier" => name.clone())
                        .increment(1);
                })?;
                metrics::counter!(telemetry::POSTS_CLASSIFIED_TOTAL,
                    "classifier" => name.clone(),
                    "sentiment" => prediction.label.as_str(),
                )
                .increment(1);
                Ok(prediction)
            })
            .collect()
    }

    /// Classify every post of a labeled dataset and score the result.
    ///
    /// Every post must carry a ground-truth label.
    #[instrument(skip_all, fields(classifier = self.classifier.name(), posts = dataset.len()))]
    pub async fn evaluate(&self, dataset: &Dataset) -> Result<Evaluation> {
        let truth: Vec<Sentiment> = dataset
            .iter()
            .enumerate()
            .map(|(i, post)| {
                post.label.ok_or_else(|| {
                    FinsentError::InvalidInput(format!("post {} has no label to evaluate against", i + 1))
                })
            })
            .collect::<Result<_>>()?;

        let texts: Vec<&str> = dataset.iter().map(|p| p.text.as_str()).collect();
        let predictions = self.classify(&texts).await?;
        let predicted: Vec<Sentiment> = predictions.iter().map(|p| p.label).collect();
        let report = ClassificationReport::from_labels(&truth, &predicted)?;

        info!(accuracy = report.accuracy, "evaluation finished");
        Ok(Evaluation {
            report,
            predictions,
        })
    }

    /// Normalize a split and relabel it into the classifier's id scheme.
    pub fn training_set(&self, split: &DatasetSplit) -> Result<TrainingSet> {
        TrainingSet::from_split(split, &self.normalizer, &self.aligner)
    }

    /// Fine-tune the classifier on `split` and return the checkpoint.
    ///
    /// The checkpoint's label table is validated before it is returned.
    #[instrument(skip_all, fields(classifier = self.classifier.name(), trainer = trainer.name()))]
    pub async fn fine_tune(
        &self,
        trainer: &dyn Trainer,
        split: &DatasetSplit,
        params: &TrainingParams,
    ) -> Result<Checkpoint> {
        let data = self.training_set(split)?;
        info!(
            train = data.train.len(),
            eval = data.eval.len(),
            epochs = params.epochs,
            "starting fine-tuning"
        );
        trainer
            .fit(self.classifier.as_ref(), &data, params)
            .await
            .inspect_err(|e| record_external_error(trainer.name(), e))
    }

    /// Fine-tune, then load the checkpoint locally as a new pipeline.
    #[cfg(feature = "local-inference")]
    pub async fn fine_tune_and_load(
        &self,
        trainer: &dyn Trainer,
        split: &DatasetSplit,
        params: &TrainingParams,
        device: crate::model::Device,
    ) -> Result<SentimentPipeline> {
        let checkpoint = self.fine_tune(trainer, split, params).await?;
        let handle = load_checkpoint(&checkpoint, device)?;
        Ok(SentimentPipeline::new(handle)?.with_batch_size(self.batch_size))
    }
}

/// Prediction for a post with nothing left to classify.
const NO_CONTENT: Prediction = Prediction {
    label: Sentiment::Neutral,
    score: 0.0,
};

fn record_external_error(name: &str, err: &FinsentError) {
    let stage = match err {
        FinsentError::UnrecognizedLabel(_) => return,
        _ => err.stage().unwrap_or(ModelStage::Infer),
    };
    metrics::counter!(telemetry::EXTERNAL_ERRORS_TOTAL,
        "classifier" => name.to_owned(),
        "stage" => stage.as_str(),
    )
    .increment(1);
}

/// Load a fine-tuned checkpoint with the local ONNX backend.
#[cfg(feature = "local-inference")]
pub fn load_checkpoint(
    checkpoint: &Checkpoint,
    device: crate::model::Device,
) -> Result<ClassifierHandle> {
    let classifier = crate::providers::OnnxClassifier::load(&checkpoint.source(), device)?;
    Ok(std::sync::Arc::new(classifier))
}

/// Load the classifier described by `config`.
#[instrument(skip_all, fields(backend = ?config.backend, source = %config.source))]
pub async fn load_classifier(config: &BackendConfig) -> Result<ClassifierHandle> {
    match config.backend {
        Backend::HuggingFace => load_huggingface(config).await,
        Backend::Onnx => load_onnx(config),
    }
}

#[cfg(feature = "huggingface")]
async fn load_huggingface(config: &BackendConfig) -> Result<ClassifierHandle> {
    use std::sync::Arc;

    use crate::model::ModelSource;
    use crate::providers::{HuggingFaceClassifier, HuggingFaceEndpoints, RetryingClassifier};

    let ModelSource::HuggingFace { repo_id } = &config.source else {
        return Err(FinsentError::Configuration(format!(
            "the huggingface backend cannot load {}; use the onnx backend for local models",
            config.source
        )));
    };
    let api_key = config.api_key.clone().ok_or_else(|| {
        FinsentError::Configuration(format!(
            "no HuggingFace API key: set {} or add it to secrets.toml",
            crate::config::HF_API_KEY_ENV
        ))
    })?;
    let endpoints = HuggingFaceEndpoints {
        base_url: config.base_url.clone(),
        hub_url: config.hub_url.clone(),
        timeout: config.timeout,
    };

    let retry = config.retry.clone();
    let classifier = crate::providers::retry::with_retry(&retry, "huggingface", || {
        HuggingFaceClassifier::load_with(api_key.clone(), repo_id, &endpoints)
    })
    .await?;
    Ok(Arc::new(RetryingClassifier::new(Arc::new(classifier), retry)))
}

#[cfg(not(feature = "huggingface"))]
async fn load_huggingface(_config: &BackendConfig) -> Result<ClassifierHandle> {
    Err(FinsentError::Configuration(
        "built without the huggingface feature".to_string(),
    ))
}

#[cfg(feature = "local-inference")]
fn load_onnx(config: &BackendConfig) -> Result<ClassifierHandle> {
    let classifier = crate::providers::OnnxClassifier::load_with_max_length(
        &config.source,
        config.device,
        config.max_length,
    )?;
    Ok(std::sync::Arc::new(classifier))
}

#[cfg(not(feature = "local-inference"))]
fn load_onnx(_config: &BackendConfig) -> Result<ClassifierHandle> {
    Err(FinsentError::Configuration(
        "built without the local-inference feature".to_string(),
    ))
}
