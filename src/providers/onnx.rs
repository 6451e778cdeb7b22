//! Local sequence classification via ONNX Runtime.
//!
//! Loads an exported sequence-classification model (`onnx/model.onnx` or
//! `model.onnx`) together with its `tokenizer.json` and `config.json`, either
//! from the HuggingFace Hub or from a local checkpoint directory.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use ort::session::Session;
use ort::session::builder::GraphOptimizationLevel;
use tracing::{debug, info, instrument};

use super::traits::Classifier;
use crate::error::{FinsentError, ModelStage, Result};
use crate::labels::ModelLabelTable;
use crate::model::{Device, ModelSource};
use crate::tokenizer::{DEFAULT_MAX_LENGTH, EncodedText, HfTokenizer};
use crate::types::RawPrediction;

/// Where exported weights may live inside a model directory, in lookup order.
const MODEL_FILES: [&str; 2] = ["onnx/model.onnx", "model.onnx"];

/// Architectures whose exports take no `token_type_ids` input.
const NO_TOKEN_TYPES: [&str; 3] = ["distilbert", "roberta", "xlm-roberta"];

/// Local classifier using ONNX Runtime.
pub struct OnnxClassifier {
    session: Mutex<Session>,
    tokenizer: HfTokenizer,
    source: ModelSource,
    labels: ModelLabelTable,
    use_token_type_ids: bool,
    device: Device,
}

impl OnnxClassifier {
    /// Load a model with the default maximum sequence length.
    pub fn load(source: &ModelSource, device: Device) -> Result<Self> {
        Self::load_with_max_length(source, device, DEFAULT_MAX_LENGTH)
    }

    /// Load a model, truncating inputs to `max_length` tokens.
    ///
    /// Hub models are downloaded into the cache directory on first use.
    #[instrument(skip(source), fields(source = %source, device = device.name()))]
    pub fn load_with_max_length(
        source: &ModelSource,
        device: Device,
        max_length: usize,
    ) -> Result<Self> {
        source.ensure_exists()?;

        let config_path = source.resolve_file("config.json")?;
        let config = std::fs::read_to_string(&config_path).map_err(|e| {
            FinsentError::external(
                ModelStage::Load,
                format!("cannot read {}: {e}", config_path.display()),
            )
        })?;
        let labels = ModelLabelTable::from_config_json(&config)?;
        let use_token_type_ids = !model_type(&config)
            .is_some_and(|t| NO_TOKEN_TYPES.contains(&t.as_str()));

        let tokenizer = HfTokenizer::from_file(&source.resolve_file("tokenizer.json")?, max_length)?;
        let model_path = resolve_model_file(source)?;
        let session = build_session(&model_path, &device)?;

        info!(model = %model_path.display(), labels = labels.len(), "loaded ONNX classifier");

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            source: source.clone(),
            labels,
            use_token_type_ids,
            device,
        })
    }

    /// Device the session runs on.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Classify one text.
    fn classify_one(&self, text: &str) -> Result<RawPrediction> {
        let encoded = self.tokenizer.encode(text)?;
        let logits = self.run_inference(&encoded)?;
        logits_to_prediction(&logits, &self.labels)
    }

    /// Run the ONNX session and return the logits row.
    fn run_inference(&self, encoded: &EncodedText) -> Result<Vec<f32>> {
        use ort::value::TensorRef;

        let shape = [1_usize, encoded.len()];
        let infer_err = |e: ort::Error| FinsentError::external(ModelStage::Infer, e);

        let input_ids = TensorRef::from_array_view((shape, encoded.input_ids.as_slice()))
            .map_err(infer_err)?;
        let attention_mask =
            TensorRef::from_array_view((shape, encoded.attention_mask.as_slice()))
                .map_err(infer_err)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| FinsentError::external(ModelStage::Infer, "ONNX session lock poisoned"))?;

        let outputs = if self.use_token_type_ids {
            let token_type_ids =
                TensorRef::from_array_view((shape, encoded.token_type_ids.as_slice()))
                    .map_err(infer_err)?;
            session
                .run(ort::inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask,
                    "token_type_ids" => token_type_ids,
                ])
                .map_err(infer_err)?
        } else {
            session
                .run(ort::inputs![
                    "input_ids" => input_ids,
                    "attention_mask" => attention_mask,
                ])
                .map_err(infer_err)?
        };

        let logits = outputs
            .get("logits")
            .ok_or_else(|| FinsentError::external(ModelStage::Infer, "no logits output found"))?;

        // try_extract_tensor returns (&Shape, &[T])
        let (_, data) = logits.try_extract_tensor::<f32>().map_err(infer_err)?;
        Ok(data.to_vec())
    }
}

/// Pick the most probable label out of one logits row.
fn logits_to_prediction(logits: &[f32], labels: &ModelLabelTable) -> Result<RawPrediction> {
    if logits.len() != labels.len() {
        return Err(FinsentError::external(
            ModelStage::Infer,
            format!("expected {} logits, got {}", labels.len(), logits.len()),
        ));
    }

    let probs = softmax(logits);
    let (best, score) = probs
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

    let label = labels
        .label(best as u32)
        .ok_or_else(|| FinsentError::UnrecognizedLabel(format!("model id {best}")))?;
    Ok(RawPrediction::new(label, score))
}

/// Softmax function.
fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|x| (x - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.iter().map(|x| x / sum).collect()
}

/// `model_type` from a `config.json`, if present.
fn model_type(config_json: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(config_json).ok()?;
    value.get("model_type")?.as_str().map(str::to_ascii_lowercase)
}

fn resolve_model_file(source: &ModelSource) -> Result<PathBuf> {
    let mut last_err = None;
    for file in MODEL_FILES {
        match source.resolve_file(file) {
            Ok(path) => return Ok(path),
            Err(e) => {
                debug!(file, error = %e, "ONNX export not found here");
                last_err = Some(e);
            }
        }
    }
    Err(last_err.unwrap_or_else(|| {
        FinsentError::external(ModelStage::Load, format!("no ONNX export in {source}"))
    }))
}

/// Build an ONNX session with the appropriate execution provider.
fn build_session(model_path: &Path, device: &Device) -> Result<Session> {
    let load_err = |e: ort::Error| FinsentError::external(ModelStage::Load, e);

    let builder = Session::builder()
        .map_err(load_err)?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(load_err)?;

    // Configure execution provider based on device
    let builder = match device {
        Device::Cpu => builder,
        #[cfg(feature = "cuda")]
        Device::Cuda { device_id } => {
            use ort::execution_providers::CUDAExecutionProvider;
            builder
                .with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(*device_id as i32)
                    .build()])
                .map_err(load_err)?
        }
    };

    builder.commit_from_file(model_path).map_err(load_err)
}

// ============================================================================
// Provider Trait Implementations
// ============================================================================

#[async_trait]
impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        "onnx"
    }

    fn source(&self) -> &ModelSource {
        &self.source
    }

    fn labels(&self) -> &ModelLabelTable {
        &self.labels
    }

    async fn predict(&self, texts: &[&str]) -> Result<Vec<RawPrediction>> {
        texts.iter().map(|text| self.classify_one(text)).collect()
    }
}
