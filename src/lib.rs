//! finsent - financial tweet sentiment with a pretrained FinBERT-style model
//!
//! This crate normalizes social-media posts, classifies them through a
//! pluggable [`Classifier`] backend, reconciles the dataset's label
//! convention with the model's own `id2label` table, and scores predictions
//! in a classification report. Fine-tuning is delegated to an external
//! training program through the [`Trainer`] capability.
//!
//! # Example
//!
//! ```rust,no_run
//! use finsent::{Dataset, SentimentPipeline, pipeline};
//! use finsent::config::BackendConfig;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> finsent::Result<()> {
//!     let config = BackendConfig {
//!         api_key: Some("hf_your_key".into()),
//!         ..Default::default()
//!     };
//!     let pipeline = SentimentPipeline::new(pipeline::load_classifier(&config).await?)?;
//!
//!     let dataset = Dataset::from_tsv_path("tweets.tsv")?;
//!     let split = dataset.train_test_split(0.2, 42)?;
//!     let evaluation = pipeline.evaluate(&split.test).await?;
//!
//!     println!("{}", evaluation.report);
//!     Ok(())
//! }
//! ```
//!
//! # Normalization
//!
//! ```rust
//! assert_eq!(
//!     finsent::normalize("@elonmusk said $TSLA will hit 100.5 today"),
//!     "@mention said $cashtag will hit #number today"
//! );
//! ```

pub mod config;
pub mod dataset;
pub mod error;
pub mod labels;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod providers;
pub mod report;
pub mod telemetry;
pub mod tokenizer;
pub mod training;
pub mod types;
pub mod version;

// Re-export main types at crate root
pub use error::{FinsentError, ModelStage, Result};
pub use version::{PKG_VERSION, version_string};

pub use dataset::{Dataset, DatasetSplit};
pub use labels::{LabelAligner, ModelLabelTable};
pub use model::{DEFAULT_MODEL, Device, ModelSource};
pub use normalize::{Normalizer, normalize};
pub use pipeline::{Evaluation, SentimentPipeline};
pub use report::{ClassMetrics, ClassificationReport, ConfusionMatrix};
pub use training::{Checkpoint, TrainingExample, TrainingParams, TrainingSet};
pub use types::{NormalizedPost, Post, Prediction, RawPrediction, Sentiment};

pub use providers::{
    Classifier, ClassifierHandle, CommandTrainer, RetryConfig, RetryingClassifier, Trainer,
};

#[cfg(feature = "huggingface")]
pub use providers::HuggingFaceClassifier;

#[cfg(feature = "local-inference")]
pub use providers::OnnxClassifier;
