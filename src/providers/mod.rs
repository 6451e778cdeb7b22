//! Classifier and trainer backends.
//!
//! Each backend implements a capability trait from [`traits`]; the pipeline
//! only ever sees a [`ClassifierHandle`] or a `&dyn Trainer`.

pub mod command;
#[cfg(feature = "huggingface")]
pub mod huggingface;
#[cfg(feature = "local-inference")]
pub mod onnx;
pub mod retry;
pub mod traits;

pub use command::CommandTrainer;
#[cfg(feature = "huggingface")]
pub use huggingface::{HuggingFaceClassifier, HuggingFaceEndpoints};
#[cfg(feature = "local-inference")]
pub use onnx::OnnxClassifier;
pub use retry::{RetryConfig, RetryingClassifier};
pub use traits::{Classifier, ClassifierHandle, Trainer};

/// Default base URL for the HuggingFace Inference API.
pub const HUGGINGFACE_BASE_URL: &str = "https://api-inference.huggingface.co";

/// Default base URL for HuggingFace Hub file downloads.
pub const HUGGINGFACE_HUB_URL: &str = "https://huggingface.co";

/// Default per-request timeout for HuggingFace calls, in seconds.
pub const HUGGINGFACE_TIMEOUT_SECS: u64 = 60;
