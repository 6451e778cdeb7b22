//! finsent error types

use std::fmt;
use std::time::Duration;

/// Stage of the external model boundary where a failure surfaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelStage {
    /// Downloading or opening a model, tokenizer or label table.
    Load,
    /// Turning text into model inputs.
    Tokenize,
    /// Running the model.
    Infer,
    /// Fine-tuning through the external training program.
    Train,
}

impl ModelStage {
    /// Stage name used in error messages and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::Tokenize => "tokenize",
            Self::Infer => "infer",
            Self::Train => "train",
        }
    }
}

impl fmt::Display for ModelStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// finsent error types
#[derive(Debug, thiserror::Error)]
pub enum FinsentError {
    // Input data errors
    /// Malformed input file: missing columns or unparsable rows.
    #[error("input format error{}: {message}", line_suffix(.line))]
    InputFormat { line: Option<u64>, message: String },

    /// A model output or dataset label outside the three-way enumeration.
    #[error("unrecognized label: {0}")]
    UnrecognizedLabel(String),

    // Model boundary errors
    /// Opaque failure from the model, tokenizer or trainer boundary.
    #[error("external model error during {stage}: {message}")]
    ExternalModel { stage: ModelStage, message: String },

    #[error("HTTP error during {stage}: {message}")]
    Http { stage: ModelStage, message: String },

    #[error("API error during {stage} ({status}): {message}")]
    Api {
        stage: ModelStage,
        status: u16,
        message: String,
    },

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("empty response from model")]
    EmptyResponse,

    // Data errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FinsentError {
    /// Wrap a boundary failure with the stage it happened in.
    pub fn external(stage: ModelStage, err: impl fmt::Display) -> Self {
        Self::ExternalModel {
            stage,
            message: err.to_string(),
        }
    }

    /// Transport failure talking to a remote model during `stage`.
    pub fn http(stage: ModelStage, err: impl fmt::Display) -> Self {
        Self::Http {
            stage,
            message: err.to_string(),
        }
    }

    /// Input format error tied to a line of the source file.
    pub fn input_format(line: Option<u64>, message: impl Into<String>) -> Self {
        Self::InputFormat {
            line,
            message: message.into(),
        }
    }

    /// Whether retrying the same call later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::RateLimited { .. } | Self::Http { .. } | Self::EmptyResponse => true,
            Self::Api { status, .. } => matches!(status, 500 | 502 | 503 | 504),
            _ => false,
        }
    }

    /// Boundary stage the failure came from, for errors that carry one.
    pub fn stage(&self) -> Option<ModelStage> {
        match self {
            Self::ExternalModel { stage, .. }
            | Self::Http { stage, .. }
            | Self::Api { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Server-suggested wait before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

fn line_suffix(line: &Option<u64>) -> String {
    line.map(|l| format!(" at line {l}")).unwrap_or_default()
}

/// Result type alias for finsent operations
pub type Result<T> = std::result::Result<T, FinsentError>;
