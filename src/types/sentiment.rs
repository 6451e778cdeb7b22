//! Sentiment categories, posts and predictions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{FinsentError, Result};

/// Canonical sentiment category, independent of any integer encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Negative,
    Positive,
    Neutral,
}

impl Sentiment {
    /// All categories, in dataset label order (0, 1, 2).
    pub const ALL: [Sentiment; 3] = [Self::Negative, Self::Positive, Self::Neutral];

    /// Map a dataset label (0=negative, 1=positive, 2=neutral).
    pub fn from_dataset_label(label: i64) -> Result<Self> {
        match label {
            0 => Ok(Self::Negative),
            1 => Ok(Self::Positive),
            2 => Ok(Self::Neutral),
            other => Err(FinsentError::UnrecognizedLabel(format!(
                "dataset label {other} (expected 0, 1 or 2)"
            ))),
        }
    }

    /// The dataset integer for this category.
    pub fn dataset_label(&self) -> u8 {
        match self {
            Self::Negative => 0,
            Self::Positive => 1,
            Self::Neutral => 2,
        }
    }

    /// Position in [`Sentiment::ALL`].
    pub(crate) fn index(&self) -> usize {
        self.dataset_label() as usize
    }

    /// Lowercase name, matching what sentiment models emit.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Negative => "negative",
            Self::Positive => "positive",
            Self::Neutral => "neutral",
        }
    }

    /// Parse a model label string, ignoring case and surrounding whitespace.
    ///
    /// Unknown strings are an error, never a silent default.
    pub fn from_model_label(label: &str) -> Result<Self> {
        match label.trim().to_ascii_lowercase().as_str() {
            "negative" => Ok(Self::Negative),
            "positive" => Ok(Self::Positive),
            "neutral" => Ok(Self::Neutral),
            _ => Err(FinsentError::UnrecognizedLabel(format!(
                "model label {label:?}"
            ))),
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single social-media text unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Post {
    /// Raw text as it appeared in the source.
    pub text: String,
    /// Ground-truth label, when known.
    pub label: Option<Sentiment>,
}

impl Post {
    /// An unlabeled post.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            label: None,
        }
    }

    /// A post with a ground-truth label.
    pub fn labeled(text: impl Into<String>, label: Sentiment) -> Self {
        Self {
            text: text.into(),
            label: Some(label),
        }
    }
}

/// A post after normalization. Only the normalizer produces these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedPost {
    text: String,
    label: Option<Sentiment>,
}

impl NormalizedPost {
    pub(crate) fn new(text: String, label: Option<Sentiment>) -> Self {
        Self { text, label }
    }

    /// Normalized text.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Ground-truth label carried over from the source post.
    pub fn label(&self) -> Option<Sentiment> {
        self.label
    }
}

/// Model output for one text, before label alignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPrediction {
    /// Label string as emitted by the model.
    pub label: String,
    /// Confidence score (0.0 to 1.0).
    pub score: f32,
}

impl RawPrediction {
    pub fn new(label: impl Into<String>, score: f32) -> Self {
        Self {
            label: label.into(),
            score,
        }
    }
}

/// Aligned prediction for one post.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    /// Predicted canonical category.
    pub label: Sentiment,
    /// Confidence score (0.0 to 1.0).
    pub score: f32,
}
