//! HuggingFace tokenizers implementation.

use std::path::Path;

use tokenizers::{Tokenizer, TruncationParams};

use super::EncodedText;
use crate::error::{FinsentError, ModelStage, Result};

/// HuggingFace tokenizers implementation.
pub struct HfTokenizer {
    inner: Tokenizer,
}

impl HfTokenizer {
    /// Load tokenizer from a local `tokenizer.json`, truncating to `max_length` tokens.
    pub fn from_file(path: &Path, max_length: usize) -> Result<Self> {
        let mut inner = Tokenizer::from_file(path).map_err(|e| {
            FinsentError::external(
                ModelStage::Load,
                format!("failed to load tokenizer from {}: {e}", path.display()),
            )
        })?;

        inner
            .with_truncation(Some(TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(|e| FinsentError::external(ModelStage::Load, e))?;

        Ok(Self { inner })
    }

    /// Encode a single text with special tokens.
    pub fn encode(&self, text: &str) -> Result<EncodedText> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| FinsentError::external(ModelStage::Tokenize, e))?;

        Ok(EncodedText {
            input_ids: encoding.get_ids().iter().map(|&id| id as i64).collect(),
            attention_mask: encoding
                .get_attention_mask()
                .iter()
                .map(|&m| m as i64)
                .collect(),
            token_type_ids: encoding.get_type_ids().iter().map(|&t| t as i64).collect(),
        })
    }
}
