//! Model-input encoding for local inference.
//!
//! Wraps a HuggingFace `tokenizer.json`; the tokenization algorithm itself
//! belongs to the `tokenizers` crate.

#[cfg(feature = "local-inference")]
mod hf;

#[cfg(feature = "local-inference")]
pub use hf::HfTokenizer;

/// Default maximum sequence length in tokens (BERT-family limit).
pub const DEFAULT_MAX_LENGTH: usize = 512;

/// One encoded text, laid out the way ONNX sequence classifiers expect.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EncodedText {
    pub input_ids: Vec<i64>,
    pub attention_mask: Vec<i64>,
    pub token_type_ids: Vec<i64>,
}

impl EncodedText {
    /// Sequence length in tokens.
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.input_ids.is_empty()
    }
}
