//! Where a model comes from: a HuggingFace repository or a local directory.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{FinsentError, ModelStage, Result};

/// Default pretrained financial sentiment model.
pub const DEFAULT_MODEL: &str = "ProsusAI/finbert";

/// Source for a model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// HuggingFace Hub repository.
    HuggingFace {
        /// Repository ID (e.g., "ProsusAI/finbert").
        repo_id: String,
    },

    /// Local model directory (a fine-tuning checkpoint or an export).
    Local {
        /// Directory holding `config.json`, `tokenizer.json` and the weights.
        path: PathBuf,
    },
}

impl ModelSource {
    /// Create a HuggingFace source.
    pub fn huggingface(repo_id: impl Into<String>) -> Self {
        Self::HuggingFace {
            repo_id: repo_id.into(),
        }
    }

    /// Create a local source.
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Self::Local { path: path.into() }
    }

    /// Interpret an identifier: existing directories are local, anything
    /// else is a hub repository ID.
    pub fn parse(identifier: &str) -> Self {
        let path = Path::new(identifier);
        if path.is_dir() {
            Self::local(path)
        } else {
            Self::huggingface(identifier)
        }
    }

    /// Identifier understood by external tooling (repo ID or path).
    pub fn identifier(&self) -> String {
        match self {
            Self::HuggingFace { repo_id } => repo_id.clone(),
            Self::Local { path } => path.display().to_string(),
        }
    }

    /// Resolve a file of this model to a local path.
    ///
    /// Hub files are downloaded into the hub cache on first use. Local files
    /// must already exist.
    #[cfg(feature = "local-inference")]
    pub fn resolve_file(&self, file: &str) -> Result<PathBuf> {
        match self {
            Self::HuggingFace { repo_id } => {
                let api = hf_hub::api::sync::ApiBuilder::new()
                    .with_cache_dir(cache_dir())
                    .build()
                    .map_err(|e| {
                        FinsentError::external(
                            ModelStage::Load,
                            format!("failed to initialize HF API: {e}"),
                        )
                    })?;
                api.model(repo_id.clone()).get(file).map_err(|e| {
                    FinsentError::external(
                        ModelStage::Load,
                        format!("failed to download {file} from {repo_id}: {e}"),
                    )
                })
            }
            Self::Local { path } => {
                let candidate = path.join(file);
                if !candidate.exists() {
                    return Err(FinsentError::external(
                        ModelStage::Load,
                        format!("{} does not exist", candidate.display()),
                    ));
                }
                Ok(candidate)
            }
        }
    }

    /// Check that a local source points at an existing directory.
    pub fn ensure_exists(&self) -> Result<()> {
        match self {
            Self::Local { path } if !path.is_dir() => Err(FinsentError::external(
                ModelStage::Load,
                format!("local model directory does not exist: {}", path.display()),
            )),
            _ => Ok(()),
        }
    }
}

/// Cache directory for downloaded model files.
///
/// `FINSENT_CACHE_DIR` wins; otherwise the platform cache directory.
pub fn cache_dir() -> PathBuf {
    std::env::var("FINSENT_CACHE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from(".cache"))
                .join("finsent")
                .join("models")
        })
}

impl Default for ModelSource {
    fn default() -> Self {
        Self::huggingface(DEFAULT_MODEL)
    }
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HuggingFace { repo_id } => write!(f, "hf:{repo_id}"),
            Self::Local { path } => write!(f, "local:{}", path.display()),
        }
    }
}
