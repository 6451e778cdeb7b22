//! Configuration for the `finsent` tool.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.finsent/config.toml` (user)
//! 3. `/etc/finsent/config.toml` (system)
//!
//! When none of these exist the built-in defaults apply.
//!
//! Secrets are loaded separately with mandatory permission checks:
//! 1. `~/.finsent/secrets.toml` (user, must be 0600)
//! 2. `/etc/finsent/secrets.toml` (system, must be 0600)
//!
//! File loading needs the `cli` feature; the types are always available so
//! library users can build a [`BackendConfig`] by hand.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::model::{DEFAULT_MODEL, Device, ModelSource};
use crate::providers::{
    HUGGINGFACE_BASE_URL, HUGGINGFACE_HUB_URL, HUGGINGFACE_TIMEOUT_SECS, RetryConfig,
};
use crate::tokenizer::DEFAULT_MAX_LENGTH;
use crate::training::TrainingParams;
use crate::{FinsentError, Result};

/// Full configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub huggingface: HuggingFaceConfig,
    #[serde(default)]
    pub data: DataConfig,
    #[serde(default)]
    pub training: TrainingConfig,
}

/// Which classifier backend to use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// HuggingFace Inference API.
    #[default]
    HuggingFace,
    /// Local ONNX Runtime inference.
    Onnx,
}

/// Model selection.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub backend: Backend,
    /// Hub repository ID (default: ProsusAI/finbert).
    #[serde(default = "default_model_id")]
    pub id: String,
    /// Local model directory; overrides `id` when set.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Device for local inference: "cpu", "cuda" or "cuda:N" (default: "cpu").
    #[serde(default = "default_device")]
    pub device: String,
    /// Texts per `predict` call (default: 32).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Maximum tokens per text for local inference (default: 512).
    #[serde(default = "default_max_length")]
    pub max_length: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            id: default_model_id(),
            path: None,
            device: default_device(),
            batch_size: default_batch_size(),
            max_length: default_max_length(),
        }
    }
}

impl ModelConfig {
    /// Where to load the model from.
    pub fn source(&self) -> ModelSource {
        match &self.path {
            Some(path) => ModelSource::local(path),
            None => ModelSource::huggingface(&self.id),
        }
    }
}

fn default_model_id() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_device() -> String {
    "cpu".to_string()
}

fn default_batch_size() -> usize {
    32
}

fn default_max_length() -> usize {
    DEFAULT_MAX_LENGTH
}

/// HuggingFace Inference API settings.
#[derive(Debug, Clone, Deserialize)]
pub struct HuggingFaceConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_hub_url")]
    pub hub_url: String,
    /// Request timeout in seconds (default: 60).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for HuggingFaceConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            hub_url: default_hub_url(),
            timeout_secs: default_timeout(),
            retry: RetryConfig::default(),
        }
    }
}

fn default_base_url() -> String {
    HUGGINGFACE_BASE_URL.to_string()
}

fn default_hub_url() -> String {
    HUGGINGFACE_HUB_URL.to_string()
}

fn default_timeout() -> u64 {
    HUGGINGFACE_TIMEOUT_SECS
}

/// Dataset handling.
#[derive(Debug, Clone, Deserialize)]
pub struct DataConfig {
    /// Share of each class held out for testing (default: 0.2).
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Shuffle seed for the split (default: 42).
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Where to write the held-out split as CSV, if anywhere.
    #[serde(default)]
    pub export_path: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            test_fraction: default_test_fraction(),
            seed: default_seed(),
            export_path: None,
        }
    }
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_seed() -> u64 {
    42
}

/// External fine-tuning program.
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Program to run; fine-tuning is unavailable when unset.
    #[serde(default)]
    pub program: Option<String>,
    /// Arguments, with `{model}`, `{train}`, `{eval}`, `{output}`, `{epochs}`,
    /// `{batch_size}` and `{learning_rate}` placeholders.
    #[serde(default)]
    pub args: Vec<String>,
    /// Checkpoint directory (default: "finsent-checkpoint").
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(flatten)]
    pub params: TrainingParams,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            program: None,
            args: Vec::new(),
            output_dir: default_output_dir(),
            params: TrainingParams::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("finsent-checkpoint")
}

/// Everything needed to load a classifier.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub backend: Backend,
    pub source: ModelSource,
    pub device: Device,
    pub max_length: usize,
    pub api_key: Option<String>,
    pub base_url: String,
    pub hub_url: String,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for BackendConfig {
    fn default() -> Self {
        let hf = HuggingFaceConfig::default();
        Self {
            backend: Backend::default(),
            source: ModelSource::default(),
            device: Device::default(),
            max_length: DEFAULT_MAX_LENGTH,
            api_key: None,
            base_url: hf.base_url,
            hub_url: hf.hub_url,
            timeout: Duration::from_secs(hf.timeout_secs),
            retry: hf.retry,
        }
    }
}

impl Config {
    /// Resolve the backend settings, pulling the API key from `secrets`.
    pub fn backend(&self, secrets: &Secrets) -> Result<BackendConfig> {
        Ok(BackendConfig {
            backend: self.model.backend,
            source: self.model.source(),
            device: self.model.device.parse()?,
            max_length: self.model.max_length,
            api_key: secrets.huggingface_api_key(),
            base_url: self.huggingface.base_url.clone(),
            hub_url: self.huggingface.hub_url.clone(),
            timeout: Duration::from_secs(self.huggingface.timeout_secs),
            retry: self.huggingface.retry.clone(),
        })
    }

    /// Reject settings that cannot work before anything is loaded.
    pub fn validate(&self) -> Result<()> {
        if self.model.batch_size == 0 {
            return Err(FinsentError::Configuration(
                "model.batch_size must be at least 1".to_string(),
            ));
        }
        if !(self.data.test_fraction > 0.0 && self.data.test_fraction < 1.0) {
            return Err(FinsentError::Configuration(format!(
                "data.test_fraction must be between 0 and 1, got {}",
                self.data.test_fraction
            )));
        }
        Ok(())
    }
}

/// Secrets configuration (API keys).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Secrets {
    #[serde(default)]
    pub huggingface: Option<ApiKeySecret>,
}

/// A single API key secret.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiKeySecret {
    pub api_key: String,
}

/// Environment variable consulted when no secrets file has a key.
pub const HF_API_KEY_ENV: &str = "HF_API_KEY";

impl Secrets {
    /// HuggingFace API key, falling back to `HF_API_KEY`.
    pub fn huggingface_api_key(&self) -> Option<String> {
        self.huggingface
            .as_ref()
            .map(|s| s.api_key.clone())
            .or_else(|| std::env::var(HF_API_KEY_ENV).ok())
    }
}

// ============================================================================
// File loading
// ============================================================================

#[cfg(feature = "cli")]
mod load {
    use std::fs;
    use std::path::{Path, PathBuf};

    use tracing::debug;

    use super::{Config, Secrets};
    use crate::{FinsentError, Result};

    impl Config {
        /// Load configuration from the standard locations.
        ///
        /// An explicit path must exist; otherwise the first existing file
        /// wins and defaults apply when there is none.
        pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
            let Some(path) = Self::resolve_config_path(explicit_path)? else {
                debug!("no config file found, using defaults");
                return Ok(Self::default());
            };
            debug!(path = %path.display(), "loading config");
            Self::load_from_file(&path)
        }

        pub fn load_from_file(path: &Path) -> Result<Self> {
            let content = fs::read_to_string(path).map_err(|e| {
                FinsentError::Configuration(format!("Failed to read config file {path:?}: {e}"))
            })?;
            let config: Self = toml::from_str(&content).map_err(|e| {
                FinsentError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
            })?;
            config.validate()?;
            Ok(config)
        }

        fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
            if let Some(path) = explicit {
                if path.exists() {
                    return Ok(Some(path.to_path_buf()));
                }
                return Err(FinsentError::Configuration(format!(
                    "Config file not found: {path:?}"
                )));
            }

            // User config
            if let Some(home) = dirs::home_dir() {
                let user_config = home.join(".finsent").join("config.toml");
                if user_config.exists() {
                    return Ok(Some(user_config));
                }
            }

            // System config
            let system_config = PathBuf::from("/etc/finsent/config.toml");
            Ok(system_config.exists().then_some(system_config))
        }
    }

    impl Secrets {
        /// Load secrets from the standard locations with permission checks.
        ///
        /// Returns empty secrets if no file exists (the key may come from
        /// the environment).
        pub fn load() -> Result<Self> {
            if let Some(home) = dirs::home_dir() {
                let user_secrets = home.join(".finsent").join("secrets.toml");
                if user_secrets.exists() {
                    return Self::load_from_file(&user_secrets);
                }
            }

            let system_secrets = PathBuf::from("/etc/finsent/secrets.toml");
            if system_secrets.exists() {
                return Self::load_from_file(&system_secrets);
            }

            Ok(Secrets::default())
        }

        /// Load one secrets file after checking its permissions.
        pub fn load_from_file(path: &Path) -> Result<Self> {
            Self::check_permissions(path)?;
            let content = fs::read_to_string(path).map_err(|e| {
                FinsentError::Configuration(format!("Failed to read secrets file {path:?}: {e}"))
            })?;
            toml::from_str(&content).map_err(|e| {
                FinsentError::Configuration(format!("Failed to parse secrets file {path:?}: {e}"))
            })
        }

        /// Check that the secrets file has secure permissions (0600 or 0400).
        #[cfg(unix)]
        fn check_permissions(path: &Path) -> Result<()> {
            use std::os::unix::fs::PermissionsExt;

            let metadata = fs::metadata(path).map_err(|e| {
                FinsentError::Configuration(format!("Failed to stat secrets file {path:?}: {e}"))
            })?;

            let mode = metadata.permissions().mode();
            // Reject if group or other bits are set
            if mode & 0o077 != 0 {
                return Err(FinsentError::Configuration(format!(
                    "Secrets file {path:?} has insecure permissions {:o}. Must be 0600 or 0400.",
                    mode & 0o777
                )));
            }

            Ok(())
        }

        #[cfg(not(unix))]
        fn check_permissions(_path: &Path) -> Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = Config::default();
        assert_eq!(config.model.backend, Backend::HuggingFace);
        assert_eq!(config.model.id, "ProsusAI/finbert");
        assert_eq!(config.model.batch_size, 32);
        assert_eq!(config.model.max_length, 512);
        assert_eq!(config.data.test_fraction, 0.2);
        assert_eq!(config.data.seed, 42);
        assert_eq!(config.training.params, TrainingParams::default());
        assert!(config.validate().is_ok());
    }

    #[cfg(feature = "huggingface")]
    #[test]
    fn huggingface_defaults_match_endpoints() {
        let config = HuggingFaceConfig::default();
        let endpoints = crate::providers::HuggingFaceEndpoints::default();
        assert_eq!(config.base_url, endpoints.base_url);
        assert_eq!(config.hub_url, endpoints.hub_url);
        assert_eq!(Duration::from_secs(config.timeout_secs), endpoints.timeout);
    }

    #[test]
    fn model_path_overrides_hub_id() {
        let config = ModelConfig {
            path: Some(PathBuf::from("/models/ckpt")),
            ..Default::default()
        };
        assert_eq!(config.source(), ModelSource::local("/models/ckpt"));
        assert_eq!(
            ModelConfig::default().source(),
            ModelSource::huggingface("ProsusAI/finbert")
        );
    }

    #[test]
    fn backend_config_from_config() {
        let config = Config::default();
        let secrets = Secrets {
            huggingface: Some(ApiKeySecret {
                api_key: "from-file".to_string(),
            }),
        };
        let backend = config.backend(&secrets).unwrap();
        assert_eq!(backend.api_key.as_deref(), Some("from-file"));
        assert_eq!(backend.device, Device::Cpu);
        assert_eq!(backend.timeout, Duration::from_secs(60));
    }

    #[test]
    fn bad_device_is_a_configuration_error() {
        let mut config = Config::default();
        config.model.device = "tpu".into();
        assert!(matches!(
            config.backend(&Secrets::default()),
            Err(FinsentError::Configuration(_))
        ));
    }

    #[test]
    fn validate_rejects_bad_fraction_and_batch() {
        let mut config = Config::default();
        config.data.test_fraction = 1.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.model.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "cli")]
    mod files {
        use std::io::Write;
        use std::path::Path;

        use super::*;

        #[test]
        fn parse_minimal_config() {
            let config: Config = toml::from_str(
                r#"
                [model]
                backend = "onnx"
                path = "/opt/ckpt"
                "#,
            )
            .unwrap();
            assert_eq!(config.model.backend, Backend::Onnx);
            assert_eq!(config.model.source(), ModelSource::local("/opt/ckpt"));
            // Defaults preserved
            assert_eq!(config.model.batch_size, 32);
            assert_eq!(config.huggingface.timeout_secs, 60);
        }

        #[test]
        fn parse_full_config() {
            let config: Config = toml::from_str(
                r#"
                [model]
                backend = "huggingface"
                id = "yiyanghkust/finbert-tone"
                device = "cpu"
                batch_size = 8
                max_length = 128

                [huggingface]
                base_url = "http://localhost:8080"
                timeout_secs = 5

                [huggingface.retry]
                max_attempts = 5
                initial_delay = 100

                [data]
                test_fraction = 0.25
                seed = 7
                export_path = "test.csv"

                [training]
                program = "python"
                args = ["train.py", "--model", "{model}"]
                output_dir = "out"
                epochs = 5
                learning_rate = 0.0001
                "#,
            )
            .unwrap();
            assert_eq!(config.model.id, "yiyanghkust/finbert-tone");
            assert_eq!(config.model.max_length, 128);
            assert_eq!(config.huggingface.base_url, "http://localhost:8080");
            assert_eq!(config.huggingface.hub_url, "https://huggingface.co");
            assert_eq!(config.huggingface.retry.max_attempts, 5);
            assert_eq!(config.data.seed, 7);
            assert_eq!(config.data.export_path, Some(PathBuf::from("test.csv")));
            assert_eq!(config.training.program.as_deref(), Some("python"));
            assert_eq!(config.training.args.len(), 3);
            assert_eq!(config.training.params.epochs, 5);
            assert_eq!(config.training.params.batch_size, 16);
            assert_eq!(config.training.params.learning_rate, 0.0001);
        }

        #[test]
        fn unknown_backend_fails_to_parse() {
            let result: std::result::Result<Config, _> = toml::from_str(
                r#"
                [model]
                backend = "candle"
                "#,
            );
            assert!(result.is_err());
        }

        #[test]
        fn config_not_found_returns_error() {
            let err = Config::load(Some(Path::new("/nonexistent/config.toml")))
                .unwrap_err()
                .to_string();
            assert!(err.contains("Config file not found"));
        }

        #[test]
        fn invalid_values_are_rejected_on_load() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("config.toml");
            std::fs::write(&path, "[data]\ntest_fraction = 0.0\n").unwrap();
            assert!(Config::load(Some(&path)).is_err());
        }

        #[test]
        fn parse_secrets() {
            let secrets: Secrets = toml::from_str(
                r#"
                [huggingface]
                api_key = "hf_test_key"
                "#,
            )
            .unwrap();
            assert_eq!(secrets.huggingface_api_key().as_deref(), Some("hf_test_key"));
        }

        #[cfg(unix)]
        #[test]
        fn secrets_with_open_permissions_are_rejected() {
            use std::os::unix::fs::PermissionsExt;

            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("secrets.toml");
            let mut file = std::fs::File::create(&path).unwrap();
            writeln!(file, "[huggingface]\napi_key = \"k\"").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o644)).unwrap();
            let err = Secrets::load_from_file(&path).unwrap_err().to_string();
            assert!(err.contains("insecure permissions"));

            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600)).unwrap();
            let secrets = Secrets::load_from_file(&path).unwrap();
            assert_eq!(secrets.huggingface.unwrap().api_key, "k");
        }
    }
}
