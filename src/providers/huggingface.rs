//! HuggingFace Inference API classifier.
//!
//! Runs the `text-classification` task on HuggingFace's serverless inference
//! endpoints. The model's label table is read from the repository's
//! `config.json` on the Hub when the classifier is loaded.
//! See: <https://huggingface.co/docs/api-inference/index>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::traits::Classifier;
use super::{HUGGINGFACE_BASE_URL, HUGGINGFACE_HUB_URL, HUGGINGFACE_TIMEOUT_SECS};
use crate::error::{FinsentError, ModelStage, Result};
use crate::labels::ModelLabelTable;
use crate::model::ModelSource;
use crate::types::RawPrediction;

/// Endpoint settings for [`HuggingFaceClassifier`].
#[derive(Debug, Clone)]
pub struct HuggingFaceEndpoints {
    /// Inference API base URL.
    pub base_url: String,
    /// Hub base URL used to fetch `config.json`.
    pub hub_url: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for HuggingFaceEndpoints {
    fn default() -> Self {
        Self {
            base_url: HUGGINGFACE_BASE_URL.to_string(),
            hub_url: HUGGINGFACE_HUB_URL.to_string(),
            timeout: Duration::from_secs(HUGGINGFACE_TIMEOUT_SECS),
        }
    }
}

impl HuggingFaceEndpoints {
    /// Point both the inference API and the hub at one server (for testing with wiremock).
    pub fn single(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            hub_url: base_url.clone(),
            base_url,
            ..Default::default()
        }
    }
}

/// Classifier backed by the HuggingFace Inference API.
#[derive(Clone)]
pub struct HuggingFaceClassifier {
    api_key: String,
    http: Client,
    base_url: String,
    source: ModelSource,
    repo_id: String,
    labels: ModelLabelTable,
}

impl HuggingFaceClassifier {
    /// Load a hub model with the default endpoints.
    pub async fn load(api_key: impl Into<String>, repo_id: &str) -> Result<Self> {
        Self::load_with(api_key, repo_id, &HuggingFaceEndpoints::default()).await
    }

    /// Load a hub model against custom endpoints.
    ///
    /// Fetches the model's `config.json` to learn its label table.
    #[instrument(skip(api_key, endpoints), fields(hub = %endpoints.hub_url))]
    pub async fn load_with(
        api_key: impl Into<String>,
        repo_id: &str,
        endpoints: &HuggingFaceEndpoints,
    ) -> Result<Self> {
        let api_key = api_key.into();
        let http = Client::builder()
            .timeout(endpoints.timeout)
            .user_agent(crate::version::user_agent())
            .build()
            .map_err(|e| FinsentError::Configuration(format!("failed to build HTTP client: {e}")))?;

        let url = format!(
            "{}/{}/resolve/main/config.json",
            endpoints.hub_url.trim_end_matches('/'),
            repo_id
        );
        let response = http
            .get(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .send()
            .await
            .map_err(|e| FinsentError::http(ModelStage::Load, e))?;

        handle_response_errors(&response, repo_id, ModelStage::Load)?;

        let body = response
            .text()
            .await
            .map_err(|e| FinsentError::external(ModelStage::Load, e))?;
        let labels = ModelLabelTable::from_config_json(&body)?;
        debug!(labels = labels.len(), "fetched model label table");

        Ok(Self {
            api_key,
            http,
            base_url: endpoints.base_url.trim_end_matches('/').to_string(),
            source: ModelSource::huggingface(repo_id),
            repo_id: repo_id.to_string(),
            labels,
        })
    }

    /// Run text classification for a batch.
    ///
    /// For each input, the highest scoring label is returned.
    #[instrument(skip(self, texts), fields(model = %self.repo_id, batch = texts.len()))]
    pub async fn classify(&self, texts: &[&str]) -> Result<Vec<RawPrediction>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let url = format!("{}/models/{}", self.base_url, self.repo_id);

        let response = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&ClassifyRequest { inputs: texts })
            .send()
            .await
            .map_err(|e| FinsentError::http(ModelStage::Infer, e))?;

        handle_response_errors(&response, &self.repo_id, ModelStage::Infer)?;

        let result: ClassifyResponse = response
            .json()
            .await
            .map_err(|e| FinsentError::external(ModelStage::Infer, e))?;

        top_labels(result, texts.len())
    }
}

/// Pick the top label per input out of either response shape.
fn top_labels(response: ClassifyResponse, expected: usize) -> Result<Vec<RawPrediction>> {
    let per_input: Vec<Vec<LabelScore>> = match response {
        ClassifyResponse::Nested(rows) => rows,
        // A flat list is either all candidates for a single input or the
        // top candidate for each input.
        ClassifyResponse::Flat(entries) if expected == 1 => vec![entries],
        ClassifyResponse::Flat(entries) => entries.into_iter().map(|e| vec![e]).collect(),
    };

    if per_input.len() != expected {
        return Err(FinsentError::external(
            ModelStage::Infer,
            format!("expected {expected} results, got {}", per_input.len()),
        ));
    }

    per_input
        .into_iter()
        .map(|candidates| {
            candidates
                .into_iter()
                .max_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal))
                .map(|best| RawPrediction::new(best.label, best.score))
                .ok_or(FinsentError::EmptyResponse)
        })
        .collect()
}

/// Check response status and map to appropriate error.
fn handle_response_errors(
    response: &reqwest::Response,
    model: &str,
    stage: ModelStage,
) -> Result<()> {
    let status = response.status();

    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        401 => Err(FinsentError::AuthenticationFailed),
        404 => Err(FinsentError::ModelNotFound(model.to_string())),
        429 => {
            // Try to parse retry-after header
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(FinsentError::RateLimited { retry_after })
        }
        503 => Err(FinsentError::Api {
            stage,
            status: 503,
            message: "Model is loading, please retry".to_string(),
        }),
        code => Err(FinsentError::Api {
            stage,
            status: code,
            message: format!("HuggingFace API error: {}", status),
        }),
    }
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    inputs: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassifyResponse {
    Nested(Vec<Vec<LabelScore>>),
    Flat(Vec<LabelScore>),
}

// ============================================================================
// Provider Trait Implementations
// ============================================================================

#[async_trait]
impl Classifier for HuggingFaceClassifier {
    fn name(&self) -> &str {
        "huggingface"
    }

    fn source(&self) -> &ModelSource {
        &self.source
    }

    fn labels(&self) -> &ModelLabelTable {
        &self.labels
    }

    async fn predict(&self, texts: &[&str]) -> Result<Vec<RawPrediction>> {
        HuggingFaceClassifier::classify(self, texts).await
    }
}
