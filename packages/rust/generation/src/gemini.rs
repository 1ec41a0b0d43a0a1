//! Gemini `generateContent` REST client.

use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};
use url::Url;

use mvpfactory_shared::{FactoryError, Result};

use crate::{Generator, ModelRole, ModelRoster};

/// User-Agent string for model requests.
const USER_AGENT: &str = concat!("mvpfactory/", env!("CARGO_PKG_VERSION"));

/// [`Generator`] backed by the Generative Language API.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    base_url: Url,
    api_key: String,
    models: ModelRoster,
}

impl GeminiClient {
    /// Build a client. No request timeout is set; calls wait for the model.
    pub fn new(base_url: Url, api_key: impl Into<String>, models: ModelRoster) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FactoryError::Generation(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            api_key: api_key.into(),
            models,
        })
    }

    pub fn models(&self) -> &ModelRoster {
        &self.models
    }

    fn endpoint(&self, model: &str) -> Result<Url> {
        self.base_url
            .join(&format!("v1beta/models/{model}:generateContent"))
            .map_err(|e| FactoryError::config(format!("invalid Gemini endpoint for {model}: {e}")))
    }
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    text: Option<String>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().filter_map(|p| p.text).collect();
        (!text.is_empty()).then_some(text)
    }
}

impl Generator for GeminiClient {
    #[instrument(skip_all, fields(role = %role, prompt_len = prompt.len()))]
    async fn generate(&self, role: ModelRole, prompt: &str) -> Result<String> {
        let model = self.models.model_for(role);
        let url = self.endpoint(model)?;

        let body = serde_json::json!({
            "contents": [{ "parts": [{ "text": prompt }] }]
        });

        let resp = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| FactoryError::Generation(format!("request to {model} failed: {e}")))?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(FactoryError::Generation(format!(
                "{model} returned HTTP {status}: {}",
                detail.chars().take(300).collect::<String>()
            )));
        }

        let parsed: GenerateResponse = resp
            .json()
            .await
            .map_err(|e| FactoryError::Generation(format!("malformed response from {model}: {e}")))?;

        let text = parsed
            .into_text()
            .ok_or_else(|| FactoryError::Generation(format!("{model} returned no text")))?;

        debug!(model, response_len = text.len(), "generation complete");
        Ok(text)
    }
}
