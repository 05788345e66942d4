//! Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use enquete_shared::{EnqueteError, GeminiConfig, Result};

use crate::TextGenerator;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: Vec<RequestContent<'a>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct RequestContent<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Default, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    /// Some proxies flatten the answer into a top-level field.
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateResponse {
    /// Text of the first candidate's first part.
    fn first_text(self) -> Option<String> {
        let from_candidate = self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text);
        from_candidate.or(self.text)
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Header carrying the API key. The key never goes into the URL, so it
/// cannot leak through error messages.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Remote text generator backed by the Gemini REST API.
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
    key_env: String,
    max_output_tokens: u32,
    temperature: f32,
}

impl GeminiClient {
    /// Build a client. A missing `api_key` is not an error here; every
    /// `generate` call then fails with [`EnqueteError::Rewrite`].
    pub fn new(config: &GeminiConfig, api_key: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| EnqueteError::Rewrite(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
            key_env: config.api_key_env.clone(),
            max_output_tokens: config.max_output_tokens,
            temperature: config.temperature,
        })
    }

    fn url(&self) -> String {
        format!("{}/models/{}:generateContent", self.endpoint, self.model)
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    #[instrument(skip_all, fields(model = %self.model))]
    async fn generate(&self, prompt: &str) -> Result<String> {
        let Some(key) = self.api_key.as_deref() else {
            return Err(EnqueteError::Rewrite(format!("{} is not set", self.key_env)));
        };

        let body = GenerateRequest {
            contents: vec![RequestContent {
                parts: vec![RequestPart { text: prompt }],
            }],
            generation_config: GenerationConfig {
                max_output_tokens: self.max_output_tokens,
                temperature: self.temperature,
            },
        };

        let response = self
            .client
            .post(self.url())
            .header(API_KEY_HEADER, key)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                EnqueteError::Rewrite(format!("gemini request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(EnqueteError::Rewrite(format!("gemini returned HTTP {status}")));
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            EnqueteError::Rewrite(format!("malformed gemini response: {}", e.without_url()))
        })?;

        let text = parsed
            .first_text()
            .map(|t| clean_answer(&t))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| EnqueteError::Rewrite("gemini response carried no text".into()))?;

        debug!(chars = text.chars().count(), "question generated");
        Ok(text)
    }
}

/// Trim whitespace and any quotes the model wrapped around its answer.
fn clean_answer(raw: &str) -> String {
    raw.trim()
        .trim_matches(|c| matches!(c, '"' | '\'' | '“' | '”' | '«' | '»'))
        .trim()
        .to_string()
}
