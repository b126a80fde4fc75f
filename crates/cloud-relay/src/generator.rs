//! Answer generation backed by the Gemini `generateContent` API.
//!
//! [`TextGenerator`] is the fallible collaborator seam; [`AnswerGenerator`]
//! wraps one and never fails, substituting [`FALLBACK_RESPONSE`] so the
//! publishing side always has well-formed text to encode.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::prompts::{FALLBACK_RESPONSE, PROMPT_VERSION, SYSTEM_PROMPT};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Errors from the hosted text model.
#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Response parse error: {0}")]
    ParseError(String),
}

/// A hosted text model that turns a prompt into a reply.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String, GenerateError>;
}

/// Gemini REST client.
pub struct GeminiClient {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String, timeout: Duration) -> Result<Self, GenerateError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GenerateError::RequestFailed(e.to_string()))?;
        Ok(Self {
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
            client,
        })
    }

    /// Point the client at a different host (local test servers, proxies).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        )
    }
}

/// Request body in the shape `generateContent` expects.
pub fn request_body(system_prompt: &str, prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "contents": [{
            "parts": [{ "text": prompt }]
        }],
        "systemInstruction": {
            "parts": [{ "text": system_prompt }]
        }
    })
}

/// Pull the first candidate's text out of a `generateContent` response.
pub fn extract_text(response: &serde_json::Value) -> Result<String, GenerateError> {
    response["candidates"][0]["content"]["parts"][0]["text"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| {
            GenerateError::ParseError("missing candidates[0].content.parts[0].text".into())
        })
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate(&self, system_prompt: &str, prompt: &str) -> Result<String, GenerateError> {
        let response = self
            .client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body(system_prompt, prompt))
            .send()
            .await
            .map_err(|e| GenerateError::RequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerateError::Status {
                status,
                body: body.chars().take(100).collect(),
            });
        }

        let json: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GenerateError::ParseError(e.to_string()))?;

        extract_text(&json)
    }
}

/// Infallible answer source used by the relay.
pub struct AnswerGenerator<G> {
    inner: G,
}

impl<G: TextGenerator> AnswerGenerator<G> {
    pub fn new(inner: G) -> Self {
        Self { inner }
    }

    /// Answer a decoded prompt. Any failure yields [`FALLBACK_RESPONSE`].
    pub async fn answer(&self, prompt: &str) -> String {
        match self.inner.generate(SYSTEM_PROMPT, prompt).await {
            Ok(text) => {
                tracing::debug!(
                    prompt_version = PROMPT_VERSION,
                    chars = text.chars().count(),
                    "Generated answer"
                );
                text
            }
            Err(e) => {
                tracing::error!(error = %e, "AI error, using fallback answer");
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}
