//! Chat model abstraction and the Gemini implementation.
//!
//! [`GeminiChat`] calls the non-streaming `generateContent` endpoint. There
//! is deliberately no retry here: a failed chat generation is surfaced to
//! the caller as an assistant-unavailable condition rather than silently
//! retried, and sentiment analysis degrades to neutral on its own.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::LlmConfig;
use crate::error::{self, Error};
use crate::models::HistoryPair;

/// One generation request: a system instruction, prior conversation pairs
/// oldest first, and the new user message.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub history: Vec<HistoryPair>,
    pub message: String,
}

/// Process-wide language model handle, built once at startup.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Produce the assistant's reply text for `request`.
    async fn generate(&self, request: &ChatRequest) -> Result<String>;
}

/// Build the configured chat model, verifying credentials up front so a
/// missing key aborts startup instead of failing the first request.
pub fn create_chat_model(config: &LlmConfig) -> error::Result<Arc<dyn ChatModel>> {
    Ok(Arc::new(GeminiChat::new(config)?))
}

/// Gemini `generateContent` client.
pub struct GeminiChat {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f64,
}

impl GeminiChat {
    pub fn new(config: &LlmConfig) -> error::Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .map_err(|_| Error::MissingCredential(config.api_key_env.clone()))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(anyhow::Error::from)?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    /// Map history pairs and the new message onto Gemini `contents` turns.
    /// Empty user utterances (assistant-only pairs) contribute just the
    /// model turn; the sequence always ends with the new user message.
    fn build_contents(request: &ChatRequest) -> Vec<serde_json::Value> {
        let mut contents = Vec::with_capacity(request.history.len() * 2 + 1);

        for pair in &request.history {
            if !pair.user.is_empty() {
                contents.push(serde_json::json!({
                    "role": "user",
                    "parts": [{ "text": pair.user }],
                }));
            }
            contents.push(serde_json::json!({
                "role": "model",
                "parts": [{ "text": pair.assistant }],
            }));
        }

        contents.push(serde_json::json!({
            "role": "user",
            "parts": [{ "text": request.message }],
        }));

        contents
    }
}

#[async_trait]
impl ChatModel for GeminiChat {
    async fn generate(&self, request: &ChatRequest) -> Result<String> {
        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let body = serde_json::json!({
            "contents": Self::build_contents(request),
            "systemInstruction": { "parts": [{ "text": request.system }] },
            "generationConfig": { "temperature": self.temperature },
        });

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            bail!("Gemini API error {}: {}", status, body_text);
        }

        let json: serde_json::Value = response.json().await?;
        extract_reply(&json)
    }
}

/// Pull the reply text out of a `generateContent` response: all `parts[].text`
/// of the first candidate, concatenated.
fn extract_reply(json: &serde_json::Value) -> Result<String> {
    let candidate = json
        .get("candidates")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow!("Gemini response contained no candidates"))?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(|p| p.as_array())
        .ok_or_else(|| anyhow!("Gemini candidate contained no content parts"))?;

    let text: String = parts
        .iter()
        .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
        .collect();

    if text.is_empty() {
        bail!("Gemini candidate contained no text");
    }
    Ok(text)
}
