//! LLM provider adapter
//!
//! A minimal generate-text contract plus the JSON hygiene applied to
//! every response: fence stripping followed by strict parsing. Model
//! output is untrusted; callers validate the parsed value against their
//! own schema before use.

pub mod prompts;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{Error, Result};

/// Text-in, text-out LLM contract.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

/// Strip markdown code fencing the model may wrap around JSON output.
pub fn strip_code_fences(text: &str) -> &str {
    let mut text = text.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

/// Generate and parse a JSON document from a prompt.
pub async fn generate_json(client: &dyn LlmClient, prompt: &str) -> Result<Value> {
    let text = client.generate(prompt).await?;
    let stripped = strip_code_fences(&text);
    serde_json::from_str(stripped).map_err(|e| {
        debug!("Unparseable LLM response: {}", stripped);
        Error::Ranking(format!("LLM response is not valid JSON: {}", e))
    })
}

/// Client for the Gemini generateContent REST API.
pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl LlmClient for GeminiClient {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.api_key.is_empty() {
            return Err(Error::Config("LLM API key not configured".into()));
        }

        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let body = serde_json::json!({
            "contents": [{"parts": [{"text": prompt}]}]
        });

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Error::Ranking(format!(
                "LLM API returned {}",
                response.status()
            )));
        }

        let payload: Value = response.json().await?;
        let text = payload
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Ranking("LLM response carried no text part".into()))?;

        Ok(text.to_string())
    }
}
