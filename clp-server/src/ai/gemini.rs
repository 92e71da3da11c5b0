//! Google Gemini `generateContent` client
//!
//! # API Reference
//! - Endpoint: `{base}/v1beta/models/{model}:generateContent`
//! - JSON mode: `generationConfig.responseMimeType = "application/json"` with a
//!   `responseSchema`

use std::time::Duration;

use async_trait::async_trait;
use clp_common::config::GeminiConfig;
use reqwest::Client;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use super::{AiError, TextGenerator};

pub struct GeminiClient {
    http_client: Client,
    api_key: String,
    endpoint: String,
}

impl GeminiClient {
    pub fn new(api_key: String, config: &GeminiConfig) -> Result<Self, AiError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AiError::Service(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            api_key,
            endpoint: format!(
                "{}/v1beta/models/{}:generateContent",
                config.base_url.trim_end_matches('/'),
                config.model
            ),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl TextGenerator for GeminiClient {
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<Map<String, Value>, AiError> {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema,
            },
        });

        debug!(endpoint = %self.endpoint, prompt_len = prompt.len(), "Gemini request");
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| AiError::Service(format!("request failed: {}", e)))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AiError::Service(format!("failed to read response: {}", e)))?;
        let payload: Value = serde_json::from_str(&text)
            .map_err(|e| AiError::Service(format!("HTTP {}: unparseable body: {}", status, e)))?;

        if !status.is_success() {
            let message = payload
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            warn!(%status, message, "Gemini returned error status");
            return Err(AiError::Service(format!("HTTP {}: {}", status, message)));
        }

        extract_json(&payload)
    }
}

/// Pull the JSON object out of a `generateContent` response
pub fn extract_json(payload: &Value) -> Result<Map<String, Value>, AiError> {
    if let Some(reason) = payload
        .pointer("/promptFeedback/blockReason")
        .and_then(Value::as_str)
    {
        return Err(AiError::Blocked(format!("prompt blocked ({})", reason)));
    }

    let candidate = payload
        .pointer("/candidates/0")
        .ok_or_else(|| AiError::InvalidResponse("response has no candidates".to_string()))?;

    if candidate.get("finishReason").and_then(Value::as_str) == Some("SAFETY") {
        return Err(AiError::Blocked("response stopped for safety".to_string()));
    }

    let text: String = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(AiError::InvalidResponse("candidate has no text".to_string()));
    }

    match serde_json::from_str::<Value>(strip_code_fence(&text)) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AiError::InvalidResponse("response is not a JSON object".to_string())),
        Err(e) => Err(AiError::InvalidResponse(format!("response is not JSON: {}", e))),
    }
}

/// Tolerate a ```json fenced reply
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed)
}
