//! Structured text generation
//!
//! Each generation step sends a prompt plus a JSON response schema and gets
//! one JSON object back.

pub mod gemini;
pub mod prompts;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

pub use gemini::GeminiClient;

/// Generation failure
#[derive(Debug, Error)]
pub enum AiError {
    /// Prompt or response rejected by the provider's content policy
    #[error("AI generation blocked: {0}")]
    Blocked(String),

    /// Transport failure or error status from the provider
    #[error("AI service error: {0}")]
    Service(String),

    /// Response text was not the requested JSON object
    #[error("Invalid AI response: {0}")]
    InvalidResponse(String),
}

/// A model that answers a prompt with a JSON object matching `schema`
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate_json(&self, prompt: &str, schema: &Value) -> Result<Map<String, Value>, AiError>;
}
