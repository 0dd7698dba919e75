//! OpenAI-compatible wire format
//!
//! Covers the non-streaming chat completions and embeddings endpoints:
//! ```text
//! POST /chat/completions  {"model":"gpt-4o-mini","messages":[{"role":"user","content":"..."}]}
//! -> {"id":"chatcmpl-xxx","choices":[{"index":0,"message":{"role":"assistant","content":"..."}}]}
//!
//! POST /embeddings  {"model":"text-embedding-3-small","input":"..."}
//! -> {"data":[{"index":0,"embedding":[0.01, ...]}]}
//! ```
//!
//! Groq, Ollama and most hosted gateways speak the same format.

use serde::{Deserialize, Serialize};

use crate::error::{ServiceError, ServiceResult};

/// A chat message in the conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Role of the message sender (system, user, assistant)
    pub role: String,

    /// Content of the message
    pub content: String,
}

impl ChatMessage {
    /// Create a new chat message
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }

    /// Create a user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    /// Create a system message
    pub fn system(content: impl Into<String>) -> Self {
        Self::new("system", content)
    }
}

/// Requested response format
#[derive(Debug, Clone, Serialize)]
pub struct ResponseFormat {
    #[serde(rename = "type")]
    pub kind: String,
}

impl ResponseFormat {
    /// Ask the backend to emit a single JSON object
    pub fn json_object() -> Self {
        Self {
            kind: "json_object".to_string(),
        }
    }
}

/// Chat completions request body
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<ResponseFormat>,
}

impl ChatCompletionRequest {
    /// Single-turn request for a prompt, deterministic sampling
    pub fn for_prompt(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![ChatMessage::user(prompt)],
            temperature: 0.0,
            max_tokens: None,
            response_format: None,
        }
    }

    /// Request JSON-object output
    pub fn json_mode(mut self) -> Self {
        self.response_format = Some(ResponseFormat::json_object());
        self
    }
}

/// Embeddings request body
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingRequest {
    pub model: String,
    pub input: String,
}

impl EmbeddingRequest {
    /// Create a new embedding request
    pub fn new(model: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            input: input.into(),
        }
    }
}

/// Extract the assistant text from a chat completions response body
pub fn parse_chat_completion(body: &str) -> ServiceResult<String> {
    let response: ChatCompletionResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::malformed(format!("invalid chat completion body: {}", e)))?;

    let choice = response
        .choices
        .into_iter()
        .min_by_key(|choice| choice.index)
        .ok_or_else(|| ServiceError::malformed("chat completion has no choices"))?;

    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(ServiceError::malformed("chat completion has empty content")),
    }
}

/// Extract the first embedding vector from an embeddings response body
pub fn parse_embedding(body: &str) -> ServiceResult<Vec<f32>> {
    let response: EmbeddingResponse = serde_json::from_str(body)
        .map_err(|e| ServiceError::malformed(format!("invalid embedding body: {}", e)))?;

    let item = response
        .data
        .into_iter()
        .min_by_key(|item| item.index)
        .ok_or_else(|| ServiceError::malformed("embedding response has no data"))?;

    if item.embedding.is_empty() {
        return Err(ServiceError::malformed("embedding vector is empty"));
    }

    Ok(item.embedding)
}

// =============================================================================
// OpenAI Response Structures
// =============================================================================

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    #[serde(default)]
    index: usize,
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}
