//! HTTP clients for OpenAI-compatible generation and embedding endpoints

use async_trait::async_trait;
use policyguard_core::adapters::openai::{
    parse_chat_completion, parse_embedding, ChatCompletionRequest, EmbeddingRequest,
};
use policyguard_core::{EmbeddingService, Error, GenerationService, Result, ServiceError, ServiceResult};
use reqwest::StatusCode;
use serde::Serialize;
use tracing::debug;

use crate::config::BackendConfig;

/// Shared request plumbing for one endpoint
struct Endpoint {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl Endpoint {
    fn new(config: &BackendConfig, path: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url: format!("{}/{}", config.base_url.trim_end_matches('/'), path),
            api_key: config.api_key(),
        })
    }

    async fn post<T: Serialize + ?Sized>(&self, body: &T) -> ServiceResult<String> {
        let mut request = self.client.post(&self.url).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        check_status(status, &text)?;
        Ok(text)
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::unavailable(err.to_string())
    }
}

fn check_status(status: StatusCode, body: &str) -> ServiceResult<()> {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return Err(ServiceError::RateLimited);
    }
    if !status.is_success() {
        let detail: String = body.chars().take(200).collect();
        return Err(ServiceError::unavailable(format!("HTTP {}: {}", status, detail)));
    }
    Ok(())
}

/// Chat-completions backend
pub struct ChatBackend {
    endpoint: Endpoint,
    model: String,
    json_mode: bool,
    max_tokens: Option<u32>,
}

impl ChatBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(config, "chat/completions")?,
            model: config.model.clone(),
            json_mode: config.json_mode,
            max_tokens: config.max_tokens,
        })
    }
}

#[async_trait]
impl GenerationService for ChatBackend {
    async fn complete(&self, prompt: &str) -> ServiceResult<String> {
        let mut request = ChatCompletionRequest::for_prompt(&self.model, prompt);
        request.max_tokens = self.max_tokens;
        if self.json_mode {
            request = request.json_mode();
        }

        debug!(model = %self.model, url = %self.endpoint.url, "Sending chat completion");
        let body = self.endpoint.post(&request).await?;
        parse_chat_completion(&body)
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Embeddings backend
pub struct EmbeddingBackend {
    endpoint: Endpoint,
    model: String,
    dimensions: usize,
}

impl EmbeddingBackend {
    pub fn new(config: &BackendConfig, dimensions: usize) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(config, "embeddings")?,
            model: config.model.clone(),
            dimensions,
        })
    }
}

#[async_trait]
impl EmbeddingService for EmbeddingBackend {
    async fn embed(&self, text: &str) -> ServiceResult<Vec<f32>> {
        let body = self
            .endpoint
            .post(&EmbeddingRequest::new(&self.model, text))
            .await?;
        let vector = parse_embedding(&body)?;

        if vector.len() != self.dimensions {
            return Err(ServiceError::malformed(format!(
                "embedding has {} dimensions, configured for {}",
                vector.len(),
                self.dimensions
            )));
        }
        Ok(vector)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}
