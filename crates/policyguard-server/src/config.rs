//! Server configuration

use policyguard_agents::PipelineConfig;
use policyguard_core::{Error, Result};
use policyguard_policy::ChunkingConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Backend used by the category classifier
    #[serde(default = "default_classifier_backend")]
    pub classifier_backend: BackendConfig,

    /// Backend used by the compliance adjudicator
    #[serde(default = "default_adjudicator_backend")]
    pub adjudicator_backend: BackendConfig,

    /// Embedding provider for the policy index and queries
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// YAML policy corpus
    #[serde(default = "default_corpus_path")]
    pub corpus_path: PathBuf,

    /// How policy bodies are chunked before embedding
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Longest accepted content, in characters
    #[serde(default = "default_max_text_chars")]
    pub max_text_chars: usize,

    /// Largest accepted request body, in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Decision audit trail
    #[serde(default)]
    pub audit: AuditConfig,

    /// Stage budgets and retrieval settings
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// An OpenAI-compatible HTTP backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL, e.g. `https://api.openai.com/v1`
    pub base_url: String,

    /// Model identifier
    pub model: String,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Request JSON-object output
    #[serde(default = "default_true")]
    pub json_mode: bool,

    /// Completion length limit
    #[serde(default)]
    pub max_tokens: Option<u32>,

    /// HTTP client timeout; stage budgets usually expire first
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

impl BackendConfig {
    fn openai(base_url: &str, model: &str, api_key_env: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            model: model.to_string(),
            api_key_env: Some(api_key_env.to_string()),
            json_mode: true,
            max_tokens: None,
            timeout_ms: default_http_timeout_ms(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve the API key from the environment
    pub fn api_key(&self) -> Option<String> {
        let name = self.api_key_env.as_deref()?;
        match std::env::var(name) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                warn!("{} is not set; calling {} without credentials", name, self.base_url);
                None
            }
        }
    }
}

/// Embedding provider selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local feature-hashing embedder, no network
    #[default]
    Hashing,
    /// OpenAI-compatible `/embeddings` endpoint
    OpenAi,
}

/// Embedding configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub provider: EmbeddingProvider,

    /// Vector length produced by the provider
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,

    /// Endpoint for the `openai` provider
    #[serde(default = "default_embedding_backend")]
    pub backend: BackendConfig,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::default(),
            dimensions: default_dimensions(),
            backend: default_embedding_backend(),
        }
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// JSON-lines log; in-memory only when unset
    #[serde(default)]
    pub log_path: Option<PathBuf>,

    /// Recent records served by `/audit/recent`
    #[serde(default = "default_recent_capacity")]
    pub recent_capacity: usize,

    /// Flush the log after this many records
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            log_path: None,
            recent_capacity: default_recent_capacity(),
            flush_every: default_flush_every(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            classifier_backend: default_classifier_backend(),
            adjudicator_backend: default_adjudicator_backend(),
            embedding: EmbeddingConfig::default(),
            corpus_path: default_corpus_path(),
            chunking: ChunkingConfig::default(),
            max_text_chars: default_max_text_chars(),
            max_body_bytes: default_max_body_bytes(),
            audit: AuditConfig::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from file and CLI overrides
    pub fn load(config_path: &Path, corpus_override: Option<&Path>) -> Result<Self> {
        let mut config = if config_path.exists() {
            Self::from_file(config_path)?
        } else {
            warn!("{} not found, using default configuration", config_path.display());
            Self::default()
        };

        if let Some(corpus) = corpus_override {
            config.corpus_path = corpus.to_path_buf();
        }

        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::config(format!("invalid config: {}", e)))
    }

    /// Reject settings the server cannot run with
    pub fn validate(&self) -> Result<()> {
        self.pipeline.validate()?;

        if self.max_text_chars == 0 {
            return Err(Error::config("max_text_chars must be positive"));
        }
        if self.max_body_bytes < self.max_text_chars {
            return Err(Error::config("max_body_bytes must be at least max_text_chars"));
        }
        if self.embedding.dimensions == 0 {
            return Err(Error::config("embedding.dimensions must be positive"));
        }

        let mut backends = vec![
            ("classifier_backend", &self.classifier_backend),
            ("adjudicator_backend", &self.adjudicator_backend),
        ];
        if self.embedding.provider == EmbeddingProvider::OpenAi {
            backends.push(("embedding.backend", &self.embedding.backend));
        }
        for (name, backend) in backends {
            if backend.base_url.trim().is_empty() || backend.model.trim().is_empty() {
                return Err(Error::config(format!("{} needs a base_url and a model", name)));
            }
        }

        Ok(())
    }
}

fn default_classifier_backend() -> BackendConfig {
    BackendConfig::openai("https://api.openai.com/v1", "gpt-4o-mini", "OPENAI_API_KEY")
}

fn default_adjudicator_backend() -> BackendConfig {
    BackendConfig::openai(
        "https://api.groq.com/openai/v1",
        "llama-3.1-8b-instant",
        "GROQ_API_KEY",
    )
}

fn default_embedding_backend() -> BackendConfig {
    BackendConfig {
        json_mode: false,
        ..BackendConfig::openai(
            "https://api.openai.com/v1",
            "text-embedding-3-small",
            "OPENAI_API_KEY",
        )
    }
}

fn default_corpus_path() -> PathBuf {
    PathBuf::from("./policies/policies.yaml")
}

fn default_max_text_chars() -> usize {
    1200
}

fn default_max_body_bytes() -> usize {
    64 * 1024
}

fn default_dimensions() -> usize {
    policyguard_policy::embedding::DEFAULT_DIMENSIONS
}

fn default_recent_capacity() -> usize {
    policyguard_telemetry::DEFAULT_RECENT_CAPACITY
}

fn default_flush_every() -> usize {
    1
}

fn default_http_timeout_ms() -> u64 {
    60_000
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_yaml("{}").unwrap();
        assert_eq!(config.max_text_chars, 1200);
        assert_eq!(config.classifier_backend.model, "gpt-4o-mini");
        assert_eq!(config.adjudicator_backend.model, "llama-3.1-8b-instant");
        assert_eq!(config.embedding.provider, EmbeddingProvider::Hashing);
        assert!(config.audit.log_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_full_config() {
        let yaml = r#"
classifier_backend:
  base_url: http://localhost:11434/v1
  model: llama3.1
  json_mode: false
adjudicator_backend:
  base_url: http://localhost:11434/v1
  model: llama3.1
  api_key_env: LOCAL_KEY
  timeout_ms: 5000
embedding:
  provider: openai
  dimensions: 1536
corpus_path: ./data/policies.yaml
max_text_chars: 500
audit:
  log_path: ./audit/decisions.jsonl
pipeline:
  retriever:
    top_k: 3
"#;
        let config = ServerConfig::from_yaml(yaml).unwrap();

        assert!(!config.classifier_backend.json_mode);
        assert!(config.classifier_backend.api_key_env.is_none());
        assert_eq!(config.adjudicator_backend.timeout(), Duration::from_secs(5));
        assert_eq!(config.embedding.provider, EmbeddingProvider::OpenAi);
        assert_eq!(config.embedding.backend.model, "text-embedding-3-small");
        assert_eq!(config.max_text_chars, 500);
        assert_eq!(config.pipeline.retriever.top_k, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_shipped_config_and_corpus_load() {
        let config =
            ServerConfig::from_yaml(include_str!("../../../policyguard.yaml")).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline.adjudicator.no_evidence_confidence_factor, 0.6);

        let corpus =
            policyguard_policy::PolicyCorpus::from_yaml(include_str!("../../../policies/policies.yaml"))
                .unwrap();
        assert_eq!(corpus.len(), 10);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = ServerConfig::from_yaml("max_text_chars: 0").unwrap();
        assert!(config.validate().is_err());

        let config = ServerConfig::from_yaml("pipeline: { retriever: { top_k: 50 } }").unwrap();
        assert!(config.validate().is_err());

        let config = ServerConfig::from_yaml(
            "classifier_backend: { base_url: '', model: gpt-4o-mini }",
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_missing_file_uses_defaults_with_override() {
        let config = ServerConfig::load(
            Path::new("/nonexistent/policyguard.yaml"),
            Some(Path::new("/tmp/corpus.yaml")),
        )
        .unwrap();
        assert_eq!(config.corpus_path, PathBuf::from("/tmp/corpus.yaml"));
    }

    #[test]
    fn test_api_key_from_environment() {
        let mut backend = default_classifier_backend();
        backend.api_key_env = Some("POLICYGUARD_TEST_KEY_UNSET".to_string());
        assert_eq!(backend.api_key(), None);

        backend.api_key_env = None;
        assert_eq!(backend.api_key(), None);
    }
}
