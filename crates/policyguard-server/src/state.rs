//! Shared application state

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusHandle;
use policyguard_agents::{AnalysisPipeline, LlmCategoryClassifier};
use policyguard_core::{EmbeddingService, GenerationService};
use policyguard_policy::{HashingEmbedder, InMemoryPolicyIndex, PolicyCorpus};
use policyguard_telemetry::{AuditLogConfig, AuditRecorder};
use std::sync::Arc;
use tracing::info;

use crate::backend::{ChatBackend, EmbeddingBackend};
use crate::config::{EmbeddingProvider, ServerConfig};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Classifier, retriever and adjudicator wired to their services
    pub pipeline: AnalysisPipeline,

    /// Decision audit trail
    pub audit: Arc<AuditRecorder>,

    /// Longest accepted content, in characters
    pub max_text_chars: usize,

    /// Most records `/audit/recent` will return
    pub recent_capacity: usize,

    /// Prometheus handle for rendering; absent when no recorder is installed
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(pipeline: AnalysisPipeline, audit: AuditRecorder, config: &ServerConfig) -> Self {
        Self {
            pipeline,
            audit: Arc::new(audit),
            max_text_chars: config.max_text_chars,
            recent_capacity: config.audit.recent_capacity,
            metrics_handle: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Build the pipeline and open the audit trail
    pub async fn build(config: &ServerConfig) -> Result<Self> {
        let pipeline = build_pipeline(config).await?;

        let audit = match &config.audit.log_path {
            Some(path) => {
                let log = AuditLogConfig {
                    path: path.clone(),
                    flush_every: config.audit.flush_every,
                };
                AuditRecorder::with_log(&log, config.audit.recent_capacity)
                    .with_context(|| format!("opening audit log {}", path.display()))?
            }
            None => AuditRecorder::in_memory(config.audit.recent_capacity),
        };

        Ok(Self::new(pipeline, audit, config))
    }
}

/// Load the corpus, index it, and connect the pipeline to its backends
pub async fn build_pipeline(config: &ServerConfig) -> Result<AnalysisPipeline> {
    let corpus = PolicyCorpus::from_file(&config.corpus_path)
        .with_context(|| format!("loading corpus {}", config.corpus_path.display()))?;
    info!(
        "Loaded {} policies from {}",
        corpus.len(),
        config.corpus_path.display()
    );

    let embedder: Arc<dyn EmbeddingService> = match config.embedding.provider {
        EmbeddingProvider::Hashing => Arc::new(HashingEmbedder::new(config.embedding.dimensions)),
        EmbeddingProvider::OpenAi => Arc::new(EmbeddingBackend::new(
            &config.embedding.backend,
            config.embedding.dimensions,
        )?),
    };

    let index = InMemoryPolicyIndex::build(&corpus, embedder.as_ref(), &config.chunking)
        .await
        .context("building policy index")?;

    let classifier_backend: Arc<dyn GenerationService> =
        Arc::new(ChatBackend::new(&config.classifier_backend)?);
    let adjudicator_backend: Arc<dyn GenerationService> =
        Arc::new(ChatBackend::new(&config.adjudicator_backend)?);
    info!(
        classifier = %config.classifier_backend.model,
        adjudicator = %config.adjudicator_backend.model,
        "Connected generation backends"
    );

    Ok(AnalysisPipeline::from_services(
        classifier_backend,
        adjudicator_backend,
        embedder,
        Arc::new(index),
        &config.pipeline,
    ))
}

/// Classifier alone, for evaluating the first stage without retrieval
pub fn build_classifier(config: &ServerConfig) -> Result<LlmCategoryClassifier> {
    let backend = ChatBackend::new(&config.classifier_backend)?;
    Ok(LlmCategoryClassifier::new(
        Arc::new(backend),
        &config.pipeline.classifier,
    ))
}
