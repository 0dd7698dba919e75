//! Contracts for the external services the pipeline depends on
//!
//! The pipeline never owns these services; it receives shared handles and
//! treats every call as fallible and latency-variable.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ServiceResult;
use crate::types::PolicyRecord;

/// Text-generation backend (chat completion style)
#[async_trait]
pub trait GenerationService: Send + Sync {
    /// Complete the prompt and return the raw model text
    async fn complete(&self, prompt: &str) -> ServiceResult<String>;

    /// Model identifier, for logging
    fn model(&self) -> &str;
}

/// Embedding backend. Deterministic for identical input within a model version.
#[async_trait]
pub trait EmbeddingService: Send + Sync {
    /// Embed text into a fixed-length vector
    async fn embed(&self, text: &str) -> ServiceResult<Vec<f32>>;

    /// Length of the vectors this service produces
    fn dimensions(&self) -> usize;
}

/// A policy hit returned by a similarity index
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredPolicy {
    /// Matched policy
    pub policy: Arc<PolicyRecord>,

    /// Similarity score, higher is more relevant
    pub score: f32,
}

impl ScoredPolicy {
    /// Create a new scored hit
    pub fn new(policy: Arc<PolicyRecord>, score: f32) -> Self {
        Self { policy, score }
    }
}

/// Nearest-neighbour search over embedded policy text.
///
/// Implementations may return the same policy more than once (for example
/// one hit per indexed chunk); callers are responsible for deduplication.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    /// Return up to `k` hits ordered by descending score
    async fn query(&self, vector: &[f32], k: usize) -> ServiceResult<Vec<ScoredPolicy>>;

    /// Number of indexed entries
    fn len(&self) -> usize;

    /// Whether the index holds no entries
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
