//! Mock external services for testing
//!
//! Provides configurable generation and embedding backends so pipeline
//! tests can script model replies, failures, and latency.

#![allow(dead_code)]

use async_trait::async_trait;
use policyguard_core::{
    Category, EmbeddingService, GenerationService, PolicyRecord, ServiceError, ServiceResult,
    Severity,
};
use policyguard_policy::{ChunkingConfig, HashingEmbedder, InMemoryPolicyIndex, PolicyCorpus};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A configurable mock generation backend
pub struct MockGeneration {
    model: String,
    reply: ServiceResult<String>,
    simulated_latency: Option<Duration>,
    call_count: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl MockGeneration {
    /// Backend answering every prompt with `reply`
    pub fn replying(reply: &str) -> Self {
        Self {
            model: "mock-model".to_string(),
            reply: Ok(reply.to_string()),
            simulated_latency: None,
            call_count: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Backend failing every call with `error`
    pub fn failing(error: ServiceError) -> Self {
        Self {
            reply: Err(error),
            ..Self::replying("")
        }
    }

    /// Classifier backend returning the given verdict
    pub fn classifier(category: &str, needs_review: bool) -> Self {
        Self::replying(&format!(
            r#"{{"category":"{}","needs_review":{},"explanation":"scripted"}}"#,
            category, needs_review
        ))
    }

    /// Adjudicator backend returning the given verdict
    pub fn adjudicator(label: &str, confidence: f32, reasons: &[&str]) -> Self {
        let reasons = serde_json::to_string(reasons).unwrap();
        Self::replying(&format!(
            r#"{{"label":"{}","confidence":{},"reasons":{}}}"#,
            label, confidence, reasons
        ))
    }

    /// Set simulated latency for this backend
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = Some(latency);
        self
    }

    /// Get the number of times complete was called
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// Prompts received so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for MockGeneration {
    async fn complete(&self, prompt: &str) -> ServiceResult<String> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        self.prompts.lock().unwrap().push(prompt.to_string());

        if let Some(latency) = self.simulated_latency {
            tokio::time::sleep(latency).await;
        }

        self.reply.clone()
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// An embedding backend that always fails
pub struct FailingEmbedder {
    error: ServiceError,
}

impl FailingEmbedder {
    pub fn new(error: ServiceError) -> Self {
        Self { error }
    }
}

#[async_trait]
impl EmbeddingService for FailingEmbedder {
    async fn embed(&self, _text: &str) -> ServiceResult<Vec<f32>> {
        Err(self.error.clone())
    }

    fn dimensions(&self) -> usize {
        256
    }
}

/// An embedding backend that answers like [`HashingEmbedder`] after a delay
pub struct SlowEmbedder {
    inner: HashingEmbedder,
    latency: Duration,
    call_count: AtomicU32,
}

impl SlowEmbedder {
    pub fn new(latency: Duration) -> Self {
        Self {
            inner: HashingEmbedder::default(),
            latency,
            call_count: AtomicU32::new(0),
        }
    }

    /// Get the number of times embed was called
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl EmbeddingService for SlowEmbedder {
    async fn embed(&self, text: &str) -> ServiceResult<Vec<f32>> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        tokio::time::sleep(self.latency).await;
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Small community-guidelines corpus
pub fn sample_corpus() -> PolicyCorpus {
    PolicyCorpus::new(vec![
        PolicyRecord::new(
            "p1",
            Category::Harassment,
            "Harassment & Bullying",
            "Do not insult, threaten, or demean other users. Targeted abuse is removed.",
            Severity::Medium,
        ),
        PolicyRecord::new(
            "p2",
            Category::SelfHarm,
            "Self-Harm",
            "Content that expresses intent to hurt myself or encourages self-harm is not allowed.",
            Severity::High,
        ),
        PolicyRecord::new(
            "p3",
            Category::Spam,
            "Spam",
            "Unsolicited advertising, repeated links, and scams are removed.",
            Severity::Low,
        ),
        PolicyRecord::new(
            "p4",
            Category::Violence,
            "Violent Threats",
            "Threats of physical violence against people are prohibited.",
            Severity::High,
        ),
    ])
    .unwrap()
}

/// Hashing embedder and an index over [`sample_corpus`]
pub async fn sample_index() -> (Arc<HashingEmbedder>, Arc<InMemoryPolicyIndex>) {
    let embedder = Arc::new(HashingEmbedder::default());
    let index = InMemoryPolicyIndex::build(&sample_corpus(), embedder.as_ref(), &ChunkingConfig::default())
        .await
        .unwrap();
    (embedder, Arc::new(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_generation_records_prompts() {
        let generation = MockGeneration::classifier("benign", false);

        let reply = generation.complete("hello").await.unwrap();
        assert!(reply.contains("\"needs_review\":false"));
        assert_eq!(generation.call_count(), 1);
        assert_eq!(generation.prompts(), vec!["hello".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_adjudicator_reply_is_json() {
        let generation = MockGeneration::adjudicator("block", 0.95, &["a", "b"]);
        let reply = generation.complete("x").await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(value["reasons"][1], "b");
    }

    #[tokio::test]
    async fn test_failing_generation() {
        let generation = MockGeneration::failing(ServiceError::RateLimited);
        assert_eq!(generation.complete("x").await, Err(ServiceError::RateLimited));
    }

    #[tokio::test]
    async fn test_sample_index_covers_corpus() {
        let (_, index) = sample_index().await;
        assert_eq!(index.policy_count(), 4);
    }
}
