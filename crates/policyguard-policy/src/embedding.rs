//! Feature-hashing embedder
//!
//! Deterministic bag-of-words embeddings that need no model download or
//! network access. Useful for offline deployments, local development and
//! tests; semantic quality is far below a sentence-transformer model.

use async_trait::async_trait;
use policyguard_core::{EmbeddingService, ServiceResult};
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Default vector length
pub const DEFAULT_DIMENSIONS: usize = 256;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("token pattern is valid"))
}

/// Embedder hashing unigrams and bigrams into a fixed number of buckets
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    /// Create an embedder producing vectors of `dimensions` length (minimum 8)
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }

    /// Embed synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let tokens: Vec<&str> = token_pattern()
            .find_iter(&lowered)
            .map(|m| m.as_str())
            .collect();

        let mut vector = vec![0.0f32; self.dimensions];

        for token in &tokens {
            self.accumulate(&mut vector, token.as_bytes(), 1.0);
        }
        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, bigram.as_bytes(), 0.5);
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        vector
    }

    fn accumulate(&self, vector: &mut [f32], feature: &[u8], weight: f32) {
        let digest = Sha256::digest(feature);
        let mut bucket_bytes = [0u8; 8];
        bucket_bytes.copy_from_slice(&digest[..8]);

        let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };

        vector[bucket] += sign * weight;
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl EmbeddingService for HashingEmbedder {
    async fn embed(&self, text: &str) -> ServiceResult<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::cosine_similarity;

    #[test]
    fn test_embedding_is_deterministic_and_normalized() {
        let embedder = HashingEmbedder::default();

        let a = embedder.embed_text("I'm going to hurt myself");
        let b = embedder.embed_text("I'm going to hurt myself");
        assert_eq!(a, b);
        assert_eq!(a.len(), DEFAULT_DIMENSIONS);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_empty_text_yields_zero_vector() {
        let embedder = HashingEmbedder::new(16);
        let vector = embedder.embed_text("   ...  ");
        assert_eq!(vector.len(), 16);
        assert!(vector.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_overlapping_text_is_more_similar() {
        let embedder = HashingEmbedder::default();

        let query = embedder.embed_text("threats of violence against a person");
        let close = embedder.embed_text("Violence: threats against a person are prohibited");
        let far = embedder.embed_text("Unsolicited advertising and spam links");

        assert!(cosine_similarity(&query, &close) > cosine_similarity(&query, &far));
    }

    #[tokio::test]
    async fn test_embedding_service_contract() {
        let embedder = HashingEmbedder::new(4);
        assert_eq!(embedder.dimensions(), 8);

        let vector = embedder.embed("hello world").await.unwrap();
        assert_eq!(vector.len(), 8);
    }
}
