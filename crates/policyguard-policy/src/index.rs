//! In-memory similarity index over chunked policy text
//!
//! Each policy body is split into chunks and every chunk is embedded
//! separately, so a query can hit the same policy several times. The
//! retriever deduplicates; the index reports raw chunk hits.

use async_trait::async_trait;
use policyguard_core::{
    EmbeddingService, Error, PolicyRecord, Result, ScoredPolicy, ServiceError, ServiceResult,
    SimilarityIndex,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

use crate::corpus::PolicyCorpus;

/// How policy bodies are split before embedding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
        }
    }
}

fn default_max_chunk_chars() -> usize {
    800
}

struct IndexEntry {
    policy: Arc<PolicyRecord>,
    chunk: usize,
    vector: Vec<f32>,
}

/// Brute-force cosine similarity index
pub struct InMemoryPolicyIndex {
    entries: Vec<IndexEntry>,
    dimensions: usize,
    policy_count: usize,
}

impl InMemoryPolicyIndex {
    /// Embed every chunk of every policy in the corpus
    pub async fn build(
        corpus: &PolicyCorpus,
        embedder: &dyn EmbeddingService,
        chunking: &ChunkingConfig,
    ) -> Result<Self> {
        let mut entries = Vec::new();
        let policy_count = corpus.len();

        for policy in corpus.clone().into_shared() {
            let mut chunks = chunk_text(&policy.body, chunking.max_chunk_chars);
            if chunks.is_empty() {
                chunks.push(String::new());
            }

            for (chunk, text) in chunks.iter().enumerate() {
                let document = format!("{}\n{}", policy.title, text);
                let vector = embedder.embed(document.trim()).await?;
                entries.push(IndexEntry {
                    policy: Arc::clone(&policy),
                    chunk,
                    vector,
                });
            }

            debug!(policy = %policy.id, chunks = chunks.len(), "Indexed policy");
        }

        let index = Self::from_entries(entries, embedder.dimensions(), policy_count)?;
        info!(
            "Built policy index with {} chunks across {} policies",
            index.entries.len(),
            policy_count
        );
        Ok(index)
    }

    /// Build an index from pre-computed vectors, one entry per element
    pub fn from_vectors(vectors: Vec<(Arc<PolicyRecord>, Vec<f32>)>) -> Result<Self> {
        let dimensions = vectors.first().map_or(0, |(_, vector)| vector.len());

        let mut ids: Vec<&str> = vectors.iter().map(|(p, _)| p.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        let policy_count = ids.len();

        let mut chunk_counter = std::collections::HashMap::new();
        let entries = vectors
            .into_iter()
            .map(|(policy, vector)| {
                let chunk = chunk_counter.entry(policy.id.clone()).or_insert(0usize);
                let entry = IndexEntry {
                    policy,
                    chunk: *chunk,
                    vector,
                };
                *chunk += 1;
                entry
            })
            .collect();

        Self::from_entries(entries, dimensions, policy_count)
    }

    fn from_entries(entries: Vec<IndexEntry>, dimensions: usize, policy_count: usize) -> Result<Self> {
        if let Some(bad) = entries.iter().find(|e| e.vector.len() != dimensions) {
            return Err(Error::corpus(format!(
                "policy '{}' chunk {} has {} dimensions, expected {}",
                bad.policy.id,
                bad.chunk,
                bad.vector.len(),
                dimensions
            )));
        }

        Ok(Self {
            entries,
            dimensions,
            policy_count,
        })
    }

    /// Vector length accepted by [`SimilarityIndex::query`]
    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Number of distinct policies indexed
    pub fn policy_count(&self) -> usize {
        self.policy_count
    }
}

#[async_trait]
impl SimilarityIndex for InMemoryPolicyIndex {
    async fn query(&self, vector: &[f32], k: usize) -> ServiceResult<Vec<ScoredPolicy>> {
        if k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }
        if vector.len() != self.dimensions {
            return Err(ServiceError::malformed(format!(
                "query vector has {} dimensions, index expects {}",
                vector.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<(&IndexEntry, f32)> = self
            .entries
            .iter()
            .map(|entry| (entry, cosine_similarity(vector, &entry.vector).clamp(0.0, 1.0)))
            .collect();

        scored.sort_by(|(a, a_score), (b, b_score)| {
            b_score
                .total_cmp(a_score)
                .then_with(|| a.policy.id.cmp(&b.policy.id))
                .then_with(|| a.chunk.cmp(&b.chunk))
        });
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(entry, score)| ScoredPolicy::new(Arc::clone(&entry.policy), score))
            .collect())
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Cosine similarity; zero when either vector has no magnitude or lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b)
        .fold((0.0f32, 0.0f32, 0.0f32), |(dot, na, nb), (x, y)| {
            (dot + x * y, na + x * x, nb + y * y)
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Paragraphs (separated by blank lines) are merged while they fit; a
/// paragraph longer than the limit is split on whitespace.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let normalized = text.replace("\r\n", "\n");

    let mut pieces = Vec::new();
    for paragraph in normalized.split("\n\n").map(str::trim).filter(|p| !p.is_empty()) {
        if paragraph.chars().count() <= max_chars {
            pieces.push(paragraph.to_string());
        } else {
            pieces.extend(split_words(paragraph, max_chars));
        }
    }

    let mut chunks: Vec<String> = Vec::new();
    for piece in pieces {
        let fits = chunks.last().map_or(false, |last| {
            last.chars().count() + 2 + piece.chars().count() <= max_chars
        });

        match chunks.last_mut() {
            Some(last) if fits => {
                last.push_str("\n\n");
                last.push_str(&piece);
            }
            _ => chunks.push(piece),
        }
    }

    chunks
}

fn split_words(paragraph: &str, max_chars: usize) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();

    for word in paragraph.split_whitespace() {
        let needed = if current.is_empty() {
            word.chars().count()
        } else {
            current.chars().count() + 1 + word.chars().count()
        };

        if needed > max_chars && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }

    if !current.is_empty() {
        out.push(current);
    }

    out
}

impl std::fmt::Debug for InMemoryPolicyIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryPolicyIndex")
            .field("entries", &self.entries.len())
            .field("policies", &self.policy_count)
            .field("dimensions", &self.dimensions)
            .finish()
    }
}
