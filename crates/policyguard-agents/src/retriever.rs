//! Policy retriever trait, similarity-search implementation, and ranking

use async_trait::async_trait;
use policyguard_core::{
    Category, EmbeddingService, RetrievedPolicy, ScoredPolicy, ServiceResult, SimilarityIndex,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::budget::within_budget;
use crate::config::RetrieverSettings;

/// Second pipeline stage: find the policies most relevant to the content.
///
/// Implementations never fail. When the search cannot run they return an
/// empty list, and the adjudicator treats that as missing evidence.
#[async_trait]
pub trait PolicyRetriever: Send + Sync {
    /// Retrieve ranked, deduplicated policies for the text and its category
    async fn retrieve(&self, text: &str, category: Category) -> Vec<RetrievedPolicy>;

    /// Get the retriever name
    fn name(&self) -> &str;
}

/// Retriever backed by an embedding service and a similarity index
pub struct IndexPolicyRetriever {
    embedder: Arc<dyn EmbeddingService>,
    index: Arc<dyn SimilarityIndex>,
    settings: RetrieverSettings,
}

impl IndexPolicyRetriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn SimilarityIndex>,
        settings: RetrieverSettings,
    ) -> Self {
        Self {
            embedder,
            index,
            settings,
        }
    }

    /// Retrieve, surfacing embedding and index failures
    pub async fn try_retrieve(
        &self,
        text: &str,
        category: Category,
    ) -> ServiceResult<Vec<RetrievedPolicy>> {
        let query = query_text(text, category);
        let depth = self.settings.fetch_depth();

        let hits = within_budget(self.settings.timeout(), async {
            let vector = self.embedder.embed(&query).await?;
            self.index.query(&vector, depth).await
        })
        .await?;

        Ok(rank_candidates(hits, category, &self.settings))
    }
}

#[async_trait]
impl PolicyRetriever for IndexPolicyRetriever {
    async fn retrieve(&self, text: &str, category: Category) -> Vec<RetrievedPolicy> {
        match self.try_retrieve(text, category).await {
            Ok(policies) => {
                debug!(
                    category = %category,
                    retrieved = policies.len(),
                    top = policies.first().map(|p| p.id()).unwrap_or("-"),
                    "Retrieved policies"
                );
                policies
            }
            Err(err) => {
                warn!(error = %err, "Policy retrieval failed, continuing without evidence");
                metrics::counter!(
                    "policyguard_stage_degraded_total",
                    "stage" => "retrieval",
                    "kind" => err.kind()
                )
                .increment(1);
                Vec::new()
            }
        }
    }

    fn name(&self) -> &str {
        "index-retriever"
    }
}

/// Search query for a text; a known category is prefixed to steer the search
pub fn query_text(text: &str, category: Category) -> String {
    if category == Category::Unknown {
        text.to_string()
    } else {
        format!("Category: {}\nContent: {}", category, text)
    }
}

/// Turn raw index hits into the final ranked list.
///
/// - Non-finite scores are dropped and the rest clamped into `[0, 1]`.
/// - Each policy appears once, with its best score.
/// - With `restrict_to_category`, policies of the detected category are kept
///   exclusively when at least one is present.
/// - Policies whose scores lie within `tie_epsilon` of a group's best score
///   are ordered by higher severity, then category match, then id.
/// - At most `top_k` policies are returned, ranked from 1.
pub fn rank_candidates(
    hits: Vec<ScoredPolicy>,
    category: Category,
    settings: &RetrieverSettings,
) -> Vec<RetrievedPolicy> {
    let mut best: HashMap<String, ScoredPolicy> = HashMap::new();
    for hit in hits {
        if !hit.score.is_finite() {
            continue;
        }
        let hit = ScoredPolicy::new(hit.policy, hit.score.clamp(0.0, 1.0));
        match best.get(&hit.policy.id) {
            Some(existing) if existing.score >= hit.score => {}
            _ => {
                best.insert(hit.policy.id.clone(), hit);
            }
        }
    }

    let mut candidates: Vec<ScoredPolicy> = best.into_values().collect();

    if settings.restrict_to_category
        && category != Category::Unknown
        && candidates.iter().any(|c| c.policy.category == category)
    {
        candidates.retain(|c| c.policy.category == category);
    }

    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.policy.id.cmp(&b.policy.id))
    });

    let epsilon = settings.tie_epsilon.max(0.0);
    let mut ranked = Vec::with_capacity(candidates.len());
    let mut remaining = candidates.into_iter().peekable();

    while let Some(leader) = remaining.next() {
        let floor = leader.score - epsilon;
        let mut group = vec![leader];
        while let Some(next) = remaining.next_if(|c| c.score >= floor) {
            group.push(next);
        }
        group.sort_by(|a, b| tie_break(a, b, category));
        ranked.extend(group);
    }

    ranked
        .into_iter()
        .take(settings.top_k)
        .enumerate()
        .map(|(i, candidate)| RetrievedPolicy {
            policy: candidate.policy,
            score: candidate.score,
            rank: i + 1,
        })
        .collect()
}

fn tie_break(a: &ScoredPolicy, b: &ScoredPolicy, category: Category) -> Ordering {
    let matches = |c: &ScoredPolicy| c.policy.category == category;

    b.policy
        .severity
        .cmp(&a.policy.severity)
        .then_with(|| matches(b).cmp(&matches(a)))
        .then_with(|| a.policy.id.cmp(&b.policy.id))
}
