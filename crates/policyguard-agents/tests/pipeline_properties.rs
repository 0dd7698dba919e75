//! Property tests for ranking, decision normalization, and the pipeline

mod common;

use common::{sample_index, FailingEmbedder, MockGeneration};
use policyguard_agents::{rank_candidates, AnalysisPipeline, PipelineConfig, RetrieverSettings};
use policyguard_core::{
    Category, Decision, Label, PipelineRequest, PolicyRecord, ScoredPolicy, ServiceError, Severity,
};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;

const SEVERITIES: [Severity; 3] = [Severity::Low, Severity::Medium, Severity::High];

fn category_strategy() -> impl Strategy<Value = Category> {
    prop::sample::select(Category::ALL.to_vec())
}

fn label_strategy() -> impl Strategy<Value = Label> {
    prop_oneof![Just(Label::Allowed), Just(Label::Flag), Just(Label::Block)]
}

/// Hits over twelve fixed policies; only the score varies per draw
fn hit_strategy() -> impl Strategy<Value = ScoredPolicy> {
    (0usize..12, -0.5f32..1.5f32).prop_map(|(n, score)| {
        let id = format!("p{}", n);
        let category = Category::ALL[n % Category::ALL.len()];
        let severity = SEVERITIES[n % SEVERITIES.len()];
        ScoredPolicy::new(
            Arc::new(PolicyRecord::new(id.clone(), category, id, "text", severity)),
            score,
        )
    })
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #[test]
    fn ranked_policies_are_unique_bounded_and_ordered(
        hits in prop::collection::vec(hit_strategy(), 0..40),
        category in category_strategy(),
        top_k in 1usize..=10,
        tie_epsilon in 0.0f32..0.1,
        restrict_to_category in any::<bool>(),
    ) {
        let settings = RetrieverSettings {
            top_k,
            tie_epsilon,
            restrict_to_category,
            ..RetrieverSettings::default()
        };

        let ranked = rank_candidates(hits, category, &settings);

        prop_assert!(ranked.len() <= top_k);

        let ids: HashSet<&str> = ranked.iter().map(|p| p.id()).collect();
        prop_assert_eq!(ids.len(), ranked.len());

        for (i, policy) in ranked.iter().enumerate() {
            prop_assert_eq!(policy.rank, i + 1);
            prop_assert!((0.0..=1.0).contains(&policy.score));
        }

        for i in 0..ranked.len() {
            for j in i + 1..ranked.len() {
                prop_assert!(ranked[j].score <= ranked[i].score + tie_epsilon + 1e-6);
            }
        }
    }

    #[test]
    fn ranking_is_deterministic(
        hits in prop::collection::vec(hit_strategy(), 0..30),
        category in category_strategy(),
    ) {
        let settings = RetrieverSettings::default();
        let mut reversed = hits.clone();
        reversed.reverse();

        let forward: Vec<String> = rank_candidates(hits, category, &settings)
            .iter()
            .map(|p| p.id().to_string())
            .collect();
        let backward: Vec<String> = rank_candidates(reversed, category, &settings)
            .iter()
            .map(|p| p.id().to_string())
            .collect();

        prop_assert_eq!(forward, backward);
    }

    #[test]
    fn normalized_decisions_hold_invariants(
        label in label_strategy(),
        confidence in prop_oneof![any::<f32>(), -2.0f32..2.0],
        reasons in prop::collection::vec("[ a-z]{0,12}", 0..4),
    ) {
        let decision = Decision::new(label, confidence, reasons);

        prop_assert!((0.0..=1.0).contains(&decision.confidence));
        prop_assert!(decision.reasons.iter().all(|r| !r.trim().is_empty()));
        if decision.label != Label::Allowed {
            prop_assert!(!decision.reasons.is_empty());
        }
    }

    #[test]
    fn pipeline_decisions_respect_review_routing(
        category in category_strategy(),
        needs_review in any::<bool>(),
        label in label_strategy(),
        confidence in -1.0f32..2.0,
        retrieval_fails in any::<bool>(),
    ) {
        let rt = runtime();
        let decision = rt.block_on(async {
            let classifier = Arc::new(MockGeneration::classifier(category.as_str(), needs_review));
            let adjudicator = Arc::new(MockGeneration::adjudicator(label.as_str(), confidence, &[]));
            let (embedder, index) = sample_index().await;
            let pipeline = if retrieval_fails {
                AnalysisPipeline::from_services(
                    classifier,
                    adjudicator,
                    Arc::new(FailingEmbedder::new(ServiceError::unavailable("down"))),
                    index,
                    &PipelineConfig::default(),
                )
            } else {
                AnalysisPipeline::from_services(classifier, adjudicator, embedder, index, &PipelineConfig::default())
            };

            pipeline
                .analyze(&PipelineRequest::new("prop", "some user content"))
                .await
                .decision
        });

        prop_assert!((0.0..=1.0).contains(&decision.confidence));
        if decision.label != Label::Allowed {
            prop_assert!(!decision.reasons.is_empty());
        }

        if !needs_review && category != Category::Unknown {
            prop_assert_eq!(decision, Decision::early_allow());
        } else if retrieval_fails {
            prop_assert!(decision.label != Label::Allowed);
        }
    }
}
