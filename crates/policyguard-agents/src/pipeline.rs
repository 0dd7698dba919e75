//! Analysis pipeline
//!
//! Runs one request through the three agents:
//!
//! ```text
//! Classifying ──(cleared)──────────────────────────────► EarlyAllow
//!      │
//!      └──(needs review)──► Retrieving ──► Adjudicating ──► Done
//! ```
//!
//! Every agent is infallible, so the pipeline always produces exactly one
//! decision. Stage failures surface only as degraded, cautious outputs.

use policyguard_core::{
    AnalysisResponse, ClassificationResult, Decision, EmbeddingService, GenerationService, Label,
    PipelineRequest, RetrievedPolicy, SimilarityIndex,
};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::adjudicator::{without_evidence, ComplianceAdjudicator, LlmComplianceAdjudicator};
use crate::classifier::{CategoryClassifier, LlmCategoryClassifier};
use crate::config::{AdjudicatorSettings, PipelineConfig};
use crate::retriever::{IndexPolicyRetriever, PolicyRetriever};

/// A pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classification,
    Retrieval,
    Adjudication,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Classification => "classification",
            Self::Retrieval => "retrieval",
            Self::Adjudication => "adjudication",
        }
    }
}

/// Route a request took to its decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionPath {
    /// Classifier cleared the content; retrieval and adjudication skipped
    EarlyAllow,
    /// Full retrieval and adjudication
    Adjudicated,
}

impl DecisionPath {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EarlyAllow => "early_allow",
            Self::Adjudicated => "adjudicated",
        }
    }
}

/// Latency of one executed stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub latency_us: u64,
}

/// How a decision was reached. Never influences the decision itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisTrace {
    pub path: DecisionPath,

    /// Classifier output, including fail-safe substitutes
    pub classification: ClassificationResult,

    /// Ids of the policies handed to the adjudicator, in rank order
    pub retrieved_policy_ids: Vec<String>,

    /// Stages that fell back to their fail-safe output
    pub degraded_stages: Vec<Stage>,

    /// Executed stages in order
    pub stages: Vec<StageTiming>,

    pub total_latency_us: u64,
}

/// Response plus the trace that produced it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub response: AnalysisResponse,
    pub trace: AnalysisTrace,
}

enum PipelineState {
    Classifying,
    Retrieving(ClassificationResult),
    Adjudicating(ClassificationResult, Vec<RetrievedPolicy>),
    Done(Outcome),
}

struct Outcome {
    path: DecisionPath,
    classification: ClassificationResult,
    retrieved: Vec<RetrievedPolicy>,
    decision: Decision,
}

/// Classifier → retriever → adjudicator orchestration
#[derive(Clone)]
pub struct AnalysisPipeline {
    classifier: Arc<dyn CategoryClassifier>,
    retriever: Arc<dyn PolicyRetriever>,
    adjudicator: Arc<dyn ComplianceAdjudicator>,
    no_evidence_factor: f32,
}

impl AnalysisPipeline {
    /// Create a pipeline from three agents
    pub fn new(
        classifier: Arc<dyn CategoryClassifier>,
        retriever: Arc<dyn PolicyRetriever>,
        adjudicator: Arc<dyn ComplianceAdjudicator>,
    ) -> Self {
        Self {
            classifier,
            retriever,
            adjudicator,
            no_evidence_factor: AdjudicatorSettings::default().no_evidence_confidence_factor,
        }
    }

    /// Confidence scaling for `allowed` verdicts reached without policy evidence
    pub fn with_no_evidence_factor(mut self, factor: f32) -> Self {
        self.no_evidence_factor = factor;
        self
    }

    /// Wire the default agents to shared service handles
    pub fn from_services(
        classifier_backend: Arc<dyn GenerationService>,
        adjudicator_backend: Arc<dyn GenerationService>,
        embedder: Arc<dyn EmbeddingService>,
        index: Arc<dyn SimilarityIndex>,
        config: &PipelineConfig,
    ) -> Self {
        Self::new(
            Arc::new(LlmCategoryClassifier::new(classifier_backend, &config.classifier)),
            Arc::new(IndexPolicyRetriever::new(embedder, index, config.retriever.clone())),
            Arc::new(LlmComplianceAdjudicator::new(adjudicator_backend, &config.adjudicator)),
        )
        .with_no_evidence_factor(config.adjudicator.no_evidence_confidence_factor)
    }

    /// Names of the configured agents, in execution order
    pub fn agent_names(&self) -> [&str; 3] {
        [
            self.classifier.name(),
            self.retriever.name(),
            self.adjudicator.name(),
        ]
    }

    /// Analyze one piece of content
    pub async fn analyze(&self, request: &PipelineRequest) -> AnalysisResponse {
        self.analyze_with_trace(request).await.response
    }

    /// Analyze one piece of content and report how the decision was reached
    pub async fn analyze_with_trace(&self, request: &PipelineRequest) -> AnalysisReport {
        let started = Instant::now();
        let text = request.text.as_str();
        let mut stages = Vec::with_capacity(3);
        let mut state = PipelineState::Classifying;

        let outcome = loop {
            state = match state {
                PipelineState::Classifying => {
                    let stage_start = Instant::now();
                    let classification = self.classifier.classify(text).await;
                    record_stage(&mut stages, Stage::Classification, stage_start);

                    if classification.permits_early_exit() {
                        debug!(content_id = %request.content_id, category = %classification.category, "Early allow");
                        PipelineState::Done(Outcome {
                            path: DecisionPath::EarlyAllow,
                            classification,
                            retrieved: Vec::new(),
                            decision: Decision::early_allow(),
                        })
                    } else {
                        if !classification.needs_review {
                            warn!(
                                content_id = %request.content_id,
                                category = %classification.category,
                                degraded = classification.degraded,
                                "Classifier cleared content it could not categorize, forcing review"
                            );
                        }
                        debug!(content_id = %request.content_id, category = %classification.category, "Retrieving");
                        PipelineState::Retrieving(classification)
                    }
                }

                PipelineState::Retrieving(classification) => {
                    let stage_start = Instant::now();
                    let retrieved = self
                        .retriever
                        .retrieve(text, classification.category)
                        .await;
                    record_stage(&mut stages, Stage::Retrieval, stage_start);

                    debug!(content_id = %request.content_id, retrieved = retrieved.len(), "Adjudicating");
                    PipelineState::Adjudicating(classification, retrieved)
                }

                PipelineState::Adjudicating(classification, retrieved) => {
                    let stage_start = Instant::now();
                    let mut decision = self
                        .adjudicator
                        .adjudicate(text, classification.category, &retrieved)
                        .await
                        .normalized();
                    record_stage(&mut stages, Stage::Adjudication, stage_start);

                    // Reviewed content is never allowed without policy evidence
                    if retrieved.is_empty() && decision.label == Label::Allowed {
                        warn!(
                            content_id = %request.content_id,
                            adjudicator = self.adjudicator.name(),
                            "Adjudicator allowed content without evidence, flagging"
                        );
                        decision = without_evidence(decision, self.no_evidence_factor);
                    }

                    PipelineState::Done(Outcome {
                        path: DecisionPath::Adjudicated,
                        classification,
                        retrieved,
                        decision,
                    })
                }

                PipelineState::Done(outcome) => break outcome,
            };
        };

        let total_latency_us = elapsed_us(started);
        let degraded_stages = degraded_stages(&outcome);

        metrics::counter!(
            "policyguard_decisions_total",
            "label" => outcome.decision.label.as_str(),
            "path" => outcome.path.as_str()
        )
        .increment(1);

        info!(
            content_id = %request.content_id,
            language = request.language.as_deref().unwrap_or("-"),
            label = %outcome.decision.label,
            confidence = outcome.decision.confidence,
            path = outcome.path.as_str(),
            category = %outcome.classification.category,
            retrieved = outcome.retrieved.len(),
            latency_us = total_latency_us,
            "Analysis complete"
        );

        AnalysisReport {
            response: AnalysisResponse {
                content_id: request.content_id.clone(),
                decision: outcome.decision,
            },
            trace: AnalysisTrace {
                path: outcome.path,
                classification: outcome.classification,
                retrieved_policy_ids: outcome
                    .retrieved
                    .iter()
                    .map(|policy| policy.id().to_string())
                    .collect(),
                degraded_stages,
                stages,
                total_latency_us,
            },
        }
    }
}

fn degraded_stages(outcome: &Outcome) -> Vec<Stage> {
    let mut degraded = Vec::new();
    if outcome.classification.degraded {
        degraded.push(Stage::Classification);
    }
    if outcome.path == DecisionPath::Adjudicated && outcome.decision.degraded {
        degraded.push(Stage::Adjudication);
    }
    degraded
}

fn record_stage(stages: &mut Vec<StageTiming>, stage: Stage, started: Instant) {
    let latency_us = elapsed_us(started);
    metrics::histogram!("policyguard_stage_latency_us", "stage" => stage.as_str())
        .record(latency_us as f64);
    stages.push(StageTiming { stage, latency_us });
}

fn elapsed_us(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX)
}

impl std::fmt::Debug for AnalysisPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisPipeline")
            .field("classifier", &self.classifier.name())
            .field("retriever", &self.retriever.name())
            .field("adjudicator", &self.adjudicator.name())
            .field("no_evidence_factor", &self.no_evidence_factor)
            .finish()
    }
}
