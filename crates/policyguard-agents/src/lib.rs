//! PolicyGuard Agents
//!
//! The three moderation agents and the pipeline that sequences them:
//! - Category classifier: coarse category plus an early-exit signal
//! - Policy retriever: similarity search with deduplication and tie-breaking
//! - Compliance adjudicator: final allowed/flag/block decision
//!
//! Every agent converts upstream failures into a cautious fail-safe output,
//! so [`AnalysisPipeline::analyze`] always returns a decision.

pub mod adjudicator;
pub mod budget;
pub mod classifier;
pub mod config;
pub mod pipeline;
pub mod prompts;
pub mod retriever;
pub mod structured;

#[cfg(test)]
mod test_support;

pub use adjudicator::{ComplianceAdjudicator, LlmComplianceAdjudicator, NO_MATCHING_POLICY_REASON};
pub use classifier::{CategoryClassifier, LlmCategoryClassifier};
pub use config::{
    AdjudicatorSettings, ClassifierSettings, PipelineConfig, RetrieverSettings, MAX_TOP_K,
};
pub use pipeline::{
    AnalysisPipeline, AnalysisReport, AnalysisTrace, DecisionPath, Stage, StageTiming,
};
pub use retriever::{rank_candidates, IndexPolicyRetriever, PolicyRetriever};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::adjudicator::ComplianceAdjudicator;
    pub use crate::classifier::CategoryClassifier;
    pub use crate::config::PipelineConfig;
    pub use crate::pipeline::{AnalysisPipeline, AnalysisReport, AnalysisTrace};
    pub use crate::retriever::PolicyRetriever;
}
