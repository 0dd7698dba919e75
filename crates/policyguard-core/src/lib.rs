//! PolicyGuard Core
//!
//! Core types, traits, and utilities shared across PolicyGuard components.
//!
//! This crate provides:
//! - Decision, classification, and policy types for the moderation pipeline
//! - Error types and result handling
//! - Contracts for the external generation, embedding, and similarity-search services
//! - Wire-format helpers for OpenAI-compatible backends

pub mod adapters;
pub mod error;
pub mod service;
pub mod types;

pub use error::{Error, Result, ServiceError, ServiceResult};
pub use service::{EmbeddingService, GenerationService, ScoredPolicy, SimilarityIndex};
pub use types::{
    AnalysisResponse, Category, ClassificationResult, Decision, Label, PipelineRequest,
    PolicyRecord, RetrievedPolicy, Severity,
};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result, ServiceError, ServiceResult};
    pub use crate::service::{EmbeddingService, GenerationService, ScoredPolicy, SimilarityIndex};
    pub use crate::types::{
        AnalysisResponse, Category, ClassificationResult, Decision, Label, PipelineRequest,
        PolicyRecord, RetrievedPolicy, Severity,
    };
}
