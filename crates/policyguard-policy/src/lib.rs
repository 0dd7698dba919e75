//! PolicyGuard Policy Corpus
//!
//! Read-only policy corpus and the similarity index built over it.
//!
//! Policies are defined in YAML and specify:
//! - An identifier, title, and body text
//! - The content category the policy governs
//! - A severity (low, medium, high)
//!
//! The index is built once at startup and then shared read-only across
//! concurrent pipeline runs.

pub mod corpus;
pub mod embedding;
pub mod index;

pub use corpus::PolicyCorpus;
pub use embedding::HashingEmbedder;
pub use index::{chunk_text, cosine_similarity, ChunkingConfig, InMemoryPolicyIndex};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::corpus::PolicyCorpus;
    pub use crate::embedding::HashingEmbedder;
    pub use crate::index::{ChunkingConfig, InMemoryPolicyIndex};
}
