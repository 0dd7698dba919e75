//! Policy corpus definitions

use policyguard_core::{Error, PolicyRecord, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// An immutable set of policies
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicyCorpus {
    /// Corpus name
    #[serde(default)]
    pub name: String,

    /// Version of the corpus
    #[serde(default)]
    pub version: String,

    /// Policies in this corpus
    pub policies: Vec<PolicyRecord>,
}

impl PolicyCorpus {
    /// Create a validated corpus from records
    pub fn new(policies: Vec<PolicyRecord>) -> Result<Self> {
        let corpus = Self {
            name: String::new(),
            version: String::new(),
            policies,
        };
        corpus.validate()?;
        Ok(corpus)
    }

    /// Load a corpus from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let corpus: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::corpus(format!("invalid corpus YAML: {}", e)))?;
        corpus.validate()?;
        Ok(corpus)
    }

    /// Load a corpus from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::corpus(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Check that every policy has a unique, non-empty identifier and a body
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();

        for policy in &self.policies {
            let id = policy.id.trim();
            if id.is_empty() {
                return Err(Error::corpus(format!(
                    "policy '{}' has an empty identifier",
                    policy.title
                )));
            }
            if !seen.insert(id) {
                return Err(Error::corpus(format!("duplicate policy identifier '{}'", id)));
            }
            if policy.body.trim().is_empty() && policy.title.trim().is_empty() {
                return Err(Error::corpus(format!("policy '{}' has no text", id)));
            }
        }

        Ok(())
    }

    /// Look up a policy by identifier
    pub fn get(&self, id: &str) -> Option<&PolicyRecord> {
        self.policies.iter().find(|policy| policy.id == id)
    }

    /// Number of policies
    pub fn len(&self) -> usize {
        self.policies.len()
    }

    /// Whether the corpus is empty
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    /// Iterate over the policies
    pub fn iter(&self) -> impl Iterator<Item = &PolicyRecord> {
        self.policies.iter()
    }

    /// Convert into shared records for indexing
    pub fn into_shared(self) -> Vec<Arc<PolicyRecord>> {
        self.policies.into_iter().map(Arc::new).collect()
    }
}
