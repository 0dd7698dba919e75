//! Pipeline configuration
//!
//! Loaded from the `pipeline:` section of the server configuration or a
//! standalone YAML file:
//!
//! ```yaml
//! classifier:
//!   timeout_ms: 20000
//! retriever:
//!   top_k: 4
//!   tie_epsilon: 0.01
//!   restrict_to_category: false
//! adjudicator:
//!   timeout_ms: 30000
//! ```

use policyguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Largest accepted retrieval depth
pub const MAX_TOP_K: usize = 10;

/// Configuration for all three pipeline stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub classifier: ClassifierSettings,

    #[serde(default)]
    pub retriever: RetrieverSettings,

    #[serde(default)]
    pub adjudicator: AdjudicatorSettings,
}

/// Classification stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSettings {
    /// Budget for one classification call
    #[serde(default = "default_classifier_timeout_ms")]
    pub timeout_ms: u64,
}

/// Retrieval stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrieverSettings {
    /// Number of policies handed to the adjudicator
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Raw hits requested per returned policy, to survive deduplication
    #[serde(default = "default_fetch_multiplier")]
    pub fetch_multiplier: usize,

    /// Scores within this distance are treated as tied
    #[serde(default = "default_tie_epsilon")]
    pub tie_epsilon: f32,

    /// Keep only policies of the detected category when any match
    #[serde(default)]
    pub restrict_to_category: bool,

    /// Budget for embedding plus index lookup
    #[serde(default = "default_retriever_timeout_ms")]
    pub timeout_ms: u64,
}

/// Adjudication stage settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdjudicatorSettings {
    /// Budget for one adjudication call
    #[serde(default = "default_adjudicator_timeout_ms")]
    pub timeout_ms: u64,

    /// Multiplier applied to confidence when no policy evidence was retrieved
    #[serde(default = "default_no_evidence_factor")]
    pub no_evidence_confidence_factor: f32,
}

impl Default for ClassifierSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_classifier_timeout_ms(),
        }
    }
}

impl Default for RetrieverSettings {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            fetch_multiplier: default_fetch_multiplier(),
            tie_epsilon: default_tie_epsilon(),
            restrict_to_category: false,
            timeout_ms: default_retriever_timeout_ms(),
        }
    }
}

impl Default for AdjudicatorSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_adjudicator_timeout_ms(),
            no_evidence_confidence_factor: default_no_evidence_factor(),
        }
    }
}

impl ClassifierSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl RetrieverSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Number of raw hits to request from the index
    pub fn fetch_depth(&self) -> usize {
        self.top_k.saturating_mul(self.fetch_multiplier.max(1))
    }
}

impl AdjudicatorSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl PipelineConfig {
    /// Load from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)
            .map_err(|e| Error::config(format!("invalid pipeline config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("failed to read {}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Reject settings the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        let retriever = &self.retriever;
        if retriever.top_k == 0 || retriever.top_k > MAX_TOP_K {
            return Err(Error::config(format!(
                "retriever.top_k must be between 1 and {}, got {}",
                MAX_TOP_K, retriever.top_k
            )));
        }
        if !retriever.tie_epsilon.is_finite() || retriever.tie_epsilon < 0.0 {
            return Err(Error::config("retriever.tie_epsilon must be a non-negative number"));
        }

        let factor = self.adjudicator.no_evidence_confidence_factor;
        if !(0.0..=1.0).contains(&factor) {
            return Err(Error::config(
                "adjudicator.no_evidence_confidence_factor must be within [0, 1]",
            ));
        }

        for (stage, timeout_ms) in [
            ("classifier", self.classifier.timeout_ms),
            ("retriever", retriever.timeout_ms),
            ("adjudicator", self.adjudicator.timeout_ms),
        ] {
            if timeout_ms == 0 {
                return Err(Error::config(format!("{}.timeout_ms must be positive", stage)));
            }
        }

        Ok(())
    }
}

fn default_classifier_timeout_ms() -> u64 {
    20_000
}

fn default_top_k() -> usize {
    4
}

fn default_fetch_multiplier() -> usize {
    3
}

fn default_tie_epsilon() -> f32 {
    0.01
}

fn default_retriever_timeout_ms() -> u64 {
    5_000
}

fn default_adjudicator_timeout_ms() -> u64 {
    30_000
}

fn default_no_evidence_factor() -> f32 {
    0.6
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_yaml() {
        let config = PipelineConfig::from_yaml("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.retriever.top_k, 4);
        assert_eq!(config.retriever.fetch_depth(), 12);
        assert_eq!(config.adjudicator.timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_partial_override() {
        let yaml = r#"
retriever:
  top_k: 6
  restrict_to_category: true
adjudicator:
  timeout_ms: 1500
"#;
        let config = PipelineConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.retriever.top_k, 6);
        assert!(config.retriever.restrict_to_category);
        assert_eq!(config.retriever.tie_epsilon, 0.01);
        assert_eq!(config.adjudicator.timeout_ms, 1500);
        assert_eq!(config.classifier.timeout_ms, 20_000);
    }

    #[test]
    fn test_invalid_top_k_rejected() {
        for yaml in ["retriever: { top_k: 0 }", "retriever: { top_k: 11 }"] {
            let err = PipelineConfig::from_yaml(yaml).unwrap_err();
            assert!(err.to_string().contains("top_k"));
        }
    }

    #[test]
    fn test_invalid_factor_and_timeout_rejected() {
        assert!(PipelineConfig::from_yaml("adjudicator: { no_evidence_confidence_factor: 1.5 }").is_err());
        assert!(PipelineConfig::from_yaml("classifier: { timeout_ms: 0 }").is_err());
        assert!(PipelineConfig::from_yaml("retriever: { tie_epsilon: -0.1 }").is_err());
    }
}
