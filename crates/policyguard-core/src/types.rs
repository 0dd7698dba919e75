//! Core types for PolicyGuard

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Confidence used whenever a stage cannot supply one of its own
pub const CONFIDENCE_FLOOR: f32 = 0.5;

/// Reason attached to the decision issued when adjudication cannot run
pub const ADJUDICATION_UNAVAILABLE_REASON: &str =
    "automated adjudication unavailable; manual review required";

/// Final disposition for a piece of content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    /// Content may be published as-is
    Allowed,
    /// Content needs a human look
    Flag,
    /// Content violates policy
    Block,
}

impl Label {
    /// Wire name of the label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Flag => "flag",
            Self::Block => "block",
        }
    }

    /// Parse a label as written by a model, accepting common inflections
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "allowed" | "allow" => Some(Self::Allowed),
            "flag" | "flagged" => Some(Self::Flag),
            "block" | "blocked" => Some(Self::Block),
            _ => None,
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse content category.
///
/// This is a closed set: anything a model reports outside of it is mapped to
/// [`Category::Unknown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Harassment,
    SelfHarm,
    Hate,
    Sexual,
    Violence,
    Politics,
    Misinformation,
    Privacy,
    Spam,
    Benign,
    Unknown,
}

impl Category {
    /// Every category, in declaration order
    pub const ALL: [Category; 11] = [
        Self::Harassment,
        Self::SelfHarm,
        Self::Hate,
        Self::Sexual,
        Self::Violence,
        Self::Politics,
        Self::Misinformation,
        Self::Privacy,
        Self::Spam,
        Self::Benign,
        Self::Unknown,
    ];

    /// Wire name of the category
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Harassment => "harassment",
            Self::SelfHarm => "self-harm",
            Self::Hate => "hate",
            Self::Sexual => "sexual",
            Self::Violence => "violence",
            Self::Politics => "politics",
            Self::Misinformation => "misinformation",
            Self::Privacy => "privacy",
            Self::Spam => "spam",
            Self::Benign => "benign",
            Self::Unknown => "unknown",
        }
    }

    /// Parse a category name, tolerating case and `_`/space separators.
    ///
    /// Returns `None` for names outside the closed set.
    pub fn parse(value: &str) -> Option<Self> {
        let normalized: String = value
            .trim()
            .chars()
            .map(|c| match c {
                '_' | ' ' => '-',
                other => other.to_ascii_lowercase(),
            })
            .collect();

        Self::ALL
            .iter()
            .copied()
            .find(|category| category.as_str() == normalized)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Policy severity, ordered `Low < Medium < High`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    /// Wire name of the severity
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single policy from the corpus. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    /// Unique policy identifier
    pub id: String,

    /// Category the policy governs
    pub category: Category,

    /// Short human-readable title
    pub title: String,

    /// Policy text
    #[serde(alias = "text")]
    pub body: String,

    /// How serious a violation of this policy is
    pub severity: Severity,
}

impl PolicyRecord {
    /// Create a new policy record
    pub fn new(
        id: impl Into<String>,
        category: Category,
        title: impl Into<String>,
        body: impl Into<String>,
        severity: Severity,
    ) -> Self {
        Self {
            id: id.into(),
            category,
            title: title.into(),
            body: body.into(),
            severity,
        }
    }
}

/// A policy returned by retrieval, with its relevance and position
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedPolicy {
    /// The matched policy
    pub policy: Arc<PolicyRecord>,

    /// Similarity score (0.0-1.0, higher is more relevant)
    pub score: f32,

    /// 1-based rank within the retrieval result
    pub rank: usize,
}

impl RetrievedPolicy {
    /// Identifier of the matched policy
    pub fn id(&self) -> &str {
        &self.policy.id
    }
}

/// Output of the category classifier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    /// Coarse category
    pub category: Category,

    /// Whether the content must go through retrieval and adjudication
    pub needs_review: bool,

    /// Free-text explanation, possibly empty
    #[serde(default)]
    pub explanation: String,

    /// Set when this result is a substitute for a failed classification
    #[serde(default)]
    pub degraded: bool,
}

impl ClassificationResult {
    /// Create a new classification result
    pub fn new(category: Category, needs_review: bool, explanation: impl Into<String>) -> Self {
        Self {
            category,
            needs_review,
            explanation: explanation.into(),
            degraded: false,
        }
    }

    /// Result used when classification could not be performed.
    ///
    /// Always routes the content toward deeper review.
    pub fn fail_safe(explanation: impl Into<String>) -> Self {
        Self {
            category: Category::Unknown,
            needs_review: true,
            explanation: explanation.into(),
            degraded: true,
        }
    }

    /// Whether this result may short-circuit the pipeline to `allowed`.
    ///
    /// Degraded and `unknown` results never qualify, whatever `needs_review` says.
    pub fn permits_early_exit(&self) -> bool {
        !self.needs_review && !self.degraded && self.category != Category::Unknown
    }
}

/// Final moderation decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Disposition
    pub label: Label,

    /// Confidence (0.0-1.0)
    pub confidence: f32,

    /// Ordered human-readable reasons
    #[serde(default)]
    pub reasons: Vec<String>,

    /// Set when this decision is a substitute for a failed adjudication.
    /// Not part of the wire format.
    #[serde(skip)]
    pub degraded: bool,
}

impl Decision {
    /// Create a normalized decision
    pub fn new(label: Label, confidence: f32, reasons: Vec<String>) -> Self {
        Self {
            label,
            confidence,
            reasons,
            degraded: false,
        }
        .normalized()
    }

    /// Decision for content the classifier cleared without review
    pub fn early_allow() -> Self {
        Self {
            label: Label::Allowed,
            confidence: 1.0,
            reasons: Vec::new(),
            degraded: false,
        }
    }

    /// Fail-safe decision issued when adjudication cannot run
    pub fn adjudication_unavailable() -> Self {
        Self {
            label: Label::Flag,
            confidence: CONFIDENCE_FLOOR,
            reasons: vec![ADJUDICATION_UNAVAILABLE_REASON.to_string()],
            degraded: true,
        }
    }

    /// Enforce decision invariants: confidence within `[0, 1]`, no blank
    /// reasons, and at least one reason for `flag` and `block`.
    pub fn normalized(mut self) -> Self {
        self.confidence = clamp_confidence(self.confidence);

        self.reasons = self
            .reasons
            .into_iter()
            .map(|reason| reason.trim().to_string())
            .filter(|reason| !reason.is_empty())
            .collect();

        if self.label != Label::Allowed && self.reasons.is_empty() {
            self.reasons.push(format!(
                "content marked '{}' without a stated reason",
                self.label
            ));
        }

        self
    }

    /// Whether the content was allowed
    pub fn is_allowed(&self) -> bool {
        self.label == Label::Allowed
    }
}

/// Clamp a confidence into `[0, 1]`, replacing non-finite values with the floor
pub fn clamp_confidence(confidence: f32) -> f32 {
    if confidence.is_finite() {
        confidence.clamp(0.0, 1.0)
    } else {
        CONFIDENCE_FLOOR
    }
}

/// One analysis call. Never shared across requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRequest {
    /// Caller-supplied content identifier
    pub content_id: String,

    /// Text to analyze
    pub text: String,

    /// Optional language hint (e.g. "en")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

impl PipelineRequest {
    /// Create a new request without a language hint
    pub fn new(content_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            content_id: content_id.into(),
            text: text.into(),
            language: None,
        }
    }

    /// Attach a language hint
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }
}

/// The pipeline's only externally visible output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResponse {
    /// Identifier echoed from the request
    pub content_id: String,

    /// The decision reached for the content
    pub decision: Decision,
}
