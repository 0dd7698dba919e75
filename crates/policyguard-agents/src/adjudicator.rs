//! Compliance adjudicator trait and the generation-backed implementation

use async_trait::async_trait;
use policyguard_core::types::{clamp_confidence, CONFIDENCE_FLOOR};
use policyguard_core::{
    Category, Decision, GenerationService, Label, RetrievedPolicy, ServiceError, ServiceResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::budget::within_budget;
use crate::config::AdjudicatorSettings;
use crate::prompts;
use crate::structured::{extract_json_object, field_f32, field_str, field_string_list};

/// Reason attached when a verdict had no retrieved policy to rest on
pub const NO_MATCHING_POLICY_REASON: &str =
    "no matching policy was found; ambiguous content routed to review";

/// Final pipeline stage: weigh the content against retrieved policies.
///
/// Implementations never fail and always return a normalized [`Decision`].
/// When adjudication cannot run they return
/// [`Decision::adjudication_unavailable`].
#[async_trait]
pub trait ComplianceAdjudicator: Send + Sync {
    /// Decide on the content given its category and supporting policies
    async fn adjudicate(
        &self,
        text: &str,
        category: Category,
        policies: &[RetrievedPolicy],
    ) -> Decision;

    /// Get the adjudicator name
    fn name(&self) -> &str;
}

/// Adjudicator that prompts a generation backend for a JSON verdict
pub struct LlmComplianceAdjudicator {
    generation: Arc<dyn GenerationService>,
    timeout: Duration,
    no_evidence_factor: f32,
}

impl LlmComplianceAdjudicator {
    pub fn new(generation: Arc<dyn GenerationService>, settings: &AdjudicatorSettings) -> Self {
        Self {
            generation,
            timeout: settings.timeout(),
            no_evidence_factor: settings.no_evidence_confidence_factor,
        }
    }

    /// Adjudicate, surfacing backend and parse failures
    pub async fn try_adjudicate(
        &self,
        text: &str,
        category: Category,
        policies: &[RetrievedPolicy],
    ) -> ServiceResult<Decision> {
        let prompt = prompts::adjudication_prompt(text, category, policies);
        let raw = within_budget(self.timeout, self.generation.complete(&prompt)).await?;
        let decision = parse_adjudication(&raw)?;

        if policies.is_empty() {
            Ok(without_evidence(decision, self.no_evidence_factor))
        } else {
            Ok(decision)
        }
    }
}

#[async_trait]
impl ComplianceAdjudicator for LlmComplianceAdjudicator {
    async fn adjudicate(
        &self,
        text: &str,
        category: Category,
        policies: &[RetrievedPolicy],
    ) -> Decision {
        match self.try_adjudicate(text, category, policies).await {
            Ok(decision) => {
                debug!(
                    model = self.generation.model(),
                    label = %decision.label,
                    confidence = decision.confidence,
                    evidence = policies.len(),
                    "Adjudicated content"
                );
                decision
            }
            Err(err) => {
                warn!(model = self.generation.model(), error = %err, "Adjudication failed, flagging for manual review");
                metrics::counter!(
                    "policyguard_stage_degraded_total",
                    "stage" => "adjudication",
                    "kind" => err.kind()
                )
                .increment(1);
                Decision::adjudication_unavailable()
            }
        }
    }

    fn name(&self) -> &str {
        "llm-adjudicator"
    }
}

/// Interpret an adjudicator reply.
///
/// The label is mandatory. A missing or unreadable confidence becomes the
/// confidence floor; out-of-range values are clamped.
pub fn parse_adjudication(raw: &str) -> ServiceResult<Decision> {
    let object = extract_json_object(raw)?;

    let label = match field_str(&object, "label") {
        Some(text) => Label::parse(text)
            .ok_or_else(|| ServiceError::malformed(format!("unknown label '{}'", text)))?,
        None => return Err(ServiceError::malformed("adjudicator reply has no label")),
    };
    let confidence = field_f32(&object, "confidence").unwrap_or(CONFIDENCE_FLOOR);
    let reasons = field_string_list(&object, "reasons");

    Ok(Decision::new(label, confidence, reasons))
}

/// Downgrade a verdict that had no policy evidence behind it.
///
/// `allowed` becomes `flag`, confidence is scaled by `factor`, and the
/// missing-evidence reason is appended.
pub fn without_evidence(decision: Decision, factor: f32) -> Decision {
    let label = match decision.label {
        Label::Allowed => Label::Flag,
        other => other,
    };

    let mut reasons = decision.reasons;
    reasons.push(NO_MATCHING_POLICY_REASON.to_string());

    let mut downgraded = Decision::new(
        label,
        clamp_confidence(decision.confidence * factor),
        reasons,
    );
    downgraded.degraded = decision.degraded;
    downgraded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{retrieved, ScriptedGeneration, SlowGeneration};
    use policyguard_core::types::ADJUDICATION_UNAVAILABLE_REASON;
    use policyguard_core::Severity;

    fn adjudicator(generation: Arc<ScriptedGeneration>) -> LlmComplianceAdjudicator {
        LlmComplianceAdjudicator::new(generation, &AdjudicatorSettings::default())
    }

    #[test]
    fn test_parse_block() {
        let decision = parse_adjudication(
            r#"{"label":"block","confidence":0.95,"reasons":["Expresses intent to self-harm"]}"#,
        )
        .unwrap();

        assert_eq!(decision.label, Label::Block);
        assert!((decision.confidence - 0.95).abs() < 1e-6);
        assert_eq!(decision.reasons, vec!["Expresses intent to self-harm"]);
    }

    #[test]
    fn test_parse_clamps_confidence_and_defaults() {
        let decision = parse_adjudication(r#"{"label":"flagged","confidence":3}"#).unwrap();
        assert_eq!(decision.label, Label::Flag);
        assert_eq!(decision.confidence, 1.0);
        assert_eq!(decision.reasons.len(), 1);

        let decision = parse_adjudication(r#"{"label":"allowed"}"#).unwrap();
        assert_eq!(decision.confidence, CONFIDENCE_FLOOR);
        assert!(decision.reasons.is_empty());
    }

    #[test]
    fn test_parse_bad_label_is_malformed() {
        for raw in [r#"{"label":"maybe"}"#, r#"{"confidence":0.9}"#, "block"] {
            assert!(matches!(parse_adjudication(raw), Err(ServiceError::Malformed(_))));
        }
    }

    #[test]
    fn test_without_evidence() {
        let allowed = Decision::new(Label::Allowed, 0.9, vec!["looks fine".into()]);
        let downgraded = without_evidence(allowed, 0.6);

        assert_eq!(downgraded.label, Label::Flag);
        assert!((downgraded.confidence - 0.54).abs() < 1e-6);
        assert_eq!(
            downgraded.reasons,
            vec!["looks fine".to_string(), NO_MATCHING_POLICY_REASON.to_string()]
        );

        let blocked = without_evidence(Decision::new(Label::Block, 1.0, vec!["x".into()]), 0.6);
        assert_eq!(blocked.label, Label::Block);
    }

    #[tokio::test]
    async fn test_adjudicate_with_evidence() {
        let generation = Arc::new(ScriptedGeneration::replying(
            r#"{"label":"block","confidence":0.95,"reasons":["Expresses intent to self-harm"]}"#,
        ));
        let policies = vec![retrieved("p2", Category::SelfHarm, Severity::High, 0.9, 1)];

        let decision = adjudicator(generation.clone())
            .adjudicate("I'm going to hurt myself", Category::SelfHarm, &policies)
            .await;

        assert_eq!(
            decision,
            Decision::new(
                Label::Block,
                0.95,
                vec!["Expresses intent to self-harm".to_string()]
            )
        );
        assert!(generation.prompts()[0].contains("[p2]"));
    }

    #[tokio::test]
    async fn test_adjudicate_without_evidence_never_allows() {
        let generation = Arc::new(ScriptedGeneration::replying(
            r#"{"label":"allowed","confidence":1.0,"reasons":[]}"#,
        ));

        let decision = adjudicator(generation)
            .adjudicate("ambiguous", Category::Unknown, &[])
            .await;

        assert_eq!(decision.label, Label::Flag);
        assert!(decision.confidence < 1.0);
        assert!(decision.reasons.contains(&NO_MATCHING_POLICY_REASON.to_string()));
    }

    #[tokio::test]
    async fn test_backend_failure_flags_for_review() {
        let generation = Arc::new(ScriptedGeneration::failing(ServiceError::RateLimited));

        let decision = adjudicator(generation)
            .adjudicate("text", Category::Hate, &[])
            .await;

        assert_eq!(decision.label, Label::Flag);
        assert_eq!(decision.confidence, CONFIDENCE_FLOOR);
        assert_eq!(decision.reasons, vec![ADJUDICATION_UNAVAILABLE_REASON.to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_flags_for_review() {
        let settings = AdjudicatorSettings {
            timeout_ms: 50,
            ..AdjudicatorSettings::default()
        };
        let adjudicator =
            LlmComplianceAdjudicator::new(Arc::new(SlowGeneration::new(Duration::from_secs(10))), &settings);

        let decision = adjudicator.adjudicate("text", Category::Spam, &[]).await;
        assert_eq!(decision, Decision::adjudication_unavailable());
    }
}
