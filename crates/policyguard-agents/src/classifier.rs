//! Category classifier trait and the generation-backed implementation

use async_trait::async_trait;
use policyguard_core::{
    Category, ClassificationResult, GenerationService, ServiceError, ServiceResult,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::budget::within_budget;
use crate::config::ClassifierSettings;
use crate::prompts;
use crate::structured::{extract_json_object, field_bool, field_str};

/// First pipeline stage: assign a category and decide whether review is needed.
///
/// Implementations never fail. Any backend problem must come back as
/// [`ClassificationResult::fail_safe`] so the content is routed to review.
#[async_trait]
pub trait CategoryClassifier: Send + Sync {
    /// Classify the given text
    async fn classify(&self, text: &str) -> ClassificationResult;

    /// Get the classifier name
    fn name(&self) -> &str;
}

/// Classifier that prompts a generation backend for a JSON verdict
pub struct LlmCategoryClassifier {
    generation: Arc<dyn GenerationService>,
    timeout: Duration,
}

impl LlmCategoryClassifier {
    pub fn new(generation: Arc<dyn GenerationService>, settings: &ClassifierSettings) -> Self {
        Self {
            generation,
            timeout: settings.timeout(),
        }
    }

    /// Classify, surfacing backend and parse failures
    pub async fn try_classify(&self, text: &str) -> ServiceResult<ClassificationResult> {
        let prompt = prompts::classification_prompt(text);
        let raw = within_budget(self.timeout, self.generation.complete(&prompt)).await?;
        parse_classification(&raw)
    }
}

#[async_trait]
impl CategoryClassifier for LlmCategoryClassifier {
    async fn classify(&self, text: &str) -> ClassificationResult {
        match self.try_classify(text).await {
            Ok(result) => {
                debug!(
                    model = self.generation.model(),
                    category = %result.category,
                    needs_review = result.needs_review,
                    "Classified content"
                );
                result
            }
            Err(err) => {
                warn!(model = self.generation.model(), error = %err, "Classification failed, routing to review");
                metrics::counter!(
                    "policyguard_stage_degraded_total",
                    "stage" => "classification",
                    "kind" => err.kind()
                )
                .increment(1);
                ClassificationResult::fail_safe(format!("classification unavailable: {}", err))
            }
        }
    }

    fn name(&self) -> &str {
        "llm-classifier"
    }
}

/// Interpret a classifier reply.
///
/// A missing `category` is malformed. A category outside the known set maps
/// to [`Category::Unknown`] with review forced; so does a missing or
/// unreadable `needs_review`.
pub fn parse_classification(raw: &str) -> ServiceResult<ClassificationResult> {
    let object = extract_json_object(raw)?;

    let label = field_str(&object, "category")
        .filter(|label| !label.is_empty())
        .ok_or_else(|| ServiceError::malformed("classifier reply has no category"))?;
    let explanation = field_str(&object, "explanation").unwrap_or_default();

    let Some(category) = Category::parse(label) else {
        let explanation = if explanation.is_empty() {
            format!("unrecognized category '{}'", label)
        } else {
            format!("unrecognized category '{}': {}", label, explanation)
        };
        return Ok(ClassificationResult::new(Category::Unknown, true, explanation));
    };

    let needs_review =
        field_bool(&object, "needs_review").unwrap_or(true) || category == Category::Unknown;

    Ok(ClassificationResult::new(category, needs_review, explanation))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedGeneration, SlowGeneration};

    #[test]
    fn test_parse_benign() {
        let result = parse_classification(
            r#"{"category":"benign","needs_review":false,"explanation":"friendly greeting"}"#,
        )
        .unwrap();

        assert_eq!(result.category, Category::Benign);
        assert!(!result.needs_review);
        assert_eq!(result.explanation, "friendly greeting");
        assert!(!result.degraded);
        assert!(result.permits_early_exit());
    }

    #[test]
    fn test_parse_normalizes_category_spelling() {
        let result =
            parse_classification(r#"{"category":"Self_Harm","needs_review":"yes"}"#).unwrap();
        assert_eq!(result.category, Category::SelfHarm);
        assert!(result.needs_review);
    }

    #[test]
    fn test_parse_unknown_category_forces_review() {
        let result = parse_classification(
            r#"{"category":"crypto-scam","needs_review":false,"explanation":"odd"}"#,
        )
        .unwrap();
        assert_eq!(result.category, Category::Unknown);
        assert!(result.needs_review);
        assert!(result.explanation.contains("crypto-scam"));
    }

    #[test]
    fn test_parse_missing_needs_review_defaults_to_review() {
        let result = parse_classification(r#"{"category":"politics"}"#).unwrap();
        assert!(result.needs_review);
    }

    #[test]
    fn test_parse_missing_category_is_malformed() {
        assert!(matches!(
            parse_classification(r#"{"needs_review":false}"#),
            Err(ServiceError::Malformed(_))
        ));
        assert!(matches!(
            parse_classification("benign"),
            Err(ServiceError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn test_backend_failure_is_fail_safe() {
        let generation = Arc::new(ScriptedGeneration::failing(ServiceError::unavailable(
            "connection refused",
        )));
        let classifier = LlmCategoryClassifier::new(generation, &ClassifierSettings::default());

        let result = classifier.classify("anything").await;
        assert_eq!(result.category, Category::Unknown);
        assert!(result.needs_review);
        assert!(result.degraded);
    }

    #[tokio::test]
    async fn test_malformed_reply_is_fail_safe() {
        let generation = Arc::new(ScriptedGeneration::replying("I think it is fine."));
        let classifier = LlmCategoryClassifier::new(generation, &ClassifierSettings::default());

        let result = classifier.classify("hello").await;
        assert!(result.needs_review);
        assert!(result.degraded);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_fail_safe() {
        let generation = Arc::new(SlowGeneration::new(Duration::from_secs(60)));
        let settings = ClassifierSettings { timeout_ms: 100 };
        let classifier = LlmCategoryClassifier::new(generation, &settings);

        let result = classifier.classify("hello").await;
        assert!(result.degraded);
        assert!(result.explanation.contains("timed out"));
    }

    #[tokio::test]
    async fn test_prompt_contains_text() {
        let generation = Arc::new(ScriptedGeneration::replying(
            r#"{"category":"benign","needs_review":false,"explanation":"ok"}"#,
        ));
        let classifier =
            LlmCategoryClassifier::new(generation.clone(), &ClassifierSettings::default());

        classifier.classify("Have a great day!").await;
        let prompts = generation.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Have a great day!"));
    }
}
