//! Prompt templates for the generation-backed agents

use policyguard_core::{Category, RetrievedPolicy};

/// Longest policy excerpt placed in an adjudication prompt
pub const SNIPPET_CHARS: usize = 800;

/// Prompt asking for `{category, needs_review, explanation}`
pub fn classification_prompt(text: &str) -> String {
    let categories = Category::ALL
        .iter()
        .filter(|category| **category != Category::Unknown)
        .map(|category| format!("'{}'", category.as_str()))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "You are a content safety classifier.\n\
         \n\
         Input text:\n\
         {text}\n\
         \n\
         1. Classify the main category of this text, choosing one of: {categories}.\n\
         2. Decide if this text requires a detailed safety/compliance review (true/false).\n\
         3. Explain briefly why.\n\
         \n\
         Respond with a single JSON object with keys:\n\
         \x20 - category: string\n\
         \x20 - needs_review: boolean\n\
         \x20 - explanation: string\n"
    )
}

/// Prompt asking for `{label, confidence, reasons}` given retrieved policies
pub fn adjudication_prompt(text: &str, category: Category, policies: &[RetrievedPolicy]) -> String {
    format!(
        "You are a policy compliance analyst for user-generated content.\n\
         \n\
         Content:\n\
         {text}\n\
         \n\
         Classifier category:\n\
         {category}\n\
         \n\
         Retrieved policy snippets:\n\
         {policies}\n\
         \n\
         Task:\n\
         Decide the best policy outcome: allowed, flag, or block.\n\
         \n\
         Provide:\n\
         \x20 - label: one of allowed/flag/block\n\
         \x20 - confidence: number 0..1\n\
         \x20 - reasons: 2-5 short reasons tied to the policies when possible\n\
         \n\
         Respond with a single JSON object with keys: label, confidence, reasons\n",
        policies = format_policies(policies),
    )
}

/// Render retrieved policies as `[id] title (cat=..., severity=...)` blocks
pub fn format_policies(policies: &[RetrievedPolicy]) -> String {
    if policies.is_empty() {
        return "None".to_string();
    }

    policies
        .iter()
        .map(|retrieved| {
            let policy = &retrieved.policy;
            format!(
                "[{}] {} (cat={}, severity={})\n{}",
                policy.id,
                policy.title,
                policy.category,
                policy.severity.as_str(),
                snippet(&policy.body)
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn snippet(body: &str) -> String {
    let body = body.trim();
    if body.chars().count() <= SNIPPET_CHARS {
        body.to_string()
    } else {
        let head: String = body.chars().take(SNIPPET_CHARS).collect();
        format!("{}...", head.trim_end())
    }
}
