//! Scripted services for unit tests

use async_trait::async_trait;
use policyguard_core::{
    Category, GenerationService, PolicyRecord, RetrievedPolicy, ServiceResult, Severity,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Generation backend returning a fixed reply and recording prompts
pub struct ScriptedGeneration {
    reply: ServiceResult<String>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedGeneration {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: Ok(reply.to_string()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: policyguard_core::ServiceError) -> Self {
        Self {
            reply: Err(error),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationService for ScriptedGeneration {
    async fn complete(&self, prompt: &str) -> ServiceResult<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        self.reply.clone()
    }

    fn model(&self) -> &str {
        "scripted"
    }
}

/// Generation backend that sleeps before answering
pub struct SlowGeneration {
    delay: Duration,
}

impl SlowGeneration {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl GenerationService for SlowGeneration {
    async fn complete(&self, _prompt: &str) -> ServiceResult<String> {
        tokio::time::sleep(self.delay).await;
        Ok(r#"{"label":"allowed","confidence":1.0}"#.to_string())
    }

    fn model(&self) -> &str {
        "slow"
    }
}

pub fn retrieved(
    id: &str,
    category: Category,
    severity: Severity,
    score: f32,
    rank: usize,
) -> RetrievedPolicy {
    RetrievedPolicy {
        policy: Arc::new(PolicyRecord::new(id, category, id, "policy text", severity)),
        score,
        rank,
    }
}
