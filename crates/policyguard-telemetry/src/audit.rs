//! Hash-chained decision audit trail
//!
//! Each record stores the SHA-256 of its predecessor, so editing, removing,
//! or reordering any persisted decision breaks verification from that point on.

use policyguard_core::{AnalysisResponse, Category, Label};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// One moderation decision as recorded for audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique record identifier
    pub record_id: String,

    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,

    pub content_id: String,
    pub label: Label,
    pub confidence: f32,
    pub reasons: Vec<String>,

    /// `early_allow` or `adjudicated`
    #[serde(default)]
    pub path: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,

    #[serde(default)]
    pub retrieved_policy_ids: Vec<String>,

    #[serde(default)]
    pub degraded_stages: Vec<String>,

    #[serde(default)]
    pub latency_us: u64,
}

impl AuditEntry {
    /// Create an entry for a pipeline response
    pub fn new(response: &AnalysisResponse) -> Self {
        Self {
            record_id: Uuid::new_v4().to_string(),
            timestamp_ms: now_ms(),
            content_id: response.content_id.clone(),
            label: response.decision.label,
            confidence: response.decision.confidence,
            reasons: response.decision.reasons.clone(),
            path: String::new(),
            category: None,
            retrieved_policy_ids: Vec::new(),
            degraded_stages: Vec::new(),
            latency_us: 0,
        }
    }

    /// Set the decision path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the classifier category
    pub fn with_category(mut self, category: Category) -> Self {
        self.category = Some(category);
        self
    }

    /// Set the ids of the policies used as evidence
    pub fn with_retrieved(mut self, ids: Vec<String>) -> Self {
        self.retrieved_policy_ids = ids;
        self
    }

    /// Set the stages that fell back to their fail-safe output
    pub fn with_degraded_stages(mut self, stages: Vec<String>) -> Self {
        self.degraded_stages = stages;
        self
    }

    /// Set the end-to-end pipeline latency
    pub fn with_latency_us(mut self, latency_us: u64) -> Self {
        self.latency_us = latency_us;
        self
    }
}

/// An entry sealed into the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Position in the chain, starting at 1
    pub sequence: u64,

    #[serde(flatten)]
    pub entry: AuditEntry,

    /// Hash of the previous record, `None` for the first
    pub previous_hash: Option<String>,

    /// Hash over sequence, entry, and previous hash
    pub hash: String,
}

impl AuditRecord {
    fn seal(entry: AuditEntry, head: &ChainHead) -> Self {
        let sequence = head.sequence + 1;
        let previous_hash = head.hash.clone();
        let hash = compute_hash(sequence, &entry, previous_hash.as_deref());

        Self {
            sequence,
            entry,
            previous_hash,
            hash,
        }
    }
}

/// Latest position of a chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChainHead {
    pub sequence: u64,
    pub hash: Option<String>,
}

impl ChainHead {
    /// Seal an entry as the next record without advancing the head
    pub fn seal(&self, entry: AuditEntry) -> AuditRecord {
        AuditRecord::seal(entry, self)
    }

    /// Advance to a record sealed with [`ChainHead::seal`]
    pub fn commit(&mut self, record: &AuditRecord) {
        self.sequence = record.sequence;
        self.hash = Some(record.hash.clone());
    }

    /// Append an entry after this head, advancing it
    pub fn append(&mut self, entry: AuditEntry) -> AuditRecord {
        let record = self.seal(entry);
        self.commit(&record);
        record
    }

    /// Head after the given verified records
    pub fn after(records: &[AuditRecord]) -> Self {
        records
            .last()
            .map(|last| Self {
                sequence: last.sequence,
                hash: Some(last.hash.clone()),
            })
            .unwrap_or_default()
    }
}

/// Why a chain failed verification
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainViolation {
    #[error("record {sequence}: expected sequence {expected}")]
    Sequence { sequence: u64, expected: u64 },

    #[error("record {sequence}: previous hash does not match the preceding record")]
    BrokenLink { sequence: u64 },

    #[error("record {sequence}: content hash mismatch")]
    HashMismatch { sequence: u64 },
}

/// Check every link and hash in a run of records
pub fn verify_chain(records: &[AuditRecord]) -> Result<(), ChainViolation> {
    let mut head = ChainHead::default();

    for record in records {
        let expected = head.sequence + 1;
        if record.sequence != expected {
            return Err(ChainViolation::Sequence {
                sequence: record.sequence,
                expected,
            });
        }
        if record.previous_hash != head.hash {
            return Err(ChainViolation::BrokenLink {
                sequence: record.sequence,
            });
        }

        let computed = compute_hash(record.sequence, &record.entry, record.previous_hash.as_deref());
        if computed != record.hash {
            return Err(ChainViolation::HashMismatch {
                sequence: record.sequence,
            });
        }

        head.sequence = record.sequence;
        head.hash = Some(record.hash.clone());
    }

    Ok(())
}

/// In-memory audit trail
#[derive(Debug, Default)]
pub struct AuditTrail {
    records: Vec<AuditRecord>,
    head: ChainHead,
}

impl AuditTrail {
    /// Create an empty trail
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to the trail
    pub fn append(&mut self, entry: AuditEntry) -> &AuditRecord {
        let record = self.head.append(entry);
        self.records.push(record);
        &self.records[self.records.len() - 1]
    }

    /// Verify the integrity of the trail
    pub fn verify(&self) -> Result<(), ChainViolation> {
        verify_chain(&self.records)
    }

    /// Get all records
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    pub fn head(&self) -> &ChainHead {
        &self.head
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

fn compute_hash(sequence: u64, entry: &AuditEntry, previous_hash: Option<&str>) -> String {
    let mut hasher = Sha256::new();

    hasher.update(sequence.to_be_bytes());
    // Entry fields are plain data; serialization cannot fail
    if let Ok(bytes) = serde_json::to_vec(entry) {
        hasher.update(&bytes);
    }
    if let Some(prev) = previous_hash {
        hasher.update(prev.as_bytes());
    }

    format!("{:x}", hasher.finalize())
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}
