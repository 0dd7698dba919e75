//! Audit service for async decision recording
//!
//! Request handlers hand entries to [`AuditRecorder::record`] without
//! waiting; a background task seals them into the chain, keeps a bounded
//! window of recent records, and appends to the optional log file.

use std::collections::VecDeque;
use std::io;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::audit::{AuditEntry, AuditRecord, ChainHead};
use crate::metrics::{AUDIT_RECORDS_TOTAL, AUDIT_WRITE_ERRORS_TOTAL};
use crate::persistence::{AuditLogConfig, AuditLogWriter};

/// Default number of recent records kept in memory
pub const DEFAULT_RECENT_CAPACITY: usize = 1_000;

/// Commands sent to the background task
enum AuditCommand {
    /// Seal and store an entry
    Record(Box<AuditEntry>),

    /// Return up to `limit` most recent records, newest last
    Recent(usize, oneshot::Sender<Vec<AuditRecord>>),

    /// Flush to disk
    Flush(oneshot::Sender<()>),

    /// Shutdown the service
    Shutdown,
}

/// Handle to the audit task
pub struct AuditRecorder {
    sender: mpsc::UnboundedSender<AuditCommand>,
}

impl AuditRecorder {
    /// Start a recorder keeping records in memory only
    pub fn in_memory(recent_capacity: usize) -> Self {
        Self::start(None, ChainHead::default(), recent_capacity)
    }

    /// Start a recorder appending to a JSON-lines log.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_log(config: &AuditLogConfig, recent_capacity: usize) -> io::Result<Self> {
        let (writer, head) = AuditLogWriter::open(config)?;
        info!(
            path = %config.path.display(),
            sequence = head.sequence,
            "Audit recorder resuming chain"
        );
        Ok(Self::start(Some(writer), head, recent_capacity))
    }

    fn start(writer: Option<AuditLogWriter>, head: ChainHead, recent_capacity: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        tokio::spawn(run_recorder(receiver, writer, head, recent_capacity.max(1)));
        Self { sender }
    }

    /// Record an entry asynchronously
    pub fn record(&self, entry: AuditEntry) {
        if let Err(e) = self.sender.send(AuditCommand::Record(Box::new(entry))) {
            warn!("Failed to send audit entry: {}", e);
        }
    }

    /// Most recent records, oldest first
    pub async fn recent(&self, limit: usize) -> Vec<AuditRecord> {
        let (reply, response) = oneshot::channel();
        if self.sender.send(AuditCommand::Recent(limit, reply)).is_err() {
            return Vec::new();
        }
        response.await.unwrap_or_default()
    }

    /// Wait until every entry sent so far is sealed and flushed
    pub async fn flush(&self) {
        let (reply, done) = oneshot::channel();
        if self.sender.send(AuditCommand::Flush(reply)).is_ok() {
            let _ = done.await;
        }
    }
}

impl Drop for AuditRecorder {
    fn drop(&mut self) {
        // Signal shutdown
        let _ = self.sender.send(AuditCommand::Shutdown);
    }
}

impl std::fmt::Debug for AuditRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditRecorder")
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

async fn run_recorder(
    mut receiver: mpsc::UnboundedReceiver<AuditCommand>,
    mut writer: Option<AuditLogWriter>,
    mut head: ChainHead,
    capacity: usize,
) {
    let mut recent: VecDeque<AuditRecord> = VecDeque::with_capacity(capacity.min(1024));

    while let Some(command) = receiver.recv().await {
        match command {
            AuditCommand::Record(entry) => {
                let record = head.seal(*entry);

                // The head only advances once the record is in the log
                if let Some(writer) = writer.as_mut() {
                    if let Err(e) = writer.write_record(&record) {
                        error!(
                            sequence = record.sequence,
                            content_id = %record.entry.content_id,
                            "Failed to write audit record, dropping it: {}", e
                        );
                        metrics::counter!(AUDIT_WRITE_ERRORS_TOTAL).increment(1);
                        continue;
                    }
                }
                head.commit(&record);

                debug!(
                    sequence = record.sequence,
                    content_id = %record.entry.content_id,
                    label = %record.entry.label,
                    "Sealed audit record"
                );
                metrics::counter!(AUDIT_RECORDS_TOTAL).increment(1);

                if recent.len() == capacity {
                    recent.pop_front();
                }
                recent.push_back(record);
            }
            AuditCommand::Recent(limit, reply) => {
                let skip = recent.len().saturating_sub(limit);
                let _ = reply.send(recent.iter().skip(skip).cloned().collect());
            }
            AuditCommand::Flush(reply) => {
                if let Some(writer) = writer.as_mut() {
                    if let Err(e) = writer.flush() {
                        error!("Failed to flush audit log: {}", e);
                        metrics::counter!(AUDIT_WRITE_ERRORS_TOTAL).increment(1);
                    }
                }
                let _ = reply.send(());
            }
            AuditCommand::Shutdown => {
                debug!("Audit recorder shutting down");
                break;
            }
        }
    }

    if let Some(mut writer) = writer {
        let _ = writer.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::verify_chain;
    use crate::persistence::verify_log;
    use policyguard_core::{AnalysisResponse, Decision, Label};

    fn entry(content_id: &str) -> AuditEntry {
        AuditEntry::new(&AnalysisResponse {
            content_id: content_id.to_string(),
            decision: Decision::new(Label::Block, 0.9, vec!["threat".to_string()]),
        })
    }

    #[tokio::test]
    async fn test_in_memory_recorder_chains_records() {
        let recorder = AuditRecorder::in_memory(10);
        for i in 0..3 {
            recorder.record(entry(&format!("c{}", i)));
        }

        let records = recorder.recent(10).await;
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].entry.content_id, "c0");
        assert_eq!(verify_chain(&records), Ok(()));
    }

    #[tokio::test]
    async fn test_recent_window_is_bounded() {
        let recorder = AuditRecorder::in_memory(2);
        for i in 0..5 {
            recorder.record(entry(&format!("c{}", i)));
        }

        let records = recorder.recent(10).await;
        let ids: Vec<&str> = records.iter().map(|r| r.entry.content_id.as_str()).collect();
        assert_eq!(ids, vec!["c3", "c4"]);
        assert_eq!(records[1].sequence, 5);

        assert_eq!(recorder.recent(1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_log_backed_recorder_persists() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditLogConfig::new(dir.path().join("decisions.jsonl"));

        let recorder = AuditRecorder::with_log(&config, 10).unwrap();
        recorder.record(entry("c1"));
        recorder.record(entry("c2"));
        recorder.flush().await;

        assert_eq!(verify_log(&config.path).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_write_is_not_chained() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditLogConfig::new(dir.path().join("decisions.jsonl"));

        let recorder = AuditRecorder::with_log(&config, 10).unwrap();
        recorder.record(entry("c1"));
        recorder.flush().await;
        drop(recorder);

        let (mut writer, head) = AuditLogWriter::open(&config).unwrap();
        writer.fail_writes().unwrap();
        let recorder = AuditRecorder::start(Some(writer), head, 10);
        recorder.record(entry("c2"));
        recorder.record(entry("c3"));
        assert!(recorder.recent(10).await.is_empty());
        drop(recorder);

        let recorder = AuditRecorder::with_log(&config, 10).unwrap();
        recorder.record(entry("c4"));
        let records = recorder.recent(10).await;
        recorder.flush().await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sequence, 2);
        assert_eq!(verify_log(&config.path).unwrap(), 2);
    }
}
