//! JSON-lines persistence for the audit trail
//!
//! One [`AuditRecord`] per line, appended in chain order. Reopening an
//! existing log verifies it and resumes the chain from its last record.
//! A write that fails part way is cut back to the last complete record.

use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::audit::{verify_chain, AuditRecord, ChainHead};

/// Audit log settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogConfig {
    /// JSON-lines file to append to
    pub path: PathBuf,

    /// Sync to disk after this many records
    #[serde(default = "default_flush_every")]
    pub flush_every: usize,
}

impl AuditLogConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            flush_every: default_flush_every(),
        }
    }
}

fn default_flush_every() -> usize {
    1
}

/// Appends sealed records to the log file
pub struct AuditLogWriter {
    file: File,
    path: PathBuf,
    /// Length of the log up to the last complete record
    committed_len: u64,
    flush_every: usize,
    pending: usize,
}

impl AuditLogWriter {
    /// Open the log for appending, returning the chain head to resume from.
    ///
    /// An incomplete trailing line is discarded first. Fails with
    /// [`io::ErrorKind::InvalidData`] if the remaining log does not verify.
    pub fn open(config: &AuditLogConfig) -> io::Result<(Self, ChainHead)> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let existing = if config.path.exists() {
            discard_torn_tail(&config.path)?;
            read_records(&config.path)?
        } else {
            Vec::new()
        };
        verify_chain(&existing).map_err(|violation| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("audit log {} failed verification: {}", config.path.display(), violation),
            )
        })?;
        let head = ChainHead::after(&existing);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.path)?;
        let committed_len = file.metadata()?.len();

        info!(
            path = %config.path.display(),
            existing = existing.len(),
            "Opened audit log"
        );

        Ok((
            Self {
                file,
                path: config.path.clone(),
                committed_len,
                flush_every: config.flush_every.max(1),
                pending: 0,
            },
            head,
        ))
    }

    /// Append one record as a single line.
    ///
    /// On error the log is truncated back to the previous record, so the
    /// caller can reseal the entry at the same position.
    pub fn write_record(&mut self, record: &AuditRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');

        if let Err(e) = self.file.write_all(&line) {
            if let Err(truncate_err) = self.rollback() {
                warn!(
                    path = %self.path.display(),
                    "Failed to cut audit log back to its last record: {}", truncate_err
                );
            }
            return Err(e);
        }
        self.committed_len += line.len() as u64;

        self.pending += 1;
        if self.pending >= self.flush_every {
            if let Err(e) = self.flush() {
                // The line is already in the file; only durability is delayed
                warn!(path = %self.path.display(), "Failed to sync audit log: {}", e);
            }
        }
        Ok(())
    }

    /// Sync written records to disk
    pub fn flush(&mut self) -> io::Result<()> {
        if self.pending > 0 {
            debug!(path = %self.path.display(), records = self.pending, "Syncing audit log");
        }
        self.file.flush()?;
        self.file.sync_data()?;
        self.pending = 0;
        Ok(())
    }

    /// Log length up to the last complete record
    pub fn committed_len(&self) -> u64 {
        self.committed_len
    }

    fn rollback(&self) -> io::Result<()> {
        OpenOptions::new()
            .write(true)
            .open(&self.path)?
            .set_len(self.committed_len)
    }

    /// Swap the handle for a read-only one so every later write fails
    #[cfg(test)]
    pub(crate) fn fail_writes(&mut self) -> io::Result<()> {
        self.file = File::open(&self.path)?;
        Ok(())
    }
}

/// Cut the log back to its last newline if it ends mid-record
fn discard_torn_tail(path: &Path) -> io::Result<()> {
    let content = std::fs::read(path)?;
    if content.last().map_or(true, |last| *last == b'\n') {
        return Ok(());
    }

    let keep = content
        .iter()
        .rposition(|byte| *byte == b'\n')
        .map_or(0, |newline| newline + 1);
    warn!(
        path = %path.display(),
        discarded_bytes = content.len() - keep,
        "Discarding incomplete trailing audit record"
    );

    OpenOptions::new()
        .write(true)
        .open(path)?
        .set_len(keep as u64)
}

/// Read every record from a log file, skipping blank lines
pub fn read_records(path: &Path) -> io::Result<Vec<AuditRecord>> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record = serde_json::from_str(&line).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} line {}: {}", path.display(), line_no + 1, e),
            )
        })?;
        records.push(record);
    }

    Ok(records)
}

/// Read and verify a log file, returning the number of records
pub fn verify_log(path: &Path) -> io::Result<usize> {
    let records = read_records(path)?;
    verify_chain(&records)
        .map_err(|violation| io::Error::new(io::ErrorKind::InvalidData, violation.to_string()))?;
    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditEntry;
    use policyguard_core::{AnalysisResponse, Decision, Label};

    fn entry(content_id: &str) -> AuditEntry {
        AuditEntry::new(&AnalysisResponse {
            content_id: content_id.to_string(),
            decision: Decision::new(Label::Flag, 0.5, vec!["review".to_string()]),
        })
    }

    #[test]
    fn test_write_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditLogConfig::new(dir.path().join("audit/decisions.jsonl"));

        let (mut writer, mut head) = AuditLogWriter::open(&config).unwrap();
        assert_eq!(head, ChainHead::default());
        writer.write_record(&head.append(entry("c1"))).unwrap();
        writer.write_record(&head.append(entry("c2"))).unwrap();
        drop(writer);

        let (mut writer, mut resumed) = AuditLogWriter::open(&config).unwrap();
        assert_eq!(resumed, head);
        writer.write_record(&resumed.append(entry("c3"))).unwrap();
        drop(writer);

        assert_eq!(verify_log(&config.path).unwrap(), 3);
        let records = read_records(&config.path).unwrap();
        assert_eq!(records[2].entry.content_id, "c3");
        assert_eq!(records[2].sequence, 3);
    }

    #[test]
    fn test_tampered_log_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditLogConfig::new(dir.path().join("decisions.jsonl"));

        let (mut writer, mut head) = AuditLogWriter::open(&config).unwrap();
        writer.write_record(&head.append(entry("c1"))).unwrap();
        writer.write_record(&head.append(entry("c2"))).unwrap();
        drop(writer);

        let content = std::fs::read_to_string(&config.path).unwrap();
        std::fs::write(&config.path, content.replacen("\"flag\"", "\"allowed\"", 1)).unwrap();

        assert!(verify_log(&config.path).is_err());
        let err = AuditLogWriter::open(&config).err().unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_failed_write_leaves_log_reopenable() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditLogConfig::new(dir.path().join("decisions.jsonl"));

        let (mut writer, mut head) = AuditLogWriter::open(&config).unwrap();
        let first = head.seal(entry("c1"));
        writer.write_record(&first).unwrap();
        head.commit(&first);
        let intact = std::fs::read(&config.path).unwrap();
        assert_eq!(writer.committed_len(), intact.len() as u64);

        // Half a line lands before the device gives out
        let mut side = OpenOptions::new().append(true).open(&config.path).unwrap();
        side.write_all(b"{\"sequence\":2,\"record_id\":\"").unwrap();
        drop(side);
        writer.fail_writes().unwrap();

        let second = head.seal(entry("c2"));
        assert!(writer.write_record(&second).is_err());
        assert_eq!(std::fs::read(&config.path).unwrap(), intact);
        drop(writer);

        let (mut writer, mut resumed) = AuditLogWriter::open(&config).unwrap();
        assert_eq!(resumed, head);
        let retried = resumed.seal(entry("c2"));
        assert_eq!(retried.sequence, 2);
        writer.write_record(&retried).unwrap();
        drop(writer);

        assert_eq!(verify_log(&config.path).unwrap(), 2);
    }

    #[test]
    fn test_torn_tail_discarded_on_open() {
        let dir = tempfile::tempdir().unwrap();
        let config = AuditLogConfig::new(dir.path().join("decisions.jsonl"));

        let (mut writer, mut head) = AuditLogWriter::open(&config).unwrap();
        writer.write_record(&head.append(entry("c1"))).unwrap();
        drop(writer);

        let mut content = std::fs::read_to_string(&config.path).unwrap();
        let intact_len = content.len();
        content.push_str("{\"sequence\":2,\"conte");
        std::fs::write(&config.path, &content).unwrap();

        let (writer, resumed) = AuditLogWriter::open(&config).unwrap();
        assert_eq!(resumed.sequence, 1);
        assert_eq!(writer.committed_len(), intact_len as u64);
        assert_eq!(verify_log(&config.path).unwrap(), 1);
    }

    #[test]
    fn test_garbage_line_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("decisions.jsonl");
        std::fs::write(&path, "not json\n").unwrap();

        let err = read_records(&path).unwrap_err();
        assert!(err.to_string().contains("line 1"));
    }
}
