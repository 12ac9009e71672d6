//! Append-only audit trail of gate decisions

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Outcome tag of an audited event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditOutcome {
    Allowed,
    Blocked,
    Disconnected,
    Error,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Allowed => "ALLOWED",
            AuditOutcome::Blocked => "BLOCKED",
            AuditOutcome::Disconnected => "DISCONNECTED",
            AuditOutcome::Error => "ERROR",
        }
    }
}

/// One audit entry
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub identity: String,
    pub outcome: AuditOutcome,
    pub detail: String,
}

impl AuditRecord {
    pub fn new(identity: &str, outcome: AuditOutcome, detail: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            identity: identity.to_string(),
            outcome,
            detail: detail.into(),
        }
    }
}

/// Destination for audit records.
///
/// Implementations may be written to by many decisions concurrently. A
/// failing sink never changes a gate decision; the gate only logs the error.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> Result<()>;
}

/// CSV file with `timestamp,ip_address,status,details` columns
pub struct FileAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditLog {
    /// Open (or create) the log file, writing the header to an empty file
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open audit log {:?}", path))?;

        let is_empty = file
            .metadata()
            .with_context(|| format!("Failed to stat audit log {:?}", path))?
            .len()
            == 0;
        if is_empty {
            writeln!(file, "timestamp,ip_address,status,details")
                .context("Failed to write audit log header")?;
        }

        info!(path = %path.display(), "Audit log opened");
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for FileAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        let line = format!(
            "{},{},{},{}\n",
            record.timestamp.to_rfc3339(),
            csv_field(&record.identity),
            record.outcome.as_str(),
            csv_field(&record.detail)
        );
        let mut file = self.file.lock();
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to audit log {:?}", self.path))
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Emits records as structured `tracing` events on the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditLog;

impl AuditSink for TracingAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        info!(
            target: "audit",
            identity = %record.identity,
            outcome = record.outcome.as_str(),
            detail = %record.detail,
            "Gate decision"
        );
        Ok(())
    }
}

/// Keeps records in memory; used by tests and diagnostics
#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditLog {
    fn record(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().push(record.clone());
        Ok(())
    }
}
