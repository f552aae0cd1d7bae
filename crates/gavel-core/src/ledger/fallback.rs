//! Durable fallback queue for audit entries that failed to persist.
//!
//! A missing audit record is itself a compliance violation, so a store
//! failure never drops the entry: it is appended to a JSONL emergency
//! file and re-ingested by [`super::AuditLedger::drain_fallback`] once
//! the store recovers.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{error, warn};

use super::entry::AuditEntry;
use super::LedgerError;

/// Append-only JSONL file of entries awaiting re-ingestion.
pub struct FallbackQueue {
    path: PathBuf,
    // Serializes append/drain within the process; each line is written in
    // one O_APPEND syscall so partially interleaved lines cannot occur.
    lock: Mutex<()>,
}

impl FallbackQueue {
    /// Opens (or will create on first write) a queue at the given path.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends an entry to the queue.
    ///
    /// # Errors
    ///
    /// Returns an I/O or serialization error; at that point the failure
    /// is unrecoverable within this process and is logged at error level
    /// for the operator.
    pub fn enqueue(&self, entry: &AuditEntry) -> Result<(), LedgerError> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let line = serde_json::to_string(entry)?;
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| writeln!(file, "{line}"));
        match result {
            Ok(()) => {
                warn!(
                    entry_id = %entry.entry_id,
                    tenant = %entry.tenant_id,
                    "audit entry diverted to fallback queue"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    entry_id = %entry.entry_id,
                    error = %e,
                    "fallback queue write failed; audit entry at risk"
                );
                Err(LedgerError::Io(e))
            }
        }
    }

    /// Removes and returns all queued entries.
    ///
    /// Unparseable lines are skipped with an error log rather than
    /// blocking recovery of the remaining entries.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read or truncated.
    pub fn drain(&self) -> Result<Vec<AuditEntry>, LedgerError> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = std::fs::File::open(&self.path)?;
        let mut entries = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditEntry>(&line) {
                Ok(entry) => entries.push(entry),
                Err(e) => error!(error = %e, "skipping unparseable fallback line"),
            }
        }
        std::fs::write(&self.path, b"")?;
        Ok(entries)
    }

    /// Number of queued lines.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn len(&self) -> Result<usize, LedgerError> {
        let _guard = self
            .lock
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if !self.path.exists() {
            return Ok(0);
        }
        let file = std::fs::File::open(&self.path)?;
        Ok(BufReader::new(file)
            .lines()
            .map_while(Result::ok)
            .filter(|l| !l.trim().is_empty())
            .count())
    }

    /// Whether the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read.
    pub fn is_empty(&self) -> Result<bool, LedgerError> {
        Ok(self.len()? == 0)
    }
}
