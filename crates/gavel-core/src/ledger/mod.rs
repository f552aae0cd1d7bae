//! Append-only, hash-chained audit ledger.
//!
//! Every access decision and system event is recorded here as an
//! [`AuditEntry`]: validated, enriched, hashed, signed, retention-tagged,
//! then persisted, in that order, each step an explicit call inside
//! [`AuditLedger::record`]. Entries are never updated or deleted through
//! this module; the only write operation is append.
//!
//! # Integrity model
//!
//! Each entry carries a salted SHA-256 integrity hash over its immutable
//! envelope, chained to the previous entry for the same tenant, plus an
//! HMAC signature proving origin. [`AuditLedger::verify_chain`] walks a
//! tenant's chain re-deriving both; any mismatch is an
//! [`LedgerError::Immutability`] and escalates as a critical meta event.
//!
//! # Failure handling
//!
//! A failed persist is the most serious operational failure this crate
//! knows: the entry is diverted to a durable JSONL fallback queue and the
//! error is still surfaced. A missing audit record is itself a compliance
//! violation, so the write path never swallows one.

mod anchor;
mod entry;
mod fallback;
mod pipeline;
mod retention;
mod store;


pub use anchor::{AnchorReference, AnchorSender, AnchorService, AnchorWorker, MemoryAnchorService};
pub use entry::{
    AuditEntry, AuditEvent, AuditEventBuilder, ComplianceStandard, EventCategory, EventContext,
    EventType, Severity, MAX_COMPLIANCE_TAGS, MAX_FIELD_LEN,
};
pub use fallback::FallbackQueue;
pub use pipeline::{AuditLedger, SignedRecords};
pub use retention::{RetentionPolicy, StorageTier};
pub use store::{LedgerReader, QueryFilter, SqliteLedgerStore, DEFAULT_QUERY_LIMIT};

use thiserror::Error;

use crate::crypto::CryptoError;

/// Errors raised by ledger construction, persistence, and verification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum LedgerError {
    /// Database error from `SQLite`.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// I/O error during ledger operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A required event field is blank.
    #[error("missing required field: {field}")]
    MissingField {
        /// The blank field.
        field: String,
    },

    /// An identifier field exceeds the length bound.
    #[error("field {field} is {len} bytes, exceeding the limit")]
    FieldTooLong {
        /// The oversized field.
        field: String,
        /// Its length.
        len: usize,
    },

    /// Too many compliance tags on one event.
    #[error("{count} compliance tags exceeds the per-entry limit")]
    TooManyTags {
        /// Number of tags supplied.
        count: usize,
    },

    /// Unrecognized event type string.
    #[error("unknown event type: {value}")]
    UnknownEventType {
        /// The offending input.
        value: String,
    },

    /// Unrecognized severity string.
    #[error("unknown severity: {value}")]
    UnknownSeverity {
        /// The offending input.
        value: String,
    },

    /// Unrecognized compliance standard string.
    #[error("unknown compliance standard: {value}")]
    UnknownStandard {
        /// The offending input.
        value: String,
    },

    /// Entry not found.
    #[error("entry not found: {entry_id}")]
    EntryNotFound {
        /// The id that was not found.
        entry_id: String,
    },

    /// An entry with this id already exists; the ledger is append-only.
    #[error("entry {entry_id} already exists: ledger is append-only")]
    DuplicateEntry {
        /// The duplicated id.
        entry_id: String,
    },

    /// A stored row could not be decoded back into an entry.
    #[error("corrupt ledger row at seq {seq}: {details}")]
    CorruptRow {
        /// Sequence number of the bad row.
        seq: u64,
        /// What failed to decode.
        details: String,
    },

    /// Integrity hash, signature, or chain-link verification failed.
    ///
    /// Indicates ledger corruption or a coding defect; always fatal,
    /// always escalated as a critical meta event.
    #[error("immutability violation: {0}")]
    Immutability(#[from] CryptoError),

    /// The durable store rejected a write.
    ///
    /// The entry has been diverted to the fallback queue; the caller and
    /// operators must still see the failure.
    #[error("audit persistence failure (entry diverted to fallback queue): {source}")]
    PersistenceFailure {
        /// The underlying store error.
        #[source]
        source: Box<LedgerError>,
    },

    /// Serialization of a payload or fallback line failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
