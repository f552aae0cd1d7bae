//! `SQLite`-backed append-only entry store.
//!
//! WAL mode allows forensic and compliance readers to scan concurrently
//! with writes. Per-tenant chain order is guaranteed by performing the
//! prev-hash lookup and the insert under the same connection lock, so two
//! writers for one tenant can never interleave between those steps.
//!
//! The store exposes no update or delete for existing entries; retention
//! enforcement surfaces purge candidates for the external archival job
//! rather than deleting rows itself.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::types::Value as SqlValue;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};
use tracing::debug;

use super::entry::{AuditEntry, ComplianceStandard, EventCategory, EventType, Severity};
use super::retention::{RetentionPolicy, StorageTier};
use super::LedgerError;
use crate::crypto::{Hash, Signature, HASH_SIZE, SIGNATURE_SIZE};

/// Schema SQL embedded at compile time.
const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Default row limit for unbounded queries.
pub const DEFAULT_QUERY_LIMIT: u64 = 1_000;

/// Filters for ledger queries. All fields are conjunctive; unset fields
/// match everything.
#[derive(Debug, Clone, Default)]
pub struct QueryFilter {
    /// Exact actor id.
    pub actor_id: Option<String>,
    /// Exact event type.
    pub event_type: Option<EventType>,
    /// Exact severity tier.
    pub severity: Option<Severity>,
    /// Exact resource type.
    pub resource_type: Option<String>,
    /// Exact resource id.
    pub resource_id: Option<String>,
    /// Inclusive lower timestamp bound (ms since epoch).
    pub from_ms: Option<u64>,
    /// Inclusive upper timestamp bound (ms since epoch).
    pub to_ms: Option<u64>,
    /// Row limit; defaults to [`DEFAULT_QUERY_LIMIT`].
    pub limit: Option<u64>,
}

impl QueryFilter {
    /// A filter covering a closed time period.
    #[must_use]
    pub fn period(from_ms: u64, to_ms: u64) -> Self {
        Self {
            from_ms: Some(from_ms),
            to_ms: Some(to_ms),
            ..Self::default()
        }
    }
}

/// The append-only audit entry store.
pub struct SqliteLedgerStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<std::path::PathBuf>,
}

impl SqliteLedgerStore {
    /// Opens or creates a store at the given path, enabling WAL mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Creates an in-memory store for tests.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be initialized.
    pub fn in_memory() -> Result<Self, LedgerError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path: None,
        })
    }

    /// Appends an entry, sealing it into the tenant's hash chain.
    ///
    /// The `seal` closure receives the previous entry hash for the
    /// tenant (genesis hash for the first entry) and the entry being
    /// written, and returns the entry's integrity hash and signature.
    /// Lookup, sealing, and insert happen under one lock, so chain links
    /// for a tenant are strictly ordered.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEntry` if the entry id already exists, or a
    /// `Database` error on insert failure.
    pub fn append_chained<F>(&self, entry: &mut AuditEntry, seal: F) -> Result<u64, LedgerError>
    where
        F: FnOnce(&Hash, &AuditEntry) -> (Hash, Signature),
    {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        let prev_hash = last_hash_for_tenant(&conn, &entry.tenant_id)?;
        let (integrity_hash, signature) = seal(&prev_hash, entry);
        entry.prev_hash = prev_hash;
        entry.integrity_hash = integrity_hash;
        entry.signature = signature;

        let result = conn.execute(
            "INSERT INTO audit_entries (
                entry_id, tenant_id, event_type, category, severity,
                actor_id, resource_type, resource_id, action, timestamp_ms,
                details, compliance_tags, compliant, context,
                prev_hash, integrity_hash, signature,
                retention_days, storage_tier, legal_hold, immutable, expires_at_ms
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                       ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            params![
                entry.entry_id,
                entry.tenant_id,
                entry.event_type.as_str(),
                entry.category.as_str(),
                entry.severity.as_str(),
                entry.actor_id,
                entry.resource_type,
                entry.resource_id,
                entry.action,
                entry.timestamp_ms,
                entry.details.to_string(),
                encode_tags(&entry.compliance_tags),
                entry.compliant,
                serde_json::to_string(&entry.context)?,
                entry.prev_hash.as_slice(),
                entry.integrity_hash.as_slice(),
                entry.signature.as_slice(),
                entry.retention.duration_days,
                entry.retention.tier.as_str(),
                entry.retention.legal_hold,
                entry.retention.immutable,
                entry.expires_at_ms,
            ],
        );

        match result {
            Ok(_) => {
                let seq = conn.last_insert_rowid() as u64;
                entry.seq = seq;
                debug!(
                    entry_id = %entry.entry_id,
                    tenant = %entry.tenant_id,
                    seq,
                    "ledger append"
                );
                Ok(seq)
            }
            Err(rusqlite::Error::SqliteFailure(e, msg))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                let _ = msg;
                Err(LedgerError::DuplicateEntry {
                    entry_id: entry.entry_id.clone(),
                })
            }
            Err(other) => Err(LedgerError::Database(other)),
        }
    }

    /// Reads one entry by id.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` if no entry has that id.
    pub fn entry_by_id(&self, entry_id: &str) -> Result<AuditEntry, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        entry_by_id(&conn, entry_id)
    }

    /// Queries a tenant's entries in timestamp order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn query(&self, tenant_id: &str, filter: &QueryFilter) -> Result<Vec<AuditEntry>, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        query_entries(&conn, tenant_id, filter)
    }

    /// Reads a tenant's entries in chain (sequence) order, starting after
    /// `after_seq`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn read_chain(
        &self,
        tenant_id: &str,
        after_seq: u64,
        limit: u64,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        read_chain(&conn, tenant_id, after_seq, limit)
    }

    /// Entries tagged with a compliance standard within a period.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn tagged(
        &self,
        tenant_id: &str,
        standard: ComplianceStandard,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tagged_entries(&conn, tenant_id, standard, from_ms, to_ms)
    }

    /// Entries past their expiry that are neither held nor immutable.
    ///
    /// Candidates for the external archival/purge job; this store never
    /// deletes rows itself.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn expired_candidates(
        &self,
        now_ms: u64,
        limit: u64,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut stmt = conn.prepare(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM audit_entries
                 WHERE expires_at_ms IS NOT NULL AND expires_at_ms < ?1
                   AND legal_hold = 0 AND immutable = 0
                 ORDER BY expires_at_ms ASC
                 LIMIT ?2"
            ),
        )?;
        let rows = stmt.query_map(params![now_ms, limit], decode_row)?;
        collect_rows(rows)
    }

    /// Number of entries stored for a tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn count(&self, tenant_id: &str) -> Result<u64, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_entries WHERE tenant_id = ?1",
            params![tenant_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Hash of the most recent entry in a tenant's chain, or the genesis
    /// hash if the tenant has no entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn last_hash(&self, tenant_id: &str) -> Result<Hash, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        last_hash_for_tenant(&conn, tenant_id)
    }

    /// Opens a read-only connection for long-running forensic and
    /// compliance scans, off the write path.
    ///
    /// # Errors
    ///
    /// Returns an error for in-memory stores (no shared file to reopen)
    /// or if the connection cannot be opened.
    pub fn open_reader(&self) -> Result<LedgerReader, LedgerError> {
        let path = self.path.as_ref().ok_or_else(|| {
            LedgerError::Io(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "cannot open a reader for an in-memory store",
            ))
        })?;
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        Ok(LedgerReader {
            conn: Mutex::new(conn),
        })
    }
}

/// Read-only view of the ledger for query workloads.
///
/// Holds its own connection so scans never contend with the writer lock.
pub struct LedgerReader {
    conn: Mutex<Connection>,
}

impl LedgerReader {
    /// Queries a tenant's entries in timestamp order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn query(&self, tenant_id: &str, filter: &QueryFilter) -> Result<Vec<AuditEntry>, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        query_entries(&conn, tenant_id, filter)
    }

    /// Reads a tenant's entries in chain order, starting after `after_seq`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn read_chain(
        &self,
        tenant_id: &str,
        after_seq: u64,
        limit: u64,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        read_chain(&conn, tenant_id, after_seq, limit)
    }

    /// Entries tagged with a compliance standard within a period.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row is corrupt.
    pub fn tagged(
        &self,
        tenant_id: &str,
        standard: ComplianceStandard,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<Vec<AuditEntry>, LedgerError> {
        let conn = self
            .conn
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        tagged_entries(&conn, tenant_id, standard, from_ms, to_ms)
    }
}

// -----------------------------------------------------------------------------
// Row mapping and shared query helpers
// -----------------------------------------------------------------------------

// The category column is written for external SQL consumers but not read
// back; it is always derivable from event_type.
const ENTRY_COLUMNS: &str = "seq, entry_id, tenant_id, event_type, severity, \
     actor_id, resource_type, resource_id, action, timestamp_ms, details, \
     compliance_tags, compliant, context, prev_hash, integrity_hash, signature, \
     retention_days, storage_tier, legal_hold, immutable, expires_at_ms";

/// Encodes tags as `,TAG_A,TAG_B,` so a single tag can be matched with
/// `LIKE '%,TAG,%'` against the tag index.
fn encode_tags(tags: &[ComplianceStandard]) -> String {
    let mut out = String::from(",");
    for tag in tags {
        out.push_str(tag.as_str());
        out.push(',');
    }
    out
}

fn decode_tags(encoded: &str) -> Result<Vec<ComplianceStandard>, LedgerError> {
    encoded
        .split(',')
        .filter(|s| !s.is_empty())
        .map(ComplianceStandard::parse)
        .collect()
}

fn fixed_bytes<const N: usize>(seq: u64, field: &str, bytes: Vec<u8>) -> Result<[u8; N], LedgerError> {
    bytes.try_into().map_err(|_| LedgerError::CorruptRow {
        seq,
        details: format!("{field} is not {N} bytes"),
    })
}

fn decode_row(row: &Row<'_>) -> rusqlite::Result<RawRow> {
    Ok(RawRow {
        seq: row.get::<_, i64>(0)? as u64,
        entry_id: row.get(1)?,
        tenant_id: row.get(2)?,
        event_type: row.get(3)?,
        severity: row.get(4)?,
        actor_id: row.get(5)?,
        resource_type: row.get(6)?,
        resource_id: row.get(7)?,
        action: row.get(8)?,
        timestamp_ms: row.get::<_, i64>(9)? as u64,
        details: row.get(10)?,
        compliance_tags: row.get(11)?,
        compliant: row.get(12)?,
        context: row.get(13)?,
        prev_hash: row.get(14)?,
        integrity_hash: row.get(15)?,
        signature: row.get(16)?,
        retention_days: row.get(17)?,
        storage_tier: row.get(18)?,
        legal_hold: row.get(19)?,
        immutable: row.get(20)?,
        expires_at_ms: row.get::<_, Option<i64>>(21)?.map(|v| v as u64),
    })
}

/// Intermediate row form; enum and hash decoding happens afterwards so
/// decode failures map to `CorruptRow` rather than a database error.
struct RawRow {
    seq: u64,
    entry_id: String,
    tenant_id: String,
    event_type: String,
    severity: String,
    actor_id: String,
    resource_type: String,
    resource_id: String,
    action: String,
    timestamp_ms: u64,
    details: String,
    compliance_tags: String,
    compliant: bool,
    context: String,
    prev_hash: Vec<u8>,
    integrity_hash: Vec<u8>,
    signature: Vec<u8>,
    retention_days: Option<u32>,
    storage_tier: String,
    legal_hold: bool,
    immutable: bool,
    expires_at_ms: Option<u64>,
}

impl RawRow {
    fn into_entry(self) -> Result<AuditEntry, LedgerError> {
        let seq = self.seq;
        let event_type = EventType::parse(&self.event_type).map_err(|_| LedgerError::CorruptRow {
            seq,
            details: format!("bad event type {}", self.event_type),
        })?;
        let severity = Severity::parse(&self.severity).map_err(|_| LedgerError::CorruptRow {
            seq,
            details: format!("bad severity {}", self.severity),
        })?;
        let details =
            serde_json::from_str(&self.details).map_err(|e| LedgerError::CorruptRow {
                seq,
                details: format!("bad details payload: {e}"),
            })?;
        let context =
            serde_json::from_str(&self.context).map_err(|e| LedgerError::CorruptRow {
                seq,
                details: format!("bad context payload: {e}"),
            })?;
        let compliance_tags = decode_tags(&self.compliance_tags)?;

        Ok(AuditEntry {
            seq,
            entry_id: self.entry_id,
            tenant_id: self.tenant_id,
            event_type,
            category: event_type.category(),
            severity,
            actor_id: self.actor_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            action: self.action,
            timestamp_ms: self.timestamp_ms,
            details,
            compliance_tags,
            compliant: self.compliant,
            context,
            prev_hash: fixed_bytes::<HASH_SIZE>(seq, "prev_hash", self.prev_hash)?,
            integrity_hash: fixed_bytes::<HASH_SIZE>(seq, "integrity_hash", self.integrity_hash)?,
            signature: fixed_bytes::<SIGNATURE_SIZE>(seq, "signature", self.signature)?,
            retention: RetentionPolicy {
                duration_days: self.retention_days,
                tier: StorageTier::parse_lossy(&self.storage_tier),
                legal_hold: self.legal_hold,
                immutable: self.immutable,
            },
            expires_at_ms: self.expires_at_ms,
        })
    }
}

fn collect_rows(
    rows: impl Iterator<Item = rusqlite::Result<RawRow>>,
) -> Result<Vec<AuditEntry>, LedgerError> {
    rows.map(|raw| raw.map_err(LedgerError::Database)?.into_entry())
        .collect()
}

fn last_hash_for_tenant(conn: &Connection, tenant_id: &str) -> Result<Hash, LedgerError> {
    let stored: Option<Vec<u8>> = conn
        .query_row(
            "SELECT integrity_hash FROM audit_entries
             WHERE tenant_id = ?1 ORDER BY seq DESC LIMIT 1",
            params![tenant_id],
            |row| row.get(0),
        )
        .optional()?;
    match stored {
        Some(bytes) => fixed_bytes::<HASH_SIZE>(0, "integrity_hash", bytes),
        None => Ok([0u8; HASH_SIZE]),
    }
}

fn entry_by_id(conn: &Connection, entry_id: &str) -> Result<AuditEntry, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM audit_entries WHERE entry_id = ?1"
    ))?;
    let raw = stmt
        .query_row(params![entry_id], decode_row)
        .optional()?
        .ok_or_else(|| LedgerError::EntryNotFound {
            entry_id: entry_id.to_string(),
        })?;
    raw.into_entry()
}

fn read_chain(
    conn: &Connection,
    tenant_id: &str,
    after_seq: u64,
    limit: u64,
) -> Result<Vec<AuditEntry>, LedgerError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM audit_entries
         WHERE tenant_id = ?1 AND seq > ?2
         ORDER BY seq ASC LIMIT ?3"
    ))?;
    let rows = stmt.query_map(params![tenant_id, after_seq, limit], decode_row)?;
    collect_rows(rows)
}

fn tagged_entries(
    conn: &Connection,
    tenant_id: &str,
    standard: ComplianceStandard,
    from_ms: u64,
    to_ms: u64,
) -> Result<Vec<AuditEntry>, LedgerError> {
    let pattern = format!("%,{},%", standard.as_str());
    let mut stmt = conn.prepare(&format!(
        "SELECT {ENTRY_COLUMNS} FROM audit_entries
         WHERE tenant_id = ?1 AND compliance_tags LIKE ?2
           AND timestamp_ms >= ?3 AND timestamp_ms <= ?4
         ORDER BY timestamp_ms ASC"
    ))?;
    let rows = stmt.query_map(params![tenant_id, pattern, from_ms, to_ms], decode_row)?;
    collect_rows(rows)
}

fn query_entries(
    conn: &Connection,
    tenant_id: &str,
    filter: &QueryFilter,
) -> Result<Vec<AuditEntry>, LedgerError> {
    let mut sql = format!(
        "SELECT {ENTRY_COLUMNS} FROM audit_entries WHERE tenant_id = ?1"
    );
    let mut params_vec: Vec<SqlValue> = vec![SqlValue::Text(tenant_id.to_string())];

    let push = |sql: &mut String, clause: &str, value: SqlValue, params_vec: &mut Vec<SqlValue>| {
        params_vec.push(value);
        sql.push_str(" AND ");
        sql.push_str(clause);
        sql.push_str(&format!("?{}", params_vec.len()));
    };

    if let Some(actor) = &filter.actor_id {
        push(&mut sql, "actor_id = ", SqlValue::Text(actor.clone()), &mut params_vec);
    }
    if let Some(event_type) = filter.event_type {
        push(
            &mut sql,
            "event_type = ",
            SqlValue::Text(event_type.as_str().to_string()),
            &mut params_vec,
        );
    }
    if let Some(severity) = filter.severity {
        push(
            &mut sql,
            "severity = ",
            SqlValue::Text(severity.as_str().to_string()),
            &mut params_vec,
        );
    }
    if let Some(resource_type) = &filter.resource_type {
        push(
            &mut sql,
            "resource_type = ",
            SqlValue::Text(resource_type.clone()),
            &mut params_vec,
        );
    }
    if let Some(resource_id) = &filter.resource_id {
        push(
            &mut sql,
            "resource_id = ",
            SqlValue::Text(resource_id.clone()),
            &mut params_vec,
        );
    }
    if let Some(from_ms) = filter.from_ms {
        push(
            &mut sql,
            "timestamp_ms >= ",
            SqlValue::Integer(from_ms as i64),
            &mut params_vec,
        );
    }
    if let Some(to_ms) = filter.to_ms {
        push(
            &mut sql,
            "timestamp_ms <= ",
            SqlValue::Integer(to_ms as i64),
            &mut params_vec,
        );
    }

    params_vec.push(SqlValue::Integer(
        filter.limit.unwrap_or(DEFAULT_QUERY_LIMIT) as i64,
    ));
    sql.push_str(&format!(
        " ORDER BY timestamp_ms ASC, seq ASC LIMIT ?{}",
        params_vec.len()
    ));

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(rusqlite::params_from_iter(params_vec), decode_row)?;
    collect_rows(rows)
}
