//! The audit write pipeline and verification surface.
//!
//! [`AuditLedger`] is the only way entries enter or leave the ledger.
//! `record` runs the commit pipeline one explicit step at a time:
//! validate (done by the event builder), enrich with id and timestamp,
//! resolve retention, hash, sign, persist, then fan out alerts and
//! anchoring for high-severity entries. Alerting and anchoring happen
//! after the entry is durable and can never fail the commit.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::anchor::AnchorSender;
use super::entry::{AuditEntry, AuditEvent};
use super::fallback::FallbackQueue;
use super::retention::RetentionPolicy;
use super::store::{LedgerReader, QueryFilter, SqliteLedgerStore};
use super::LedgerError;
use crate::alert::{AlertDispatcher, AuditAlert};
use crate::clock::{Clock, SystemClock};
use crate::crypto::{hex_decode, hex_encode, IntegrityHasher, LedgerSigner, SIGNATURE_SIZE};

/// Entries verified per batch during a chain walk.
const VERIFY_BATCH: u64 = 256;

/// Query results wrapped with a detached signature.
///
/// The signature covers the canonical JSON serialization of `records`,
/// so a consumer holding the signing key can prove the result set was
/// produced by this ledger and not edited in transit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedRecords {
    /// The matching entries, oldest first.
    pub records: Vec<AuditEntry>,
    /// Number of records returned.
    pub record_count: usize,
    /// Hex-encoded HMAC over the serialized records.
    pub signature: String,
}

/// The append-only audit ledger.
///
/// Thread-safe; clones of the underlying store handle share one
/// connection, so concurrent `record` calls serialize at the store lock
/// and chain order per tenant is preserved.
pub struct AuditLedger {
    store: SqliteLedgerStore,
    hasher: IntegrityHasher,
    signer: Arc<LedgerSigner>,
    fallback: FallbackQueue,
    alerts: AlertDispatcher,
    anchor: Option<AnchorSender>,
    clock: Arc<dyn Clock>,
}

impl AuditLedger {
    /// Creates a ledger over the given store, crypto material, and
    /// fallback queue.
    #[must_use]
    pub fn new(
        store: SqliteLedgerStore,
        hasher: IntegrityHasher,
        signer: Arc<LedgerSigner>,
        fallback: FallbackQueue,
    ) -> Self {
        Self {
            store,
            hasher,
            signer,
            fallback,
            alerts: AlertDispatcher::new(),
            anchor: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Attaches an anchor sender; top-tier entries are submitted to it
    /// post-commit.
    #[must_use]
    pub fn with_anchor(mut self, anchor: AnchorSender) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// Replaces the clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// The alert channel for this ledger.
    #[must_use]
    pub fn alerts(&self) -> &AlertDispatcher {
        &self.alerts
    }

    /// Commits an event to the ledger and returns its entry id.
    ///
    /// On store failure the sealed entry is diverted to the fallback
    /// queue and the error is surfaced as `PersistenceFailure`; a
    /// missing audit record is never silently accepted.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateEntry` on an id collision (the ledger is
    /// append-only), `PersistenceFailure` when the store rejected the
    /// write, or an I/O error if even the fallback write failed.
    #[instrument(skip(self, event), fields(tenant = %event.tenant_id, event_type = %event.event_type))]
    pub fn record(&self, event: AuditEvent) -> Result<String, LedgerError> {
        let timestamp_ms = self.clock.now_ms();
        let retention =
            RetentionPolicy::resolve(event.severity, event.event_type, &event.compliance_tags);
        let expires_at_ms = retention.expires_at_ms(timestamp_ms);

        let mut entry = AuditEntry {
            seq: 0,
            entry_id: Uuid::new_v4().to_string(),
            tenant_id: event.tenant_id,
            event_type: event.event_type,
            category: event.event_type.category(),
            severity: event.severity,
            actor_id: event.actor_id,
            resource_type: event.resource_type,
            resource_id: event.resource_id,
            action: event.action,
            timestamp_ms,
            details: event.details,
            compliance_tags: event.compliance_tags,
            compliant: !event.event_type.is_violation(),
            context: event.context,
            prev_hash: IntegrityHasher::GENESIS_PREV_HASH,
            integrity_hash: IntegrityHasher::GENESIS_PREV_HASH,
            signature: [0u8; SIGNATURE_SIZE],
            retention,
            expires_at_ms,
        };

        match self.append_sealed(&mut entry) {
            Ok(seq) => {
                debug!(entry_id = %entry.entry_id, seq, "entry committed");
                self.fan_out(&entry);
                Ok(entry.entry_id)
            }
            Err(e @ LedgerError::DuplicateEntry { .. }) => Err(e),
            Err(source) => {
                self.fallback.enqueue(&entry)?;
                Err(LedgerError::PersistenceFailure {
                    source: Box::new(source),
                })
            }
        }
    }

    /// Seals and appends an entry under the store lock.
    fn append_sealed(&self, entry: &mut AuditEntry) -> Result<u64, LedgerError> {
        self.store.append_chained(entry, |prev_hash, sealed| {
            let envelope = sealed.envelope();
            let hash = self.hasher.hash_entry(&envelope, prev_hash);
            let signature = self.signer.sign_envelope(&envelope, &hash);
            (hash, signature)
        })
    }

    /// Post-commit fan-out: alert subscribers and the anchor queue.
    fn fan_out(&self, entry: &AuditEntry) {
        if entry.severity.alerts() {
            self.alerts.publish_audit(AuditAlert {
                entry_id: entry.entry_id.clone(),
                tenant_id: entry.tenant_id.clone(),
                severity: entry.severity,
                event_type: entry.event_type,
                actor_id: entry.actor_id.clone(),
                summary: format!(
                    "{} by {} on {} {}",
                    entry.event_type, entry.actor_id, entry.resource_type, entry.resource_id
                ),
            });
        }
        if entry.severity.anchors() {
            if let Some(anchor) = &self.anchor {
                anchor.submit(&entry.entry_id, &entry.integrity_hash);
            }
        }
    }

    /// Verifies one entry's integrity hash and signature.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` if the id is unknown, or `Immutability`
    /// when the stored entry fails verification. A failure is escalated
    /// as a critical meta event before returning.
    pub fn verify_entry(&self, entry_id: &str) -> Result<(), LedgerError> {
        let entry = self.store.entry_by_id(entry_id)?;
        if let Err(e) = self.check_entry(&entry) {
            self.escalate(&entry, &e);
            return Err(e);
        }
        Ok(())
    }

    /// Walks a tenant's full chain from genesis, re-deriving every hash,
    /// chain link, and signature. Returns the number of entries verified.
    ///
    /// # Errors
    ///
    /// Returns `Immutability` at the first broken entry; the failure is
    /// escalated as a critical meta event before returning.
    #[instrument(skip(self))]
    pub fn verify_chain(&self, tenant_id: &str) -> Result<u64, LedgerError> {
        let mut expected_prev = IntegrityHasher::GENESIS_PREV_HASH;
        let mut after_seq = 0u64;
        let mut verified = 0u64;
        loop {
            let batch = self.store.read_chain(tenant_id, after_seq, VERIFY_BATCH)?;
            let Some(last) = batch.last() else {
                break;
            };
            after_seq = last.seq;
            for entry in &batch {
                if let Err(e) = self.check_link(entry, &expected_prev) {
                    self.escalate(entry, &e);
                    return Err(e);
                }
                expected_prev = entry.integrity_hash;
                verified += 1;
            }
        }
        info!(tenant = tenant_id, verified, "chain verified");
        Ok(verified)
    }

    /// Rejects an attempted rewrite of a stored entry.
    ///
    /// The ledger has no update path; this is the guard callers use to
    /// prove a candidate record still matches what was committed. A
    /// candidate whose immutable fields differ from the stored entry is
    /// an attempted mutation and escalates like any other integrity
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` for an unknown id, or `Immutability` when
    /// the candidate does not match the stored entry.
    pub fn verify_unmodified(&self, candidate: &AuditEntry) -> Result<(), LedgerError> {
        let stored = self.store.entry_by_id(&candidate.entry_id)?;
        if let Err(e) = self
            .hasher
            .verify_entry(&candidate.envelope(), &stored.prev_hash, &stored.integrity_hash)
            .map_err(LedgerError::Immutability)
        {
            warn!(entry_id = %candidate.entry_id, "mutation attempt rejected");
            self.escalate(&stored, &e);
            return Err(e);
        }
        Ok(())
    }

    /// Re-ingests entries from the fallback queue.
    ///
    /// Entries keep their original id and timestamp but are re-sealed at
    /// their new chain position. Entries that made it to the store before
    /// the original failure surfaced are skipped. Returns the number of
    /// entries recovered.
    ///
    /// # Errors
    ///
    /// Returns an error if the queue cannot be read, or
    /// `PersistenceFailure` if the store is still rejecting writes (the
    /// remaining entries go back to the queue).
    pub fn drain_fallback(&self) -> Result<usize, LedgerError> {
        let pending = self.fallback.drain()?;
        if pending.is_empty() {
            return Ok(0);
        }
        let total = pending.len();
        let mut recovered = 0usize;
        let mut iter = pending.into_iter();
        while let Some(mut entry) = iter.next() {
            match self.append_sealed(&mut entry) {
                Ok(_) => recovered += 1,
                Err(LedgerError::DuplicateEntry { entry_id }) => {
                    debug!(entry_id, "fallback entry already committed; skipping");
                }
                Err(source) => {
                    self.fallback.enqueue(&entry)?;
                    for rest in iter {
                        self.fallback.enqueue(&rest)?;
                    }
                    return Err(LedgerError::PersistenceFailure {
                        source: Box::new(source),
                    });
                }
            }
        }
        info!(recovered, total, "fallback queue drained");
        if recovered > 0 {
            self.record_drain(recovered, total);
        }
        Ok(recovered)
    }

    /// Best-effort meta event marking a fallback-queue recovery.
    fn record_drain(&self, recovered: usize, total: usize) {
        let event = AuditEvent::builder(super::entry::EventType::PersistenceFallback)
            .tenant("PLATFORM")
            .actor("system")
            .resource("AUDIT_LOG", "fallback-queue")
            .action("DRAIN")
            .details(serde_json::json!({ "recovered": recovered, "total": total }))
            .build();
        match event {
            Ok(event) => {
                if let Err(e) = self.record(event) {
                    warn!(error = %e, "failed to record fallback drain");
                }
            }
            Err(e) => warn!(error = %e, "failed to build fallback drain event"),
        }
    }

    /// Queries a tenant's entries and signs the result set.
    ///
    /// # Errors
    ///
    /// Returns an error if the query or serialization fails.
    pub fn query(
        &self,
        tenant_id: &str,
        filter: &QueryFilter,
    ) -> Result<SignedRecords, LedgerError> {
        let records = self.store.query(tenant_id, filter)?;
        self.sign_records(records)
    }

    /// Verifies the detached signature on a previously returned result
    /// set.
    ///
    /// # Errors
    ///
    /// Returns `Immutability` if the signature does not match the
    /// records.
    pub fn verify_records(&self, signed: &SignedRecords) -> Result<(), LedgerError> {
        let payload = serde_json::to_vec(&signed.records)?;
        let signature = hex_decode(&signed.signature).map_err(LedgerError::Immutability)?;
        self.signer
            .verify(&payload, &signature, "signed-records")
            .map_err(LedgerError::Immutability)
    }

    /// Reads one entry by id.
    ///
    /// # Errors
    ///
    /// Returns `EntryNotFound` if no entry has that id.
    pub fn entry(&self, entry_id: &str) -> Result<AuditEntry, LedgerError> {
        self.store.entry_by_id(entry_id)
    }

    /// Number of entries stored for a tenant.
    ///
    /// # Errors
    ///
    /// Returns an error if the count query fails.
    pub fn count(&self, tenant_id: &str) -> Result<u64, LedgerError> {
        self.store.count(tenant_id)
    }

    /// Entries past their expiry that are neither held nor immutable,
    /// for the external archival job. The ledger never deletes rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn expired_candidates(&self, limit: u64) -> Result<Vec<AuditEntry>, LedgerError> {
        self.store.expired_candidates(self.clock.now_ms(), limit)
    }

    /// Opens a read-only view for long-running forensic and compliance
    /// scans.
    ///
    /// # Errors
    ///
    /// Returns an error for in-memory stores or if the connection cannot
    /// be opened.
    pub fn open_reader(&self) -> Result<LedgerReader, LedgerError> {
        self.store.open_reader()
    }

    /// Signs a result set with the ledger key.
    pub(crate) fn sign_records(
        &self,
        records: Vec<AuditEntry>,
    ) -> Result<SignedRecords, LedgerError> {
        let payload = serde_json::to_vec(&records)?;
        let signature = hex_encode(&self.signer.sign(&payload));
        Ok(SignedRecords {
            record_count: records.len(),
            records,
            signature,
        })
    }

    /// Hash, signature, and chain-link checks for one entry.
    fn check_link(&self, entry: &AuditEntry, expected_prev: &crate::crypto::Hash) -> Result<(), LedgerError> {
        IntegrityHasher::verify_chain_link(&entry.entry_id, &entry.prev_hash, expected_prev)?;
        self.check_entry(entry)
    }

    /// Hash and signature checks for one entry against its stored
    /// `prev_hash`.
    fn check_entry(&self, entry: &AuditEntry) -> Result<(), LedgerError> {
        let envelope = entry.envelope();
        self.hasher
            .verify_entry(&envelope, &entry.prev_hash, &entry.integrity_hash)?;
        self.signer
            .verify_envelope(&envelope, &entry.integrity_hash, &entry.signature)?;
        Ok(())
    }

    /// Records a critical meta event for an integrity failure.
    ///
    /// Best-effort: verification already failed, so a second failure here
    /// is logged rather than masking the original error.
    fn escalate(&self, entry: &AuditEntry, failure: &LedgerError) {
        error!(
            entry_id = %entry.entry_id,
            tenant = %entry.tenant_id,
            error = %failure,
            "ledger integrity failure"
        );
        let event = AuditEvent::builder(super::entry::EventType::ImmutabilityAlert)
            .tenant(entry.tenant_id.clone())
            .actor("system")
            .resource("AUDIT_LOG", entry.entry_id.clone())
            .action("VERIFY")
            .details(serde_json::json!({ "failure": failure.to_string() }))
            .build();
        match event {
            Ok(event) => {
                if let Err(e) = self.record(event) {
                    error!(error = %e, "failed to record immutability alert");
                }
            }
            Err(e) => error!(error = %e, "failed to build immutability alert"),
        }
    }
}
