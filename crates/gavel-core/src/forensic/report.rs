//! Investigation and discovery-bundle data types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::ledger::{AuditEntry, EventType, Severity};

/// What an investigation should look at.
///
/// Applied while walking the tenant's chain; unset fields match
/// everything within the period.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvestigationCriteria {
    /// Inclusive period start (ms since epoch).
    pub from_ms: u64,
    /// Inclusive period end (ms since epoch).
    pub to_ms: u64,
    /// Restrict to one actor.
    pub actor_id: Option<String>,
    /// Restrict to one event type.
    pub event_type: Option<EventType>,
    /// Restrict to one severity tier.
    pub severity: Option<Severity>,
    /// Restrict to one resource type.
    pub resource_type: Option<String>,
    /// Restrict to one resource.
    pub resource_id: Option<String>,
    /// Matter or case number the investigation belongs to.
    pub case_number: Option<String>,
    /// Record cap; unset scans the whole period.
    pub limit: Option<u64>,
}

impl InvestigationCriteria {
    /// A criteria set covering a closed period.
    #[must_use]
    pub fn period(from_ms: u64, to_ms: u64) -> Self {
        Self {
            from_ms,
            to_ms,
            ..Self::default()
        }
    }

    /// Whether an entry falls inside the criteria.
    #[must_use]
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        entry.timestamp_ms >= self.from_ms
            && entry.timestamp_ms <= self.to_ms
            && self
                .actor_id
                .as_ref()
                .map_or(true, |actor| *actor == entry.actor_id)
            && self.event_type.map_or(true, |t| t == entry.event_type)
            && self.severity.map_or(true, |s| s == entry.severity)
            && self
                .resource_type
                .as_ref()
                .map_or(true, |r| *r == entry.resource_type)
            && self
                .resource_id
                .as_ref()
                .map_or(true, |r| *r == entry.resource_id)
    }
}

/// Aggregate activity breakdowns over the matched entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityStatistics {
    /// Total matched entries.
    pub total: u64,
    /// Entries per event type.
    pub by_event_type: BTreeMap<String, u64>,
    /// Entries per severity tier.
    pub by_severity: BTreeMap<String, u64>,
    /// Entries per actor.
    pub by_actor: BTreeMap<String, u64>,
    /// Entries per resource type.
    pub by_resource_type: BTreeMap<String, u64>,
    /// Entries per UTC hour of day (0-23).
    pub by_hour: BTreeMap<u8, u64>,
    /// Entries per UTC calendar day (`YYYY-MM-DD`).
    pub by_day: BTreeMap<String, u64>,
}

/// Classification of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum AnomalyKind {
    /// Elevated activity volume during the configured unusual-hours
    /// window.
    UnusualHoursVolume,
    /// More events than the burst threshold inside a sub-second window.
    RapidBurst,
}

/// A detected anomaly with the entries that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Anomaly {
    /// What kind of anomaly.
    pub kind: AnomalyKind,
    /// Human-readable description.
    pub description: String,
    /// Entry ids involved, capped for readability.
    pub entry_ids: Vec<String>,
}

/// One link in the chain of custody: the entry and its stored hash, in
/// ledger order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustodyLink {
    /// Store sequence number.
    pub seq: u64,
    /// Entry id.
    pub entry_id: String,
    /// Hex-encoded stored integrity hash.
    pub integrity_hash: String,
}

impl CustodyLink {
    pub(crate) fn for_entry(entry: &AuditEntry) -> Self {
        Self {
            seq: entry.seq,
            entry_id: entry.entry_id.clone(),
            integrity_hash: crate::crypto::hex_encode(&entry.integrity_hash),
        }
    }
}

/// The signed outcome of an investigation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvestigationReport {
    /// Report id (UUID).
    pub investigation_id: String,
    /// Tenant investigated.
    pub tenant_id: String,
    /// The criteria that produced this report.
    pub criteria: InvestigationCriteria,
    /// When the report was generated (ms since epoch).
    pub generated_at_ms: u64,
    /// Number of matched entries.
    pub record_count: u64,
    /// Aggregate breakdowns.
    pub statistics: ActivityStatistics,
    /// Detected anomalies.
    pub anomalies: Vec<Anomaly>,
    /// Ordered chain of custody over the matched entries.
    pub chain_of_custody: Vec<CustodyLink>,
    /// Hex-encoded HMAC over the full result set.
    pub signature: String,
}

/// Descriptive metadata on a discovery bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleMetadata {
    /// Matter or case number the production belongs to.
    pub case_number: String,
    /// Inclusive period start (ms since epoch).
    pub period_from_ms: u64,
    /// Inclusive period end (ms since epoch).
    pub period_to_ms: u64,
    /// Number of records in the bundle.
    pub record_count: u64,
    /// Hex-encoded SHA-256 over the serialized records.
    pub integrity_hash: String,
}

/// A court-production export of ledger records.
///
/// Self-contained and verifiable offline by any holder of the signing
/// key: the metadata hash covers the records, the signature covers both.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryBundle {
    /// Bundle id (UUID).
    pub bundle_id: String,
    /// Tenant the records belong to.
    pub tenant_id: String,
    /// Descriptive metadata, including the records hash.
    pub metadata: BundleMetadata,
    /// The exported records, in ledger order.
    pub records: Vec<AuditEntry>,
    /// Aggregate breakdowns over the records.
    pub summary: ActivityStatistics,
    /// Ordered chain of custody.
    pub chain_of_custody: Vec<CustodyLink>,
    /// When the bundle itself expires (ms since epoch).
    pub expires_at_ms: u64,
    /// Hex-encoded HMAC over the bundle payload.
    pub signature: String,
}
