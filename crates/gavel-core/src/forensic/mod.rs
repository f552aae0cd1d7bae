//! Forensic investigation over the ledger.
//!
//! All reads go through a read-only connection so long scans never
//! contend with the write path. Reports and bundles are signed with the
//! ledger key; an aborted investigation yields an error, never a partial
//! unsigned report.

mod report;


pub use report::{
    ActivityStatistics, Anomaly, AnomalyKind, BundleMetadata, CustodyLink, DiscoveryBundle,
    InvestigationCriteria, InvestigationReport,
};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{Datelike, TimeZone, Timelike, Utc};
use serde_json::json;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::crypto::{hex_decode, hex_encode, CryptoError, LedgerSigner};
use crate::ledger::{AuditEntry, AuditEvent, AuditLedger, EventType, LedgerError, LedgerReader};

/// Entries examined between abort-flag checks.
const SCAN_BATCH: usize = 256;

/// Default lifetime of a discovery bundle: 90 days.
const BUNDLE_LIFETIME_MS: u64 = 90 * 24 * 60 * 60 * 1000;

/// Entry ids attached to an anomaly before truncation.
const ANOMALY_SAMPLE: usize = 20;

/// Errors from investigations and bundle handling.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ForensicError {
    /// Underlying ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The investigation was aborted before completion.
    ///
    /// No partial report is produced.
    #[error("investigation aborted")]
    Aborted,

    /// The criteria cannot be evaluated.
    #[error("invalid investigation criteria: {0}")]
    InvalidCriteria(String),

    /// Bundle contents do not match their recorded hash.
    #[error("discovery bundle {bundle_id} failed verification: {details}")]
    BundleTampered {
        /// The bundle that failed.
        bundle_id: String,
        /// What did not match.
        details: String,
    },

    /// Signature verification failure.
    #[error(transparent)]
    Integrity(#[from] CryptoError),

    /// Serialization of report or bundle payloads failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cooperative cancellation flag for long investigations.
///
/// Checked between scan batches; setting it makes the investigation
/// return [`ForensicError::Aborted`] instead of a report.
#[derive(Debug, Clone, Default)]
pub struct AbortFlag(Arc<AtomicBool>);

impl AbortFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation.
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Tuning knobs for the anomaly heuristics.
#[derive(Debug, Clone, Copy)]
pub struct AnomalyThresholds {
    /// Start of the unusual-hours window (UTC hour, inclusive).
    pub unusual_hours_start: u8,
    /// End of the unusual-hours window (UTC hour, exclusive).
    pub unusual_hours_end: u8,
    /// Entries inside the window above which volume is anomalous.
    pub unusual_hours_volume: u64,
    /// Entries inside one sub-second window above which the burst is
    /// anomalous.
    pub burst_size: u64,
}

impl Default for AnomalyThresholds {
    fn default() -> Self {
        Self {
            unusual_hours_start: 22,
            unusual_hours_end: 6,
            unusual_hours_volume: 10,
            burst_size: 20,
        }
    }
}

impl AnomalyThresholds {
    /// Whether a UTC hour falls inside the unusual-hours window.
    ///
    /// The window may wrap midnight (22 to 6 covers 22:00-05:59).
    #[must_use]
    pub fn is_unusual_hour(&self, hour: u8) -> bool {
        if self.unusual_hours_start <= self.unusual_hours_end {
            hour >= self.unusual_hours_start && hour < self.unusual_hours_end
        } else {
            hour >= self.unusual_hours_start || hour < self.unusual_hours_end
        }
    }
}

/// Read-only investigator over the audit ledger.
pub struct ForensicInvestigator {
    reader: LedgerReader,
    signer: Arc<LedgerSigner>,
    thresholds: AnomalyThresholds,
    audit: Option<Arc<AuditLedger>>,
    clock: Arc<dyn Clock>,
}

impl ForensicInvestigator {
    /// Creates an investigator over a read-only ledger view.
    #[must_use]
    pub fn new(reader: LedgerReader, signer: Arc<LedgerSigner>) -> Self {
        Self {
            reader,
            signer,
            thresholds: AnomalyThresholds::default(),
            audit: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Overrides the anomaly thresholds.
    #[must_use]
    pub const fn with_thresholds(mut self, thresholds: AnomalyThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Attaches a ledger so investigations and exports audit themselves.
    #[must_use]
    pub fn with_audit(mut self, ledger: Arc<AuditLedger>) -> Self {
        self.audit = Some(ledger);
        self
    }

    /// Replaces the clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs an investigation and returns a signed report.
    ///
    /// # Errors
    ///
    /// Returns `InvalidCriteria` for an inverted period, `Aborted` if the
    /// flag is raised mid-scan, or a ledger error.
    pub fn investigate(
        &self,
        tenant_id: &str,
        criteria: &InvestigationCriteria,
        abort: &AbortFlag,
    ) -> Result<InvestigationReport, ForensicError> {
        let entries = self.scan(tenant_id, criteria, abort)?;

        let statistics = self.summarize(&entries, abort)?;
        let anomalies = self.detect_anomalies(&entries);
        let chain_of_custody: Vec<_> = entries.iter().map(CustodyLink::for_entry).collect();
        let signature = self.sign_result_set(&entries)?;

        let report = InvestigationReport {
            investigation_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            criteria: criteria.clone(),
            generated_at_ms: self.clock.now_ms(),
            record_count: entries.len() as u64,
            statistics,
            anomalies,
            chain_of_custody,
            signature,
        };
        info!(
            tenant = tenant_id,
            records = report.record_count,
            anomalies = report.anomalies.len(),
            "investigation complete"
        );
        self.audit_event(
            tenant_id,
            EventType::InvestigationRun,
            "INVESTIGATION",
            &report.investigation_id,
            "INVESTIGATE",
            json!({
                "record_count": report.record_count,
                "anomalies": report.anomalies.len(),
            }),
        );
        Ok(report)
    }

    /// Exports a signed, self-verifying discovery bundle.
    ///
    /// # Errors
    ///
    /// Same failure modes as [`ForensicInvestigator::investigate`];
    /// additionally requires a case number in the criteria.
    pub fn export_bundle(
        &self,
        tenant_id: &str,
        criteria: &InvestigationCriteria,
        abort: &AbortFlag,
    ) -> Result<DiscoveryBundle, ForensicError> {
        let case_number = criteria
            .case_number
            .clone()
            .ok_or_else(|| ForensicError::InvalidCriteria("case number required".to_string()))?;

        let records = self.scan(tenant_id, criteria, abort)?;
        let summary = self.summarize(&records, abort)?;
        let chain_of_custody: Vec<_> = records.iter().map(CustodyLink::for_entry).collect();

        let bundle_id = Uuid::new_v4().to_string();
        let metadata = BundleMetadata {
            case_number,
            period_from_ms: criteria.from_ms,
            period_to_ms: criteria.to_ms,
            record_count: records.len() as u64,
            integrity_hash: hex_encode(&records_hash(&records)?),
        };
        let signature = hex_encode(&self.signer.sign(&bundle_payload(&bundle_id, &metadata, &records)?));

        let bundle = DiscoveryBundle {
            bundle_id,
            tenant_id: tenant_id.to_string(),
            metadata,
            records,
            summary,
            chain_of_custody,
            expires_at_ms: self.clock.now_ms() + BUNDLE_LIFETIME_MS,
            signature,
        };
        info!(
            tenant = tenant_id,
            bundle = %bundle.bundle_id,
            records = bundle.metadata.record_count,
            "discovery bundle exported"
        );
        self.audit_event(
            tenant_id,
            EventType::DiscoveryExported,
            "DISCOVERY_BUNDLE",
            &bundle.bundle_id,
            "EXPORT",
            json!({
                "case_number": bundle.metadata.case_number,
                "record_count": bundle.metadata.record_count,
            }),
        );
        Ok(bundle)
    }

    /// Verifies a bundle's records hash and signature.
    ///
    /// # Errors
    ///
    /// Returns `BundleTampered` when the records no longer match the
    /// recorded hash, or `Integrity` when the signature fails.
    pub fn verify_bundle(&self, bundle: &DiscoveryBundle) -> Result<(), ForensicError> {
        let recomputed = hex_encode(&records_hash(&bundle.records)?);
        if recomputed != bundle.metadata.integrity_hash {
            return Err(ForensicError::BundleTampered {
                bundle_id: bundle.bundle_id.clone(),
                details: "records do not match the recorded integrity hash".to_string(),
            });
        }
        let payload = bundle_payload(&bundle.bundle_id, &bundle.metadata, &bundle.records)?;
        let signature = hex_decode(&bundle.signature)?;
        self.signer
            .verify(&payload, &signature, &bundle.bundle_id)?;
        Ok(())
    }

    /// Walks the tenant's chain in batches, keeping the entries the
    /// criteria match and checking the abort flag between batches.
    ///
    /// Cursor-based so the scan covers the whole period regardless of
    /// how many entries it holds; a single capped ledger query would
    /// drop matches past its row limit.
    fn scan(
        &self,
        tenant_id: &str,
        criteria: &InvestigationCriteria,
        abort: &AbortFlag,
    ) -> Result<Vec<AuditEntry>, ForensicError> {
        if criteria.to_ms < criteria.from_ms {
            return Err(ForensicError::InvalidCriteria(
                "period end precedes period start".to_string(),
            ));
        }
        let cap = criteria.limit.map(|limit| limit as usize);
        let mut matched = Vec::new();
        let mut after_seq = 0u64;
        'walk: loop {
            if abort.is_aborted() {
                return Err(ForensicError::Aborted);
            }
            let batch = self
                .reader
                .read_chain(tenant_id, after_seq, SCAN_BATCH as u64)?;
            let exhausted = batch.len() < SCAN_BATCH;
            if let Some(last) = batch.last() {
                after_seq = last.seq;
            }
            for entry in batch {
                if criteria.matches(&entry) {
                    matched.push(entry);
                    if cap.is_some_and(|cap| matched.len() >= cap) {
                        break 'walk;
                    }
                }
            }
            if exhausted {
                break;
            }
        }
        // Chain order is commit order; reports present time order.
        matched.sort_by_key(|entry| (entry.timestamp_ms, entry.seq));
        debug!(tenant = tenant_id, matched = matched.len(), "forensic scan");
        Ok(matched)
    }

    /// Builds the activity breakdowns, honoring the abort flag.
    fn summarize(
        &self,
        entries: &[AuditEntry],
        abort: &AbortFlag,
    ) -> Result<ActivityStatistics, ForensicError> {
        let mut stats = ActivityStatistics {
            total: entries.len() as u64,
            ..ActivityStatistics::default()
        };
        for chunk in entries.chunks(SCAN_BATCH) {
            if abort.is_aborted() {
                return Err(ForensicError::Aborted);
            }
            for entry in chunk {
                *stats
                    .by_event_type
                    .entry(entry.event_type.as_str().to_string())
                    .or_default() += 1;
                *stats
                    .by_severity
                    .entry(entry.severity.as_str().to_string())
                    .or_default() += 1;
                *stats.by_actor.entry(entry.actor_id.clone()).or_default() += 1;
                *stats
                    .by_resource_type
                    .entry(entry.resource_type.clone())
                    .or_default() += 1;
                if let Some(when) = Utc.timestamp_millis_opt(entry.timestamp_ms as i64).single() {
                    *stats.by_hour.entry(when.hour() as u8).or_default() += 1;
                    let day = format!(
                        "{:04}-{:02}-{:02}",
                        when.year(),
                        when.month(),
                        when.day()
                    );
                    *stats.by_day.entry(day).or_default() += 1;
                }
            }
        }
        Ok(stats)
    }

    /// Applies the anomaly heuristics to the time-ordered entry set.
    fn detect_anomalies(&self, entries: &[AuditEntry]) -> Vec<Anomaly> {
        let mut anomalies = Vec::new();

        let unusual: Vec<&AuditEntry> = entries
            .iter()
            .filter(|e| {
                Utc.timestamp_millis_opt(e.timestamp_ms as i64)
                    .single()
                    .is_some_and(|t| self.thresholds.is_unusual_hour(t.hour() as u8))
            })
            .collect();
        if unusual.len() as u64 > self.thresholds.unusual_hours_volume {
            anomalies.push(Anomaly {
                kind: AnomalyKind::UnusualHoursVolume,
                description: format!(
                    "{} events between {:02}:00 and {:02}:00 UTC (threshold {})",
                    unusual.len(),
                    self.thresholds.unusual_hours_start,
                    self.thresholds.unusual_hours_end,
                    self.thresholds.unusual_hours_volume
                ),
                entry_ids: sample_ids(&unusual),
            });
        }

        // Sliding window over the time-ordered entries: a burst is more
        // than burst_size events inside one second.
        let mut window_start = 0usize;
        let mut burst: Option<(usize, usize)> = None;
        for (i, entry) in entries.iter().enumerate() {
            while entry.timestamp_ms - entries[window_start].timestamp_ms >= 1_000 {
                window_start += 1;
            }
            let size = i - window_start + 1;
            if size as u64 > self.thresholds.burst_size
                && burst.map_or(true, |(s, e)| size > e - s + 1)
            {
                burst = Some((window_start, i));
            }
        }
        if let Some((start, end)) = burst {
            let involved: Vec<&AuditEntry> = entries[start..=end].iter().collect();
            anomalies.push(Anomaly {
                kind: AnomalyKind::RapidBurst,
                description: format!(
                    "{} events inside a sub-second window (threshold {})",
                    involved.len(),
                    self.thresholds.burst_size
                ),
                entry_ids: sample_ids(&involved),
            });
        }

        anomalies
    }

    /// Signs the serialized result set.
    fn sign_result_set(&self, entries: &[AuditEntry]) -> Result<String, ForensicError> {
        let payload = serde_json::to_vec(entries)?;
        Ok(hex_encode(&self.signer.sign(&payload)))
    }

    /// Best-effort self-audit of a forensic operation.
    fn audit_event(
        &self,
        tenant_id: &str,
        event_type: EventType,
        resource_type: &str,
        resource_id: &str,
        action: &str,
        details: serde_json::Value,
    ) {
        let Some(ledger) = &self.audit else {
            return;
        };
        let event = AuditEvent::builder(event_type)
            .tenant(tenant_id)
            .actor("system")
            .resource(resource_type, resource_id)
            .action(action)
            .details(details)
            .build();
        match event {
            Ok(event) => {
                if let Err(e) = ledger.record(event) {
                    warn!(error = %e, "failed to audit forensic operation");
                }
            }
            Err(e) => warn!(error = %e, "failed to build forensic audit event"),
        }
    }
}

/// SHA-256 over the serialized records.
fn records_hash(records: &[AuditEntry]) -> Result<[u8; 32], serde_json::Error> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(records)?);
    Ok(hasher.finalize().into())
}

/// Canonical signing payload for a bundle: id, metadata, records.
fn bundle_payload(
    bundle_id: &str,
    metadata: &BundleMetadata,
    records: &[AuditEntry],
) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(&(bundle_id, metadata, records))
}

fn sample_ids(entries: &[&AuditEntry]) -> Vec<String> {
    entries
        .iter()
        .take(ANOMALY_SAMPLE)
        .map(|e| e.entry_id.clone())
        .collect()
}
