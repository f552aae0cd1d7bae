//! Per-standard compliance scoring over tagged ledger entries.
//!
//! Reads go through the read-only ledger view; reports are signed with
//! the ledger key and generation is itself audited.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::crypto::{hex_encode, LedgerSigner};
use crate::ledger::{
    AuditEntry, AuditEvent, AuditLedger, ComplianceStandard, EventType, LedgerError, LedgerReader,
};

/// Errors from report generation.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ComplianceError {
    /// Underlying ledger failure.
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// The reporting period is inverted.
    #[error("period end precedes period start")]
    InvalidPeriod,

    /// Serialization of the report payload failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One non-compliant tagged entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceGap {
    /// The offending entry.
    pub entry_id: String,
    /// Its event type.
    pub event_type: EventType,
    /// When it occurred (ms since epoch).
    pub timestamp_ms: u64,
    /// What went wrong.
    pub description: String,
}

/// A signed per-standard compliance report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceReport {
    /// Report id (UUID).
    pub report_id: String,
    /// Tenant reported on.
    pub tenant_id: String,
    /// The standard evaluated.
    pub standard: ComplianceStandard,
    /// Inclusive period start (ms since epoch).
    pub period_from_ms: u64,
    /// Inclusive period end (ms since epoch).
    pub period_to_ms: u64,
    /// When the report was generated (ms since epoch).
    pub generated_at_ms: u64,
    /// Entries tagged with the standard inside the period.
    pub total_tagged: u64,
    /// Tagged entries that count toward the standard.
    pub compliant_count: u64,
    /// Tagged entries that count against it.
    pub non_compliant_count: u64,
    /// `round(compliant / (compliant + non_compliant) * 100)`; 100 when
    /// nothing is tagged.
    pub score: u8,
    /// The non-compliant entries, oldest first.
    pub gaps: Vec<ComplianceGap>,
    /// Activity areas with tagged entries and zero violations.
    pub strengths: Vec<String>,
    /// Hex-encoded HMAC over the tagged result set.
    pub signature: String,
}

/// Generates signed compliance reports from the ledger.
pub struct ComplianceReporter {
    reader: LedgerReader,
    signer: Arc<LedgerSigner>,
    audit: Option<Arc<AuditLedger>>,
    clock: Arc<dyn Clock>,
}

impl ComplianceReporter {
    /// Creates a reporter over a read-only ledger view.
    #[must_use]
    pub fn new(reader: LedgerReader, signer: Arc<LedgerSigner>) -> Self {
        Self {
            reader,
            signer,
            audit: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Attaches a ledger so report generation audits itself.
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

    /// Generates a signed report for one standard over a period.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPeriod` for an inverted period or a ledger error.
    pub fn generate_report(
        &self,
        tenant_id: &str,
        standard: ComplianceStandard,
        from_ms: u64,
        to_ms: u64,
    ) -> Result<ComplianceReport, ComplianceError> {
        if to_ms < from_ms {
            return Err(ComplianceError::InvalidPeriod);
        }
        let tagged = self.reader.tagged(tenant_id, standard, from_ms, to_ms)?;

        let compliant_count = tagged.iter().filter(|e| e.compliant).count() as u64;
        let non_compliant_count = tagged.len() as u64 - compliant_count;
        let score = score(compliant_count, non_compliant_count);

        let gaps: Vec<ComplianceGap> = tagged
            .iter()
            .filter(|e| !e.compliant)
            .map(|e| ComplianceGap {
                entry_id: e.entry_id.clone(),
                event_type: e.event_type,
                timestamp_ms: e.timestamp_ms,
                description: format!(
                    "{} by {} on {} {}",
                    e.event_type, e.actor_id, e.resource_type, e.resource_id
                ),
            })
            .collect();
        let strengths = strengths(&tagged);
        let signature = hex_encode(&self.signer.sign(&serde_json::to_vec(&tagged)?));

        let report = ComplianceReport {
            report_id: Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            standard,
            period_from_ms: from_ms,
            period_to_ms: to_ms,
            generated_at_ms: self.clock.now_ms(),
            total_tagged: tagged.len() as u64,
            compliant_count,
            non_compliant_count,
            score,
            gaps,
            strengths,
            signature,
        };
        info!(
            tenant = tenant_id,
            standard = %standard,
            score = report.score,
            gaps = report.gaps.len(),
            "compliance report generated"
        );
        self.audit_report(&report);
        Ok(report)
    }

    fn audit_report(&self, report: &ComplianceReport) {
        let Some(ledger) = &self.audit else {
            return;
        };
        let event = AuditEvent::builder(EventType::ComplianceReportGenerated)
            .tenant(report.tenant_id.clone())
            .actor("system")
            .resource("COMPLIANCE_REPORT", report.report_id.clone())
            .action("GENERATE")
            .details(serde_json::json!({
                "standard": report.standard.as_str(),
                "score": report.score,
            }))
            .build();
        match event {
            Ok(event) => {
                if let Err(e) = ledger.record(event) {
                    warn!(error = %e, "failed to audit compliance report");
                }
            }
            Err(e) => warn!(error = %e, "failed to build compliance audit event"),
        }
    }
}

/// The compliance score: rounded percentage of compliant tagged entries,
/// with an unblemished 100 when nothing is tagged.
fn score(compliant: u64, non_compliant: u64) -> u8 {
    let total = compliant + non_compliant;
    if total == 0 {
        return 100;
    }
    ((compliant as f64 / total as f64) * 100.0).round() as u8
}

/// Activity areas (event categories) with tagged entries and zero
/// violations.
fn strengths(tagged: &[AuditEntry]) -> Vec<String> {
    let mut violations_by_category: BTreeMap<&'static str, bool> = BTreeMap::new();
    for entry in tagged {
        let slot = violations_by_category
            .entry(entry.category.as_str())
            .or_insert(false);
        *slot |= !entry.compliant;
    }
    violations_by_category
        .into_iter()
        .filter(|(_, violated)| !violated)
        .map(|(category, _)| format!("{category} activity fully compliant"))
        .collect()
}
