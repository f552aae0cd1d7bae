//! Audit entry model: event vocabulary, severity tiers, and the immutable
//! persisted record.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::retention::RetentionPolicy;
use super::LedgerError;
use crate::crypto::{EntryEnvelope, Hash, Signature};

/// Maximum length of free-text identifier fields on an event.
pub const MAX_FIELD_LEN: usize = 512;

/// Maximum number of compliance tags on one entry.
pub const MAX_COMPLIANCE_TAGS: usize = 16;

/// Severity tiers, ordered from least to most serious.
///
/// The top two tiers (`Security`, `Legal`) fan out to the alert channel;
/// both also schedule external anchoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Routine activity.
    Informational,
    /// Unusual but non-threatening activity.
    Warning,
    /// Operation or system failure.
    Error,
    /// Security-relevant activity (isolation violations, auth failures).
    Security,
    /// Court-admissibility-relevant activity (holds, privilege, discovery).
    Legal,
}

impl Severity {
    /// Parses a severity case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownSeverity` for unrecognized input.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s.to_uppercase().as_str() {
            "INFORMATIONAL" => Ok(Self::Informational),
            "WARNING" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            "SECURITY" => Ok(Self::Security),
            "LEGAL" => Ok(Self::Legal),
            _ => Err(LedgerError::UnknownSeverity {
                value: s.to_string(),
            }),
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Informational => "INFORMATIONAL",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Security => "SECURITY",
            Self::Legal => "LEGAL",
        }
    }

    /// Whether writes at this severity fan out to alert subscribers.
    #[must_use]
    pub const fn alerts(&self) -> bool {
        matches!(self, Self::Security | Self::Legal)
    }

    /// Whether writes at this severity schedule external anchoring.
    #[must_use]
    pub const fn anchors(&self) -> bool {
        matches!(self, Self::Security | Self::Legal)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Broad grouping of event types, derived rather than caller-supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EventCategory {
    /// Access decisions and authentication.
    AccessControl,
    /// Reads/writes of platform data.
    DataActivity,
    /// Privilege, holds, and discovery.
    Legal,
    /// Security incidents.
    Security,
    /// Platform lifecycle and administration.
    System,
}

impl EventCategory {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccessControl => "ACCESS_CONTROL",
            Self::DataActivity => "DATA_ACTIVITY",
            Self::Legal => "LEGAL",
            Self::Security => "SECURITY",
            Self::System => "SYSTEM",
        }
    }
}

/// The closed set of recordable event types.
///
/// An unknown event type is a construction error, not a stored string:
/// everything in the ledger is drawn from this vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum EventType {
    /// A decision evaluation that allowed the operation.
    AccessGranted,
    /// A decision evaluation that denied the operation.
    AccessDenied,
    /// Request arrived without an authenticated subject.
    AuthenticationFailed,
    /// A resource was read.
    ResourceViewed,
    /// A resource was created.
    ResourceCreated,
    /// A resource was modified.
    ResourceModified,
    /// A resource was deleted.
    ResourceDeleted,
    /// A resource was exported off-platform.
    ResourceExported,
    /// A legal hold was applied to a matter or resource.
    LegalHoldApplied,
    /// A legal hold was released.
    LegalHoldReleased,
    /// Privileged material was accessed under the privilege rules.
    PrivilegedAccess,
    /// A discovery bundle was assembled and exported.
    DiscoveryExported,
    /// A forensic investigation was run.
    InvestigationRun,
    /// A compliance report was generated.
    ComplianceReportGenerated,
    /// A subject crossed a tenant boundary.
    TenantIsolationViolation,
    /// Ledger integrity verification failed.
    ImmutabilityAlert,
    /// A persisted write failed and was diverted to the fallback queue.
    PersistenceFallback,
    /// The policy catalog was reloaded.
    CatalogReloaded,
    /// Platform startup.
    SystemStartup,
}

impl EventType {
    /// Parses an event type from its canonical form, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownEventType` for unrecognized input.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s.to_uppercase().as_str() {
            "ACCESS_GRANTED" => Ok(Self::AccessGranted),
            "ACCESS_DENIED" => Ok(Self::AccessDenied),
            "AUTHENTICATION_FAILED" => Ok(Self::AuthenticationFailed),
            "RESOURCE_VIEWED" => Ok(Self::ResourceViewed),
            "RESOURCE_CREATED" => Ok(Self::ResourceCreated),
            "RESOURCE_MODIFIED" => Ok(Self::ResourceModified),
            "RESOURCE_DELETED" => Ok(Self::ResourceDeleted),
            "RESOURCE_EXPORTED" => Ok(Self::ResourceExported),
            "LEGAL_HOLD_APPLIED" => Ok(Self::LegalHoldApplied),
            "LEGAL_HOLD_RELEASED" => Ok(Self::LegalHoldReleased),
            "PRIVILEGED_ACCESS" => Ok(Self::PrivilegedAccess),
            "DISCOVERY_EXPORTED" => Ok(Self::DiscoveryExported),
            "INVESTIGATION_RUN" => Ok(Self::InvestigationRun),
            "COMPLIANCE_REPORT_GENERATED" => Ok(Self::ComplianceReportGenerated),
            "TENANT_ISOLATION_VIOLATION" => Ok(Self::TenantIsolationViolation),
            "IMMUTABILITY_ALERT" => Ok(Self::ImmutabilityAlert),
            "PERSISTENCE_FALLBACK" => Ok(Self::PersistenceFallback),
            "CATALOG_RELOADED" => Ok(Self::CatalogReloaded),
            "SYSTEM_STARTUP" => Ok(Self::SystemStartup),
            _ => Err(LedgerError::UnknownEventType {
                value: s.to_string(),
            }),
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::AccessGranted => "ACCESS_GRANTED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::AuthenticationFailed => "AUTHENTICATION_FAILED",
            Self::ResourceViewed => "RESOURCE_VIEWED",
            Self::ResourceCreated => "RESOURCE_CREATED",
            Self::ResourceModified => "RESOURCE_MODIFIED",
            Self::ResourceDeleted => "RESOURCE_DELETED",
            Self::ResourceExported => "RESOURCE_EXPORTED",
            Self::LegalHoldApplied => "LEGAL_HOLD_APPLIED",
            Self::LegalHoldReleased => "LEGAL_HOLD_RELEASED",
            Self::PrivilegedAccess => "PRIVILEGED_ACCESS",
            Self::DiscoveryExported => "DISCOVERY_EXPORTED",
            Self::InvestigationRun => "INVESTIGATION_RUN",
            Self::ComplianceReportGenerated => "COMPLIANCE_REPORT_GENERATED",
            Self::TenantIsolationViolation => "TENANT_ISOLATION_VIOLATION",
            Self::ImmutabilityAlert => "IMMUTABILITY_ALERT",
            Self::PersistenceFallback => "PERSISTENCE_FALLBACK",
            Self::CatalogReloaded => "CATALOG_RELOADED",
            Self::SystemStartup => "SYSTEM_STARTUP",
        }
    }

    /// The category this event type belongs to.
    #[must_use]
    pub const fn category(&self) -> EventCategory {
        match self {
            Self::AccessGranted | Self::AccessDenied | Self::AuthenticationFailed => {
                EventCategory::AccessControl
            }
            Self::ResourceViewed
            | Self::ResourceCreated
            | Self::ResourceModified
            | Self::ResourceDeleted
            | Self::ResourceExported => EventCategory::DataActivity,
            Self::LegalHoldApplied
            | Self::LegalHoldReleased
            | Self::PrivilegedAccess
            | Self::DiscoveryExported
            | Self::InvestigationRun
            | Self::ComplianceReportGenerated => EventCategory::Legal,
            Self::TenantIsolationViolation | Self::ImmutabilityAlert => EventCategory::Security,
            Self::PersistenceFallback | Self::CatalogReloaded | Self::SystemStartup => {
                EventCategory::System
            }
        }
    }

    /// Default severity when the caller supplies none.
    #[must_use]
    pub const fn default_severity(&self) -> Severity {
        match self {
            Self::AccessGranted
            | Self::ResourceViewed
            | Self::ResourceCreated
            | Self::ResourceModified
            | Self::CatalogReloaded
            | Self::SystemStartup
            | Self::ComplianceReportGenerated
            | Self::InvestigationRun => Severity::Informational,
            Self::AccessDenied | Self::ResourceDeleted | Self::ResourceExported => {
                Severity::Warning
            }
            Self::PersistenceFallback => Severity::Error,
            Self::AuthenticationFailed | Self::TenantIsolationViolation | Self::ImmutabilityAlert => {
                Severity::Security
            }
            Self::LegalHoldApplied
            | Self::LegalHoldReleased
            | Self::PrivilegedAccess
            | Self::DiscoveryExported => Severity::Legal,
        }
    }

    /// Whether this event represents a compliance failure.
    ///
    /// Drives per-standard scoring: a tagged entry of a violation type
    /// counts against the standard; any other tagged entry counts toward
    /// it.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        matches!(
            self,
            Self::AccessDenied
                | Self::AuthenticationFailed
                | Self::TenantIsolationViolation
                | Self::ImmutabilityAlert
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compliance standards an entry can be tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ComplianceStandard {
    /// EU data-protection regulation.
    Gdpr,
    /// US health-data privacy rules.
    Hipaa,
    /// Service-organization audit controls.
    Soc2,
    /// Records subject to an active litigation hold. Permanent.
    LitigationHold,
    /// Records subject to a court preservation order. Permanent.
    CourtOrder,
}

impl ComplianceStandard {
    /// Parses a standard case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::UnknownStandard` for unrecognized input.
    pub fn parse(s: &str) -> Result<Self, LedgerError> {
        match s.to_uppercase().as_str() {
            "GDPR" => Ok(Self::Gdpr),
            "HIPAA" => Ok(Self::Hipaa),
            "SOC2" => Ok(Self::Soc2),
            "LITIGATION_HOLD" => Ok(Self::LitigationHold),
            "COURT_ORDER" => Ok(Self::CourtOrder),
            _ => Err(LedgerError::UnknownStandard {
                value: s.to_string(),
            }),
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Gdpr => "GDPR",
            Self::Hipaa => "HIPAA",
            Self::Soc2 => "SOC2",
            Self::LitigationHold => "LITIGATION_HOLD",
            Self::CourtOrder => "COURT_ORDER",
        }
    }

    /// Whether records tagged with this standard must be kept forever.
    ///
    /// A permanent tag forces a legal hold on the entry regardless of its
    /// severity-derived policy.
    #[must_use]
    pub const fn permanent(&self) -> bool {
        matches!(self, Self::LitigationHold | Self::CourtOrder)
    }
}

impl std::fmt::Display for ComplianceStandard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied actor/network/application context.
///
/// Identities are resolved by the session layer; the ledger records what
/// it is given and does not resolve anything itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventContext {
    /// Client IP address, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    /// Client user agent, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    /// Session identifier, if the event originated in a session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Originating application component.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application: Option<String>,
}

/// A validated event awaiting commit to the ledger.
///
/// Built through [`AuditEventBuilder`]; required fields are checked at
/// `build()` so a malformed event never reaches the write pipeline.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Tenant the event belongs to.
    pub tenant_id: String,
    /// Event type from the closed vocabulary.
    pub event_type: EventType,
    /// Actor id (subject or `"system"`).
    pub actor_id: String,
    /// Resource type acted on.
    pub resource_type: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Action verb for the audit trail.
    pub action: String,
    /// Severity; defaults from the event type.
    pub severity: Severity,
    /// Structured detail payload.
    pub details: Value,
    /// Compliance tags.
    pub compliance_tags: Vec<ComplianceStandard>,
    /// Caller-resolved context.
    pub context: EventContext,
}

impl AuditEvent {
    /// Starts building an event of the given type.
    #[must_use]
    pub fn builder(event_type: EventType) -> AuditEventBuilder {
        AuditEventBuilder {
            event_type,
            tenant_id: String::new(),
            actor_id: String::new(),
            resource_type: String::new(),
            resource_id: String::new(),
            action: String::new(),
            severity: None,
            details: Value::Null,
            compliance_tags: Vec::new(),
            context: EventContext::default(),
        }
    }
}

/// Builder for [`AuditEvent`].
#[derive(Debug)]
pub struct AuditEventBuilder {
    event_type: EventType,
    tenant_id: String,
    actor_id: String,
    resource_type: String,
    resource_id: String,
    action: String,
    severity: Option<Severity>,
    details: Value,
    compliance_tags: Vec<ComplianceStandard>,
    context: EventContext,
}

impl AuditEventBuilder {
    /// Sets the tenant id. Required.
    #[must_use]
    pub fn tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    /// Sets the actor id. Required.
    #[must_use]
    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = actor_id.into();
        self
    }

    /// Sets the resource type and id. Type is required.
    #[must_use]
    pub fn resource(mut self, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = resource_id.into();
        self
    }

    /// Sets the action verb. Required.
    #[must_use]
    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Overrides the event type's default severity.
    #[must_use]
    pub const fn severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    /// Attaches a structured detail payload.
    #[must_use]
    pub fn details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Adds a compliance tag.
    #[must_use]
    pub fn tag(mut self, standard: ComplianceStandard) -> Self {
        self.compliance_tags.push(standard);
        self
    }

    /// Attaches caller-resolved context.
    #[must_use]
    pub fn context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }

    /// Validates and produces the event.
    ///
    /// # Errors
    ///
    /// Returns `LedgerError::MissingField` if tenant, actor, resource
    /// type, or action is blank; `LedgerError::FieldTooLong` if any
    /// identifier exceeds [`MAX_FIELD_LEN`]; `LedgerError::TooManyTags`
    /// past [`MAX_COMPLIANCE_TAGS`].
    pub fn build(self) -> Result<AuditEvent, LedgerError> {
        for (field, value) in [
            ("tenant_id", &self.tenant_id),
            ("actor_id", &self.actor_id),
            ("resource_type", &self.resource_type),
            ("action", &self.action),
        ] {
            if value.trim().is_empty() {
                return Err(LedgerError::MissingField {
                    field: field.to_string(),
                });
            }
            if value.len() > MAX_FIELD_LEN {
                return Err(LedgerError::FieldTooLong {
                    field: field.to_string(),
                    len: value.len(),
                });
            }
        }
        if self.resource_id.len() > MAX_FIELD_LEN {
            return Err(LedgerError::FieldTooLong {
                field: "resource_id".to_string(),
                len: self.resource_id.len(),
            });
        }
        if self.compliance_tags.len() > MAX_COMPLIANCE_TAGS {
            return Err(LedgerError::TooManyTags {
                count: self.compliance_tags.len(),
            });
        }

        let mut tags = self.compliance_tags;
        tags.sort_unstable();
        tags.dedup();

        Ok(AuditEvent {
            tenant_id: self.tenant_id,
            event_type: self.event_type,
            actor_id: self.actor_id,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            action: self.action,
            severity: self.severity.unwrap_or(self.event_type.default_severity()),
            details: self.details,
            compliance_tags: tags,
            context: self.context,
        })
    }
}

/// A persisted, immutable ledger entry.
///
/// Once written, no field contributing to `integrity_hash` may change.
/// The stored hash is recomputed on verification; a mismatch is an
/// `ImmutabilityViolation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Store-assigned sequence number (monotonic across tenants).
    pub seq: u64,
    /// Ledger-assigned entry id (UUID).
    pub entry_id: String,
    /// Tenant the entry belongs to.
    pub tenant_id: String,
    /// Event type.
    pub event_type: EventType,
    /// Derived category.
    pub category: EventCategory,
    /// Severity.
    pub severity: Severity,
    /// Actor id.
    pub actor_id: String,
    /// Resource type.
    pub resource_type: String,
    /// Resource id.
    pub resource_id: String,
    /// Action verb.
    pub action: String,
    /// Timestamp in milliseconds since the Unix epoch. Immutable once set.
    pub timestamp_ms: u64,
    /// Structured detail payload.
    pub details: Value,
    /// Compliance tags, sorted and deduplicated.
    pub compliance_tags: Vec<ComplianceStandard>,
    /// Whether the entry counts as compliant for its tagged standards.
    pub compliant: bool,
    /// Caller-resolved context.
    pub context: EventContext,
    /// Hash of the previous entry in this tenant's chain.
    pub prev_hash: Hash,
    /// Salted integrity hash over the immutable envelope.
    pub integrity_hash: Hash,
    /// HMAC signature over the envelope and hash.
    pub signature: Signature,
    /// Retention policy resolved at write time.
    pub retention: RetentionPolicy,
    /// Expiry in milliseconds since the Unix epoch; `None` when the entry
    /// is permanent or under legal hold.
    pub expires_at_ms: Option<u64>,
}

impl AuditEntry {
    /// The immutable envelope over which hash and signature are computed.
    #[must_use]
    pub fn envelope(&self) -> EntryEnvelope<'_> {
        EntryEnvelope {
            entry_id: &self.entry_id,
            tenant_id: &self.tenant_id,
            timestamp_ms: self.timestamp_ms,
            event_type: self.event_type.as_str(),
            actor_id: &self.actor_id,
            resource_type: &self.resource_type,
            resource_id: &self.resource_id,
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_builder_requires_core_fields() {
        let result = AuditEvent::builder(EventType::AccessGranted)
            .actor("user-1")
            .resource("DOCUMENT", "doc-1")
            .action("READ")
            .build();
        assert!(matches!(result, Err(LedgerError::MissingField { field }) if field == "tenant_id"));
    }

    #[test]
    fn test_builder_defaults_severity_from_event_type() {
        let event = AuditEvent::builder(EventType::TenantIsolationViolation)
            .tenant("t1")
            .actor("user-1")
            .resource("CASE", "case-9")
            .action("READ")
            .build()
            .unwrap();
        assert_eq!(event.severity, Severity::Security);

        let event = AuditEvent::builder(EventType::LegalHoldApplied)
            .tenant("t1")
            .actor("system")
            .resource("CASE", "case-9")
            .action("HOLD")
            .build()
            .unwrap();
        assert_eq!(event.severity, Severity::Legal);
    }

    #[test]
    fn test_builder_dedups_tags() {
        let event = AuditEvent::builder(EventType::ResourceViewed)
            .tenant("t1")
            .actor("user-1")
            .resource("CLIENT_DATA", "c-1")
            .action("READ")
            .tag(ComplianceStandard::Gdpr)
            .tag(ComplianceStandard::Gdpr)
            .build()
            .unwrap();
        assert_eq!(event.compliance_tags, vec![ComplianceStandard::Gdpr]);
    }

    #[test]
    fn test_event_type_round_trip() {
        for ty in [
            EventType::AccessGranted,
            EventType::LegalHoldApplied,
            EventType::ImmutabilityAlert,
        ] {
            assert_eq!(EventType::parse(ty.as_str()).unwrap(), ty);
        }
        assert!(matches!(
            EventType::parse("CAKE_BAKED"),
            Err(LedgerError::UnknownEventType { .. })
        ));
    }

    #[test]
    fn test_severity_tiers() {
        assert!(Severity::Legal > Severity::Security);
        assert!(Severity::Security > Severity::Error);
        assert!(Severity::Security.alerts());
        assert!(Severity::Legal.alerts());
        assert!(!Severity::Error.alerts());
    }

    #[test]
    fn test_violation_event_types() {
        assert!(EventType::TenantIsolationViolation.is_violation());
        assert!(EventType::AccessDenied.is_violation());
        assert!(!EventType::AccessGranted.is_violation());
        assert!(!EventType::LegalHoldApplied.is_violation());
    }

    #[test]
    fn test_field_length_limit() {
        let result = AuditEvent::builder(EventType::ResourceViewed)
            .tenant("t".repeat(MAX_FIELD_LEN + 1))
            .actor("user-1")
            .resource("DOCUMENT", "doc-1")
            .action("READ")
            .build();
        assert!(matches!(result, Err(LedgerError::FieldTooLong { .. })));
    }
}
