//! Retention policy resolution.
//!
//! Policies are derived deterministically from severity, event type, and
//! compliance tags at write time; they are part of the entry and never
//! revisited. A legal hold always wins: held entries have no expiry and
//! are never purge candidates.

use serde::{Deserialize, Serialize};

use super::entry::{ComplianceStandard, EventType, Severity};

/// Milliseconds in one day.
const MS_PER_DAY: u64 = 24 * 60 * 60 * 1000;

/// Storage tier the entry is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[non_exhaustive]
pub enum StorageTier {
    /// Online, query-optimized storage.
    Standard,
    /// Compressed long-term storage.
    Archive,
    /// Write-once storage for hold/privilege material.
    Vault,
}

impl StorageTier {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "STANDARD",
            Self::Archive => "ARCHIVE",
            Self::Vault => "VAULT",
        }
    }

    /// Parses a storage tier case-insensitively; unknown input maps to
    /// `Standard` (old rows stay readable across tier renames).
    #[must_use]
    pub fn parse_lossy(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ARCHIVE" => Self::Archive,
            "VAULT" => Self::Vault,
            _ => Self::Standard,
        }
    }
}

/// Retention policy attached to an entry at write time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Retention duration in days; `None` means permanent.
    pub duration_days: Option<u32>,
    /// Destination storage tier.
    pub tier: StorageTier,
    /// Whether the entry is under legal hold (never purged).
    pub legal_hold: bool,
    /// Whether the entry is flagged write-once at the storage layer.
    pub immutable: bool,
}

impl RetentionPolicy {
    /// Resolves the policy for an entry from its severity, event type,
    /// and compliance tags.
    ///
    /// Severity table: informational events get short retention; warnings
    /// and errors progressively longer; security and legal events are
    /// permanent, held, and immutable. Any tag referencing a permanent
    /// standard (litigation hold, court order) forces a legal hold
    /// regardless of severity.
    #[must_use]
    pub fn resolve(
        severity: Severity,
        event_type: EventType,
        tags: &[ComplianceStandard],
    ) -> Self {
        let mut policy = match severity {
            Severity::Informational => Self {
                duration_days: Some(90),
                tier: StorageTier::Standard,
                legal_hold: false,
                immutable: false,
            },
            Severity::Warning => Self {
                duration_days: Some(365),
                tier: StorageTier::Standard,
                legal_hold: false,
                immutable: false,
            },
            Severity::Error => Self {
                duration_days: Some(1095),
                tier: StorageTier::Archive,
                legal_hold: false,
                immutable: false,
            },
            Severity::Security | Severity::Legal => Self {
                duration_days: None,
                tier: StorageTier::Vault,
                legal_hold: true,
                immutable: true,
            },
        };

        // Hold events and permanent-standard tags force a hold even when
        // the severity table alone would allow expiry.
        if event_type == EventType::LegalHoldApplied
            || tags.iter().any(ComplianceStandard::permanent)
        {
            policy.legal_hold = true;
            policy.immutable = true;
            policy.duration_days = None;
            policy.tier = StorageTier::Vault;
        }

        policy
    }

    /// Computes the expiry timestamp for an entry written at
    /// `timestamp_ms`.
    ///
    /// Held or permanent entries never expire.
    #[must_use]
    pub fn expires_at_ms(&self, timestamp_ms: u64) -> Option<u64> {
        if self.legal_hold {
            return None;
        }
        self.duration_days
            .map(|days| timestamp_ms + u64::from(days) * MS_PER_DAY)
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_informational_gets_short_retention() {
        let policy = RetentionPolicy::resolve(
            Severity::Informational,
            EventType::AccessGranted,
            &[],
        );
        assert_eq!(policy.duration_days, Some(90));
        assert!(!policy.legal_hold);
        assert!(!policy.immutable);
    }

    #[test]
    fn test_legal_severity_is_held_and_permanent() {
        let policy = RetentionPolicy::resolve(Severity::Legal, EventType::LegalHoldApplied, &[]);
        assert!(policy.legal_hold);
        assert!(policy.immutable);
        assert_eq!(policy.duration_days, None);
        assert_eq!(policy.expires_at_ms(1_000), None);
    }

    #[test]
    fn test_security_severity_is_held_and_permanent() {
        let policy = RetentionPolicy::resolve(
            Severity::Security,
            EventType::TenantIsolationViolation,
            &[],
        );
        assert!(policy.legal_hold);
        assert_eq!(policy.duration_days, None);
    }

    #[test]
    fn test_permanent_tag_forces_hold() {
        let policy = RetentionPolicy::resolve(
            Severity::Informational,
            EventType::ResourceViewed,
            &[ComplianceStandard::CourtOrder],
        );
        assert!(policy.legal_hold);
        assert!(policy.immutable);
        assert_eq!(policy.duration_days, None);
    }

    #[test]
    fn test_non_permanent_tag_keeps_severity_policy() {
        let policy = RetentionPolicy::resolve(
            Severity::Warning,
            EventType::ResourceExported,
            &[ComplianceStandard::Gdpr],
        );
        assert!(!policy.legal_hold);
        assert_eq!(policy.duration_days, Some(365));
    }

    #[test]
    fn test_expiry_is_never_before_timestamp_plus_duration() {
        let ts = 1_700_000_000_000u64;
        let policy = RetentionPolicy::resolve(Severity::Warning, EventType::AccessDenied, &[]);
        let expires = policy.expires_at_ms(ts).unwrap();
        assert_eq!(expires, ts + 365 * MS_PER_DAY);
        assert!(expires >= ts + 365 * MS_PER_DAY);
    }
}
