//! Role definitions and grant satisfaction.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::permission::{Grant, Permission};
use super::scope::ScopeTier;

/// How much detail a role's activity generates in the audit ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AuditVerbosity {
    /// Denials and high-severity events only.
    Minimal,
    /// Every decision outcome.
    Standard,
    /// Every decision outcome plus full context payloads.
    Verbose,
}

impl Default for AuditVerbosity {
    fn default() -> Self {
        Self::Standard
    }
}

/// A role in the practice hierarchy. Immutable once the catalog is built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Role {
    /// Canonical role name (`SCREAMING_SNAKE_CASE`).
    pub name: String,

    /// Hierarchy rank; higher ranks outrank lower ones.
    pub level: u8,

    /// Grants held by this role.
    pub grants: BTreeSet<Grant>,

    /// The boundary within which the role's grants apply.
    pub scope: ScopeTier,

    /// Whether sessions for this role must be MFA-backed.
    #[serde(default)]
    pub requires_mfa: bool,

    /// Audit detail level for this role's activity.
    #[serde(default)]
    pub audit_verbosity: AuditVerbosity,

    /// External parties (opposing counsel, vendors, third parties).
    /// Excluded outright from privileged material.
    #[serde(default)]
    pub external: bool,
}

impl Role {
    /// Whether this role satisfies the given permission.
    ///
    /// Satisfaction paths, in order:
    /// 1. an exact grant for the permission;
    /// 2. the full `*` wildcard;
    /// 3. a per-resource wildcard, bounded by the role's level: the grant
    ///    covers actions whose level does not exceed the role's rank.
    ///
    /// The level bound is what makes the hierarchy monotonic: a level-70
    /// role holding `DOCUMENT_*` still cannot perform level-90
    /// `DOCUMENT_DELETE`.
    #[must_use]
    pub fn satisfies(&self, permission: Permission) -> bool {
        if self.grants.contains(&Grant::Exact(permission)) {
            return true;
        }
        if self.grants.contains(&Grant::All) {
            return true;
        }
        self.grants.contains(&Grant::Resource(permission.resource))
            && self.level >= permission.level()
    }

    /// Whether the role operates beyond a single tenant.
    #[must_use]
    pub const fn is_global(&self) -> bool {
        matches!(self.scope, ScopeTier::Global)
    }
}
