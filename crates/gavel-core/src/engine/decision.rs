//! Decision outcomes.

use serde::{Deserialize, Serialize};

/// Machine-readable decision codes.
///
/// Denial codes are normal outcomes, not errors: they are recorded,
/// cached, and returned to the caller with a structured reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum DecisionCode {
    /// The role satisfies the permission and every override predicate.
    Granted,
    /// Allowed via the super-admin bypass.
    SuperAdminOverride,
    /// The role's grants do not cover the permission.
    InsufficientPermission,
    /// The operation's scope tier is broader than the role's scope.
    ScopeViolation,
    /// The subject reached across a tenant boundary.
    TenantScopeViolation,
    /// An override predicate (privilege, data minimization) vetoed a
    /// base allow.
    ComplianceViolation,
}

impl DecisionCode {
    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "GRANTED",
            Self::SuperAdminOverride => "SUPER_ADMIN_OVERRIDE",
            Self::InsufficientPermission => "INSUFFICIENT_PERMISSION",
            Self::ScopeViolation => "SCOPE_VIOLATION",
            Self::TenantScopeViolation => "TENANT_SCOPE_VIOLATION",
            Self::ComplianceViolation => "COMPLIANCE_VIOLATION",
        }
    }
}

impl std::fmt::Display for DecisionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one evaluation.
///
/// Ephemeral: decisions live in the cache under a TTL and are re-derived
/// freely; the durable record of each outcome is the ledger entry the
/// caller writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    /// Whether the operation is allowed.
    pub allowed: bool,
    /// Machine-readable outcome code.
    pub code: DecisionCode,
    /// Human-readable reason.
    pub reason: String,
    /// When the decision was computed (ms since epoch); zero for
    /// decisions constructed outside the engine.
    pub computed_at_ms: u64,
    /// Whether this instance was served from the cache.
    #[serde(default)]
    pub cached: bool,
}

impl Decision {
    /// An allow with code [`DecisionCode::Granted`].
    #[must_use]
    pub fn allow(reason: impl Into<String>) -> Self {
        Self::allow_as(DecisionCode::Granted, reason)
    }

    /// An allow with an explicit code.
    #[must_use]
    pub fn allow_as(code: DecisionCode, reason: impl Into<String>) -> Self {
        Self {
            allowed: true,
            code,
            reason: reason.into(),
            computed_at_ms: 0,
            cached: false,
        }
    }

    /// A deny with the given code.
    #[must_use]
    pub fn deny(code: DecisionCode, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            code,
            reason: reason.into(),
            computed_at_ms: 0,
            cached: false,
        }
    }

    /// Stamps the computation time.
    #[must_use]
    pub const fn computed_at(mut self, timestamp_ms: u64) -> Self {
        self.computed_at_ms = timestamp_ms;
        self
    }

    /// Marks the decision as a cache hit.
    #[must_use]
    pub const fn from_cache(mut self) -> Self {
        self.cached = true;
        self
    }
}
