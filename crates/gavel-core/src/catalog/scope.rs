//! Scope tiers: the boundary within which a role's grants apply.

use serde::{Deserialize, Serialize};

use super::CatalogError;

/// Enforcement tier for a role's grants.
///
/// Tiers narrow monotonically: a global role sees across tenants, a
/// tenant role is confined to its firm, a project role to assigned
/// matters, a client role to its own records only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ScopeTier {
    /// Cross-tenant platform operations.
    Global,
    /// Confined to one tenant (firm).
    Tenant,
    /// Confined to assigned matters within one tenant.
    Project,
    /// Confined to the subject's own client records.
    Client,
}

impl ScopeTier {
    /// Parses a scope tier case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownScope` for unrecognized input.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        match s.to_uppercase().as_str() {
            "GLOBAL" => Ok(Self::Global),
            "TENANT" => Ok(Self::Tenant),
            "PROJECT" => Ok(Self::Project),
            "CLIENT" => Ok(Self::Client),
            _ => Err(CatalogError::UnknownScope {
                value: s.to_string(),
            }),
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Global => "GLOBAL",
            Self::Tenant => "TENANT",
            Self::Project => "PROJECT",
            Self::Client => "CLIENT",
        }
    }
}

impl std::fmt::Display for ScopeTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    #[test]
    fn test_parse_round_trip() {
        for tier in [
            ScopeTier::Global,
            ScopeTier::Tenant,
            ScopeTier::Project,
            ScopeTier::Client,
        ] {
            assert_eq!(ScopeTier::parse(tier.as_str()).unwrap(), tier);
        }
        assert_eq!(ScopeTier::parse("client").unwrap(), ScopeTier::Client);
        assert!(ScopeTier::parse("COUNTY").is_err());
    }
}
