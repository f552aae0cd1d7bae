//! Closed permission vocabulary: resource × action with hierarchy levels.
//!
//! Permissions were historically composed as `"RESOURCE_ACTION"` strings.
//! Here both sides are closed enums, so a typo in a permission name is a
//! parse error at catalog load instead of a silent deny (or worse, a
//! silent allow against an unintended resource).

use serde::{Deserialize, Serialize};

use super::CatalogError;

/// Protected resource types of the practice platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum ResourceType {
    /// Documents and filings.
    Document,
    /// Matters / case files.
    Case,
    /// Client master records.
    Client,
    /// Client personal data (data-protection sensitive).
    ClientData,
    /// Billing and trust accounting records.
    Billing,
    /// Platform user accounts.
    User,
    /// The audit ledger itself.
    AuditLog,
    /// Attorney work product (privilege-restricted).
    WorkProduct,
}

impl ResourceType {
    /// Parses a resource type from its canonical `SCREAMING_SNAKE_CASE`
    /// form. Matching is case-insensitive.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownResource` for unrecognized input.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        match s.to_uppercase().as_str() {
            "DOCUMENT" => Ok(Self::Document),
            "CASE" => Ok(Self::Case),
            "CLIENT" => Ok(Self::Client),
            "CLIENT_DATA" => Ok(Self::ClientData),
            "BILLING" => Ok(Self::Billing),
            "USER" => Ok(Self::User),
            "AUDIT_LOG" => Ok(Self::AuditLog),
            "WORK_PRODUCT" => Ok(Self::WorkProduct),
            _ => Err(CatalogError::UnknownResource {
                value: s.to_string(),
            }),
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Document => "DOCUMENT",
            Self::Case => "CASE",
            Self::Client => "CLIENT",
            Self::ClientData => "CLIENT_DATA",
            Self::Billing => "BILLING",
            Self::User => "USER",
            Self::AuditLog => "AUDIT_LOG",
            Self::WorkProduct => "WORK_PRODUCT",
        }
    }
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Actions that can be performed on a resource.
///
/// Each action carries a hierarchy level; a permission's level is its
/// action's level. Destructive and disclosure actions rank highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[non_exhaustive]
pub enum Action {
    /// Read access.
    Read,
    /// Create new records.
    Create,
    /// Modify existing records.
    Update,
    /// Export / produce outside the platform.
    Export,
    /// Approve or sign off.
    Approve,
    /// Delete records.
    Delete,
}

impl Action {
    /// Parses an action from its canonical form, case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownAction` for unrecognized input.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        match s.to_uppercase().as_str() {
            "READ" => Ok(Self::Read),
            "CREATE" => Ok(Self::Create),
            "UPDATE" => Ok(Self::Update),
            "EXPORT" => Ok(Self::Export),
            "APPROVE" => Ok(Self::Approve),
            "DELETE" => Ok(Self::Delete),
            _ => Err(CatalogError::UnknownAction {
                value: s.to_string(),
            }),
        }
    }

    /// Canonical string form.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "READ",
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Export => "EXPORT",
            Self::Approve => "APPROVE",
            Self::Delete => "DELETE",
        }
    }

    /// Hierarchy level required for this action.
    #[must_use]
    pub const fn level(&self) -> u8 {
        match self {
            Self::Read => 10,
            Self::Create => 30,
            Self::Update => 50,
            Self::Export => 60,
            Self::Approve => 70,
            Self::Delete => 90,
        }
    }
}

/// A concrete permission: one action on one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    /// The resource the permission applies to.
    pub resource: ResourceType,
    /// The action being performed.
    pub action: Action,
}

impl Permission {
    /// Creates a permission.
    #[must_use]
    pub const fn new(resource: ResourceType, action: Action) -> Self {
        Self { resource, action }
    }

    /// Hierarchy level required for this permission.
    #[must_use]
    pub const fn level(&self) -> u8 {
        self.action.level()
    }

    /// Parses `"RESOURCE_ACTION"` canonical form, e.g. `DOCUMENT_DELETE`.
    ///
    /// The action is the suffix after the final underscore; everything
    /// before it is the resource.
    ///
    /// # Errors
    ///
    /// Returns a `CatalogError` if either side is unrecognized.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        let s = s.trim();
        let (resource, action) = s
            .rsplit_once('_')
            .ok_or_else(|| CatalogError::UnknownPermission {
                value: s.to_string(),
            })?;
        // CLIENT_DATA_READ splits as (CLIENT_DATA, READ); CLIENT_DATA alone
        // would split as (CLIENT, DATA) and fail on the action side.
        let action = Action::parse(action).map_err(|_| CatalogError::UnknownPermission {
            value: s.to_string(),
        })?;
        let resource = ResourceType::parse(resource).map_err(|_| CatalogError::UnknownPermission {
            value: s.to_string(),
        })?;
        Ok(Self { resource, action })
    }

    /// Canonical `"RESOURCE_ACTION"` form.
    #[must_use]
    pub fn as_string(&self) -> String {
        format!("{}_{}", self.resource.as_str(), self.action.as_str())
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.resource.as_str(), self.action.as_str())
    }
}

/// A grant held by a role.
///
/// Grants are broader than single permissions: a role may hold the full
/// wildcard, a per-resource wildcard, or an exact permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Grant {
    /// The `*` wildcard: every action on every resource.
    All,
    /// Every action on one resource, bounded by the role's level.
    Resource(ResourceType),
    /// A single exact permission.
    Exact(Permission),
}

impl Grant {
    /// Parses a grant from config syntax: `*`, `RESOURCE_*`, or
    /// `RESOURCE_ACTION`.
    ///
    /// # Errors
    ///
    /// Returns a `CatalogError` for unrecognized input.
    pub fn parse(s: &str) -> Result<Self, CatalogError> {
        let s = s.trim();
        if s == "*" {
            return Ok(Self::All);
        }
        if let Some(resource) = s.strip_suffix("_*") {
            return Ok(Self::Resource(ResourceType::parse(resource)?));
        }
        Ok(Self::Exact(Permission::parse(s)?))
    }

    /// Canonical config string form.
    #[must_use]
    pub fn as_string(&self) -> String {
        match self {
            Self::All => "*".to_string(),
            Self::Resource(r) => format!("{}_*", r.as_str()),
            Self::Exact(p) => p.as_string(),
        }
    }
}
