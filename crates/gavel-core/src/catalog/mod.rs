//! The policy catalog: roles, permissions, and scopes.
//!
//! The catalog is built once at startup from configuration and never
//! mutated afterwards. Reload replaces the whole catalog behind a
//! [`SharedCatalog`] swap; the decision engine only ever sees a complete,
//! validated catalog.

mod permission;
mod role;
mod scope;

#[cfg(test)]
mod proptest_identifiers;
#[cfg(test)]
mod tests;

pub use permission::{Action, Grant, Permission, ResourceType};
pub use role::{AuditVerbosity, Role};
pub use scope::ScopeTier;

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// The distinguished role that bypasses all checks.
pub const SUPER_ADMIN_ROLE: &str = "SUPER_ADMIN";

/// Upper bound on roles in one catalog.
pub const MAX_ROLES: usize = 256;

/// Errors raised while building or querying the catalog.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CatalogError {
    /// Unrecognized resource type name.
    #[error("unknown resource type: {value}")]
    UnknownResource {
        /// The offending input.
        value: String,
    },

    /// Unrecognized action name.
    #[error("unknown action: {value}")]
    UnknownAction {
        /// The offending input.
        value: String,
    },

    /// Unrecognized permission string.
    #[error("unknown permission: {value}")]
    UnknownPermission {
        /// The offending input.
        value: String,
    },

    /// Unrecognized scope tier name.
    #[error("unknown scope tier: {value}")]
    UnknownScope {
        /// The offending input.
        value: String,
    },

    /// Unrecognized role name at evaluation time.
    #[error("unknown role: {value}")]
    UnknownRole {
        /// The offending input.
        value: String,
    },

    /// A role name appears twice in the catalog definition.
    #[error("duplicate role definition: {name}")]
    DuplicateRole {
        /// The duplicated role name.
        name: String,
    },

    /// The catalog definition exceeds [`MAX_ROLES`].
    #[error("catalog defines {count} roles, maximum is {MAX_ROLES}")]
    TooManyRoles {
        /// Number of roles defined.
        count: usize,
    },

    /// Catalog TOML could not be parsed.
    #[error("catalog parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Normalizes a role or permission identifier.
///
/// Inputs are case- and whitespace-insensitive: leading/trailing
/// whitespace is trimmed, interior runs of whitespace collapse to a
/// single underscore, and the result is uppercased.
#[must_use]
pub fn normalize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_gap = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() {
            pending_gap = true;
            continue;
        }
        if pending_gap && !out.is_empty() {
            out.push('_');
        }
        pending_gap = false;
        for upper in ch.to_uppercase() {
            out.push(upper);
        }
    }
    out
}

/// One role definition in catalog configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleConfig {
    /// Role name; normalized on load.
    pub name: String,
    /// Hierarchy rank.
    pub level: u8,
    /// Grant strings: `*`, `RESOURCE_*`, or `RESOURCE_ACTION`.
    #[serde(default)]
    pub grants: Vec<String>,
    /// Scope tier name.
    pub scope: String,
    /// Whether sessions must be MFA-backed.
    #[serde(default)]
    pub requires_mfa: bool,
    /// External-party flag.
    #[serde(default)]
    pub external: bool,
}

/// Top-level catalog configuration document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Role definitions.
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

/// Immutable catalog of roles, permissions, and scopes.
///
/// Pure data; the only behavior is lookup. Built once, shared via `Arc`.
#[derive(Debug)]
pub struct PolicyCatalog {
    roles: HashMap<String, Role>,
}

impl PolicyCatalog {
    /// Builds a catalog from configuration, validating every grant and
    /// scope string up front.
    ///
    /// # Errors
    ///
    /// Returns a `CatalogError` on any unknown grant, scope, duplicate
    /// role, or size-limit violation.
    pub fn from_config(config: &CatalogConfig) -> Result<Self, CatalogError> {
        if config.roles.len() > MAX_ROLES {
            return Err(CatalogError::TooManyRoles {
                count: config.roles.len(),
            });
        }

        let mut roles = HashMap::with_capacity(config.roles.len());
        for rc in &config.roles {
            let name = normalize_identifier(&rc.name);
            let mut grants = BTreeSet::new();
            for g in &rc.grants {
                grants.insert(Grant::parse(g)?);
            }
            let role = Role {
                name: name.clone(),
                level: rc.level,
                grants,
                scope: ScopeTier::parse(&rc.scope)?,
                requires_mfa: rc.requires_mfa,
                audit_verbosity: AuditVerbosity::default(),
                external: rc.external,
            };
            if roles.insert(name.clone(), role).is_some() {
                return Err(CatalogError::DuplicateRole { name });
            }
        }
        Ok(Self { roles })
    }

    /// Parses a catalog from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a `CatalogError` if the document cannot be parsed or fails
    /// validation.
    pub fn from_toml(content: &str) -> Result<Self, CatalogError> {
        let config: CatalogConfig = toml::from_str(content)?;
        Self::from_config(&config)
    }

    /// The built-in catalog of practice-platform roles.
    ///
    /// Serves as the default when no catalog configuration is supplied,
    /// and as the fixture set for tests.
    #[must_use]
    pub fn builtin() -> Self {
        let config = CatalogConfig {
            roles: vec![
                RoleConfig {
                    name: SUPER_ADMIN_ROLE.to_string(),
                    level: 100,
                    grants: vec!["*".to_string()],
                    scope: "GLOBAL".to_string(),
                    requires_mfa: true,
                    external: false,
                },
                RoleConfig {
                    name: "FIRM_ADMIN".to_string(),
                    level: 90,
                    grants: vec![
                        "DOCUMENT_*".to_string(),
                        "CASE_*".to_string(),
                        "CLIENT_*".to_string(),
                        "CLIENT_DATA_*".to_string(),
                        "BILLING_*".to_string(),
                        "USER_*".to_string(),
                        "AUDIT_LOG_READ".to_string(),
                        "WORK_PRODUCT_*".to_string(),
                    ],
                    scope: "TENANT".to_string(),
                    requires_mfa: true,
                    external: false,
                },
                RoleConfig {
                    name: "MANAGING_PARTNER".to_string(),
                    level: 85,
                    grants: vec![
                        "DOCUMENT_*".to_string(),
                        "CASE_*".to_string(),
                        "CLIENT_*".to_string(),
                        "BILLING_*".to_string(),
                        "WORK_PRODUCT_*".to_string(),
                    ],
                    scope: "TENANT".to_string(),
                    requires_mfa: true,
                    external: false,
                },
                RoleConfig {
                    name: "ATTORNEY".to_string(),
                    level: 70,
                    grants: vec![
                        "DOCUMENT_*".to_string(),
                        "CASE_*".to_string(),
                        "CLIENT_READ".to_string(),
                        "CLIENT_DATA_READ".to_string(),
                        "WORK_PRODUCT_*".to_string(),
                    ],
                    scope: "PROJECT".to_string(),
                    requires_mfa: false,
                    external: false,
                },
                RoleConfig {
                    name: "PARALEGAL".to_string(),
                    level: 50,
                    grants: vec![
                        "DOCUMENT_READ".to_string(),
                        "DOCUMENT_CREATE".to_string(),
                        "DOCUMENT_UPDATE".to_string(),
                        "CASE_READ".to_string(),
                        "CASE_UPDATE".to_string(),
                        "WORK_PRODUCT_READ".to_string(),
                    ],
                    scope: "PROJECT".to_string(),
                    requires_mfa: false,
                    external: false,
                },
                RoleConfig {
                    name: "BILLING_CLERK".to_string(),
                    level: 40,
                    grants: vec![
                        "BILLING_*".to_string(),
                        "CLIENT_READ".to_string(),
                    ],
                    scope: "TENANT".to_string(),
                    requires_mfa: false,
                    external: false,
                },
                RoleConfig {
                    name: "CLIENT_REPRESENTATIVE".to_string(),
                    level: 20,
                    grants: vec![
                        "DOCUMENT_READ".to_string(),
                        "CASE_READ".to_string(),
                        "CLIENT_DATA_READ".to_string(),
                        "BILLING_READ".to_string(),
                    ],
                    scope: "CLIENT".to_string(),
                    requires_mfa: false,
                    external: false,
                },
                RoleConfig {
                    name: "EXTERNAL_COUNSEL".to_string(),
                    level: 30,
                    grants: vec![
                        "DOCUMENT_READ".to_string(),
                        "CASE_READ".to_string(),
                    ],
                    scope: "PROJECT".to_string(),
                    requires_mfa: false,
                    external: true,
                },
                RoleConfig {
                    name: "THIRD_PARTY".to_string(),
                    level: 10,
                    grants: vec!["DOCUMENT_READ".to_string()],
                    scope: "CLIENT".to_string(),
                    requires_mfa: false,
                    external: true,
                },
            ],
        };
        Self::from_config(&config).expect("builtin catalog is well-formed")
    }

    /// Looks up a role by normalized name.
    #[must_use]
    pub fn role(&self, normalized_name: &str) -> Option<&Role> {
        self.roles.get(normalized_name)
    }

    /// Number of roles in the catalog.
    #[must_use]
    pub fn role_count(&self) -> usize {
        self.roles.len()
    }

    /// Role names permitted to operate at a scope tier.
    ///
    /// A role may operate at its own tier and every narrower tier.
    #[must_use]
    pub fn roles_at_tier(&self, tier: ScopeTier) -> BTreeSet<&str> {
        self.roles
            .values()
            .filter(|r| r.scope <= tier)
            .map(|r| r.name.as_str())
            .collect()
    }
}

/// Shared handle to the current catalog, supporting atomic reload.
///
/// Readers clone the inner `Arc`; reload swaps the reference wholesale so
/// an in-flight evaluation always sees one consistent catalog.
#[derive(Debug, Clone)]
pub struct SharedCatalog {
    inner: Arc<RwLock<Arc<PolicyCatalog>>>,
}

impl SharedCatalog {
    /// Wraps an initial catalog.
    #[must_use]
    pub fn new(catalog: PolicyCatalog) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(catalog))),
        }
    }

    /// Returns the current catalog snapshot.
    ///
    /// The snapshot stays valid for the caller even if a reload swaps the
    /// shared reference mid-evaluation.
    #[must_use]
    pub fn load(&self) -> Arc<PolicyCatalog> {
        self.inner
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// Atomically replaces the catalog.
    ///
    /// Callers are responsible for purging decision caches afterwards;
    /// cached decisions may reflect the old catalog until then.
    pub fn swap(&self, catalog: PolicyCatalog) {
        let role_count = catalog.role_count();
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(catalog);
        info!(role_count, "policy catalog swapped");
    }
}
