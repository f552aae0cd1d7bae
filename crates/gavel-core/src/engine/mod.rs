//! The access decision engine.
//!
//! `evaluate` runs a fixed sequence of short-circuiting steps: identifier
//! normalization, super-admin bypass, tenant isolation, cache lookup,
//! the base permission check, then override predicates. Denials are
//! normal outcomes with structured codes; the only evaluation error is a
//! request with no authenticated subject. The engine itself writes
//! nothing to the ledger; [`crate::gate::AccessGate`] owns the
//! evaluate-then-record pipeline.

mod decision;
mod overrides;

#[cfg(test)]
mod tests;

pub use decision::{Decision, DecisionCode};
pub use overrides::{DataMinimizationRule, LegalPrivilegeRule, OverridePredicate};

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

use crate::alert::{AlertDispatcher, SecurityAlert};
use crate::cache::{decision_key, DecisionCache, DEFAULT_DECISION_TTL};
use crate::catalog::{
    normalize_identifier, CatalogError, Permission, PolicyCatalog, ScopeTier, SharedCatalog,
    SUPER_ADMIN_ROLE,
};
use crate::clock::{Clock, SystemClock};

/// Errors from evaluation.
///
/// Denials are not errors; this enum covers requests the engine cannot
/// evaluate at all.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EngineError {
    /// The request carries no authenticated subject.
    ///
    /// Never cached, never recorded as a decision; the gate records it as
    /// an authentication failure instead.
    #[error("authentication required: {0}")]
    AuthenticationRequired(String),

    /// The permission string could not be parsed.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Sensitivity classification of the data behind a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[non_exhaustive]
pub enum DataCategory {
    /// Non-personal operational data.
    General,
    /// Personal data subject to minimization rules.
    Personal,
    /// Special-category personal data.
    Sensitive,
    /// Privileged legal material.
    Privileged,
}

impl DataCategory {
    /// Canonical name, used in cache keys and audit payloads.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::General => "GENERAL",
            Self::Personal => "PERSONAL",
            Self::Sensitive => "SENSITIVE",
            Self::Privileged => "PRIVILEGED",
        }
    }
}

/// An authenticated subject, as resolved by the identity layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subject {
    /// Subject identifier.
    pub id: String,
    /// Tenant the subject belongs to.
    pub tenant_id: String,
    /// Role name; normalized during evaluation.
    pub role: String,
    /// For client-scoped subjects, the client they represent.
    pub client_id: Option<String>,
}

/// Everything the engine knows about the targeted resource.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceContext {
    /// Tenant that owns the resource.
    pub tenant_id: String,
    /// Resource identifier.
    pub resource_id: String,
    /// Client the resource belongs to, when applicable.
    pub client_id: Option<String>,
    /// Scope tier at which the operation occurs.
    ///
    /// `None` means the narrowest tier, which every role may operate at.
    pub scope: Option<ScopeTier>,
    /// Data sensitivity classification.
    pub data_category: Option<DataCategory>,
    /// Declared purpose of access, required for personal data.
    pub purpose: Option<String>,
}

/// The decision engine.
///
/// Holds the live catalog, the decision cache, and the registered
/// override predicates. Cheap to share behind an `Arc`.
pub struct DecisionEngine {
    catalog: SharedCatalog,
    cache: Arc<dyn DecisionCache>,
    overrides: Vec<Box<dyn OverridePredicate>>,
    ttl: Duration,
    alerts: Option<AlertDispatcher>,
    clock: Arc<dyn Clock>,
}

impl DecisionEngine {
    /// Creates an engine with the standard override predicates (legal
    /// privilege, data minimization) and the default decision TTL.
    #[must_use]
    pub fn new(catalog: SharedCatalog, cache: Arc<dyn DecisionCache>) -> Self {
        Self {
            catalog,
            cache,
            overrides: vec![
                Box::new(LegalPrivilegeRule),
                Box::new(DataMinimizationRule),
            ],
            ttl: DEFAULT_DECISION_TTL,
            alerts: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Overrides the decision TTL.
    #[must_use]
    pub const fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Attaches the alert channel for immediate security alerts.
    #[must_use]
    pub fn with_alerts(mut self, alerts: AlertDispatcher) -> Self {
        self.alerts = Some(alerts);
        self
    }

    /// Replaces the clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Registers an additional override predicate after the standard
    /// ones.
    #[must_use]
    pub fn with_override(mut self, predicate: Box<dyn OverridePredicate>) -> Self {
        self.overrides.push(predicate);
        self
    }

    /// Evaluates one access request.
    ///
    /// # Errors
    ///
    /// Returns `AuthenticationRequired` for a blank subject id and a
    /// catalog error for an unparseable permission string. Denials are
    /// `Ok` decisions, not errors.
    pub fn evaluate(
        &self,
        subject: &Subject,
        permission: &str,
        ctx: &ResourceContext,
    ) -> Result<Decision, EngineError> {
        // Step 1: normalize. A request without a subject is unanswerable.
        let subject_id = subject.id.trim();
        if subject_id.is_empty() {
            return Err(EngineError::AuthenticationRequired(
                "request has no subject id".to_string(),
            ));
        }
        let role_name = normalize_identifier(&subject.role);
        let permission = Permission::parse(&normalize_identifier(permission))?;
        let now_ms = self.clock.now_ms();

        let catalog = self.catalog.load();
        let Some(role) = catalog.role(&role_name) else {
            return Ok(Decision::deny(
                DecisionCode::InsufficientPermission,
                format!("role {role_name} is not defined in the catalog"),
            )
            .computed_at(now_ms));
        };

        // Step 2: super-admin bypass skips the cache in both directions.
        if role.name == SUPER_ADMIN_ROLE {
            return Ok(Decision::allow_as(
                DecisionCode::SuperAdminOverride,
                "super-admin bypass",
            )
            .computed_at(now_ms));
        }

        // Step 3: tenant isolation. Violations short-circuit before the
        // cache and raise an immediate security alert.
        if !role.is_global() && subject.tenant_id != ctx.tenant_id {
            warn!(
                subject = subject_id,
                subject_tenant = %subject.tenant_id,
                resource_tenant = %ctx.tenant_id,
                "tenant isolation violation"
            );
            if let Some(alerts) = &self.alerts {
                alerts.publish_security(SecurityAlert {
                    subject_tenant_id: subject.tenant_id.clone(),
                    subject_id: subject_id.to_string(),
                    resource_tenant_id: ctx.tenant_id.clone(),
                    permission: permission.as_string(),
                    detected_at_ms: now_ms,
                });
            }
            return Ok(Decision::deny(
                DecisionCode::TenantScopeViolation,
                "subject tenant does not match resource tenant",
            )
            .computed_at(now_ms));
        }

        // Step 4: cache lookup. An unavailable cache degrades to direct
        // evaluation. Every context field the later steps consult is part
        // of the key, so a decision is only ever replayed for an
        // equivalent request.
        let key = decision_key(
            &ctx.tenant_id,
            subject_id,
            &permission.as_string(),
            &ctx.resource_id,
            &[
                ctx.scope.map_or("", |tier| tier.as_str()),
                ctx.data_category.map_or("", |category| category.as_str()),
                ctx.client_id.as_deref().unwrap_or(""),
                ctx.purpose.as_deref().unwrap_or(""),
            ],
        );
        match self.cache.get(&key) {
            Ok(Some(hit)) => return Ok(hit.from_cache()),
            Ok(None) => {}
            Err(e) => debug!(error = %e, "cache read failed; evaluating directly"),
        }

        // Steps 5 and 6: base permission check, then override predicates
        // on an allow.
        let decision = self
            .base_check(role, permission, ctx)
            .or_else(|| {
                self.overrides.iter().find_map(|rule| {
                    rule.review(subject, role, permission, ctx).map(|deny| {
                        debug!(rule = rule.name(), subject = subject_id, "override veto");
                        deny
                    })
                })
            })
            .unwrap_or_else(|| {
                Decision::allow(format!("{} satisfies {}", role.name, permission))
            })
            .computed_at(now_ms);

        // Step 7: cache the final outcome, allow or deny.
        if let Err(e) = self.cache.set_with_ttl(&key, decision.clone(), self.ttl) {
            debug!(error = %e, "cache write failed; decision not memoized");
        }
        Ok(decision)
    }

    /// The non-override denial checks: scope tier and grant coverage.
    fn base_check(
        &self,
        role: &crate::catalog::Role,
        permission: Permission,
        ctx: &ResourceContext,
    ) -> Option<Decision> {
        let operation_tier = ctx.scope.unwrap_or(ScopeTier::Client);
        if role.scope > operation_tier {
            return Some(Decision::deny(
                DecisionCode::ScopeViolation,
                format!(
                    "role {} operates at {} scope, operation requires {}",
                    role.name,
                    role.scope.as_str(),
                    operation_tier.as_str()
                ),
            ));
        }
        if !role.satisfies(permission) {
            return Some(Decision::deny(
                DecisionCode::InsufficientPermission,
                format!("role {} does not grant {}", role.name, permission),
            ));
        }
        None
    }

    /// Purges all cached decisions for a tenant.
    #[must_use = "the removed-entry count signals whether the purge matched anything"]
    pub fn purge_tenant(&self, tenant_id: &str) -> usize {
        self.cache
            .purge_matching(&format!("{tenant_id}:"))
            .unwrap_or_else(|e| {
                warn!(error = %e, tenant = tenant_id, "tenant cache purge failed");
                0
            })
    }

    /// Purges all cached decisions for one subject within a tenant.
    #[must_use = "the removed-entry count signals whether the purge matched anything"]
    pub fn purge_subject(&self, tenant_id: &str, subject_id: &str) -> usize {
        self.cache
            .purge_matching(&format!("{tenant_id}:{subject_id}:"))
            .unwrap_or_else(|e| {
                warn!(error = %e, subject = subject_id, "subject cache purge failed");
                0
            })
    }

    /// Atomically swaps the catalog and clears the decision cache.
    ///
    /// Cached decisions reflect the old catalog, so the purge is part of
    /// the swap, not a follow-up.
    pub fn reload_catalog(&self, catalog: PolicyCatalog) {
        self.catalog.swap(catalog);
        if let Err(e) = self.cache.purge_all() {
            warn!(error = %e, "cache clear after catalog reload failed");
        }
    }

    /// The current catalog snapshot.
    #[must_use]
    pub fn catalog(&self) -> Arc<PolicyCatalog> {
        self.catalog.load()
    }
}
