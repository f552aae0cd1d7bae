//! Override predicates: compliance rules consulted after a base allow.
//!
//! Predicates can only narrow access. They run in registration order and
//! the first veto wins; a predicate never converts a deny into an allow.

use crate::catalog::{Permission, ResourceType, Role};

use super::decision::{Decision, DecisionCode};
use super::{DataCategory, ResourceContext, Subject};

/// A compliance rule reviewed after the base permission check allows.
pub trait OverridePredicate: Send + Sync {
    /// Stable rule name, used in deny reasons and logs.
    fn name(&self) -> &'static str;

    /// Reviews an allowed operation; returns a deny decision to veto it.
    fn review(
        &self,
        subject: &Subject,
        role: &Role,
        permission: Permission,
        ctx: &ResourceContext,
    ) -> Option<Decision>;
}

/// Roles permitted to touch privileged material at all.
const PRIVILEGE_ROLES: &[&str] = &[
    "SUPER_ADMIN",
    "FIRM_ADMIN",
    "MANAGING_PARTNER",
    "ATTORNEY",
    "PARALEGAL",
];

/// Attorney-client privilege and work-product protection.
///
/// External parties are excluded from privileged material outright, and
/// even internal access is restricted to the enumerated practice roles.
#[derive(Debug, Default, Clone, Copy)]
pub struct LegalPrivilegeRule;

impl LegalPrivilegeRule {
    fn applies(permission: Permission, ctx: &ResourceContext) -> bool {
        permission.resource == ResourceType::WorkProduct
            || ctx.data_category == Some(DataCategory::Privileged)
    }
}

impl OverridePredicate for LegalPrivilegeRule {
    fn name(&self) -> &'static str {
        "legal_privilege"
    }

    fn review(
        &self,
        _subject: &Subject,
        role: &Role,
        permission: Permission,
        ctx: &ResourceContext,
    ) -> Option<Decision> {
        if !Self::applies(permission, ctx) {
            return None;
        }
        if role.external {
            return Some(Decision::deny(
                DecisionCode::ComplianceViolation,
                "external parties are excluded from privileged material",
            ));
        }
        if !PRIVILEGE_ROLES.contains(&role.name.as_str()) {
            return Some(Decision::deny(
                DecisionCode::ComplianceViolation,
                format!("role {} may not access privileged material", role.name),
            ));
        }
        None
    }
}

/// Data-protection minimization for client personal data.
///
/// Access to personal or sensitive categories requires a declared
/// purpose; external roles are barred from sensitive categories; client
/// representatives see only their own client's records.
#[derive(Debug, Default, Clone, Copy)]
pub struct DataMinimizationRule;

impl DataMinimizationRule {
    fn applies(permission: Permission, ctx: &ResourceContext) -> bool {
        permission.resource == ResourceType::ClientData
            || matches!(
                ctx.data_category,
                Some(DataCategory::Personal | DataCategory::Sensitive)
            )
    }
}

impl OverridePredicate for DataMinimizationRule {
    fn name(&self) -> &'static str {
        "data_minimization"
    }

    fn review(
        &self,
        subject: &Subject,
        role: &Role,
        permission: Permission,
        ctx: &ResourceContext,
    ) -> Option<Decision> {
        if !Self::applies(permission, ctx) {
            return None;
        }
        if ctx.purpose.as_deref().map_or(true, |p| p.trim().is_empty()) {
            return Some(Decision::deny(
                DecisionCode::ComplianceViolation,
                "personal data access requires a declared purpose",
            ));
        }
        if role.external && ctx.data_category == Some(DataCategory::Sensitive) {
            return Some(Decision::deny(
                DecisionCode::ComplianceViolation,
                "external parties may not access sensitive data categories",
            ));
        }
        if role.scope == crate::catalog::ScopeTier::Client {
            let own = subject.client_id.as_deref();
            if own.is_none() || own != ctx.client_id.as_deref() {
                return Some(Decision::deny(
                    DecisionCode::ComplianceViolation,
                    "client-scoped subjects may only access their own client's records",
                ));
            }
        }
        None
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::catalog::{Action, PolicyCatalog};

    fn subject(client: Option<&str>) -> Subject {
        Subject {
            id: "user-1".to_string(),
            tenant_id: "t1".to_string(),
            role: "CLIENT_REPRESENTATIVE".to_string(),
            client_id: client.map(str::to_string),
        }
    }

    fn ctx(category: Option<DataCategory>, purpose: Option<&str>, client: Option<&str>) -> ResourceContext {
        ResourceContext {
            tenant_id: "t1".to_string(),
            resource_id: "rec-1".to_string(),
            client_id: client.map(str::to_string),
            data_category: category,
            purpose: purpose.map(str::to_string),
            ..ResourceContext::default()
        }
    }

    fn role(name: &str) -> Role {
        PolicyCatalog::builtin().role(name).unwrap().clone()
    }

    #[test]
    fn test_privilege_rule_excludes_external_roles() {
        let rule = LegalPrivilegeRule;
        let permission = Permission::new(ResourceType::WorkProduct, Action::Read);
        let veto = rule.review(
            &subject(None),
            &role("EXTERNAL_COUNSEL"),
            permission,
            &ctx(None, None, None),
        );
        assert!(veto.is_some_and(|d| d.code == DecisionCode::ComplianceViolation));
    }

    #[test]
    fn test_privilege_rule_allows_attorneys() {
        let rule = LegalPrivilegeRule;
        let permission = Permission::new(ResourceType::WorkProduct, Action::Read);
        assert!(rule
            .review(&subject(None), &role("ATTORNEY"), permission, &ctx(None, None, None))
            .is_none());
    }

    #[test]
    fn test_privilege_rule_covers_privileged_category() {
        let rule = LegalPrivilegeRule;
        let permission = Permission::new(ResourceType::Document, Action::Read);
        let veto = rule.review(
            &subject(None),
            &role("BILLING_CLERK"),
            permission,
            &ctx(Some(DataCategory::Privileged), None, None),
        );
        assert!(veto.is_some());
    }

    #[test]
    fn test_minimization_requires_purpose() {
        let rule = DataMinimizationRule;
        let permission = Permission::new(ResourceType::ClientData, Action::Read);
        let veto = rule.review(
            &subject(Some("c-1")),
            &role("ATTORNEY"),
            permission,
            &ctx(Some(DataCategory::Personal), None, Some("c-1")),
        );
        assert!(veto.is_some());
        assert!(rule
            .review(
                &subject(Some("c-1")),
                &role("ATTORNEY"),
                permission,
                &ctx(Some(DataCategory::Personal), Some("case preparation"), Some("c-1")),
            )
            .is_none());
    }

    #[test]
    fn test_minimization_blocks_cross_client_access() {
        let rule = DataMinimizationRule;
        let permission = Permission::new(ResourceType::ClientData, Action::Read);
        let veto = rule.review(
            &subject(Some("c-1")),
            &role("CLIENT_REPRESENTATIVE"),
            permission,
            &ctx(Some(DataCategory::Personal), Some("billing inquiry"), Some("c-2")),
        );
        assert!(veto.is_some_and(|d| !d.allowed));
    }
}
