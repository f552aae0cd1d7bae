//! Engine tests: the evaluation sequence end to end against the builtin
//! catalog.

use std::sync::Arc;
use std::time::Duration;

use super::*;
use crate::alert::{AlertDispatcher, AlertMessage};
use crate::cache::{MemoryDecisionCache, UnavailableCache};
use crate::catalog::PolicyCatalog;
use crate::clock::FixedClock;

const T0: u64 = 1_700_000_000_000;

fn engine_with_cache(cache: Arc<dyn crate::cache::DecisionCache>) -> DecisionEngine {
    DecisionEngine::new(SharedCatalog::new(PolicyCatalog::builtin()), cache)
        .with_clock(Arc::new(FixedClock::at(T0)))
}

fn engine() -> (DecisionEngine, Arc<MemoryDecisionCache>) {
    let cache = Arc::new(MemoryDecisionCache::new());
    let shared: Arc<dyn crate::cache::DecisionCache> = cache.clone();
    (engine_with_cache(shared), cache)
}

fn subject(role: &str, tenant: &str) -> Subject {
    Subject {
        id: "user-1".to_string(),
        tenant_id: tenant.to_string(),
        role: role.to_string(),
        client_id: None,
    }
}

fn ctx(tenant: &str) -> ResourceContext {
    ResourceContext {
        tenant_id: tenant.to_string(),
        resource_id: "res-1".to_string(),
        ..ResourceContext::default()
    }
}

#[test]
fn test_blank_subject_is_an_authentication_error() {
    let (engine, _) = engine();
    let mut anon = subject("ATTORNEY", "t1");
    anon.id = "   ".to_string();
    let result = engine.evaluate(&anon, "DOCUMENT_READ", &ctx("t1"));
    assert!(matches!(result, Err(EngineError::AuthenticationRequired(_))));
}

#[test]
fn test_super_admin_bypasses_everything_including_the_cache() {
    let (engine, cache) = engine();
    let admin = subject("SUPER_ADMIN", "t1");

    // Cross-tenant, destructive, privileged: still allowed.
    let decision = engine
        .evaluate(&admin, "WORK_PRODUCT_DELETE", &ctx("t2"))
        .unwrap();
    assert!(decision.allowed);
    assert_eq!(decision.code, DecisionCode::SuperAdminOverride);
    assert_eq!(decision.computed_at_ms, T0);
    assert!(cache.is_empty());
}

#[test]
fn test_tenant_isolation_denies_and_alerts() {
    let alerts = AlertDispatcher::new();
    let (engine, cache) = engine();
    let engine = engine.with_alerts(alerts.clone());
    let mut rx = alerts.subscribe();

    let decision = engine
        .evaluate(&subject("ATTORNEY", "t1"), "DOCUMENT_READ", &ctx("t2"))
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.code, DecisionCode::TenantScopeViolation);
    // Violations short-circuit before the cache.
    assert!(cache.is_empty());

    match rx.try_recv().unwrap() {
        AlertMessage::Security(alert) => {
            assert_eq!(alert.subject_tenant_id, "t1");
            assert_eq!(alert.resource_tenant_id, "t2");
            assert_eq!(alert.permission, "DOCUMENT_READ");
        }
        other => panic!("unexpected alert: {other:?}"),
    }
}

#[test]
fn test_allow_is_cached_and_replayed() {
    let (engine, cache) = engine();
    let attorney = subject("ATTORNEY", "t1");

    let first = engine
        .evaluate(&attorney, "DOCUMENT_READ", &ctx("t1"))
        .unwrap();
    assert!(first.allowed);
    assert!(!first.cached);
    assert_eq!(cache.len(), 1);

    let second = engine
        .evaluate(&attorney, "DOCUMENT_READ", &ctx("t1"))
        .unwrap();
    assert!(second.allowed);
    assert!(second.cached);
    assert_eq!(second.code, first.code);
}

#[test]
fn test_denials_are_cached_too() {
    let (engine, cache) = engine();
    let third_party = subject("THIRD_PARTY", "t1");

    let first = engine
        .evaluate(&third_party, "BILLING_READ", &ctx("t1"))
        .unwrap();
    assert!(!first.allowed);
    assert_eq!(first.code, DecisionCode::InsufficientPermission);
    assert_eq!(cache.len(), 1);

    let second = engine
        .evaluate(&third_party, "BILLING_READ", &ctx("t1"))
        .unwrap();
    assert!(second.cached);
    assert!(!second.allowed);
}

#[test]
fn test_resource_wildcard_is_level_bounded() {
    let (engine, _) = engine();
    let attorney = subject("ATTORNEY", "t1");

    // ATTORNEY holds DOCUMENT_* at level 70: APPROVE (70) passes,
    // DELETE (90) does not.
    assert!(engine
        .evaluate(&attorney, "DOCUMENT_APPROVE", &ctx("t1"))
        .unwrap()
        .allowed);
    let deny = engine
        .evaluate(&attorney, "DOCUMENT_DELETE", &ctx("t1"))
        .unwrap();
    assert!(!deny.allowed);
    assert_eq!(deny.code, DecisionCode::InsufficientPermission);
}

#[test]
fn test_scope_tier_check() {
    let (engine, _) = engine();
    let rep = subject("CLIENT_REPRESENTATIVE", "t1");
    let mut tenant_op = ctx("t1");
    tenant_op.scope = Some(ScopeTier::Tenant);

    let deny = engine.evaluate(&rep, "DOCUMENT_READ", &tenant_op).unwrap();
    assert!(!deny.allowed);
    assert_eq!(deny.code, DecisionCode::ScopeViolation);
}

#[test]
fn test_privilege_rule_vetoes_external_counsel() {
    let (engine, _) = engine();
    let counsel = subject("EXTERNAL_COUNSEL", "t1");
    let mut privileged = ctx("t1");
    privileged.data_category = Some(DataCategory::Privileged);

    // EXTERNAL_COUNSEL holds DOCUMENT_READ, so the base check allows;
    // the privilege rule vetoes.
    let deny = engine
        .evaluate(&counsel, "DOCUMENT_READ", &privileged)
        .unwrap();
    assert!(!deny.allowed);
    assert_eq!(deny.code, DecisionCode::ComplianceViolation);
}

#[test]
fn test_data_minimization_requires_purpose() {
    let (engine, _) = engine();
    let attorney = subject("ATTORNEY", "t1");
    let mut personal = ctx("t1");
    personal.data_category = Some(DataCategory::Personal);

    let deny = engine
        .evaluate(&attorney, "CLIENT_DATA_READ", &personal)
        .unwrap();
    assert!(!deny.allowed);
    assert_eq!(deny.code, DecisionCode::ComplianceViolation);

    personal.purpose = Some("case preparation".to_string());
    assert!(engine
        .evaluate(&attorney, "CLIENT_DATA_READ", &personal)
        .unwrap()
        .allowed);
}

#[test]
fn test_cached_decisions_are_context_sensitive() {
    let (engine, cache) = engine();
    let attorney = subject("ATTORNEY", "t1");
    let mut personal = ctx("t1");
    personal.data_category = Some(DataCategory::Personal);
    personal.purpose = Some("case preparation".to_string());

    let allow = engine
        .evaluate(&attorney, "CLIENT_DATA_READ", &personal)
        .unwrap();
    assert!(allow.allowed);
    assert_eq!(cache.len(), 1);

    // Same subject, permission, and resource without the purpose: the
    // purposeful allow must not be replayed.
    personal.purpose = None;
    let deny = engine
        .evaluate(&attorney, "CLIENT_DATA_READ", &personal)
        .unwrap();
    assert!(!deny.allowed);
    assert!(!deny.cached);
    assert_eq!(deny.code, DecisionCode::ComplianceViolation);
    assert_eq!(cache.len(), 2);
}

#[test]
fn test_client_representative_sees_only_own_client() {
    let (engine, _) = engine();
    let mut rep = subject("CLIENT_REPRESENTATIVE", "t1");
    rep.client_id = Some("client-1".to_string());

    let mut own = ctx("t1");
    own.client_id = Some("client-1".to_string());
    own.purpose = Some("billing inquiry".to_string());
    assert!(engine
        .evaluate(&rep, "CLIENT_DATA_READ", &own)
        .unwrap()
        .allowed);

    let mut other = ctx("t1");
    other.resource_id = "res-2".to_string();
    other.client_id = Some("client-2".to_string());
    other.purpose = Some("billing inquiry".to_string());
    let deny = engine.evaluate(&rep, "CLIENT_DATA_READ", &other).unwrap();
    assert!(!deny.allowed);
    assert_eq!(deny.code, DecisionCode::ComplianceViolation);
}

#[test]
fn test_identifiers_are_normalized() {
    let (engine, _) = engine();
    let sloppy = Subject {
        id: "  user-1  ".to_string(),
        tenant_id: "t1".to_string(),
        role: "  attorney ".to_string(),
        client_id: None,
    };
    assert!(engine
        .evaluate(&sloppy, "document   read", &ctx("t1"))
        .unwrap()
        .allowed);
}

#[test]
fn test_unknown_role_denies() {
    let (engine, _) = engine();
    let decision = engine
        .evaluate(&subject("INTERGALACTIC_JUDGE", "t1"), "DOCUMENT_READ", &ctx("t1"))
        .unwrap();
    assert!(!decision.allowed);
    assert_eq!(decision.code, DecisionCode::InsufficientPermission);
}

#[test]
fn test_unknown_permission_is_an_error() {
    let (engine, _) = engine();
    let result = engine.evaluate(&subject("ATTORNEY", "t1"), "DOCUMENT_FROB", &ctx("t1"));
    assert!(matches!(result, Err(EngineError::Catalog(_))));
}

#[test]
fn test_unavailable_cache_degrades_to_direct_evaluation() {
    let engine = engine_with_cache(Arc::new(UnavailableCache));
    let decision = engine
        .evaluate(&subject("ATTORNEY", "t1"), "DOCUMENT_READ", &ctx("t1"))
        .unwrap();
    assert!(decision.allowed);
    assert!(!decision.cached);
}

#[test]
fn test_catalog_reload_purges_the_cache() {
    let (engine, cache) = engine();
    engine
        .evaluate(&subject("ATTORNEY", "t1"), "DOCUMENT_READ", &ctx("t1"))
        .unwrap();
    assert_eq!(cache.len(), 1);

    engine.reload_catalog(PolicyCatalog::builtin());
    assert!(cache.is_empty());
}

#[test]
fn test_subject_purge_is_targeted() {
    let (engine, cache) = engine();
    engine
        .evaluate(&subject("ATTORNEY", "t1"), "DOCUMENT_READ", &ctx("t1"))
        .unwrap();
    let mut other = subject("ATTORNEY", "t1");
    other.id = "user-2".to_string();
    engine.evaluate(&other, "DOCUMENT_READ", &ctx("t1")).unwrap();
    assert_eq!(cache.len(), 2);

    assert_eq!(engine.purge_subject("t1", "user-1"), 1);
    assert_eq!(cache.len(), 1);
    assert_eq!(engine.purge_tenant("t1"), 1);
    assert!(cache.is_empty());
}

#[test]
fn test_cache_ttl_is_configurable() {
    let cache = Arc::new(MemoryDecisionCache::new());
    let shared: Arc<dyn crate::cache::DecisionCache> = cache.clone();
    let engine = DecisionEngine::new(SharedCatalog::new(PolicyCatalog::builtin()), shared)
        .with_ttl(Duration::from_millis(0));

    engine
        .evaluate(&subject("ATTORNEY", "t1"), "DOCUMENT_READ", &ctx("t1"))
        .unwrap();
    // Zero TTL means the entry expires immediately: the next evaluation
    // is a miss, not a replay.
    let second = engine
        .evaluate(&subject("ATTORNEY", "t1"), "DOCUMENT_READ", &ctx("t1"))
        .unwrap();
    assert!(!second.cached);
}
