//! End-to-end flow: configuration, gated access checks, the hash-chained
//! ledger, alert fan-out, forensics, and compliance reporting against one
//! real on-disk store.

use std::sync::Arc;

use tempfile::TempDir;

use gavel_core::alert::AlertMessage;
use gavel_core::cache::{DecisionCache, MemoryDecisionCache};
use gavel_core::catalog::{PolicyCatalog, SharedCatalog};
use gavel_core::clock::{Clock, FixedClock};
use gavel_core::compliance::ComplianceReporter;
use gavel_core::config::GavelConfig;
use gavel_core::crypto::IntegrityHasher;
use gavel_core::engine::{DecisionCode, DecisionEngine, ResourceContext, Subject};
use gavel_core::forensic::{AbortFlag, ForensicInvestigator, InvestigationCriteria};
use gavel_core::gate::AccessGate;
use gavel_core::ledger::{
    AuditEvent, AuditLedger, ComplianceStandard, EventType, FallbackQueue, QueryFilter,
    SqliteLedgerStore,
};

// 2023-11-15 12:00:00 UTC.
const NOON: u64 = 1_700_049_600_000;
const HOUR: u64 = 60 * 60 * 1000;

struct Platform {
    gate: AccessGate,
    ledger: Arc<AuditLedger>,
    clock: Arc<FixedClock>,
    config: GavelConfig,
    _dir: TempDir,
}

fn platform() -> Platform {
    let dir = TempDir::new().unwrap();
    let toml = format!(
        "[signing]\nkey_hex = \"{}\"\nsalt_hex = \"{}\"\n",
        "5a".repeat(32),
        "07".repeat(32)
    );
    let config = GavelConfig::from_toml(&toml).unwrap();
    let signer = Arc::new(config.signing_key().unwrap());
    let hasher = IntegrityHasher::new(config.server_salt().unwrap());

    let clock = Arc::new(FixedClock::at(NOON));
    let shared_clock: Arc<dyn Clock> = Arc::clone(&clock) as Arc<dyn Clock>;
    let store = SqliteLedgerStore::open(dir.path().join("ledger.db")).unwrap();
    let ledger = Arc::new(
        AuditLedger::new(
            store,
            hasher,
            signer,
            FallbackQueue::new(dir.path().join("fallback.jsonl")),
        )
        .with_clock(Arc::clone(&shared_clock)),
    );

    let cache: Arc<dyn DecisionCache> = Arc::new(MemoryDecisionCache::new());
    let engine = Arc::new(
        DecisionEngine::new(SharedCatalog::new(PolicyCatalog::builtin()), cache)
            .with_ttl(config.decision_ttl())
            .with_alerts(ledger.alerts().clone())
            .with_clock(Arc::clone(&shared_clock)),
    );
    let gate = AccessGate::new(engine, Arc::clone(&ledger)).with_clock(shared_clock);
    Platform {
        gate,
        ledger,
        clock,
        config,
        _dir: dir,
    }
}

fn subject(id: &str, role: &str, tenant: &str) -> Subject {
    Subject {
        id: id.to_string(),
        tenant_id: tenant.to_string(),
        role: role.to_string(),
        client_id: None,
    }
}

fn resource(tenant: &str, id: &str) -> ResourceContext {
    ResourceContext {
        tenant_id: tenant.to_string(),
        resource_id: id.to_string(),
        ..ResourceContext::default()
    }
}

#[test]
fn test_checks_land_in_verified_tenant_chains() {
    let p = platform();

    let allowed = p
        .gate
        .check(
            &subject("alice", "attorney", "firm-a"),
            "document read",
            &resource("firm-a", "doc-1"),
        )
        .unwrap();
    assert!(allowed.allowed);

    p.clock.advance_ms(HOUR);
    let denied = p
        .gate
        .check(
            &subject("carol", "billing_clerk", "firm-a"),
            "work_product delete",
            &resource("firm-a", "wp-9"),
        )
        .unwrap();
    assert!(!denied.allowed);
    assert_eq!(denied.code, DecisionCode::InsufficientPermission);

    // A cross-tenant reach lands in the violated tenant's chain.
    let crossed = p
        .gate
        .check(
            &subject("mallory", "attorney", "firm-a"),
            "document read",
            &resource("firm-b", "doc-2"),
        )
        .unwrap();
    assert_eq!(crossed.code, DecisionCode::TenantScopeViolation);

    assert_eq!(p.ledger.verify_chain("firm-a").unwrap(), 2);
    assert_eq!(p.ledger.verify_chain("firm-b").unwrap(), 1);

    let signed = p.ledger.query("firm-a", &QueryFilter::default()).unwrap();
    assert_eq!(signed.record_count, 2);
    p.ledger.verify_records(&signed).unwrap();
}

#[test]
fn test_isolation_violation_raises_both_alerts() {
    let p = platform();
    let mut alerts = p.ledger.alerts().subscribe();

    p.gate
        .check(
            &subject("mallory", "attorney", "firm-a"),
            "client_data read",
            &resource("firm-b", "client-7"),
        )
        .unwrap();

    // The engine publishes the security alert first, then the recorded
    // violation entry fans out as an audit alert.
    let first = alerts.try_recv().unwrap();
    let AlertMessage::Security(security) = first else {
        panic!("expected a security alert, got {first:?}");
    };
    assert_eq!(security.subject_tenant_id, "firm-a");
    assert_eq!(security.resource_tenant_id, "firm-b");

    let second = alerts.try_recv().unwrap();
    let AlertMessage::Audit(audit) = second else {
        panic!("expected an audit alert, got {second:?}");
    };
    assert_eq!(audit.event_type, EventType::TenantIsolationViolation);
    assert!(alerts.try_recv().is_err());
}

#[test]
fn test_investigation_covers_gate_activity() {
    let p = platform();
    for actor in ["alice", "alice", "bob"] {
        p.gate
            .check(
                &subject(actor, "paralegal", "firm-a"),
                "document read",
                &resource("firm-a", "doc-1"),
            )
            .unwrap();
        p.clock.advance_ms(5_000);
    }

    let investigator = ForensicInvestigator::new(
        p.ledger.open_reader().unwrap(),
        Arc::new(p.config.signing_key().unwrap()),
    )
    .with_thresholds(p.config.anomaly_thresholds())
    .with_clock(Arc::clone(&p.clock) as Arc<dyn Clock>);

    let report = investigator
        .investigate(
            "firm-a",
            &InvestigationCriteria::period(NOON - HOUR, NOON + HOUR),
            &AbortFlag::new(),
        )
        .unwrap();
    assert_eq!(report.record_count, 3);
    assert_eq!(report.statistics.by_actor["alice"], 2);
    assert_eq!(report.statistics.by_event_type["ACCESS_GRANTED"], 3);
    assert_eq!(report.chain_of_custody.len(), 3);
    assert!(report.anomalies.is_empty());
}

#[test]
fn test_compliance_report_over_tagged_activity() {
    let p = platform();
    for event_type in [
        EventType::ResourceViewed,
        EventType::ResourceViewed,
        EventType::ResourceViewed,
        EventType::AccessDenied,
    ] {
        let event = AuditEvent::builder(event_type)
            .tenant("firm-a")
            .actor("alice")
            .resource("CLIENT_DATA", "rec-1")
            .action("READ")
            .tag(ComplianceStandard::Gdpr)
            .build()
            .unwrap();
        p.ledger.record(event).unwrap();
    }

    let reporter = ComplianceReporter::new(
        p.ledger.open_reader().unwrap(),
        Arc::new(p.config.signing_key().unwrap()),
    )
    .with_clock(Arc::clone(&p.clock) as Arc<dyn Clock>);

    let report = reporter
        .generate_report("firm-a", ComplianceStandard::Gdpr, NOON - HOUR, NOON + HOUR)
        .unwrap();
    assert_eq!(report.total_tagged, 4);
    assert_eq!(report.score, 75);
    assert_eq!(report.gaps.len(), 1);
    assert!(!report.signature.is_empty());
}
