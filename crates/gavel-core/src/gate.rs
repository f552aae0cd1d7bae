//! The caller-facing access surface.
//!
//! [`AccessGate`] ties the decision engine and the ledger into one call
//! path: evaluate, record the outcome, return it with timing. Every
//! allow and deny that reaches a caller has a matching ledger entry;
//! requests without an authenticated subject are recorded as
//! authentication failures, never as decisions.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::catalog::PolicyCatalog;
use crate::clock::{Clock, SystemClock};
use crate::engine::{
    DataCategory, Decision, DecisionCode, DecisionEngine, EngineError, ResourceContext, Subject,
};
use crate::ledger::{AuditEvent, AuditLedger, EventContext, EventType, LedgerError};

/// Errors from the gate.
///
/// Denials are outcomes, not errors; this enum covers requests that
/// cannot be evaluated or whose audit record could not be preserved.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum GateError {
    /// The request carries no authenticated subject. Recorded as an
    /// authentication failure before this error is returned.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The outcome could not be recorded anywhere, not even the
    /// fallback queue.
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// The result of one gated access check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessOutcome {
    /// Whether the operation may proceed.
    pub allowed: bool,
    /// Structured decision code.
    pub code: DecisionCode,
    /// Human-readable reason.
    pub reason: String,
    /// Wall-clock time the check took, in milliseconds.
    pub processing_time_ms: u64,
}

impl AccessOutcome {
    fn from_decision(decision: &Decision, processing_time_ms: u64) -> Self {
        Self {
            allowed: decision.allowed,
            code: decision.code,
            reason: decision.reason.clone(),
            processing_time_ms,
        }
    }
}

/// Evaluate-then-record pipeline over the engine and the ledger.
pub struct AccessGate {
    engine: Arc<DecisionEngine>,
    ledger: Arc<AuditLedger>,
    clock: Arc<dyn Clock>,
}

impl AccessGate {
    /// Creates a gate over an engine and a ledger.
    #[must_use]
    pub fn new(engine: Arc<DecisionEngine>, ledger: Arc<AuditLedger>) -> Self {
        Self {
            engine,
            ledger,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replaces the clock, for deterministic tests.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Checks one access request and records the outcome.
    ///
    /// # Errors
    ///
    /// Returns an engine error for unanswerable requests (no subject,
    /// unparseable permission) or a ledger error when the outcome could
    /// not be preserved anywhere.
    pub fn check(
        &self,
        subject: &Subject,
        permission: &str,
        ctx: &ResourceContext,
    ) -> Result<AccessOutcome, GateError> {
        self.check_with_context(subject, permission, ctx, EventContext::default())
    }

    /// [`check`](Self::check) with caller-resolved session context
    /// attached to the audit record.
    #[instrument(skip(self, subject, ctx, event_ctx), fields(subject = %subject.id))]
    pub fn check_with_context(
        &self,
        subject: &Subject,
        permission: &str,
        ctx: &ResourceContext,
        event_ctx: EventContext,
    ) -> Result<AccessOutcome, GateError> {
        let started_ms = self.clock.now_ms();
        let decision = match self.engine.evaluate(subject, permission, ctx) {
            Ok(decision) => decision,
            Err(e) => {
                if matches!(e, EngineError::AuthenticationRequired(_)) {
                    self.record_auth_failure(permission, ctx, event_ctx, &e)?;
                }
                return Err(e.into());
            }
        };

        self.record_decision(subject, permission, ctx, event_ctx, &decision)?;
        let elapsed_ms = self.clock.now_ms().saturating_sub(started_ms);
        info!(
            subject = %subject.id,
            permission,
            allowed = decision.allowed,
            code = %decision.code,
            elapsed_ms,
            "access check"
        );
        Ok(AccessOutcome::from_decision(&decision, elapsed_ms))
    }

    fn record_decision(
        &self,
        subject: &Subject,
        permission: &str,
        ctx: &ResourceContext,
        event_ctx: EventContext,
        decision: &Decision,
    ) -> Result<(), GateError> {
        let event_type = if decision.allowed {
            if ctx.data_category == Some(DataCategory::Privileged) {
                EventType::PrivilegedAccess
            } else {
                EventType::AccessGranted
            }
        } else if decision.code == DecisionCode::TenantScopeViolation {
            EventType::TenantIsolationViolation
        } else {
            EventType::AccessDenied
        };

        let event = AuditEvent::builder(event_type)
            .tenant(ctx.tenant_id.clone())
            .actor(subject.id.trim())
            .resource("ACCESS_CHECK", ctx.resource_id.clone())
            .action(permission.trim().to_uppercase())
            .details(serde_json::json!({
                "code": decision.code.as_str(),
                "reason": decision.reason,
                "cached": decision.cached,
                "subject_tenant": subject.tenant_id,
            }))
            .context(event_ctx)
            .build()?;
        self.commit(event)
    }

    fn record_auth_failure(
        &self,
        permission: &str,
        ctx: &ResourceContext,
        event_ctx: EventContext,
        error: &EngineError,
    ) -> Result<(), GateError> {
        let event = AuditEvent::builder(EventType::AuthenticationFailed)
            .tenant(ctx.tenant_id.clone())
            .actor("anonymous")
            .resource("ACCESS_CHECK", ctx.resource_id.clone())
            .action(permission.trim().to_uppercase())
            .details(serde_json::json!({ "reason": error.to_string() }))
            .context(event_ctx)
            .build()?;
        self.commit(event)
    }

    /// Swaps the policy catalog and audits the reload.
    ///
    /// # Errors
    ///
    /// Returns a ledger error when the reload record could not be
    /// preserved; the swap itself has already happened.
    pub fn reload_catalog(&self, catalog: PolicyCatalog) -> Result<(), GateError> {
        self.engine.reload_catalog(catalog);
        let event = AuditEvent::builder(EventType::CatalogReloaded)
            .tenant("PLATFORM")
            .actor("system")
            .resource("POLICY_CATALOG", "active")
            .action("RELOAD")
            .build()?;
        self.commit(event)
    }

    /// The engine behind this gate.
    #[must_use]
    pub fn engine(&self) -> &Arc<DecisionEngine> {
        &self.engine
    }

    // Persistence failures are tolerated here: the entry is already in
    // the fallback queue, so the caller still gets their outcome.
    fn commit(&self, event: AuditEvent) -> Result<(), GateError> {
        match self.ledger.record(event) {
            Ok(_) => Ok(()),
            Err(LedgerError::PersistenceFailure { source }) => {
                warn!(error = %source, "audit record diverted to fallback queue");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}
