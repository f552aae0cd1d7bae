//! Real-time fan-out of high-severity ledger writes.
//!
//! Alerts are lossy hints, not the system of record: the ledger entry is
//! already durable before anything is published, a lagging subscriber
//! loses messages rather than exerting backpressure, and publish failures
//! never fail the commit path.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::ledger::{EventType, Severity};

/// Capacity of the broadcast channel; older messages are dropped for
/// subscribers that fall further behind than this.
pub const ALERT_CHANNEL_CAPACITY: usize = 256;

/// Notification of a high-severity ledger write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditAlert {
    /// The ledger entry that triggered the alert.
    pub entry_id: String,
    /// Tenant the entry belongs to.
    pub tenant_id: String,
    /// Entry severity.
    pub severity: Severity,
    /// Entry event type.
    pub event_type: EventType,
    /// Acting subject or system.
    pub actor_id: String,
    /// Human-readable one-line summary.
    pub summary: String,
}

/// Immediate notification of a tenant-isolation violation.
///
/// Published regardless of configured severity thresholds: a subject
/// reaching across a tenant boundary is investigated even when the
/// denial itself is routine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityAlert {
    /// Tenant of the acting subject.
    pub subject_tenant_id: String,
    /// The acting subject.
    pub subject_id: String,
    /// Tenant that owns the targeted resource.
    pub resource_tenant_id: String,
    /// The permission that was requested.
    pub permission: String,
    /// When the violation was detected (ms since epoch).
    pub detected_at_ms: u64,
}

/// A message on the alert channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertMessage {
    /// High-severity ledger write.
    Audit(AuditAlert),
    /// Tenant-isolation violation.
    Security(SecurityAlert),
}

/// Fire-and-forget publisher of alert messages.
#[derive(Debug, Clone)]
pub struct AlertDispatcher {
    tx: broadcast::Sender<AlertMessage>,
}

impl Default for AlertDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl AlertDispatcher {
    /// Creates a dispatcher with the default channel capacity.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(ALERT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribes to the alert stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertMessage> {
        self.tx.subscribe()
    }

    /// Publishes a high-severity write notification.
    ///
    /// Having no subscribers is normal and not an error.
    pub fn publish_audit(&self, alert: AuditAlert) {
        debug!(entry_id = %alert.entry_id, severity = %alert.severity, "audit alert");
        if self.tx.send(AlertMessage::Audit(alert)).is_err() {
            debug!("no alert subscribers");
        }
    }

    /// Publishes an immediate tenant-isolation security alert.
    pub fn publish_security(&self, alert: SecurityAlert) {
        warn!(
            subject = %alert.subject_id,
            subject_tenant = %alert.subject_tenant_id,
            resource_tenant = %alert.resource_tenant_id,
            "tenant isolation violation"
        );
        if self.tx.send(AlertMessage::Security(alert)).is_err() {
            debug!("no alert subscribers");
        }
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn audit_alert() -> AuditAlert {
        AuditAlert {
            entry_id: "entry-1".to_string(),
            tenant_id: "t1".to_string(),
            severity: Severity::Security,
            event_type: EventType::TenantIsolationViolation,
            actor_id: "user-1".to_string(),
            summary: "cross-tenant read attempt".to_string(),
        }
    }

    #[tokio::test]
    async fn test_subscriber_receives_alert() {
        let dispatcher = AlertDispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.publish_audit(audit_alert());
        let message = rx.recv().await.unwrap();
        assert_eq!(message, AlertMessage::Audit(audit_alert()));
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_fine() {
        let dispatcher = AlertDispatcher::new();
        dispatcher.publish_audit(audit_alert());
        assert_eq!(dispatcher.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_security_alert_is_distinct() {
        let dispatcher = AlertDispatcher::new();
        let mut rx = dispatcher.subscribe();
        dispatcher.publish_security(SecurityAlert {
            subject_tenant_id: "t1".to_string(),
            subject_id: "user-1".to_string(),
            resource_tenant_id: "t2".to_string(),
            permission: "DOCUMENT_READ".to_string(),
            detected_at_ms: 1,
        });
        match rx.recv().await.unwrap() {
            AlertMessage::Security(alert) => assert_eq!(alert.resource_tenant_id, "t2"),
            AlertMessage::Audit(_) => panic!("expected security alert"),
        }
    }
}
