//! # gavel-core
//!
//! Access decisions and an immutable audit ledger for a multi-tenant
//! legal-practice platform.
//!
//! Two halves, joined by the gate:
//!
//! - The **decision engine** evaluates `(subject, permission, resource)`
//!   requests against a role catalog, with tenant isolation, scope-tier
//!   checks, override predicates for legal privilege and data
//!   minimization, and a TTL'd decision cache.
//! - The **audit ledger** is an append-only, per-tenant hash chain over
//!   SQLite. Every entry is salted-hashed, HMAC-signed, chained to its
//!   predecessor, and retained per severity; high-severity entries fan
//!   out to alert subscribers and an external anchor.
//!
//! On top of the ledger sit forensic investigations with signed chains
//! of custody ([`forensic`]) and per-standard compliance scoring
//! ([`compliance`]).
//!
//! # Modules
//!
//! - [`gate`]: `AccessGate`, the evaluate-then-record entry point
//! - [`engine`]: the decision engine and override predicates
//! - [`catalog`]: roles, permissions, scope tiers, grant matching
//! - [`ledger`]: the hash-chained store, commit pipeline, retention,
//!   fallback queue, and anchoring
//! - [`forensic`]: investigations, anomaly heuristics, discovery bundles
//! - [`compliance`]: signed per-standard compliance reports
//! - [`alert`]: broadcast fan-out of audit and security alerts
//! - [`cache`]: the decision cache trait and in-memory implementation
//! - [`crypto`]: integrity hashing and HMAC signing
//! - [`config`]: TOML configuration and key-material sourcing
//! - [`clock`]: injectable time sources
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use gavel_core::cache::{DecisionCache, MemoryDecisionCache};
//! use gavel_core::catalog::{PolicyCatalog, SharedCatalog};
//! use gavel_core::crypto::{IntegrityHasher, LedgerSigner};
//! use gavel_core::engine::{DecisionEngine, ResourceContext, Subject};
//! use gavel_core::gate::AccessGate;
//! use gavel_core::ledger::{AuditLedger, FallbackQueue, SqliteLedgerStore};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = SqliteLedgerStore::in_memory()?;
//! let signer = Arc::new(LedgerSigner::new(vec![0x5a; 32])?);
//! let ledger = Arc::new(AuditLedger::new(
//!     store,
//!     IntegrityHasher::new([7u8; 32]),
//!     signer,
//!     FallbackQueue::new("fallback.jsonl"),
//! ));
//!
//! let cache: Arc<dyn DecisionCache> = Arc::new(MemoryDecisionCache::new());
//! let engine = DecisionEngine::new(SharedCatalog::new(PolicyCatalog::builtin()), cache);
//! let gate = AccessGate::new(Arc::new(engine), ledger);
//!
//! let subject = Subject {
//!     id: "user-1".to_string(),
//!     tenant_id: "firm-a".to_string(),
//!     role: "ATTORNEY".to_string(),
//!     client_id: None,
//! };
//! let resource = ResourceContext {
//!     tenant_id: "firm-a".to_string(),
//!     resource_id: "doc-42".to_string(),
//!     ..ResourceContext::default()
//! };
//! let outcome = gate.check(&subject, "document read", &resource)?;
//! assert!(outcome.allowed);
//! # Ok(())
//! # }
//! ```

pub mod alert;
pub mod cache;
pub mod catalog;
pub mod clock;
pub mod compliance;
pub mod config;
pub mod crypto;
pub mod engine;
pub mod forensic;
pub mod gate;
pub mod ledger;

pub use config::{ConfigError, GavelConfig};
pub use engine::{Decision, DecisionCode, DecisionEngine, ResourceContext, Subject};
pub use gate::{AccessGate, AccessOutcome, GateError};
pub use ledger::{AuditEvent, AuditLedger, EventType, LedgerError, Severity};
