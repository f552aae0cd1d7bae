//! External tamper-evidence anchoring.
//!
//! Top-tier entries have their integrity hash submitted to an external
//! anchor service as independent corroboration. Anchoring is best-effort:
//! it is queued post-commit, retried by a background worker, and never
//! required for an entry to be valid. The write path only ever does a
//! non-blocking enqueue.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::crypto::Hash;

/// Capacity of the pending-anchor queue. Overflow drops the request with
/// a warning; the entry itself is already durable.
pub const ANCHOR_QUEUE_CAPACITY: usize = 1_024;

/// Attempts per anchor request before giving up.
pub const MAX_ANCHOR_ATTEMPTS: u32 = 5;

/// Delay between anchor retries.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Errors from an anchor backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AnchorError {
    /// The anchor service is unreachable or rejected the request.
    #[error("anchor service unavailable: {0}")]
    Unavailable(String),
}

/// Receipt returned by the anchor service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnchorReference {
    /// The anchored entry.
    pub entry_id: String,
    /// Service-assigned anchor identifier.
    pub anchor_id: String,
    /// When the anchor was accepted (ms since epoch).
    pub anchored_at_ms: u64,
}

/// External tamper-evidence service.
///
/// Implementations submit `(entry_id, hash)` pairs to a system that is
/// harder to tamper with than the ledger's own storage. No consensus
/// mechanism is assumed.
pub trait AnchorService: Send + Sync {
    /// Submits a hash for anchoring.
    ///
    /// # Errors
    ///
    /// Returns `AnchorError::Unavailable` when the service cannot accept
    /// the request; the worker retries.
    fn anchor(&self, entry_id: &str, hash: &Hash) -> Result<AnchorReference, AnchorError>;
}

/// In-process anchor service for tests and local deployments.
#[derive(Default)]
pub struct MemoryAnchorService {
    anchors: Mutex<Vec<AnchorReference>>,
    fail_remaining: Mutex<u32>,
}

impl MemoryAnchorService {
    /// Creates an empty service.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` anchor calls fail, exercising retry paths.
    pub fn fail_next(&self, count: u32) {
        *self
            .fail_remaining
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = count;
    }

    /// Snapshot of accepted anchors.
    #[must_use]
    pub fn anchors(&self) -> Vec<AnchorReference> {
        self.anchors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

impl AnchorService for MemoryAnchorService {
    fn anchor(&self, entry_id: &str, hash: &Hash) -> Result<AnchorReference, AnchorError> {
        {
            let mut remaining = self
                .fail_remaining
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if *remaining > 0 {
                *remaining -= 1;
                return Err(AnchorError::Unavailable("induced failure".to_string()));
            }
        }
        let mut anchors = self
            .anchors
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let reference = AnchorReference {
            entry_id: entry_id.to_string(),
            anchor_id: format!("anchor-{}-{}", anchors.len(), crate::crypto::hex_encode(&hash[..4])),
            anchored_at_ms: crate::clock::now_ms(),
        };
        anchors.push(reference.clone());
        Ok(reference)
    }
}

/// A queued anchor request.
#[derive(Debug, Clone)]
struct AnchorRequest {
    entry_id: String,
    hash: Hash,
}

/// Handle for enqueueing anchor requests from the write path.
#[derive(Clone)]
pub struct AnchorSender {
    tx: mpsc::Sender<AnchorRequest>,
}

impl AnchorSender {
    /// Enqueues a request without blocking.
    ///
    /// A full queue drops the request with a warning; the ledger entry is
    /// already durable and can be re-anchored by a later sweep.
    pub fn submit(&self, entry_id: &str, hash: &Hash) {
        let request = AnchorRequest {
            entry_id: entry_id.to_string(),
            hash: *hash,
        };
        if let Err(e) = self.tx.try_send(request) {
            warn!(entry_id, error = %e, "anchor queue full; request dropped");
        }
    }
}

/// Supervised background worker draining the anchor queue.
///
/// Started explicitly with [`AnchorWorker::start`] and stopped with
/// [`AnchorWorker::shutdown`]; construction has no side effects.
pub struct AnchorWorker {
    tx: mpsc::Sender<AnchorRequest>,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl AnchorWorker {
    /// Spawns the worker on the current tokio runtime.
    #[must_use]
    pub fn start(service: Arc<dyn AnchorService>) -> Self {
        let (tx, mut rx) = mpsc::channel::<AnchorRequest>(ANCHOR_QUEUE_CAPACITY);
        let (stop, mut stopped) = watch::channel(false);
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = rx.recv() => {
                        let Some(request) = request else { break };
                        process(service.as_ref(), &request).await;
                    }
                    _ = stopped.changed() => {
                        // Stop is a signal, not channel closure: live
                        // senders elsewhere keep the channel open, so
                        // drain what is already queued and exit.
                        while let Ok(request) = rx.try_recv() {
                            process(service.as_ref(), &request).await;
                        }
                        break;
                    }
                }
            }
            info!("anchor worker stopped");
        });
        Self { tx, stop, handle }
    }

    /// A cloneable sender for the write path.
    #[must_use]
    pub fn sender(&self) -> AnchorSender {
        AnchorSender {
            tx: self.tx.clone(),
        }
    }

    /// Stops the worker after draining queued requests.
    ///
    /// Completes even while [`AnchorSender`] clones are still held;
    /// requests submitted after shutdown are dropped.
    pub async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.handle.await;
    }
}

/// Anchors one request, retrying transient failures.
async fn process(service: &dyn AnchorService, request: &AnchorRequest) {
    let mut attempt = 0;
    loop {
        attempt += 1;
        match service.anchor(&request.entry_id, &request.hash) {
            Ok(reference) => {
                debug!(
                    entry_id = %request.entry_id,
                    anchor_id = %reference.anchor_id,
                    "entry anchored"
                );
                break;
            }
            Err(e) if attempt < MAX_ANCHOR_ATTEMPTS => {
                warn!(
                    entry_id = %request.entry_id,
                    attempt,
                    error = %e,
                    "anchor attempt failed; retrying"
                );
                tokio::time::sleep(RETRY_DELAY).await;
            }
            Err(e) => {
                warn!(
                    entry_id = %request.entry_id,
                    error = %e,
                    "anchoring abandoned after {MAX_ANCHOR_ATTEMPTS} attempts"
                );
                break;
            }
        }
    }
}
