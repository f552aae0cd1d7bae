//! Decision memoization with per-key TTL.
//!
//! The cache sits on the evaluation hot path: reads take a shared lock and
//! never perform I/O or policy work. A failed or unavailable cache is a
//! degradation, not a denial: the engine falls back to direct evaluation.
//!
//! Keys are structured `tenant:subject:fingerprint` so administrative
//! purges can target one tenant or one subject by key prefix, while the
//! fingerprint keeps (permission, resource, context) tuples deterministic
//! and fixed-length.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::debug;

use crate::engine::Decision;

/// Default decision TTL: five minutes.
pub const DEFAULT_DECISION_TTL: Duration = Duration::from_secs(300);

/// Upper bound on cached decisions; oldest-expiring entries are evicted
/// past this point.
pub const MAX_CACHE_ENTRIES: usize = 100_000;

/// Errors from a cache backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CacheError {
    /// The backing store is unreachable or failed.
    ///
    /// Callers degrade to uncached evaluation; this error never fails a
    /// request closed on its own.
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

/// Key-value cache of access decisions with per-key TTL.
///
/// Implementations must be safe for many concurrent readers and writers;
/// reads must not block on writes beyond a short critical section.
pub trait DecisionCache: Send + Sync {
    /// Looks up a non-expired cached decision.
    fn get(&self, key: &str) -> Result<Option<Decision>, CacheError>;

    /// Stores a decision with the given TTL, overwriting any previous
    /// value for the key.
    fn set_with_ttl(&self, key: &str, decision: Decision, ttl: Duration)
        -> Result<(), CacheError>;

    /// Removes all entries whose key starts with `prefix`, returning the
    /// count removed. Used for per-tenant and per-subject purges.
    fn purge_matching(&self, prefix: &str) -> Result<usize, CacheError>;

    /// Removes every entry. Invoked on catalog reload.
    fn purge_all(&self) -> Result<usize, CacheError>;
}

/// Builds the cache key for a decision.
///
/// Layout: `tenant:subject:hex(sha256(permission ∥ resource ∥ context))`.
/// Tenant and subject stay in the clear for prefix purges; the fingerprint
/// makes the variable-length tail deterministic. Every request attribute
/// that can change the outcome belongs in `context`: two requests that
/// hash to the same key must be answerable with the same decision.
#[must_use]
pub fn decision_key(
    tenant_id: &str,
    subject_id: &str,
    permission: &str,
    resource_id: &str,
    context: &[&str],
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(permission.as_bytes());
    hasher.update([0x1f]);
    hasher.update(resource_id.as_bytes());
    for part in context {
        hasher.update([0x1f]);
        hasher.update(part.as_bytes());
    }
    let fingerprint = hasher.finalize();
    let mut key = String::with_capacity(tenant_id.len() + subject_id.len() + 66);
    key.push_str(tenant_id);
    key.push(':');
    key.push_str(subject_id);
    key.push(':');
    for b in fingerprint {
        use std::fmt::Write;
        let _ = write!(key, "{b:02x}");
    }
    key
}

struct CacheSlot {
    decision: Decision,
    expires_at: Instant,
}

/// In-process decision cache backed by a `RwLock<HashMap>`.
///
/// Expired entries are skipped on read and reaped opportunistically on
/// write once the map crosses [`MAX_CACHE_ENTRIES`].
#[derive(Default)]
pub struct MemoryDecisionCache {
    slots: RwLock<HashMap<String, CacheSlot>>,
}

impl MemoryDecisionCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (possibly expired, not yet reaped) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DecisionCache for MemoryDecisionCache {
    fn get(&self, key: &str) -> Result<Option<Decision>, CacheError> {
        let slots = self
            .slots
            .read()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(slots.get(key).and_then(|slot| {
            if slot.expires_at > Instant::now() {
                Some(slot.decision.clone())
            } else {
                None
            }
        }))
    }

    fn set_with_ttl(
        &self,
        key: &str,
        decision: Decision,
        ttl: Duration,
    ) -> Result<(), CacheError> {
        let mut slots = self
            .slots
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if slots.len() >= MAX_CACHE_ENTRIES {
            let now = Instant::now();
            slots.retain(|_, slot| slot.expires_at > now);
        }
        slots.insert(
            key.to_string(),
            CacheSlot {
                decision,
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    fn purge_matching(&self, prefix: &str) -> Result<usize, CacheError> {
        let mut slots = self
            .slots
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|key, _| !key.starts_with(prefix));
        let removed = before - slots.len();
        debug!(prefix, removed, "cache purge");
        Ok(removed)
    }

    fn purge_all(&self) -> Result<usize, CacheError> {
        let mut slots = self
            .slots
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let removed = slots.len();
        slots.clear();
        debug!(removed, "cache cleared");
        Ok(removed)
    }
}

/// A cache stand-in that always reports itself unavailable.
///
/// Exercises the degrade-to-direct-evaluation path in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCache;

impl DecisionCache for UnavailableCache {
    fn get(&self, _key: &str) -> Result<Option<Decision>, CacheError> {
        Err(CacheError::Unavailable("cache offline".to_string()))
    }

    fn set_with_ttl(
        &self,
        _key: &str,
        _decision: Decision,
        _ttl: Duration,
    ) -> Result<(), CacheError> {
        Err(CacheError::Unavailable("cache offline".to_string()))
    }

    fn purge_matching(&self, _prefix: &str) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("cache offline".to_string()))
    }

    fn purge_all(&self) -> Result<usize, CacheError> {
        Err(CacheError::Unavailable("cache offline".to_string()))
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;
    use crate::engine::{Decision, DecisionCode};

    fn allow() -> Decision {
        Decision::allow("granted by test")
    }

    fn deny() -> Decision {
        Decision::deny(DecisionCode::InsufficientPermission, "denied by test")
    }

    #[test]
    fn test_set_then_get() {
        let cache = MemoryDecisionCache::new();
        cache
            .set_with_ttl("t1:u1:abc", allow(), Duration::from_secs(60))
            .unwrap();
        let hit = cache.get("t1:u1:abc").unwrap().unwrap();
        assert!(hit.allowed);
        assert!(cache.get("t1:u1:other").unwrap().is_none());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let cache = MemoryDecisionCache::new();
        cache
            .set_with_ttl("t1:u1:abc", deny(), Duration::from_millis(0))
            .unwrap();
        assert!(cache.get("t1:u1:abc").unwrap().is_none());
    }

    #[test]
    fn test_purge_by_tenant_prefix() {
        let cache = MemoryDecisionCache::new();
        cache
            .set_with_ttl("t1:u1:a", allow(), Duration::from_secs(60))
            .unwrap();
        cache
            .set_with_ttl("t1:u2:b", allow(), Duration::from_secs(60))
            .unwrap();
        cache
            .set_with_ttl("t2:u1:c", allow(), Duration::from_secs(60))
            .unwrap();

        let removed = cache.purge_matching("t1:").unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get("t1:u1:a").unwrap().is_none());
        assert!(cache.get("t2:u1:c").unwrap().is_some());
    }

    #[test]
    fn test_purge_by_subject_prefix() {
        let cache = MemoryDecisionCache::new();
        cache
            .set_with_ttl("t1:u1:a", allow(), Duration::from_secs(60))
            .unwrap();
        cache
            .set_with_ttl("t1:u2:b", allow(), Duration::from_secs(60))
            .unwrap();
        let removed = cache.purge_matching("t1:u1:").unwrap();
        assert_eq!(removed, 1);
        assert!(cache.get("t1:u2:b").unwrap().is_some());
    }

    #[test]
    fn test_purge_all() {
        let cache = MemoryDecisionCache::new();
        cache
            .set_with_ttl("t1:u1:a", allow(), Duration::from_secs(60))
            .unwrap();
        assert_eq!(cache.purge_all().unwrap(), 1);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_decision_key_is_deterministic_and_prefix_friendly() {
        let k1 = decision_key("t1", "u1", "DOCUMENT_READ", "doc-1", &[]);
        let k2 = decision_key("t1", "u1", "DOCUMENT_READ", "doc-1", &[]);
        let k3 = decision_key("t1", "u1", "DOCUMENT_READ", "doc-2", &[]);
        assert_eq!(k1, k2);
        assert_ne!(k1, k3);
        assert!(k1.starts_with("t1:u1:"));
    }

    #[test]
    fn test_decision_key_separates_context_variants() {
        let bare = decision_key("t1", "u1", "CLIENT_DATA_READ", "doc-1", &["", "", "", ""]);
        let purposeful = decision_key(
            "t1",
            "u1",
            "CLIENT_DATA_READ",
            "doc-1",
            &["", "PERSONAL", "", "case preparation"],
        );
        assert_ne!(bare, purposeful);
        // Shifting a value across the field boundary must not collide.
        let shifted = decision_key(
            "t1",
            "u1",
            "CLIENT_DATA_READ",
            "doc-1",
            &["", "", "PERSONAL", "case preparation"],
        );
        assert_ne!(purposeful, shifted);
    }

    #[test]
    fn test_unavailable_cache_errors() {
        let cache = UnavailableCache;
        assert!(matches!(
            cache.get("k"),
            Err(CacheError::Unavailable(_))
        ));
    }
}
