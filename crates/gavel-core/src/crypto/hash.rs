//! Salted SHA-256 integrity hashing with per-tenant chain linking.

use sha2::{Digest, Sha256};

use super::{hex_encode, CryptoError};

/// Size of an integrity hash in bytes.
pub const HASH_SIZE: usize = 32;

/// Type alias for a 32-byte integrity hash.
pub type Hash = [u8; HASH_SIZE];

/// Field separator inside the hash preimage.
///
/// Prevents ambiguity between adjacent fields (`"ab" + "c"` vs `"a" + "bc"`).
const FIELD_SEP: &[u8] = &[0x1f];

/// The immutable envelope fields that contribute to an entry's integrity
/// hash and signature.
///
/// Once an entry is persisted, none of these fields may change; the stored
/// hash is recomputed from this envelope on every verification.
#[derive(Debug, Clone, Copy)]
pub struct EntryEnvelope<'a> {
    /// Ledger-assigned entry id.
    pub entry_id: &'a str,
    /// Tenant the entry belongs to.
    pub tenant_id: &'a str,
    /// Timestamp in milliseconds since the Unix epoch, immutable once set.
    pub timestamp_ms: u64,
    /// Canonical event type string.
    pub event_type: &'a str,
    /// Actor id (subject or system).
    pub actor_id: &'a str,
    /// Resource type string.
    pub resource_type: &'a str,
    /// Resource identifier.
    pub resource_id: &'a str,
}

impl EntryEnvelope<'_> {
    /// Serializes the envelope into the canonical hash preimage.
    fn preimage(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(128);
        for field in [
            self.entry_id,
            self.tenant_id,
            &self.timestamp_ms.to_string(),
            self.event_type,
            self.actor_id,
            self.resource_type,
            self.resource_id,
        ] {
            buf.extend_from_slice(field.as_bytes());
            buf.extend_from_slice(FIELD_SEP);
        }
        buf
    }
}

/// Computes salted, chain-linked integrity hashes for audit entries.
///
/// The salt is server-local configuration: an attacker who can read ledger
/// rows but not configuration cannot forge a matching hash for an altered
/// entry.
#[derive(Clone)]
pub struct IntegrityHasher {
    salt: [u8; 32],
}

impl std::fmt::Debug for IntegrityHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntegrityHasher").finish_non_exhaustive()
    }
}

impl IntegrityHasher {
    /// The zero hash used as the previous hash for the first entry of a
    /// tenant's chain.
    pub const GENESIS_PREV_HASH: Hash = [0u8; HASH_SIZE];

    /// Creates a hasher with the given server salt.
    #[must_use]
    pub const fn new(salt: [u8; 32]) -> Self {
        Self { salt }
    }

    /// Hashes an entry envelope, linking it to the previous entry in the
    /// tenant's chain.
    ///
    /// The hash is computed over `prev_hash || envelope || salt`.
    #[must_use]
    pub fn hash_entry(&self, envelope: &EntryEnvelope<'_>, prev_hash: &Hash) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(prev_hash);
        hasher.update(envelope.preimage());
        hasher.update(self.salt);
        hasher.finalize().into()
    }

    /// Verifies that a stored hash matches the recomputed value.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::HashMismatch` if the hashes differ.
    pub fn verify_entry(
        &self,
        envelope: &EntryEnvelope<'_>,
        prev_hash: &Hash,
        stored_hash: &Hash,
    ) -> Result<(), CryptoError> {
        let computed = self.hash_entry(envelope, prev_hash);
        if computed != *stored_hash {
            return Err(CryptoError::HashMismatch {
                entry_id: envelope.entry_id.to_string(),
            });
        }
        Ok(())
    }

    /// Verifies the link between an entry's stored `prev_hash` and the
    /// hash of the entry that precedes it in the tenant's chain.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::ChainBroken` if the hashes differ.
    pub fn verify_chain_link(
        entry_id: &str,
        stored_prev_hash: &Hash,
        previous_entry_hash: &Hash,
    ) -> Result<(), CryptoError> {
        if stored_prev_hash != previous_entry_hash {
            return Err(CryptoError::ChainBroken {
                entry_id: entry_id.to_string(),
                expected: hex_encode(previous_entry_hash),
                actual: hex_encode(stored_prev_hash),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn envelope() -> EntryEnvelope<'static> {
        EntryEnvelope {
            entry_id: "entry-001",
            tenant_id: "tenant-a",
            timestamp_ms: 1_700_000_000_000,
            event_type: "DOCUMENT_READ",
            actor_id: "user-42",
            resource_type: "DOCUMENT",
            resource_id: "doc-7",
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        let hasher = IntegrityHasher::new([7u8; 32]);
        let env = envelope();
        let h1 = hasher.hash_entry(&env, &IntegrityHasher::GENESIS_PREV_HASH);
        let h2 = hasher.hash_entry(&env, &IntegrityHasher::GENESIS_PREV_HASH);
        assert_eq!(h1, h2);
    }

    #[test]
    fn test_salt_changes_hash() {
        let env = envelope();
        let h1 = IntegrityHasher::new([1u8; 32])
            .hash_entry(&env, &IntegrityHasher::GENESIS_PREV_HASH);
        let h2 = IntegrityHasher::new([2u8; 32])
            .hash_entry(&env, &IntegrityHasher::GENESIS_PREV_HASH);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_prev_hash_changes_hash() {
        let hasher = IntegrityHasher::new([7u8; 32]);
        let env = envelope();
        let h1 = hasher.hash_entry(&env, &[0u8; 32]);
        let h2 = hasher.hash_entry(&env, &[1u8; 32]);
        assert_ne!(h1, h2);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let hasher = IntegrityHasher::new([0u8; 32]);
        let mut a = envelope();
        a.actor_id = "userx";
        a.resource_type = "doc";
        let mut b = envelope();
        b.actor_id = "user";
        b.resource_type = "xdoc";
        let ha = hasher.hash_entry(&a, &IntegrityHasher::GENESIS_PREV_HASH);
        let hb = hasher.hash_entry(&b, &IntegrityHasher::GENESIS_PREV_HASH);
        assert_ne!(ha, hb);
    }

    #[test]
    fn test_verify_entry_detects_tampering() {
        let hasher = IntegrityHasher::new([7u8; 32]);
        let env = envelope();
        let hash = hasher.hash_entry(&env, &IntegrityHasher::GENESIS_PREV_HASH);

        let mut altered = env;
        altered.actor_id = "user-43";
        let result = hasher.verify_entry(&altered, &IntegrityHasher::GENESIS_PREV_HASH, &hash);
        assert!(matches!(result, Err(CryptoError::HashMismatch { .. })));
    }

    #[test]
    fn test_chain_link_verification() {
        let good = [3u8; 32];
        assert!(IntegrityHasher::verify_chain_link("e", &good, &good).is_ok());
        let result = IntegrityHasher::verify_chain_link("e", &good, &[4u8; 32]);
        assert!(matches!(result, Err(CryptoError::ChainBroken { .. })));
    }
}
