//! Property-based tests for hashing, signing, and hex encoding.

use proptest::prelude::*;

use super::{hex_decode, hex_encode, EntryEnvelope, IntegrityHasher, LedgerSigner};

fn field() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_-]{1,32}"
}

fn salt() -> impl Strategy<Value = [u8; 32]> {
    any::<[u8; 32]>()
}

proptest! {
    /// The same envelope, salt, and chain position always produce the
    /// same hash.
    #[test]
    fn prop_hash_is_deterministic(
        salt in salt(),
        prev in any::<[u8; 32]>(),
        entry_id in field(),
        tenant_id in field(),
        timestamp_ms in any::<u64>(),
        actor_id in field(),
    ) {
        let envelope = EntryEnvelope {
            entry_id: &entry_id,
            tenant_id: &tenant_id,
            timestamp_ms,
            event_type: "ACCESS_GRANTED",
            actor_id: &actor_id,
            resource_type: "DOCUMENT",
            resource_id: "doc-1",
        };
        let hasher = IntegrityHasher::new(salt);
        prop_assert_eq!(
            hasher.hash_entry(&envelope, &prev),
            hasher.hash_entry(&envelope, &prev)
        );
        prop_assert!(hasher.verify_entry(&envelope, &prev, &hasher.hash_entry(&envelope, &prev)).is_ok());
    }

    /// Changing the actor changes the hash; verification catches it.
    #[test]
    fn prop_hash_detects_field_changes(
        salt in salt(),
        actor_id in field(),
        other_actor in field(),
    ) {
        prop_assume!(actor_id != other_actor);
        let mut envelope = EntryEnvelope {
            entry_id: "e-1",
            tenant_id: "t-1",
            timestamp_ms: 1_700_000_000_000,
            event_type: "ACCESS_GRANTED",
            actor_id: &actor_id,
            resource_type: "DOCUMENT",
            resource_id: "doc-1",
        };
        let hasher = IntegrityHasher::new(salt);
        let stored = hasher.hash_entry(&envelope, &IntegrityHasher::GENESIS_PREV_HASH);
        envelope.actor_id = &other_actor;
        prop_assert!(hasher
            .verify_entry(&envelope, &IntegrityHasher::GENESIS_PREV_HASH, &stored)
            .is_err());
    }

    /// A signature verifies with the signing key and fails once the data
    /// changes.
    #[test]
    fn prop_signature_binds_data(
        key in prop::collection::vec(any::<u8>(), 32..64),
        data in prop::collection::vec(any::<u8>(), 0..256),
        extra in any::<u8>(),
    ) {
        let signer = LedgerSigner::new(key).unwrap();
        let signature = signer.sign(&data);
        prop_assert!(signer.verify(&data, &signature, "e-1").is_ok());

        let mut altered = data;
        altered.push(extra);
        prop_assert!(signer.verify(&altered, &signature, "e-1").is_err());
    }

    /// Hex encoding round-trips arbitrary bytes.
    #[test]
    fn prop_hex_round_trips(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let encoded = hex_encode(&bytes);
        prop_assert_eq!(hex_decode(&encoded).unwrap(), bytes);
    }
}
