//! Integrity hashing and envelope signing for the audit ledger.
//!
//! Two independent guarantees are computed at write time and never again:
//!
//! - **Integrity hash**: salted SHA-256 over an entry's immutable envelope
//!   fields, chained to the previous entry for the same tenant. Detects
//!   tampering without access to key material.
//! - **Signature**: HMAC-SHA-256 over the same envelope, keyed by the
//!   server signing key. Proves the entry was written by a key holder.
//!
//! Verification re-derives both and compares in constant time.

mod hash;
#[cfg(test)]
mod proptest_integrity;
mod signer;

pub use hash::{EntryEnvelope, Hash, HASH_SIZE, IntegrityHasher};
pub use signer::{LedgerSigner, Signature, SIGNATURE_SIZE};

use thiserror::Error;

/// Errors from integrity or signature verification.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CryptoError {
    /// The stored integrity hash does not match the recomputed value.
    #[error("integrity hash mismatch for entry {entry_id}")]
    HashMismatch {
        /// The entry whose hash failed verification.
        entry_id: String,
    },

    /// The stored signature does not verify against the signing key.
    #[error("signature verification failed for entry {entry_id}")]
    SignatureInvalid {
        /// The entry whose signature failed verification.
        entry_id: String,
    },

    /// The chain link to the previous entry is broken.
    #[error("hash chain broken at entry {entry_id}: expected prev {expected}, got {actual}")]
    ChainBroken {
        /// The entry at which the chain broke.
        entry_id: String,
        /// Hex of the expected previous hash.
        expected: String,
        /// Hex of the stored previous hash.
        actual: String,
    },

    /// Key material is malformed (wrong length or not hex).
    #[error("invalid signing key material: {0}")]
    InvalidKeyMaterial(String),
}

/// Encodes bytes as a lowercase hex string.
#[must_use]
pub fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            let _ = write!(acc, "{b:02x}");
            acc
        })
}

/// Decodes a hex string into bytes.
///
/// # Errors
///
/// Returns `CryptoError::InvalidKeyMaterial` if the string is not valid
/// even-length hex.
pub fn hex_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    if s.len() % 2 != 0 {
        return Err(CryptoError::InvalidKeyMaterial(
            "odd-length hex string".to_string(),
        ));
    }
    // Walk bytes, not char boundaries: non-ASCII input is rejected by the
    // nibble check instead of slicing mid-character.
    s.as_bytes()
        .chunks_exact(2)
        .map(|pair| {
            let hi = hex_nibble(pair[0])?;
            let lo = hex_nibble(pair[1])?;
            Ok(hi << 4 | lo)
        })
        .collect()
}

fn hex_nibble(b: u8) -> Result<u8, CryptoError> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(CryptoError::InvalidKeyMaterial(
            "non-hex character".to_string(),
        )),
    }
}
