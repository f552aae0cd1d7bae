//! HMAC-SHA-256 signing of ledger entry envelopes and export bundles.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::hash::EntryEnvelope;
use super::{hex_decode, CryptoError};

type HmacSha256 = Hmac<Sha256>;

/// Size of a signature in bytes.
pub const SIGNATURE_SIZE: usize = 32;

/// Type alias for a 32-byte HMAC signature.
pub type Signature = [u8; SIGNATURE_SIZE];

/// Minimum accepted signing key length in bytes.
const MIN_KEY_LEN: usize = 32;

/// Signs ledger entries and exported bundles with the server signing key.
///
/// The key is supplied through process configuration and held in
/// [`SecretVec`] so it is zeroized on drop and never appears in debug
/// output. Loss of the key is a startup-fatal condition handled by the
/// config layer.
pub struct LedgerSigner {
    key: SecretVec<u8>,
}

impl std::fmt::Debug for LedgerSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerSigner").finish_non_exhaustive()
    }
}

impl LedgerSigner {
    /// Creates a signer from raw key bytes.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` if the key is shorter
    /// than [`MIN_KEY_LEN`] bytes.
    pub fn new(key: Vec<u8>) -> Result<Self, CryptoError> {
        if key.len() < MIN_KEY_LEN {
            return Err(CryptoError::InvalidKeyMaterial(format!(
                "signing key must be at least {MIN_KEY_LEN} bytes, got {}",
                key.len()
            )));
        }
        Ok(Self {
            key: SecretVec::new(key),
        })
    }

    /// Creates a signer from a hex-encoded key string.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::InvalidKeyMaterial` if the string is not
    /// valid hex or decodes to a too-short key.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        Self::new(hex_decode(hex_key.trim())?)
    }

    /// Signs arbitrary bytes.
    #[must_use]
    pub fn sign(&self, data: &[u8]) -> Signature {
        let mut mac = HmacSha256::new_from_slice(self.key.expose_secret())
            .expect("HMAC accepts keys of any length");
        mac.update(data);
        mac.finalize().into_bytes().into()
    }

    /// Signs an entry envelope together with its integrity hash.
    ///
    /// Binding the hash into the signature means a forged hash cannot be
    /// paired with a replayed signature.
    #[must_use]
    pub fn sign_envelope(&self, envelope: &EntryEnvelope<'_>, integrity_hash: &[u8]) -> Signature {
        let mut buf = Vec::with_capacity(160);
        buf.extend_from_slice(envelope.entry_id.as_bytes());
        buf.push(0x1f);
        buf.extend_from_slice(envelope.tenant_id.as_bytes());
        buf.push(0x1f);
        buf.extend_from_slice(envelope.event_type.as_bytes());
        buf.push(0x1f);
        buf.extend_from_slice(envelope.actor_id.as_bytes());
        buf.push(0x1f);
        buf.extend_from_slice(integrity_hash);
        self.sign(&buf)
    }

    /// Verifies a signature over arbitrary bytes in constant time.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SignatureInvalid` if verification fails.
    pub fn verify(&self, data: &[u8], signature: &[u8], entry_id: &str) -> Result<(), CryptoError> {
        let expected = self.sign(data);
        if expected.ct_eq(signature).into() {
            Ok(())
        } else {
            Err(CryptoError::SignatureInvalid {
                entry_id: entry_id.to_string(),
            })
        }
    }

    /// Verifies an envelope signature in constant time.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::SignatureInvalid` if verification fails.
    pub fn verify_envelope(
        &self,
        envelope: &EntryEnvelope<'_>,
        integrity_hash: &[u8],
        signature: &[u8],
    ) -> Result<(), CryptoError> {
        let expected = self.sign_envelope(envelope, integrity_hash);
        if expected.ct_eq(signature).into() {
            Ok(())
        } else {
            Err(CryptoError::SignatureInvalid {
                entry_id: envelope.entry_id.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod unit_tests {
    use super::*;

    fn signer() -> LedgerSigner {
        LedgerSigner::new(vec![0x5a; 32]).unwrap()
    }

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
    fn test_rejects_short_key() {
        assert!(matches!(
            LedgerSigner::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn test_sign_verify_round_trip() {
        let signer = signer();
        let sig = signer.sign(b"payload");
        assert!(signer.verify(b"payload", &sig, "e").is_ok());
        assert!(signer.verify(b"tampered", &sig, "e").is_err());
    }

    #[test]
    fn test_envelope_signature_binds_hash() {
        let signer = signer();
        let env = envelope();
        let sig = signer.sign_envelope(&env, &[1u8; 32]);
        assert!(signer.verify_envelope(&env, &[1u8; 32], &sig).is_ok());
        assert!(signer.verify_envelope(&env, &[2u8; 32], &sig).is_err());
    }

    #[test]
    fn test_different_keys_disagree() {
        let env = envelope();
        let sig = LedgerSigner::new(vec![1u8; 32])
            .unwrap()
            .sign_envelope(&env, &[0u8; 32]);
        let other = LedgerSigner::new(vec![2u8; 32]).unwrap();
        assert!(other.verify_envelope(&env, &[0u8; 32], &sig).is_err());
    }

    #[test]
    fn test_from_hex() {
        let signer = LedgerSigner::from_hex(&"ab".repeat(32)).unwrap();
        let sig = signer.sign(b"x");
        assert!(signer.verify(b"x", &sig, "e").is_ok());
        assert!(LedgerSigner::from_hex("nothex").is_err());
    }
}
