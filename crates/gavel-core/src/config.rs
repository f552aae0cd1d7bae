//! Process configuration.
//!
//! Loaded once at startup from TOML. Key material is referenced by the
//! config (inline hex for tests, environment variable for deployments)
//! and wrapped in [`LedgerSigner`] immediately; a missing signing key is
//! startup-fatal.

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::crypto::{hex_decode, CryptoError, LedgerSigner};
use crate::forensic::AnomalyThresholds;

/// Default decision TTL in seconds.
const DEFAULT_TTL_SECS: u64 = 300;

/// Errors from loading or validating configuration.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),

    /// The config file could not be parsed.
    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// No signing key is configured. Startup-fatal: the ledger cannot
    /// sign entries without it.
    #[error("no signing key configured (set signing.key_hex or signing.key_env)")]
    MissingSigningKey,

    /// Key or salt material is malformed.
    #[error(transparent)]
    InvalidKeyMaterial(#[from] CryptoError),

    /// A config value is out of range.
    #[error("invalid config value for {field}: {details}")]
    InvalidValue {
        /// The offending field.
        field: String,
        /// What is wrong with it.
        details: String,
    },
}

/// Ledger storage locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// Path of the SQLite database.
    pub db_path: PathBuf,
    /// Path of the JSONL fallback queue.
    pub fallback_path: PathBuf,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("gavel-ledger.db"),
            fallback_path: PathBuf::from("gavel-fallback.jsonl"),
        }
    }
}

/// Signing and hashing key material sources.
///
/// The key itself never appears in logs or debug output; only its
/// source is configured here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Hex-encoded signing key, inline. Intended for tests.
    pub key_hex: Option<String>,
    /// Name of an environment variable holding the hex-encoded key.
    pub key_env: Option<String>,
    /// Hex-encoded 32-byte server salt for integrity hashing.
    ///
    /// When absent a random salt is generated, which makes hashes
    /// unverifiable across restarts; persistent deployments set it.
    pub salt_hex: Option<String>,
}

/// Decision cache tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Decision TTL in seconds.
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

/// Anomaly heuristic tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForensicConfig {
    /// Start of the unusual-hours window (UTC hour, inclusive).
    pub unusual_hours_start: u8,
    /// End of the unusual-hours window (UTC hour, exclusive).
    pub unusual_hours_end: u8,
    /// Unusual-hours volume threshold.
    pub unusual_hours_volume: u64,
    /// Sub-second burst threshold.
    pub burst_size: u64,
}

impl Default for ForensicConfig {
    fn default() -> Self {
        let t = AnomalyThresholds::default();
        Self {
            unusual_hours_start: t.unusual_hours_start,
            unusual_hours_end: t.unusual_hours_end,
            unusual_hours_volume: t.unusual_hours_volume,
            burst_size: t.burst_size,
        }
    }
}

/// Top-level process configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GavelConfig {
    /// Ledger storage locations.
    pub ledger: LedgerConfig,
    /// Key material sources.
    pub signing: SigningConfig,
    /// Decision cache tuning.
    pub cache: CacheConfig,
    /// Anomaly heuristic tuning.
    pub forensic: ForensicConfig,
}

impl GavelConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read or a parse error
    /// for malformed TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_toml(&std::fs::read_to_string(path)?)
    }

    /// Parses configuration from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns a parse error for malformed TOML or invalid values.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.forensic.unusual_hours_start > 23 || self.forensic.unusual_hours_end > 23 {
            return Err(ConfigError::InvalidValue {
                field: "forensic.unusual_hours".to_string(),
                details: "hours must be 0-23".to_string(),
            });
        }
        Ok(())
    }

    /// Builds the ledger signer from the configured key source.
    ///
    /// Inline hex wins over the environment variable when both are set.
    ///
    /// # Errors
    ///
    /// Returns `MissingSigningKey` when neither source yields a key, or
    /// `InvalidKeyMaterial` for malformed or too-short keys.
    pub fn signing_key(&self) -> Result<LedgerSigner, ConfigError> {
        if let Some(hex_key) = &self.signing.key_hex {
            return Ok(LedgerSigner::from_hex(hex_key)?);
        }
        if let Some(var) = &self.signing.key_env {
            if let Ok(hex_key) = std::env::var(var) {
                return Ok(LedgerSigner::from_hex(&hex_key)?);
            }
        }
        Err(ConfigError::MissingSigningKey)
    }

    /// The server salt for integrity hashing.
    ///
    /// # Errors
    ///
    /// Returns `InvalidKeyMaterial` if the configured salt is not 32
    /// hex-encoded bytes.
    pub fn server_salt(&self) -> Result<[u8; 32], ConfigError> {
        match &self.signing.salt_hex {
            Some(hex_salt) => {
                let bytes = hex_decode(hex_salt)?;
                bytes.try_into().map_err(|_| {
                    ConfigError::InvalidKeyMaterial(CryptoError::InvalidKeyMaterial(
                        "server salt must be exactly 32 bytes".to_string(),
                    ))
                })
            }
            None => {
                warn!("no server salt configured; generating an ephemeral one");
                let mut salt = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut salt);
                Ok(salt)
            }
        }
    }

    /// The decision TTL as a duration.
    #[must_use]
    pub const fn decision_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_secs)
    }

    /// The anomaly thresholds for the investigator.
    #[must_use]
    pub const fn anomaly_thresholds(&self) -> AnomalyThresholds {
        AnomalyThresholds {
            unusual_hours_start: self.forensic.unusual_hours_start,
            unusual_hours_end: self.forensic.unusual_hours_end,
            unusual_hours_volume: self.forensic.unusual_hours_volume,
            burst_size: self.forensic.burst_size,
        }
    }
}
