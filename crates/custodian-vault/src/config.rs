//! Vault configuration.
//!
//! [`VaultConfig`] names the secret store root and carries the master
//! passphrase. The passphrase is supplied out-of-band, normally through the
//! `CUSTODIAN_MASTER_KEY` environment variable, and is never written to
//! disk. A builder-style API allows callers to customise individual fields.

use std::fmt;
use std::path::PathBuf;

use zeroize::Zeroizing;

use crate::crypto;
use crate::error::{Result, VaultError};

/// Environment variable holding the master passphrase.
pub const ENV_MASTER_KEY: &str = "CUSTODIAN_MASTER_KEY";

/// Environment variable overriding the secret store root.
pub const ENV_SECRETS_DIR: &str = "CUSTODIAN_SECRETS_DIR";

/// Environment variable overriding the current-format PBKDF2 iteration count.
pub const ENV_KDF_ITERATIONS: &str = "CUSTODIAN_KDF_ITERATIONS";

/// Settings for opening a [`CredentialVault`](crate::CredentialVault).
#[derive(Clone)]
pub struct VaultConfig {
    /// Directory holding one JSON file per owner.
    ///
    /// Default: **`data/secrets`**.
    pub secrets_dir: PathBuf,

    /// Master passphrase. Required; construction fails without it.
    pub master_passphrase: Option<Zeroizing<String>>,

    /// PBKDF2 iterations for newly written records. Must be at least
    /// [`crypto::CURRENT_KDF_ITERATIONS`].
    ///
    /// Default: **600 000**.
    pub kdf_iterations: u32,
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            secrets_dir: PathBuf::from("data/secrets"),
            master_passphrase: None,
            kdf_iterations: crypto::CURRENT_KDF_ITERATIONS,
        }
    }
}

impl VaultConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from `CUSTODIAN_*` environment variables.
    ///
    /// A missing passphrase is not an error here; it is reported when the
    /// vault is opened.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidConfig`] if the iteration override is
    /// not a number.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(passphrase) = std::env::var(ENV_MASTER_KEY) {
            config.master_passphrase = Some(Zeroizing::new(passphrase));
        }
        if let Ok(dir) = std::env::var(ENV_SECRETS_DIR) {
            config.secrets_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var(ENV_KDF_ITERATIONS) {
            config.kdf_iterations = raw.trim().parse().map_err(|_| VaultError::InvalidConfig {
                reason: format!("{ENV_KDF_ITERATIONS} must be an integer, got {raw:?}"),
            })?;
        }

        Ok(config)
    }

    /// Set the secret store root.
    pub fn with_secrets_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.secrets_dir = dir.into();
        self
    }

    /// Set the master passphrase.
    pub fn with_master_passphrase(mut self, passphrase: impl Into<String>) -> Self {
        self.master_passphrase = Some(Zeroizing::new(passphrase.into()));
        self
    }

    /// Set the PBKDF2 iteration count for newly written records.
    pub fn with_kdf_iterations(mut self, iterations: u32) -> Self {
        self.kdf_iterations = iterations;
        self
    }

    /// Check the configuration and return the passphrase bytes.
    pub(crate) fn validated_passphrase(&self) -> Result<Zeroizing<Vec<u8>>> {
        let passphrase = self
            .master_passphrase
            .as_ref()
            .filter(|p| !p.is_empty())
            .ok_or(VaultError::MissingMasterKey)?;

        if self.kdf_iterations < crypto::CURRENT_KDF_ITERATIONS {
            return Err(VaultError::InvalidConfig {
                reason: format!(
                    "kdf_iterations must be at least {}, got {}",
                    crypto::CURRENT_KDF_ITERATIONS,
                    self.kdf_iterations
                ),
            });
        }

        Ok(Zeroizing::new(passphrase.as_bytes().to_vec()))
    }
}

impl fmt::Debug for VaultConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VaultConfig")
            .field("secrets_dir", &self.secrets_dir)
            .field(
                "master_passphrase",
                &self.master_passphrase.as_ref().map(|_| "[REDACTED]"),
            )
            .field("kdf_iterations", &self.kdf_iterations)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_passphrase_is_rejected() {
        let config = VaultConfig::new();
        assert!(matches!(
            config.validated_passphrase(),
            Err(VaultError::MissingMasterKey)
        ));
    }

    #[test]
    fn empty_passphrase_is_rejected() {
        let config = VaultConfig::new().with_master_passphrase("");
        assert!(matches!(
            config.validated_passphrase(),
            Err(VaultError::MissingMasterKey)
        ));
    }

    #[test]
    fn low_iteration_count_is_rejected() {
        let config = VaultConfig::new()
            .with_master_passphrase("pw")
            .with_kdf_iterations(10_000);
        assert!(matches!(
            config.validated_passphrase(),
            Err(VaultError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn debug_output_redacts_passphrase() {
        let config = VaultConfig::new().with_master_passphrase("hunter2");
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
