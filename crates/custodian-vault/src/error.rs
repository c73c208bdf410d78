//! Vault error types.
//!
//! All vault operations surface errors through [`VaultError`]. Note that a
//! record which fails to decrypt is *not* an error at the public API: it is
//! reported as [`SecretLookup::DecryptFailed`](crate::SecretLookup). The
//! crypto variants below are used internally and by the [`crypto`](crate::crypto)
//! primitives.

/// Unified error type for the Custodian credential vault.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    // -- Configuration errors -----------------------------------------------
    /// No master passphrase was supplied; the vault cannot be constructed.
    #[error("master passphrase is not configured (set CUSTODIAN_MASTER_KEY)")]
    MissingMasterKey,

    /// A configuration value is present but unusable.
    #[error("invalid vault configuration: {reason}")]
    InvalidConfig { reason: String },

    // -- Crypto errors ------------------------------------------------------
    /// Encryption failed (e.g. invalid key length, CSPRNG failure).
    #[error("encryption failed: {reason}")]
    EncryptionFailed { reason: String },

    /// Decryption failed (e.g. wrong passphrase, corrupted token).
    #[error("decryption failed: {reason}")]
    DecryptionFailed { reason: String },

    /// Key derivation failed (e.g. zero iterations, salt generation).
    #[error("key derivation failed: {reason}")]
    KeyDerivationFailed { reason: String },

    /// A legacy record needs the shared legacy salt, which is not on disk.
    #[error("legacy salt file is missing; legacy records cannot be decrypted")]
    LegacySaltMissing,

    // -- Ownership errors ---------------------------------------------------
    /// The owner file at this owner's path belongs to someone else.
    #[error("secret file of {expected:?} is recorded as belonging to {found:?}")]
    OwnerMismatch { expected: String, found: String },

    // -- Argument errors ----------------------------------------------------
    /// A category or key name was empty.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -- Underlying errors --------------------------------------------------
    /// File primitive failure (I/O on the secret store, bad owner id).
    #[error("storage error: {0}")]
    Storage(#[from] custodian_store::StoreError),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the vault crate.
pub type Result<T> = std::result::Result<T, VaultError>;
