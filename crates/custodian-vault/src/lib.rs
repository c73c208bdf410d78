//! Envelope-encrypted credential vault for Custodian.
//!
//! Secrets are partitioned by owner (one file each) and category, and every
//! value is encrypted under a key derived from the master passphrase and a
//! per-record random salt. Records written by older releases (format `"1"`)
//! are read with their legacy parameters and transparently upgraded.
//!
//! # Modules
//!
//! - [`crypto`] — PBKDF2 key derivation, AES-128-CBC + HMAC-SHA256 tokens.
//! - [`record`] — on-disk record and lookup types.
//! - [`store`] — the file-backed [`CredentialVault`].
//! - [`migration`] — eager legacy upgrade.
//! - [`config`] — [`VaultConfig`] and its environment variables.
//! - [`error`] — unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use custodian_vault::{CredentialVault, SecretLookup, VaultConfig};
//!
//! # fn example() -> custodian_vault::Result<()> {
//! // Reads CUSTODIAN_MASTER_KEY and CUSTODIAN_SECRETS_DIR.
//! let vault = CredentialVault::open(&VaultConfig::from_env()?)?;
//!
//! vault.store("acme", "crm", "api_key", "sk_live_123")?;
//!
//! match vault.get("acme", "crm", "api_key")? {
//!     SecretLookup::Found(value) => println!("got {} bytes", value.len()),
//!     SecretLookup::Absent => println!("not configured"),
//!     SecretLookup::DecryptFailed => println!("stored but unreadable"),
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod crypto;
pub mod error;
pub mod migration;
pub mod record;
pub mod store;

// Re-export the most commonly used types at the crate root for convenience.
pub use config::VaultConfig;
pub use error::{Result, VaultError};
pub use migration::MigrationReport;
pub use record::{CategorySummary, FormatVersion, SecretLookup, SecretRecord};
pub use store::{CredentialVault, LEGACY_SALT_FILE, LegacyStatus};
