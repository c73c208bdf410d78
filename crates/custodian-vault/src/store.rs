//! File-backed encrypted credential store.
//!
//! The [`CredentialVault`] keeps one JSON file per owner under the secrets
//! directory. Every value is encrypted under a key derived from the master
//! passphrase and the record's own salt before it touches disk.
//!
//! # Layout
//!
//! ```text
//! <secrets_dir>/
//!   .legacy_salt        shared salt of format "1" records (optional)
//!   acme.json           { "owner_id": "acme",
//!                         "categories": { "crm": { "api_key": { ciphertext, salt, ... } } } }
//!   globex.json
//! ```
//!
//! # Concurrency
//!
//! Writes are whole-file read-modify-write cycles. Callers that may touch
//! the same owner from several threads or processes must serialize those
//! calls per owner; distinct owners use distinct files and are independent.
//!
//! # Ownership
//!
//! Each file records the raw owner id it was written for. Reading or
//! writing it under any other id fails with [`VaultError::OwnerMismatch`],
//! so two ids that map to the same file name never see each other's
//! secrets.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::path::{Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use chrono::Utc;
use zeroize::Zeroizing;

use custodian_store::{ensure_private_dir, owner_file_stem, write_atomic};

use crate::config::VaultConfig;
use crate::crypto;
use crate::error::{Result, VaultError};
use crate::record::{
    CategorySummary, FormatVersion, OwnerFile, OwnerSecrets, SecretLookup, SecretRecord,
    StoredOwnerFile,
};

/// File name of the shared legacy salt inside the secrets directory.
pub const LEGACY_SALT_FILE: &str = ".legacy_salt";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Legacy-format bookkeeping across the whole store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LegacyStatus {
    /// Whether the shared legacy salt was found at construction.
    pub salt_present: bool,
    /// Legacy records across all owners.
    pub legacy_records: usize,
}

impl LegacyStatus {
    /// Legacy records exist but can never be decrypted.
    pub fn at_risk(&self) -> bool {
        self.legacy_records > 0 && !self.salt_present
    }
}

// ---------------------------------------------------------------------------
// Vault
// ---------------------------------------------------------------------------

/// Encrypted credential vault backed by per-owner JSON files.
///
/// # Example
///
/// ```rust,no_run
/// # use custodian_vault::{CredentialVault, VaultConfig};
/// # fn example() -> custodian_vault::Result<()> {
/// let config = VaultConfig::new()
///     .with_secrets_dir("data/secrets")
///     .with_master_passphrase("correct horse battery staple");
/// let vault = CredentialVault::open(&config)?;
///
/// vault.store("acme", "crm", "api_key", "sk_live_123")?;
/// let api_key = vault.get("acme", "crm", "api_key")?.into_option();
/// # Ok(())
/// # }
/// ```
pub struct CredentialVault {
    secrets_dir: PathBuf,
    passphrase: Zeroizing<Vec<u8>>,
    kdf_iterations: u32,
    legacy_salt: Option<Zeroizing<Vec<u8>>>,
}

impl CredentialVault {
    /// Open (or create) a vault rooted at `config.secrets_dir`.
    ///
    /// Emits a warning if legacy records exist while the shared legacy salt
    /// is missing, since those records can no longer be decrypted.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::MissingMasterKey`] if no passphrase is
    /// configured, [`VaultError::InvalidConfig`] for an unusable iteration
    /// count, or a storage error if the directory cannot be created.
    pub fn open(config: &VaultConfig) -> Result<Self> {
        let passphrase = config.validated_passphrase()?;
        let secrets_dir = config.secrets_dir.clone();

        tracing::info!(path = %secrets_dir.display(), "opening credential vault");
        ensure_private_dir(&secrets_dir)?;

        let legacy_salt = Self::read_legacy_salt(&secrets_dir)?;

        let vault = Self {
            secrets_dir,
            passphrase,
            kdf_iterations: config.kdf_iterations,
            legacy_salt,
        };

        if vault.legacy_salt.is_none() {
            let status = vault.legacy_status()?;
            if status.at_risk() {
                tracing::warn!(
                    legacy_records = status.legacy_records,
                    salt_file = LEGACY_SALT_FILE,
                    "legacy salt file is missing; legacy records are unreadable"
                );
            }
        }

        tracing::info!(
            legacy_salt = vault.legacy_salt.is_some(),
            "credential vault ready"
        );
        Ok(vault)
    }

    /// Open a vault configured from `CUSTODIAN_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::open(&VaultConfig::from_env()?)
    }

    /// The secret store root.
    pub fn secrets_dir(&self) -> &Path {
        &self.secrets_dir
    }

    // -- Secret operations --------------------------------------------------

    /// Encrypt `value` and store it under `owner_id / category / key`.
    ///
    /// A fresh salt is drawn on every call, so storing the same value twice
    /// produces different ciphertexts. Overwriting keeps the original
    /// `created_at`.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the owner's file cannot be read or written.
    pub fn store(&self, owner_id: &str, category: &str, key: &str, value: &str) -> Result<()> {
        validate_name("category", category)?;
        validate_name("key", key)?;

        let path = self.owner_path(owner_id)?;
        let mut secrets = self.load(&path, owner_id)?;

        let mut record = self.seal(value)?;
        let slot = secrets
            .entry(category.to_string())
            .or_default()
            .entry(key.to_string());

        match slot {
            Entry::Occupied(mut existing) => {
                record.created_at = existing.get().created_at;
                record.last_accessed_at = existing.get().last_accessed_at;
                existing.insert(record);
            }
            Entry::Vacant(vacant) => {
                vacant.insert(record);
            }
        }

        self.save(&path, owner_id, &secrets)?;

        tracing::info!(owner_id, category, key, "stored secret");
        Ok(())
    }

    /// Retrieve and decrypt a secret.
    ///
    /// Legacy records are re-encrypted under the current format and written
    /// back before the value is returned. A successful read also refreshes
    /// `last_accessed_at`.
    ///
    /// # Errors
    ///
    /// Only storage failures are errors. A record that cannot be decrypted
    /// yields [`SecretLookup::DecryptFailed`].
    pub fn get(&self, owner_id: &str, category: &str, key: &str) -> Result<SecretLookup> {
        let path = self.owner_path(owner_id)?;
        let mut secrets = self.load(&path, owner_id)?;

        let Some(record) = secrets.get_mut(category).and_then(|c| c.get_mut(key)) else {
            tracing::debug!(owner_id, category, key, "secret not found");
            return Ok(SecretLookup::Absent);
        };

        let value = match self.unseal(record) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(
                    owner_id,
                    category,
                    key,
                    format_version = %record.format_version,
                    error = %e,
                    "failed to decrypt secret"
                );
                return Ok(SecretLookup::DecryptFailed);
            }
        };

        if record.format_version == FormatVersion::Legacy {
            let mut upgraded = self.seal(&value)?;
            upgraded.created_at = record.created_at;
            *record = upgraded;
            tracing::info!(owner_id, category, key, "migrated legacy secret to current format");
        }

        record.last_accessed_at = Some(Utc::now());
        self.save(&path, owner_id, &secrets)?;

        Ok(SecretLookup::Found(value))
    }

    /// Decrypt every secret in `category`.
    ///
    /// Keys whose records cannot be decrypted are left out of the result.
    pub fn get_all(&self, owner_id: &str, category: &str) -> Result<BTreeMap<String, String>> {
        let path = self.owner_path(owner_id)?;
        let keys: Vec<String> = self
            .load(&path, owner_id)?
            .get(category)
            .map(|c| c.keys().cloned().collect())
            .unwrap_or_default();

        let mut values = BTreeMap::new();
        for key in keys {
            if let SecretLookup::Found(value) = self.get(owner_id, category, &key)? {
                values.insert(key, value);
            }
        }

        tracing::debug!(owner_id, category, count = values.len(), "read category");
        Ok(values)
    }

    /// Delete one category, or with `category = None` every secret of the
    /// owner.
    ///
    /// Returns `true` if anything was removed.
    pub fn delete(&self, owner_id: &str, category: Option<&str>) -> Result<bool> {
        let path = self.owner_path(owner_id)?;

        let Some(category) = category else {
            if !path.exists() {
                return Ok(false);
            }
            self.load(&path, owner_id)?;
            std::fs::remove_file(&path)?;
            tracing::info!(owner_id, "deleted all secrets of owner");
            return Ok(true);
        };

        let mut secrets = self.load(&path, owner_id)?;
        if secrets.remove(category).is_none() {
            return Ok(false);
        }
        self.save(&path, owner_id, &secrets)?;

        tracing::info!(owner_id, category, "deleted secret category");
        Ok(true)
    }

    /// Delete a single secret. An emptied category is dropped as well.
    ///
    /// Returns `true` if the record existed.
    pub fn delete_key(&self, owner_id: &str, category: &str, key: &str) -> Result<bool> {
        let path = self.owner_path(owner_id)?;
        let mut secrets = self.load(&path, owner_id)?;

        let Some(records) = secrets.get_mut(category) else {
            return Ok(false);
        };
        if records.remove(key).is_none() {
            return Ok(false);
        }
        if records.is_empty() {
            secrets.remove(category);
        }
        self.save(&path, owner_id, &secrets)?;

        tracing::info!(owner_id, category, key, "deleted secret");
        Ok(true)
    }

    /// List categories and keys of an owner without decrypting anything.
    pub fn list(&self, owner_id: &str) -> Result<BTreeMap<String, CategorySummary>> {
        let path = self.owner_path(owner_id)?;
        let secrets = self.load(&path, owner_id)?;

        let summaries: BTreeMap<String, CategorySummary> = secrets
            .into_iter()
            .map(|(category, records)| {
                let summary = CategorySummary {
                    last_accessed_at: records.values().filter_map(|r| r.last_accessed_at).max(),
                    legacy_records: records
                        .values()
                        .filter(|r| r.format_version == FormatVersion::Legacy)
                        .count(),
                    keys: records.into_keys().collect(),
                };
                (category, summary)
            })
            .collect();

        tracing::debug!(owner_id, categories = summaries.len(), "listed secrets");
        Ok(summaries)
    }

    /// Report legacy-format records across every owner file.
    pub fn legacy_status(&self) -> Result<LegacyStatus> {
        let mut legacy_records = 0;

        for path in self.owner_files()? {
            match self.read_owner_file(&path) {
                Ok(stored) => {
                    legacy_records += stored
                        .into_secrets()
                        .values()
                        .flat_map(|c| c.values())
                        .filter(|r| r.format_version == FormatVersion::Legacy)
                        .count();
                }
                Err(VaultError::Serialization(e)) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable secret file");
                }
                Err(e) => return Err(e),
            }
        }

        Ok(LegacyStatus {
            salt_present: self.legacy_salt.is_some(),
            legacy_records,
        })
    }

    // -- Internal helpers ---------------------------------------------------

    pub(crate) fn owner_path(&self, owner_id: &str) -> Result<PathBuf> {
        let stem = owner_file_stem(owner_id)?;
        Ok(self.secrets_dir.join(format!("{stem}.json")))
    }

    /// Load `owner_id`'s map. A missing file is an empty map.
    ///
    /// Fails with [`VaultError::OwnerMismatch`] if the file records a
    /// different owner. Files from older releases record none and are
    /// accepted; the next save tags them.
    pub(crate) fn load(&self, path: &Path, owner_id: &str) -> Result<OwnerSecrets> {
        let stored = match self.read_owner_file(path) {
            Ok(stored) => stored,
            Err(VaultError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(OwnerSecrets::new());
            }
            Err(e) => return Err(e),
        };

        if let Some(found) = stored.owner_id()
            && found != owner_id
        {
            tracing::error!(
                owner_id,
                found,
                path = %path.display(),
                "secret file belongs to another owner"
            );
            return Err(VaultError::OwnerMismatch {
                expected: owner_id.to_string(),
                found: found.to_string(),
            });
        }
        Ok(stored.into_secrets())
    }

    fn read_owner_file(&self, path: &Path) -> Result<StoredOwnerFile> {
        let bytes = std::fs::read(path)?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    /// Write the owner's map, or remove the file once nothing is left.
    pub(crate) fn save(&self, path: &Path, owner_id: &str, secrets: &OwnerSecrets) -> Result<()> {
        if secrets.is_empty() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }

        let file = OwnerFile {
            owner_id,
            categories: secrets,
        };
        let bytes = serde_json::to_vec_pretty(&file)?;
        write_atomic(path, &bytes)?;
        Ok(())
    }

    /// Encrypt `value` into a fresh current-format record.
    pub(crate) fn seal(&self, value: &str) -> Result<SecretRecord> {
        let salt = crypto::generate_salt()?;
        let key = crypto::derive_key(&self.passphrase, &salt, self.kdf_iterations)?;
        let ciphertext = crypto::encrypt(value.as_bytes(), &key)?;

        Ok(SecretRecord {
            ciphertext,
            salt: Some(B64.encode(salt)),
            format_version: FormatVersion::Current,
            kdf_iterations: Some(self.kdf_iterations),
            algorithm: Some(crypto::ALGORITHM.to_string()),
            created_at: Utc::now(),
            last_accessed_at: None,
        })
    }

    /// Decrypt a record with the parameters stored on it.
    pub(crate) fn unseal(&self, record: &SecretRecord) -> Result<String> {
        let salt: Zeroizing<Vec<u8>> = match (&record.salt, record.format_version) {
            (Some(encoded), _) => {
                Zeroizing::new(B64.decode(encoded).map_err(|_| VaultError::DecryptionFailed {
                    reason: "record salt is not valid base64".into(),
                })?)
            }
            (None, FormatVersion::Legacy) => self
                .legacy_salt
                .clone()
                .ok_or(VaultError::LegacySaltMissing)?,
            (None, FormatVersion::Current) => {
                return Err(VaultError::DecryptionFailed {
                    reason: "current-format record has no salt".into(),
                });
            }
        };

        let key = crypto::derive_key(&self.passphrase, &salt, record.iterations())?;
        let plaintext = crypto::decrypt(&record.ciphertext, &key)?;

        String::from_utf8(plaintext).map_err(|_| VaultError::DecryptionFailed {
            reason: "decrypted value is not valid UTF-8".into(),
        })
    }

    fn owner_files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.secrets_dir)? {
            let path = entry?.path();
            let is_hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if !is_hidden && path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    fn read_legacy_salt(secrets_dir: &Path) -> Result<Option<Zeroizing<Vec<u8>>>> {
        let path = secrets_dir.join(LEGACY_SALT_FILE);
        match std::fs::read(&path) {
            Ok(bytes) if bytes.is_empty() => {
                tracing::warn!(path = %path.display(), "legacy salt file is empty; ignoring");
                Ok(None)
            }
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

fn validate_name(what: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(VaultError::InvalidArgument(format!("{what} must not be empty")));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn test_vault(dir: &Path) -> CredentialVault {
        let config = VaultConfig::new()
            .with_secrets_dir(dir)
            .with_master_passphrase("unit-test-passphrase");
        CredentialVault::open(&config).unwrap()
    }

    #[test]
    fn store_and_retrieve_secret() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        vault.store("acme", "crm", "api_key", "sk_live_123").unwrap();

        let value = vault.get("acme", "crm", "api_key").unwrap();
        assert_eq!(value, SecretLookup::Found("sk_live_123".into()));
    }

    #[test]
    fn missing_secret_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        assert_eq!(vault.get("acme", "crm", "nope").unwrap(), SecretLookup::Absent);
        vault.store("acme", "crm", "api_key", "v").unwrap();
        assert_eq!(vault.get("acme", "billing", "api_key").unwrap(), SecretLookup::Absent);
    }

    #[test]
    fn overwrite_keeps_created_at() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        vault.store("acme", "crm", "api_key", "old").unwrap();
        let path = vault.owner_path("acme").unwrap();
        let first = vault.load(&path, "acme").unwrap()["crm"]["api_key"].clone();

        vault.store("acme", "crm", "api_key", "new").unwrap();
        let second = vault.load(&path, "acme").unwrap()["crm"]["api_key"].clone();

        assert_eq!(first.created_at, second.created_at);
        assert_ne!(first.salt, second.salt);
        assert_eq!(
            vault.get("acme", "crm", "api_key").unwrap().into_option().as_deref(),
            Some("new")
        );
    }

    #[test]
    fn records_carry_their_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        vault.store("acme", "crm", "api_key", "v").unwrap();
        let path = vault.owner_path("acme").unwrap();
        let record = vault.load(&path, "acme").unwrap()["crm"]["api_key"].clone();

        assert_eq!(record.format_version, FormatVersion::Current);
        assert_eq!(record.kdf_iterations, Some(crypto::CURRENT_KDF_ITERATIONS));
        assert_eq!(record.algorithm.as_deref(), Some(crypto::ALGORITHM));
        let salt = B64.decode(record.salt.unwrap()).unwrap();
        assert_eq!(salt.len(), crypto::SALT_LEN);
    }

    #[test]
    fn corrupted_ciphertext_reports_decrypt_failed() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        vault.store("acme", "crm", "api_key", "v").unwrap();
        let path = vault.owner_path("acme").unwrap();
        let mut secrets = vault.load(&path, "acme").unwrap();
        let record = secrets.get_mut("crm").unwrap().get_mut("api_key").unwrap();
        record.ciphertext = record.ciphertext.replacen('A', "B", 1);
        vault.save(&path, "acme", &secrets).unwrap();

        assert_eq!(
            vault.get("acme", "crm", "api_key").unwrap(),
            SecretLookup::DecryptFailed
        );
    }

    #[test]
    fn delete_key_drops_empty_category_and_file() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        vault.store("acme", "crm", "api_key", "v").unwrap();
        assert!(vault.delete_key("acme", "crm", "api_key").unwrap());
        assert!(!vault.delete_key("acme", "crm", "api_key").unwrap());

        assert!(vault.list("acme").unwrap().is_empty());
        assert!(!vault.owner_path("acme").unwrap().exists());
    }

    #[test]
    fn empty_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let vault = test_vault(dir.path());

        assert!(matches!(
            vault.store("acme", "", "k", "v"),
            Err(VaultError::InvalidArgument(_))
        ));
        assert!(matches!(
            vault.store("", "crm", "k", "v"),
            Err(VaultError::Storage(_))
        ));
    }

    #[test]
    fn legacy_status_without_salt_is_at_risk() {
        let status = LegacyStatus {
            salt_present: false,
            legacy_records: 2,
        };
        assert!(status.at_risk());
        assert!(!LegacyStatus { salt_present: true, ..status }.at_risk());
    }
}
