//! Eager upgrade of legacy-format records.
//!
//! Reads already migrate records one at a time. [`CredentialVault::migrate_owner`]
//! runs the same upgrade over every legacy record of an owner in one pass,
//! which lets operators retire the shared legacy salt once nothing depends
//! on it.

use crate::error::Result;
use crate::record::FormatVersion;
use crate::store::CredentialVault;

/// Outcome of [`CredentialVault::migrate_owner`]. Entries are
/// `"category/key"` identities.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    /// Records rewritten under the current format.
    pub migrated: Vec<String>,
    /// Records that were already current.
    pub already_current: usize,
    /// Legacy records that could not be decrypted and were left untouched.
    pub failed: Vec<String>,
}

impl MigrationReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

impl CredentialVault {
    /// Upgrade every legacy record of `owner_id` to the current format.
    ///
    /// Undecryptable records are reported, not removed. The owner's file is
    /// written once, and only if something changed.
    pub fn migrate_owner(&self, owner_id: &str) -> Result<MigrationReport> {
        let path = self.owner_path(owner_id)?;
        let mut secrets = self.load(&path, owner_id)?;
        let mut report = MigrationReport::default();

        for (category, records) in secrets.iter_mut() {
            for (key, record) in records.iter_mut() {
                if record.format_version == FormatVersion::Current {
                    report.already_current += 1;
                    continue;
                }

                let identity = format!("{category}/{key}");
                match self.unseal(record) {
                    Ok(value) => {
                        let mut upgraded = self.seal(&value)?;
                        upgraded.created_at = record.created_at;
                        upgraded.last_accessed_at = record.last_accessed_at;
                        *record = upgraded;
                        report.migrated.push(identity);
                    }
                    Err(e) => {
                        tracing::warn!(owner_id, secret = %identity, error = %e, "legacy secret not migrated");
                        report.failed.push(identity);
                    }
                }
            }
        }

        if !report.migrated.is_empty() {
            self.save(&path, owner_id, &secrets)?;
        }

        tracing::info!(
            owner_id,
            migrated = report.migrated.len(),
            failed = report.failed.len(),
            "legacy migration finished"
        );
        Ok(report)
    }
}
