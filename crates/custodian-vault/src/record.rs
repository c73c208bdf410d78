//! On-disk secret record types.
//!
//! Each owner's secrets live in one JSON file holding the raw owner id and
//! a `category -> key -> SecretRecord` map. Files written by older releases
//! are the bare map. Records carry their own KDF parameters so that
//! decryption never depends on a global constant.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto;

/// The full secret map of one owner: category, then key, then record.
pub type OwnerSecrets = BTreeMap<String, BTreeMap<String, SecretRecord>>;

/// One owner's file as written today.
#[derive(Debug, Serialize)]
pub(crate) struct OwnerFile<'a> {
    pub(crate) owner_id: &'a str,
    pub(crate) categories: &'a OwnerSecrets,
}

/// Either shape an owner's file may have on disk.
///
/// A bare map never parses as the tagged form: its values are objects, and
/// `owner_id` must be a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum StoredOwnerFile {
    Tagged {
        owner_id: String,
        categories: OwnerSecrets,
    },
    Bare(OwnerSecrets),
}

impl StoredOwnerFile {
    /// The owner recorded in the file, if any.
    pub(crate) fn owner_id(&self) -> Option<&str> {
        match self {
            Self::Tagged { owner_id, .. } => Some(owner_id),
            Self::Bare(_) => None,
        }
    }

    pub(crate) fn into_secrets(self) -> OwnerSecrets {
        match self {
            Self::Tagged { categories, .. } | Self::Bare(categories) => categories,
        }
    }
}

/// Storage format of a record.
///
/// The format is read from each record, never from vault-wide state, so a
/// store holding both formats always decrypts correctly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FormatVersion {
    /// Shared salt kept in a separate file, lower iteration count. Records
    /// written before versioning existed carry no tag and land here.
    #[default]
    #[serde(rename = "1")]
    Legacy,

    /// Per-record random salt, current iteration count.
    #[serde(rename = "2")]
    Current,
}

impl FormatVersion {
    /// The string stored in `format_version`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "1",
            Self::Current => "2",
        }
    }

    /// Iteration count assumed when a record does not name one.
    pub fn default_iterations(&self) -> u32 {
        match self {
            Self::Legacy => crypto::LEGACY_KDF_ITERATIONS,
            Self::Current => crypto::CURRENT_KDF_ITERATIONS,
        }
    }
}

impl std::fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One encrypted secret.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretRecord {
    /// Base64 token produced by [`crypto::encrypt`].
    pub ciphertext: String,

    /// Standard base64 of the per-record salt. Absent on legacy records.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub salt: Option<String>,

    #[serde(default)]
    pub format_version: FormatVersion,

    /// PBKDF2 iterations used for this record.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kdf_iterations: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    #[serde(default)]
    pub created_at: DateTime<Utc>,

    #[serde(default)]
    pub last_accessed_at: Option<DateTime<Utc>>,
}

impl SecretRecord {
    /// Iterations to use when deriving this record's key.
    pub fn iterations(&self) -> u32 {
        self.kdf_iterations
            .unwrap_or_else(|| self.format_version.default_iterations())
    }
}

/// Result of looking up a secret.
///
/// Keeps "never stored" apart from "stored but unreadable" so callers
/// cannot conflate the two.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretLookup {
    /// The secret was decrypted.
    Found(String),
    /// No record exists for this owner/category/key.
    Absent,
    /// A record exists but could not be decrypted (wrong passphrase,
    /// corrupted token, missing legacy salt).
    DecryptFailed,
}

impl SecretLookup {
    /// Collapse to `Some(value)` only when the secret was decrypted.
    pub fn into_option(self) -> Option<String> {
        match self {
            Self::Found(value) => Some(value),
            Self::Absent | Self::DecryptFailed => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

/// Per-category listing returned by [`CredentialVault::list`](crate::CredentialVault::list).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySummary {
    /// Stored key names, sorted.
    pub keys: Vec<String>,
    /// Most recent access across the category's keys.
    pub last_accessed_at: Option<DateTime<Utc>>,
    /// Records still in the legacy format.
    pub legacy_records: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn untagged_record_is_legacy() {
        let record: SecretRecord =
            serde_json::from_str(r#"{"ciphertext":"gAAAA"}"#).unwrap();

        assert_eq!(record.format_version, FormatVersion::Legacy);
        assert_eq!(record.iterations(), crypto::LEGACY_KDF_ITERATIONS);
        assert!(record.salt.is_none());
    }

    #[test]
    fn format_version_serializes_as_string_digit() {
        let json = serde_json::to_string(&FormatVersion::Current).unwrap();
        assert_eq!(json, r#""2""#);
        let parsed: FormatVersion = serde_json::from_str(r#""1""#).unwrap();
        assert_eq!(parsed, FormatVersion::Legacy);
    }

    #[test]
    fn recorded_iterations_win_over_defaults() {
        let record: SecretRecord = serde_json::from_str(
            r#"{"ciphertext":"x","format_version":"2","kdf_iterations":700000}"#,
        )
        .unwrap();
        assert_eq!(record.iterations(), 700_000);
    }

    #[test]
    fn owner_file_shapes() {
        let tagged: StoredOwnerFile = serde_json::from_str(
            r#"{"owner_id":"a.b","categories":{"crm":{"api_key":{"ciphertext":"x"}}}}"#,
        )
        .unwrap();
        assert_eq!(tagged.owner_id(), Some("a.b"));
        assert!(tagged.into_secrets()["crm"].contains_key("api_key"));

        let bare: StoredOwnerFile =
            serde_json::from_str(r#"{"crm":{"api_key":{"ciphertext":"x"}}}"#).unwrap();
        assert_eq!(bare.owner_id(), None);
        assert!(bare.into_secrets()["crm"].contains_key("api_key"));

        // Categories that happen to use the tag's field names stay a bare map.
        let lookalike: StoredOwnerFile = serde_json::from_str(
            r#"{"owner_id":{"k":{"ciphertext":"x"}},"categories":{"k":{"ciphertext":"y"}}}"#,
        )
        .unwrap();
        assert_eq!(lookalike.owner_id(), None);
        assert_eq!(lookalike.into_secrets().len(), 2);
    }

    #[test]
    fn lookup_collapses_to_option() {
        assert_eq!(
            SecretLookup::Found("v".into()).into_option(),
            Some("v".to_string())
        );
        assert_eq!(SecretLookup::Absent.into_option(), None);
        assert_eq!(SecretLookup::DecryptFailed.into_option(), None);
    }
}
