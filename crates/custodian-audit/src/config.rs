//! Audit chain configuration.
//!
//! [`AuditConfig`] names the audit store root and the two knobs that shape
//! its files: the rotation size threshold and the minimum retention of
//! compliance records.

use std::path::PathBuf;

use crate::error::{AuditError, Result};

/// Environment variable overriding the audit store root.
pub const ENV_AUDIT_DIR: &str = "CUSTODIAN_AUDIT_DIR";

/// Environment variable overriding the rotation threshold in bytes.
pub const ENV_MAX_FILE_BYTES: &str = "CUSTODIAN_AUDIT_MAX_FILE_BYTES";

/// Environment variable overriding the compliance minimum retention.
pub const ENV_COMPLIANCE_RETENTION_DAYS: &str = "CUSTODIAN_COMPLIANCE_RETENTION_DAYS";

/// Settings for opening an [`AuditChain`](crate::AuditChain).
#[derive(Debug, Clone)]
pub struct AuditConfig {
    /// Directory holding one sub-directory of log files per owner.
    ///
    /// Default: **`data/audit`**.
    pub audit_dir: PathBuf,

    /// A new log file is started once the active one reaches this size.
    ///
    /// Default: **10 MiB**.
    pub max_file_bytes: u64,

    /// Compliance records (exports, compliance requests, deletions) are
    /// never purged before this many days, whatever retention a purge asks
    /// for.
    ///
    /// Default: **2 555** (seven years).
    pub compliance_retention_days: u32,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            audit_dir: PathBuf::from("data/audit"),
            max_file_bytes: 10 * 1024 * 1024,
            compliance_retention_days: 2555,
        }
    }
}

impl AuditConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from `CUSTODIAN_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidConfig`] if a numeric variable does not
    /// parse.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var(ENV_AUDIT_DIR) {
            config.audit_dir = PathBuf::from(dir);
        }
        if let Ok(raw) = std::env::var(ENV_MAX_FILE_BYTES) {
            config.max_file_bytes = parse_env(ENV_MAX_FILE_BYTES, &raw)?;
        }
        if let Ok(raw) = std::env::var(ENV_COMPLIANCE_RETENTION_DAYS) {
            config.compliance_retention_days = parse_env(ENV_COMPLIANCE_RETENTION_DAYS, &raw)?;
        }

        Ok(config)
    }

    /// Set the audit store root.
    pub fn with_audit_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.audit_dir = dir.into();
        self
    }

    /// Set the rotation threshold (in bytes).
    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    /// Set the compliance minimum retention (in days).
    pub fn with_compliance_retention_days(mut self, days: u32) -> Self {
        self.compliance_retention_days = days;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.max_file_bytes == 0 {
            return Err(AuditError::InvalidConfig {
                reason: "max_file_bytes must be greater than zero".into(),
            });
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.trim().parse().map_err(|_| AuditError::InvalidConfig {
        reason: format!("{name} must be a non-negative integer, got {raw:?}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        let config = AuditConfig::default();
        assert_eq!(config.max_file_bytes, 10 * 1024 * 1024);
        assert_eq!(config.compliance_retention_days, 2555);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn zero_rotation_threshold_rejected() {
        let config = AuditConfig::new().with_max_file_bytes(0);
        assert!(matches!(
            config.validate(),
            Err(AuditError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn parse_env_reports_variable_name() {
        let err = parse_env::<u64>(ENV_MAX_FILE_BYTES, "ten").unwrap_err();
        assert!(err.to_string().contains(ENV_MAX_FILE_BYTES));
    }
}
