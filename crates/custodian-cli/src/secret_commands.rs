//! `custodian secret ...` handlers.
//!
//! Every vault operation that touches an owner is followed by a
//! `secret_*` entry in that owner's audit chain carrying the outcome.
//! Secret values never reach the audit log or the tracing output.

use anyhow::{Context, Result, bail};
use custodian_audit::{AuditChain, AuditEvent, EventType, Severity};
use custodian_vault::{CredentialVault, SecretLookup};
use tracing::info;

use crate::cli::SecretAction;
use crate::helpers;

pub fn run(action: SecretAction, actor: Option<String>) -> Result<()> {
    let vault = helpers::open_vault()?;
    let audit = helpers::open_audit()?;
    let session = SecretSession { vault, audit, actor };

    match action {
        SecretAction::Store {
            owner,
            category,
            key,
            value,
        } => session.store(&owner, &category, &key, value),
        SecretAction::Get {
            owner,
            category,
            key,
        } => session.get(&owner, &category, &key),
        SecretAction::List { owner } => session.list(&owner),
        SecretAction::Delete {
            owner,
            category,
            key,
        } => session.delete(&owner, category.as_deref(), key.as_deref()),
        SecretAction::Migrate { owner } => session.migrate(&owner),
        SecretAction::LegacyStatus => session.legacy_status(),
    }
}

/// The vault plus the audit chain its operations are recorded in.
struct SecretSession {
    vault: CredentialVault,
    audit: AuditChain,
    actor: Option<String>,
}

impl SecretSession {
    /// Append an audit entry for `owner`, attributed to the CLI actor.
    fn record(&self, event: AuditEvent) -> Result<()> {
        let event = match &self.actor {
            Some(actor) => event.actor(actor.clone()),
            None => event,
        };
        self.audit
            .log(event)
            .context("vault operation completed but the audit entry was not written")?;
        Ok(())
    }

    fn store(&self, owner: &str, category: &str, key: &str, value: Option<String>) -> Result<()> {
        let value = match value {
            Some(value) => value,
            None => helpers::read_secret_from_stdin()?,
        };

        self.vault
            .store(owner, category, key, &value)
            .with_context(|| format!("failed to store {category}/{key} for {owner}"))?;

        self.record(
            AuditEvent::new(
                EventType::SecretStored,
                owner,
                format!("stored secret {category}/{key}"),
            )
            .meta("category", category)
            .meta("key", key)
            .meta("outcome", "stored"),
        )?;

        println!("  [+] Stored {category}/{key} for {owner}");
        Ok(())
    }

    fn get(&self, owner: &str, category: &str, key: &str) -> Result<()> {
        let lookup = self
            .vault
            .get(owner, category, key)
            .with_context(|| format!("failed to read {category}/{key} for {owner}"))?;

        let (outcome, severity) = match &lookup {
            SecretLookup::Found(_) => ("found", Severity::Info),
            SecretLookup::Absent => ("absent", Severity::Info),
            SecretLookup::DecryptFailed => ("decrypt_failed", Severity::Error),
        };
        self.record(
            AuditEvent::new(
                EventType::SecretAccessed,
                owner,
                format!("read secret {category}/{key}"),
            )
            .severity(severity)
            .meta("category", category)
            .meta("key", key)
            .meta("outcome", outcome),
        )?;

        match lookup {
            SecretLookup::Found(value) => {
                println!("{value}");
                Ok(())
            }
            SecretLookup::Absent => bail!("no secret {category}/{key} for {owner}"),
            SecretLookup::DecryptFailed => bail!(
                "secret {category}/{key} for {owner} exists but could not be decrypted"
            ),
        }
    }

    fn list(&self, owner: &str) -> Result<()> {
        let categories = self
            .vault
            .list(owner)
            .with_context(|| format!("failed to list secrets for {owner}"))?;

        let key_count: usize = categories.values().map(|c| c.keys.len()).sum();
        self.record(
            AuditEvent::new(
                EventType::SecretAccessed,
                owner,
                format!("listed {key_count} secret name(s)"),
            )
            .meta("categories", categories.len())
            .meta("keys", key_count)
            .meta("outcome", "listed"),
        )?;

        println!();
        println!("  Secrets for {owner}");
        println!("  ===================");
        if categories.is_empty() {
            println!("  (none)");
        }
        for (category, summary) in &categories {
            let accessed = summary
                .last_accessed_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string());
            println!();
            println!("  {category}  (last accessed: {accessed})");
            for key in &summary.keys {
                println!("    - {key}");
            }
            if summary.legacy_records > 0 {
                println!("    [!] {} record(s) in the legacy format", summary.legacy_records);
            }
        }
        println!();
        Ok(())
    }

    fn delete(&self, owner: &str, category: Option<&str>, key: Option<&str>) -> Result<()> {
        let (removed, target) = match (category, key) {
            (Some(category), Some(key)) => (
                self.vault.delete_key(owner, category, key)?,
                format!("{category}/{key}"),
            ),
            (Some(category), None) => (self.vault.delete(owner, Some(category))?, category.to_string()),
            (None, None) => (self.vault.delete(owner, None)?, "all secrets".to_string()),
            (None, Some(_)) => bail!("a key can only be deleted within a category"),
        };

        let mut event = AuditEvent::new(
            EventType::SecretDeleted,
            owner,
            format!("deleted {target}"),
        )
        .meta("outcome", if removed { "deleted" } else { "absent" });
        if let Some(category) = category {
            event = event.meta("category", category);
        }
        if let Some(key) = key {
            event = event.meta("key", key);
        }
        self.record(event)?;

        if removed {
            println!("  [-] Deleted {target} for {owner}");
        } else {
            println!("  [=] Nothing to delete ({target} for {owner})");
        }
        Ok(())
    }

    fn migrate(&self, owner: &str) -> Result<()> {
        let report = self
            .vault
            .migrate_owner(owner)
            .with_context(|| format!("failed to migrate secrets for {owner}"))?;

        let severity = if report.is_complete() {
            Severity::Info
        } else {
            Severity::Warning
        };
        self.record(
            AuditEvent::new(
                EventType::SecretMigrated,
                owner,
                format!("migrated {} legacy secret(s)", report.migrated.len()),
            )
            .severity(severity)
            .meta("migrated", report.migrated.clone())
            .meta("failed", report.failed.clone())
            .meta("already_current", report.already_current),
        )?;

        info!(
            owner,
            migrated = report.migrated.len(),
            failed = report.failed.len(),
            "migration finished"
        );
        println!("  Migrated:        {}", report.migrated.len());
        println!("  Already current: {}", report.already_current);
        if !report.is_complete() {
            for id in &report.failed {
                println!("  [!] Could not migrate {id}");
            }
            bail!("{} legacy secret(s) could not be migrated", report.failed.len());
        }
        Ok(())
    }

    fn legacy_status(&self) -> Result<()> {
        let status = self.vault.legacy_status()?;

        let salt = if status.salt_present { "present" } else { "MISSING" };
        println!("  Legacy salt:     {salt}");
        println!("  Legacy records:  {}", status.legacy_records);
        if status.at_risk() {
            println!("  [!] Legacy records cannot be decrypted without the shared salt file.");
        }
        Ok(())
    }
}
