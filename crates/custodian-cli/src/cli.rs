//! CLI argument definitions for Custodian.
//!
//! All `clap` structures live here so that `main.rs` stays focused on
//! dispatching subcommands.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use custodian_audit::{EventType, Severity};

use crate::helpers;

/// Custodian -- encrypted per-owner secrets with a tamper-evident audit trail.
#[derive(Parser)]
#[command(
    name = "custodian",
    version,
    about = "Custodian -- encrypted secrets and tamper-evident audit logs",
    long_about = "Stores per-owner credentials encrypted under a master passphrase \
                  (CUSTODIAN_MASTER_KEY) and records every access in a hash-chained \
                  audit log that can be verified, purged and exported."
)]
pub struct Cli {
    /// Who is performing the operation, recorded as the audit actor.
    #[arg(long, global = true, env = "CUSTODIAN_ACTOR")]
    pub actor: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage encrypted secrets.
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },

    /// Inspect and maintain the audit chain.
    Audit {
        #[command(subcommand)]
        action: AuditAction,
    },
}

/// Actions on the credential vault.
#[derive(Subcommand)]
pub enum SecretAction {
    /// Encrypt and store a secret.
    Store {
        owner: String,
        category: String,
        key: String,
        /// The secret value. Read from stdin when omitted, which keeps it
        /// out of shell history.
        value: Option<String>,
    },
    /// Decrypt and print a secret.
    Get {
        owner: String,
        category: String,
        key: String,
    },
    /// List an owner's categories and keys (values are not decrypted).
    List { owner: String },
    /// Delete a key, a category, or everything an owner has.
    Delete {
        owner: String,
        category: Option<String>,
        /// Requires a category.
        key: Option<String>,
    },
    /// Re-encrypt all of an owner's legacy records in the current format.
    Migrate { owner: String },
    /// Report legacy records and whether they are still readable.
    LegacyStatus,
}

/// Actions on the audit chain.
#[derive(Subcommand)]
pub enum AuditAction {
    /// Append an event to an owner's chain.
    Log {
        owner: String,
        #[arg(value_parser = parse_event_type)]
        event_type: EventType,
        description: String,
        #[arg(long, short, default_value = "info", value_parser = parse_severity)]
        severity: Severity,
        /// Metadata as key=value; values that parse as JSON keep their type.
        #[arg(long = "meta", short, value_name = "KEY=VALUE")]
        metadata: Vec<String>,
    },
    /// Show an owner's entries, oldest first.
    Show {
        owner: String,
        #[arg(long = "type", short = 't', value_parser = parse_event_type)]
        event_type: Option<EventType>,
        /// Inclusive lower bound (RFC 3339 or YYYY-MM-DD).
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,
        /// Exclusive upper bound (RFC 3339 or YYYY-MM-DD).
        #[arg(long, value_parser = parse_timestamp)]
        until: Option<DateTime<Utc>>,
        /// Only entries recorded for this actor.
        #[arg(long = "by")]
        by_actor: Option<String>,
        #[arg(long, short, default_value_t = 100)]
        limit: usize,
        /// Print entries as JSON lines.
        #[arg(long)]
        json: bool,
    },
    /// Verify chain integrity. Exits non-zero when compromised.
    Verify {
        /// Owner to verify; every owner when omitted.
        owner: Option<String>,
    },
    /// Delete whole log files older than the retention window.
    Purge {
        #[arg(long, short)]
        retention_days: u32,
    },
    /// Export an owner's entries as a compliance document.
    Export {
        owner: String,
        #[arg(long, value_parser = parse_timestamp)]
        since: Option<DateTime<Utc>>,
        #[arg(long, value_parser = parse_timestamp)]
        until: Option<DateTime<Utc>>,
        /// Write the document here instead of stdout.
        #[arg(long, short)]
        output: Option<std::path::PathBuf>,
    },
}

fn parse_event_type(s: &str) -> Result<EventType, String> {
    EventType::parse(s).ok_or_else(|| {
        let known: Vec<&str> = EventType::ALL.iter().map(EventType::as_str).collect();
        format!("unknown event type {s:?}; expected one of: {}", known.join(", "))
    })
}

fn parse_severity(s: &str) -> Result<Severity, String> {
    Severity::parse(s).ok_or_else(|| format!("unknown severity {s:?}"))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    helpers::parse_timestamp(s).map_err(|e| e.to_string())
}
