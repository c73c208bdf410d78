//! Shared helper functions used across CLI subcommands.
//!
//! Includes tracing initialization, opening the vault and audit chain from
//! the environment, and argument parsing utilities.

use std::io::BufRead;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, NaiveDate, Utc};
use custodian_audit::{AuditChain, AuditEntry};
use custodian_vault::CredentialVault;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Tracing
// ---------------------------------------------------------------------------

/// Environment variable selecting the log format (`compact` or `json`).
pub const ENV_LOG_FORMAT: &str = "CUSTODIAN_LOG_FORMAT";

/// Initialize the tracing subscriber with the given default log level.
///
/// Logs go to stderr so command output on stdout stays pipeable.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if std::env::var(ENV_LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json")) {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

// ---------------------------------------------------------------------------
// Components
// ---------------------------------------------------------------------------

pub fn open_vault() -> Result<CredentialVault> {
    CredentialVault::from_env()
        .context("failed to open vault (is CUSTODIAN_MASTER_KEY set?)")
}

pub fn open_audit() -> Result<AuditChain> {
    AuditChain::from_env().context("failed to open audit chain")
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(s) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .with_context(|| format!("expected RFC 3339 or YYYY-MM-DD, got {s:?}"))?;
    Ok(date.and_time(chrono::NaiveTime::MIN).and_utc())
}

/// Split `key=value`. The value is kept as JSON when it parses as JSON
/// (`attempts=3`, `ok=true`), otherwise as a string.
pub fn parse_meta(pair: &str) -> Result<(String, serde_json::Value)> {
    let Some((key, raw)) = pair.split_once('=') else {
        bail!("metadata must be KEY=VALUE, got {pair:?}");
    };
    if key.is_empty() {
        bail!("metadata key is empty in {pair:?}");
    }
    let value = serde_json::from_str(raw).unwrap_or_else(|_| raw.into());
    Ok((key.to_string(), value))
}

/// Read one line from stdin, without the trailing newline.
pub fn read_secret_from_stdin() -> Result<String> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read secret from stdin")?;
    let value = line.trim_end_matches(['\r', '\n']).to_string();
    if value.is_empty() {
        bail!("no secret value given on the command line or stdin");
    }
    Ok(value)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

/// One-line human rendering of an entry.
pub fn format_entry(entry: &AuditEntry) -> String {
    let mut line = format!(
        "{}  {:<8} {:<18} {}",
        entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
        entry.severity,
        entry.event_type,
        entry.description,
    );
    if let Some(actor) = &entry.actor_id {
        line.push_str(&format!("  [by {actor}]"));
    }
    if !entry.metadata.is_empty() {
        let meta = serde_json::to_string(&entry.metadata).unwrap_or_default();
        line.push_str(&format!("  {meta}"));
    }
    line
}
