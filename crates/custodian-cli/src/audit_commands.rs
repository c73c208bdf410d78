//! `custodian audit ...` handlers.

use anyhow::{Context, Result, bail};
use custodian_audit::{AuditChain, AuditEvent, AuditQuery, ChainReport};
use tracing::{info, warn};

use crate::cli::AuditAction;
use crate::helpers;

pub fn run(action: AuditAction, actor: Option<String>) -> Result<()> {
    let chain = helpers::open_audit()?;

    match action {
        AuditAction::Log {
            owner,
            event_type,
            description,
            severity,
            metadata,
        } => {
            let mut event = AuditEvent::new(event_type, &owner, description).severity(severity);
            if let Some(actor) = actor {
                event = event.actor(actor);
            }
            for pair in &metadata {
                let (key, value) = helpers::parse_meta(pair)?;
                event = event.meta(key, value);
            }
            let event_id = chain.log(event).context("failed to append audit entry")?;
            println!("{event_id}");
            Ok(())
        }
        AuditAction::Show {
            owner,
            event_type,
            since,
            until,
            by_actor,
            limit,
            json,
        } => {
            let query = AuditQuery {
                event_type,
                since,
                until,
                actor_id: by_actor,
                limit: Some(limit),
            };
            let entries = chain.get(&owner, &query)?;
            for entry in &entries {
                if json {
                    println!("{}", serde_json::to_string(entry)?);
                } else {
                    println!("{}", helpers::format_entry(entry));
                }
            }
            if !json && entries.is_empty() {
                println!("  (no matching entries for {owner})");
            }
            Ok(())
        }
        AuditAction::Verify { owner } => cmd_verify(&chain, owner),
        AuditAction::Purge { retention_days } => {
            let report = chain
                .purge(retention_days)
                .context("failed to purge audit logs")?;
            println!("  Files removed:   {}", report.files_removed);
            println!("  Entries removed: {}", report.entries_removed);
            if !report.owners_affected.is_empty() {
                println!("  Owners:          {}", report.owners_affected.join(", "));
            }
            Ok(())
        }
        AuditAction::Export {
            owner,
            since,
            until,
            output,
        } => {
            let document = chain
                .export(&owner, since, until)
                .with_context(|| format!("failed to export audit entries for {owner}"))?;
            let json = document.to_json_pretty()?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)
                        .with_context(|| format!("failed to write {}", path.display()))?;
                    info!(path = %path.display(), entries = document.entry_count, "export written");
                    println!("  [+] Exported {} entries to {}", document.entry_count, path.display());
                }
                None => println!("{json}"),
            }
            if !document.chain.chain_intact {
                warn!(owner, "exported chain is not intact");
            }
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// Subcommand: verify
// ---------------------------------------------------------------------------

fn cmd_verify(chain: &AuditChain, owner: Option<String>) -> Result<()> {
    let owners = match owner {
        Some(owner) => vec![owner],
        None => chain.owners()?,
    };

    let mut compromised = 0;
    for owner in &owners {
        let report = chain.verify_chain_report(owner)?;
        print_report(&report);
        if !report.is_intact() {
            compromised += 1;
        }
    }

    if compromised > 0 {
        bail!("{compromised} of {} audit chain(s) compromised", owners.len());
    }
    Ok(())
}

fn print_report(report: &ChainReport) {
    match report.violation() {
        None => println!(
            "  [ok] {}: {} entries, head {}",
            report.owner_id,
            report.entries_checked,
            short_hash(&report.head_hash)
        ),
        Some(violation) => {
            println!(
                "  [!!] {}: COMPROMISED after {} valid entries",
                report.owner_id, report.entries_checked
            );
            println!("       {violation}");
        }
    }
}

/// First 12 characters of a hash. The hash may come from a tampered
/// anchor file, so it is cut on character boundaries.
fn short_hash(hash: &str) -> &str {
    if hash.is_empty() {
        return "(empty)";
    }
    match hash.char_indices().nth(12) {
        Some((end, _)) => &hash[..end],
        None => hash,
    }
}
