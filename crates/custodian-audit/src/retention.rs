//! Retention purge and the chain anchor.
//!
//! Purging removes whole log files from the old end of an owner's chain.
//! The first retained entry still carries the hash of the last purged one,
//! so before any file is removed that hash is written to the owner's
//! `chain_anchor.json`. Verification starts from the anchor instead of the
//! empty string.
//!
//! The anchor is written before files are deleted. If a purge is
//! interrupted in between, the chain reports a broken link at its first
//! entry until the purge is run again and finishes the deletion.

use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use custodian_store::write_atomic;
use serde::{Deserialize, Serialize};

use crate::chain::{AuditChain, log_files};
use crate::entry::AuditEntry;
use crate::error::Result;

pub const ANCHOR_FILE: &str = "chain_anchor.json";

/// Where a purged owner's chain now begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainAnchor {
    /// Raw id of the owner whose chain this anchors.
    pub owner_id: String,
    /// Hash of the newest purged entry.
    pub last_hash: String,
    pub last_event_id: String,
    /// Timestamp of the newest purged entry.
    pub purged_through: DateTime<Utc>,
    /// Entries purged over the owner's lifetime.
    pub entries_purged: u64,
    pub updated_at: DateTime<Utc>,
}

/// Read an owner's anchor, if a purge ever ran.
pub(crate) fn read_anchor(owner_dir: &Path) -> Result<Option<ChainAnchor>> {
    match std::fs::read(owner_dir.join(ANCHOR_FILE)) {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn write_anchor(owner_dir: &Path, anchor: &ChainAnchor) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(anchor)?;
    write_atomic(&owner_dir.join(ANCHOR_FILE), &bytes)?;
    Ok(())
}

/// Totals for one purge run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    pub files_removed: usize,
    pub entries_removed: usize,
    /// Owners that lost at least one file.
    pub owners_affected: Vec<String>,
}

/// Age limits for one run.
struct Cutoffs {
    ordinary: DateTime<Utc>,
    compliance: DateTime<Utc>,
}

impl Cutoffs {
    fn new(now: DateTime<Utc>, retention_days: u32, compliance_retention_days: u32) -> Self {
        Self {
            ordinary: cutoff(now, retention_days),
            compliance: cutoff(now, retention_days.max(compliance_retention_days)),
        }
    }

    fn allows(&self, entry: &AuditEntry) -> bool {
        let cutoff = if entry.event_type.is_compliance_record() {
            self.compliance
        } else {
            self.ordinary
        };
        entry.timestamp < cutoff
    }
}

/// `now - days`, or the earliest representable instant when that lies
/// outside chrono's range. Nothing is older than that, so nothing is
/// purged.
fn cutoff(now: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    TimeDelta::try_days(i64::from(days))
        .and_then(|age| now.checked_sub_signed(age))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

impl AuditChain {
    /// Delete whole log files whose entries are all older than
    /// `retention_days`.
    ///
    /// Compliance records (see [`EventType::is_compliance_record`]) are
    /// kept for at least the configured compliance retention. Only a
    /// contiguous run of the oldest files is removed; the first file that
    /// must stay ends the run for that owner, and a file with an unparseable
    /// line is never removed.
    ///
    /// [`EventType::is_compliance_record`]: crate::EventType::is_compliance_record
    pub fn purge(&self, retention_days: u32) -> Result<PurgeReport> {
        let cutoffs = Cutoffs::new(Utc::now(), retention_days, self.compliance_retention_days);

        let mut report = PurgeReport::default();
        let mut heads = self.lock_heads()?;

        for (stem, owner_id) in self.owner_dirs()? {
            let owner_dir = self.audit_dir.join(&stem);
            let (files, entries) = purge_owner(&owner_dir, &cutoffs)?;
            if files == 0 {
                continue;
            }

            heads.remove(&stem);
            tracing::info!(
                owner_id = %owner_id,
                files_removed = files,
                entries_removed = entries,
                "purged audit log files"
            );
            report.files_removed += files;
            report.entries_removed += entries;
            report.owners_affected.push(owner_id);
        }
        report.owners_affected.sort();

        Ok(report)
    }
}

/// Purge one owner. Returns (files, entries) removed.
fn purge_owner(owner_dir: &Path, cutoffs: &Cutoffs) -> Result<(usize, usize)> {
    let previous = read_anchor(owner_dir)?;

    let mut doomed: Vec<PathBuf> = Vec::new();
    let mut purged: Vec<AuditEntry> = Vec::new();

    for path in log_files(owner_dir)? {
        let Some(entries) = eligible_entries(&path, cutoffs)? else {
            break;
        };
        purged.extend(entries);
        doomed.push(path);
    }

    if doomed.is_empty() {
        return Ok((0, 0));
    }

    // A rerun after an interrupted purge sees files that an earlier run
    // already counted; only entries after the old anchor are new.
    let already_counted = previous
        .as_ref()
        .and_then(|anchor| purged.iter().position(|e| e.hash == anchor.last_hash))
        .map_or(0, |idx| idx + 1);
    let newly_purged = purged.len() - already_counted;

    if let Some(last) = purged.last() {
        let anchor = ChainAnchor {
            owner_id: last.owner_id.clone(),
            last_hash: last.hash.clone(),
            last_event_id: last.event_id.clone(),
            purged_through: last.timestamp,
            entries_purged: previous.as_ref().map_or(0, |a| a.entries_purged)
                + newly_purged as u64,
            updated_at: Utc::now(),
        };
        write_anchor(owner_dir, &anchor)?;
    }

    for path in &doomed {
        std::fs::remove_file(path)?;
        tracing::debug!(file = %path.display(), "removed audit log file");
    }

    Ok((doomed.len(), newly_purged))
}

/// The file's entries when every one of them is past its cutoff, else
/// `None`.
fn eligible_entries(path: &Path, cutoffs: &Cutoffs) -> Result<Option<Vec<AuditEntry>>> {
    let content = std::fs::read_to_string(path)?;
    let mut entries = Vec::new();

    for line in content.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(entry) = serde_json::from_str::<AuditEntry>(line) else {
            tracing::warn!(file = %path.display(), "unparseable audit line, file kept");
            return Ok(None);
        };
        if !cutoffs.allows(&entry) {
            return Ok(None);
        }
        entries.push(entry);
    }

    Ok(Some(entries))
}
