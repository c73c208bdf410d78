//! Chain integrity verification.
//!
//! Verification walks an owner's files oldest first and checks, for every
//! line, that it parses, that it names exactly the requested owner id, that
//! its stored hash matches its fields, and that its `previous_hash` matches
//! the hash of the entry before it. The first retained entry links to the purge anchor, or
//! to the empty string when nothing was ever purged.
//!
//! A broken chain is a result, not an error. Only I/O failures surface as
//! [`AuditError`](crate::AuditError).

use serde::Serialize;

use crate::chain::{AuditChain, log_files};
use crate::entry::AuditEntry;
use crate::error::Result;
use crate::retention;

/// What kind of damage was found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViolationKind {
    /// The stored hash does not match the entry's fields.
    HashMismatch { stored: String, computed: String },
    /// `previous_hash` does not point at the preceding entry. Deleted,
    /// reordered and inserted entries all show up here.
    BrokenLink { expected: String, found: String },
    /// The line is not a valid entry.
    Malformed { reason: String },
    /// The entry names a different owner than the chain it sits in.
    ForeignOwner { found: String },
}

/// The first offending line of a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainViolation {
    #[serde(flatten)]
    pub kind: ViolationKind,
    /// `None` when the line did not parse.
    pub event_id: Option<String>,
    pub file: String,
    /// 1-based line number within `file`.
    pub line: usize,
}

impl std::fmt::Display for ChainViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let what = match &self.kind {
            ViolationKind::HashMismatch { .. } => "hash mismatch".to_string(),
            ViolationKind::BrokenLink { .. } => "broken link".to_string(),
            ViolationKind::Malformed { reason } => format!("malformed entry ({reason})"),
            ViolationKind::ForeignOwner { found } => format!("entry owned by {found:?}"),
        };
        write!(f, "{what} at {}:{}", self.file, self.line)?;
        if let Some(event_id) = &self.event_id {
            write!(f, " (event {event_id})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "violation", rename_all = "snake_case")]
pub enum ChainStatus {
    Intact,
    Compromised(ChainViolation),
}

/// Outcome of verifying one owner's chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainReport {
    pub owner_id: String,
    /// Entries that passed every check before the walk stopped.
    pub entries_checked: usize,
    /// Hash of the last verified entry, or the anchor hash when no entries
    /// are retained.
    pub head_hash: String,
    pub status: ChainStatus,
}

impl ChainReport {
    pub fn is_intact(&self) -> bool {
        self.status == ChainStatus::Intact
    }

    pub fn violation(&self) -> Option<&ChainViolation> {
        match &self.status {
            ChainStatus::Intact => None,
            ChainStatus::Compromised(violation) => Some(violation),
        }
    }
}

impl AuditChain {
    /// Verify an owner's chain and report the first violation, if any.
    ///
    /// An owner without entries verifies as intact.
    ///
    /// # Errors
    ///
    /// Returns an error only if the files cannot be read.
    pub fn verify_chain_report(&self, owner_id: &str) -> Result<ChainReport> {
        let owner_dir = self.owner_dir(owner_id)?;

        let mut expected = retention::read_anchor(&owner_dir)?
            .map(|anchor| anchor.last_hash)
            .unwrap_or_default();
        let mut entries_checked = 0;

        for path in log_files(&owner_dir)? {
            let file = path.display().to_string();
            let content = std::fs::read_to_string(&path)?;

            for (idx, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let compromised = |kind, event_id| ChainReport {
                    owner_id: owner_id.to_string(),
                    entries_checked,
                    head_hash: expected.clone(),
                    status: ChainStatus::Compromised(ChainViolation {
                        kind,
                        event_id,
                        file: file.clone(),
                        line: idx + 1,
                    }),
                };

                let entry: AuditEntry = match serde_json::from_str(line) {
                    Ok(entry) => entry,
                    Err(e) => {
                        let reason = e.to_string();
                        return Ok(compromised(ViolationKind::Malformed { reason }, None));
                    }
                };
                let event_id = Some(entry.event_id.clone());

                if entry.owner_id != owner_id {
                    let kind = ViolationKind::ForeignOwner {
                        found: entry.owner_id.clone(),
                    };
                    return Ok(compromised(kind, event_id));
                }

                let computed = entry.compute_hash();
                if computed != entry.hash {
                    let kind = ViolationKind::HashMismatch {
                        stored: entry.hash.clone(),
                        computed,
                    };
                    return Ok(compromised(kind, event_id));
                }

                if entry.previous_hash != expected {
                    let kind = ViolationKind::BrokenLink {
                        expected: expected.clone(),
                        found: entry.previous_hash.clone(),
                    };
                    return Ok(compromised(kind, event_id));
                }

                expected = computed;
                entries_checked += 1;
            }
        }

        tracing::debug!(owner_id, entries_checked, "audit chain verified");
        Ok(ChainReport {
            owner_id: owner_id.to_string(),
            entries_checked,
            head_hash: expected,
            status: ChainStatus::Intact,
        })
    }

    /// Whether an owner's chain is intact.
    ///
    /// A compromised chain is logged at `warn` with the offending entry.
    pub fn verify_chain(&self, owner_id: &str) -> Result<bool> {
        let report = self.verify_chain_report(owner_id)?;
        if let Some(violation) = report.violation() {
            tracing::warn!(owner_id, %violation, "audit chain compromised");
        }
        Ok(report.is_intact())
    }
}
