//! Append-only, per-owner hash chains on disk.
//!
//! # Layout
//!
//! ```text
//! <audit_dir>/
//!   acme/
//!     audit_20260301_0001.jsonl   one AuditEntry per line
//!     audit_20260301_0002.jsonl   rotated on size
//!     audit_20260302_0001.jsonl   rotated on UTC day
//!     chain_anchor.json           written by purge
//! ```
//!
//! Files sort chronologically by `(day, sequence)`. Rotation only changes
//! which file receives the next line; the chain itself runs across files.
//!
//! # Concurrency
//!
//! Each [`AuditChain`] caches the newest hash per owner so appends do not
//! re-read the log. Appends through one instance are serialized by the
//! cache lock. Appends to the same owner from several instances or
//! processes must be serialized by the caller; two unsynchronized writers
//! would both chain to the same predecessor.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use custodian_store::{append_line, ensure_private_dir, owner_file_stem, read_last_line};

use crate::config::AuditConfig;
use crate::entry::{AuditEntry, AuditEvent};
use crate::error::{AuditError, Result};
use crate::query::AuditQuery;
use crate::retention;

const FILE_PREFIX: &str = "audit_";
const FILE_SUFFIX: &str = ".jsonl";

// ---------------------------------------------------------------------------
// Chain head cache
// ---------------------------------------------------------------------------

/// The file currently receiving appends for an owner.
#[derive(Debug, Clone)]
pub(crate) struct ActiveFile {
    pub(crate) path: PathBuf,
    pub(crate) day: String,
    pub(crate) seq: u32,
    pub(crate) size: u64,
}

/// Cached tail of one owner's chain.
#[derive(Debug, Clone, Default)]
pub(crate) struct ChainHead {
    pub(crate) last_hash: String,
    /// Raw owner id of the newest entry or anchor; `None` for a new chain.
    pub(crate) owner_id: Option<String>,
    pub(crate) active: Option<ActiveFile>,
}

// ---------------------------------------------------------------------------
// AuditChain
// ---------------------------------------------------------------------------

/// Tamper-evident audit log with one hash chain per owner.
///
/// # Example
///
/// ```rust,no_run
/// # use custodian_audit::{AuditChain, AuditConfig, AuditEvent, EventType};
/// # fn example() -> custodian_audit::Result<()> {
/// let chain = AuditChain::open(&AuditConfig::new().with_audit_dir("data/audit"))?;
///
/// chain.log(AuditEvent::new(EventType::SecretAccessed, "acme", "read crm/api_key"))?;
/// assert!(chain.verify_chain("acme")?);
/// # Ok(())
/// # }
/// ```
pub struct AuditChain {
    pub(crate) audit_dir: PathBuf,
    max_file_bytes: u64,
    pub(crate) compliance_retention_days: u32,
    /// Keyed by owner file stem.
    pub(crate) heads: Mutex<HashMap<String, ChainHead>>,
}

impl AuditChain {
    /// Open (or create) an audit store rooted at `config.audit_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::InvalidConfig`] for unusable settings, or a
    /// storage error if the directory cannot be created.
    pub fn open(config: &AuditConfig) -> Result<Self> {
        config.validate()?;

        tracing::info!(path = %config.audit_dir.display(), "opening audit chain");
        ensure_private_dir(&config.audit_dir)?;

        Ok(Self {
            audit_dir: config.audit_dir.clone(),
            max_file_bytes: config.max_file_bytes,
            compliance_retention_days: config.compliance_retention_days,
            heads: Mutex::new(HashMap::new()),
        })
    }

    /// Open an audit chain configured from `CUSTODIAN_*` environment
    /// variables.
    pub fn from_env() -> Result<Self> {
        Self::open(&AuditConfig::from_env()?)
    }

    /// The audit store root.
    pub fn audit_dir(&self) -> &Path {
        &self.audit_dir
    }

    // -- Append -------------------------------------------------------------

    /// Append `event` to its owner's chain and return the new `event_id`.
    ///
    /// The cached head is only advanced after the line is on disk, so a
    /// failed write leaves the chain where it was.
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::CorruptTail`] if the owner's newest entry cannot
    /// be parsed, [`AuditError::OwnerCollision`] if the owner's directory
    /// holds another owner's chain, or a storage error if the append fails.
    pub fn log(&self, event: AuditEvent) -> Result<String> {
        let stem = owner_file_stem(event.owner_id())?;
        let owner_dir = self.audit_dir.join(&stem);

        let mut heads = self.lock_heads()?;
        let head = match heads.entry(stem) {
            Entry::Occupied(occupied) => occupied.into_mut(),
            Entry::Vacant(vacant) => vacant.insert(seed_head(&owner_dir)?),
        };

        if let Some(found) = &head.owner_id
            && found != event.owner_id()
        {
            tracing::error!(
                owner_id = event.owner_id(),
                found = %found,
                "audit directory holds another owner's chain"
            );
            return Err(AuditError::OwnerCollision {
                owner_id: event.owner_id().to_string(),
                found: found.clone(),
            });
        }

        let entry = event.into_entry(head.last_hash.clone());
        let line = serde_json::to_string(&entry)?;
        let day = entry.timestamp.format("%Y%m%d").to_string();

        let mut target = self.next_target(&owner_dir, head.active.as_ref(), &day);
        let rotated = head
            .active
            .as_ref()
            .is_some_and(|active| active.path != target.path);

        ensure_private_dir(&owner_dir)?;
        target.size = append_line(&target.path, &line)?;

        if rotated {
            tracing::info!(
                owner_id = %entry.owner_id,
                file = %target.path.display(),
                "rotated audit log file"
            );
        }

        head.last_hash = entry.hash;
        head.owner_id = Some(entry.owner_id.clone());
        head.active = Some(target);

        tracing::debug!(
            owner_id = %entry.owner_id,
            event_id = %entry.event_id,
            event_type = %entry.event_type,
            "appended audit entry"
        );
        Ok(entry.event_id)
    }

    // -- Read ---------------------------------------------------------------

    /// Return the owner's entries matching `query`, oldest first.
    ///
    /// Lines that do not parse, or that name another owner, are skipped
    /// with a warning; use [`verify_chain_report`](Self::verify_chain_report)
    /// to locate them.
    pub fn get(&self, owner_id: &str, query: &AuditQuery) -> Result<Vec<AuditEntry>> {
        let owner_dir = self.owner_dir(owner_id)?;
        let mut entries = Vec::new();

        if query.is_full(0) {
            return Ok(entries);
        }

        for path in log_files(&owner_dir)? {
            let content = std::fs::read_to_string(&path)?;
            for (idx, line) in content.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                let entry: AuditEntry = match serde_json::from_str(line) {
                    Ok(entry) => entry,
                    Err(e) => {
                        tracing::warn!(
                            file = %path.display(),
                            line = idx + 1,
                            error = %e,
                            "skipping malformed audit line"
                        );
                        continue;
                    }
                };
                if entry.owner_id != owner_id {
                    tracing::warn!(
                        file = %path.display(),
                        line = idx + 1,
                        owner_id,
                        found = %entry.owner_id,
                        "skipping audit line of another owner"
                    );
                    continue;
                }

                if query.matches(&entry) {
                    entries.push(entry);
                    if query.is_full(entries.len()) {
                        return Ok(entries);
                    }
                }
            }
        }

        Ok(entries)
    }

    /// Raw ids of the owners that have an audit directory, sorted.
    pub fn owners(&self) -> Result<Vec<String>> {
        let mut owners: Vec<String> = self
            .owner_dirs()?
            .into_iter()
            .map(|(_, owner_id)| owner_id)
            .collect();
        owners.sort();
        Ok(owners)
    }

    /// Every owner directory as `(stem, raw owner id)`.
    ///
    /// The raw id is taken from the first entry that maps back to the
    /// directory, then from the purge anchor. A directory with neither is
    /// reported under its stem.
    pub(crate) fn owner_dirs(&self) -> Result<Vec<(String, String)>> {
        let mut dirs = Vec::new();
        for entry in std::fs::read_dir(&self.audit_dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir()
                && let Some(stem) = entry.file_name().to_str()
            {
                let owner_id = match recorded_owner(&entry.path(), stem)? {
                    Some(owner_id) => owner_id,
                    None => {
                        tracing::warn!(dir = %entry.path().display(), "audit directory names no owner");
                        stem.to_string()
                    }
                };
                dirs.push((stem.to_string(), owner_id));
            }
        }
        dirs.sort();
        Ok(dirs)
    }

    // -- Internal helpers ---------------------------------------------------

    pub(crate) fn owner_dir(&self, owner_id: &str) -> Result<PathBuf> {
        Ok(self.audit_dir.join(owner_file_stem(owner_id)?))
    }

    pub(crate) fn lock_heads(&self) -> Result<MutexGuard<'_, HashMap<String, ChainHead>>> {
        self.heads.lock().map_err(|_| AuditError::LockPoisoned)
    }

    /// Pick the file for the next append, rotating on size or day change.
    fn next_target(&self, owner_dir: &Path, active: Option<&ActiveFile>, day: &str) -> ActiveFile {
        match active {
            // A clock that steps backwards keeps writing to the newest file
            // so file order stays chronological.
            Some(active) if active.day.as_str() >= day && active.size < self.max_file_bytes => {
                active.clone()
            }
            Some(active) if active.day.as_str() >= day => {
                new_active(owner_dir, &active.day, active.seq + 1)
            }
            _ => new_active(owner_dir, day, 1),
        }
    }
}

// ---------------------------------------------------------------------------
// File naming
// ---------------------------------------------------------------------------

fn new_active(owner_dir: &Path, day: &str, seq: u32) -> ActiveFile {
    ActiveFile {
        path: owner_dir.join(format!("{FILE_PREFIX}{day}_{seq:04}{FILE_SUFFIX}")),
        day: day.to_string(),
        seq,
        size: 0,
    }
}

/// Split `audit_<YYYYMMDD>_<NNNN>.jsonl` into its day and sequence.
pub(crate) fn parse_log_file_name(name: &str) -> Option<(String, u32)> {
    let body = name.strip_prefix(FILE_PREFIX)?.strip_suffix(FILE_SUFFIX)?;
    let (day, seq) = body.split_once('_')?;
    if day.len() != 8 || !day.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((day.to_string(), seq.parse().ok()?))
}

/// The owner's log files in chronological order. A missing directory has
/// no files.
pub(crate) fn log_files(owner_dir: &Path) -> Result<Vec<PathBuf>> {
    let read_dir = match std::fs::read_dir(owner_dir) {
        Ok(read_dir) => read_dir,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut files = Vec::new();
    for entry in read_dir {
        let path = entry?.path();
        if let Some(key) = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_log_file_name)
        {
            files.push((key, path));
        }
    }
    files.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(files.into_iter().map(|(_, path)| path).collect())
}

/// Rebuild an owner's head from disk: the newest entry, or the purge anchor,
/// or an empty chain.
pub(crate) fn seed_head(owner_dir: &Path) -> Result<ChainHead> {
    let files = log_files(owner_dir)?;

    for path in files.iter().rev() {
        let Some(line) = read_last_line(path)? else {
            continue;
        };
        let entry: AuditEntry =
            serde_json::from_str(&line).map_err(|e| AuditError::CorruptTail {
                path: path.display().to_string(),
                reason: e.to_string(),
            })?;

        let active = active_for(path)?;
        tracing::debug!(file = %path.display(), "seeded audit chain head from disk");
        return Ok(ChainHead {
            last_hash: entry.hash,
            owner_id: Some(entry.owner_id),
            active,
        });
    }

    let (last_hash, owner_id) = match retention::read_anchor(owner_dir)? {
        Some(anchor) => (anchor.last_hash, Some(anchor.owner_id)),
        None => (String::new(), None),
    };
    let active = match files.last() {
        Some(path) => active_for(path)?,
        None => None,
    };

    Ok(ChainHead {
        last_hash,
        owner_id,
        active,
    })
}

/// The raw owner id a directory's chain was written for.
fn recorded_owner(owner_dir: &Path, stem: &str) -> Result<Option<String>> {
    for path in log_files(owner_dir)? {
        let content = std::fs::read_to_string(&path)?;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            let Ok(entry) = serde_json::from_str::<AuditEntry>(line) else {
                continue;
            };
            if owner_file_stem(&entry.owner_id).ok().as_deref() == Some(stem) {
                return Ok(Some(entry.owner_id));
            }
        }
    }
    Ok(retention::read_anchor(owner_dir)?.map(|anchor| anchor.owner_id))
}

fn active_for(path: &Path) -> Result<Option<ActiveFile>> {
    let Some((day, seq)) = path
        .file_name()
        .and_then(|n| n.to_str())
        .and_then(parse_log_file_name)
    else {
        return Ok(None);
    };
    let size = std::fs::metadata(path)?.len();
    Ok(Some(ActiveFile {
        path: path.to_path_buf(),
        day,
        seq,
        size,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
