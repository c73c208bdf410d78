//! Compliance export.
//!
//! An export is a single JSON document holding an owner's entries for a
//! time range together with the state of the chain at the moment of
//! export. Producing it is itself audited: a `data_export` entry is
//! appended afterwards, so it never appears in the document it describes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chain::AuditChain;
use crate::entry::{AuditEntry, AuditEvent, EventType};
use crate::error::Result;
use crate::query::AuditQuery;

/// Value of the `format` field of every export.
pub const EXPORT_FORMAT: &str = "custodian-audit-export";

/// Current export document version.
pub const EXPORT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRange {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Chain state at export time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportChainInfo {
    pub chain_intact: bool,
    pub entries_verified: usize,
    pub head_hash: String,
}

/// The export document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditExport {
    pub format: String,
    pub version: u32,
    pub owner_id: String,
    pub generated_at: DateTime<Utc>,
    pub range: ExportRange,
    pub entry_count: usize,
    pub chain: ExportChainInfo,
    pub entries: Vec<AuditEntry>,
}

impl AuditExport {
    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

impl AuditChain {
    /// Export an owner's entries in `[since, until)` and log the export.
    ///
    /// A compromised chain does not prevent the export; the document
    /// carries `chain_intact: false` instead.
    pub fn export(
        &self,
        owner_id: &str,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<AuditExport> {
        let query = AuditQuery {
            since,
            until,
            ..AuditQuery::default()
        };
        let entries = self.get(owner_id, &query)?;
        let report = self.verify_chain_report(owner_id)?;

        let document = AuditExport {
            format: EXPORT_FORMAT.to_string(),
            version: EXPORT_VERSION,
            owner_id: owner_id.to_string(),
            generated_at: Utc::now(),
            range: ExportRange { since, until },
            entry_count: entries.len(),
            chain: ExportChainInfo {
                chain_intact: report.is_intact(),
                entries_verified: report.entries_checked,
                head_hash: report.head_hash,
            },
            entries,
        };

        let event = AuditEvent::new(
            EventType::DataExport,
            owner_id,
            format!("exported {} audit entries", document.entry_count),
        )
        .meta("entry_count", document.entry_count)
        .meta("chain_intact", document.chain.chain_intact)
        .meta("since", since.map(|t| t.to_rfc3339()))
        .meta("until", until.map(|t| t.to_rfc3339()));
        self.log(event)?;

        tracing::info!(
            owner_id,
            entry_count = document.entry_count,
            chain_intact = document.chain.chain_intact,
            "exported audit entries"
        );
        Ok(document)
    }
}
