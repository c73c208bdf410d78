//! Audit entry types and the canonical hash.
//!
//! An [`AuditEntry`] is hashed over a canonical JSON encoding of every field
//! except `hash` itself, in declaration order. Metadata is a `BTreeMap`, so
//! keys are always encoded sorted. Timestamps are truncated to microseconds
//! when an entry is built and encoded with a fixed precision, which keeps the
//! hash stable across a write/parse round trip.

use std::collections::BTreeMap;

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use ring::digest;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Taxonomy
// ---------------------------------------------------------------------------

/// Closed set of auditable events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    AuthSuccess,
    AuthFailure,
    DataAccess,
    DataModification,
    DataDeletion,
    SecretStored,
    SecretAccessed,
    SecretDeleted,
    SecretMigrated,
    ComplianceRequest,
    DataExport,
    ToolExecution,
    ConfigChange,
    SystemEvent,
}

/// Coarse grouping of [`EventType`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Auth,
    DataAccess,
    SecretLifecycle,
    ComplianceRequest,
    ToolExecution,
    Configuration,
    System,
}

impl EventType {
    /// Every event type, in taxonomy order.
    pub const ALL: [EventType; 14] = [
        Self::AuthSuccess,
        Self::AuthFailure,
        Self::DataAccess,
        Self::DataModification,
        Self::DataDeletion,
        Self::SecretStored,
        Self::SecretAccessed,
        Self::SecretDeleted,
        Self::SecretMigrated,
        Self::ComplianceRequest,
        Self::DataExport,
        Self::ToolExecution,
        Self::ConfigChange,
        Self::SystemEvent,
    ];

    /// The string stored on disk.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthSuccess => "auth_success",
            Self::AuthFailure => "auth_failure",
            Self::DataAccess => "data_access",
            Self::DataModification => "data_modification",
            Self::DataDeletion => "data_deletion",
            Self::SecretStored => "secret_stored",
            Self::SecretAccessed => "secret_accessed",
            Self::SecretDeleted => "secret_deleted",
            Self::SecretMigrated => "secret_migrated",
            Self::ComplianceRequest => "compliance_request",
            Self::DataExport => "data_export",
            Self::ToolExecution => "tool_execution",
            Self::ConfigChange => "config_change",
            Self::SystemEvent => "system_event",
        }
    }

    /// Parse from the string stored on disk.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    pub fn category(&self) -> EventCategory {
        match self {
            Self::AuthSuccess | Self::AuthFailure => EventCategory::Auth,
            Self::DataAccess | Self::DataModification | Self::DataDeletion => {
                EventCategory::DataAccess
            }
            Self::SecretStored
            | Self::SecretAccessed
            | Self::SecretDeleted
            | Self::SecretMigrated => EventCategory::SecretLifecycle,
            Self::ComplianceRequest | Self::DataExport => EventCategory::ComplianceRequest,
            Self::ToolExecution => EventCategory::ToolExecution,
            Self::ConfigChange => EventCategory::Configuration,
            Self::SystemEvent => EventCategory::System,
        }
    }

    /// Events that fall under the compliance minimum retention.
    pub fn is_compliance_record(&self) -> bool {
        matches!(
            self,
            Self::ComplianceRequest | Self::DataExport | Self::DataDeletion
        )
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Severity of an audit event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    #[default]
    Info,
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warning" => Some(Self::Warning),
            "error" => Some(Self::Error),
            "critical" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Entry
// ---------------------------------------------------------------------------

/// One persisted, hash-linked audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// UUIDv7, so lexical order follows creation time.
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub owner_id: String,
    #[serde(default)]
    pub actor_id: Option<String>,
    #[serde(default)]
    pub severity: Severity,
    pub description: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// `hash` of the previous entry in this owner's chain; empty for the
    /// first entry.
    pub previous_hash: String,
    /// Hex SHA-256 of the canonical encoding of all other fields.
    pub hash: String,
}

/// Borrowed view of the hashed fields, in hash order.
#[derive(Serialize)]
struct CanonicalEntry<'a> {
    event_id: &'a str,
    timestamp: String,
    event_type: EventType,
    owner_id: &'a str,
    actor_id: Option<&'a str>,
    severity: Severity,
    description: &'a str,
    metadata: &'a BTreeMap<String, serde_json::Value>,
    previous_hash: &'a str,
}

impl AuditEntry {
    /// Recompute the hash from the entry's fields.
    pub fn compute_hash(&self) -> String {
        let canonical = CanonicalEntry {
            event_id: &self.event_id,
            timestamp: self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
            event_type: self.event_type,
            owner_id: &self.owner_id,
            actor_id: self.actor_id.as_deref(),
            severity: self.severity,
            description: &self.description,
            metadata: &self.metadata,
            previous_hash: &self.previous_hash,
        };
        // Serializing plain strings and a string-keyed map cannot fail.
        let bytes = serde_json::to_vec(&canonical).unwrap_or_default();
        hex::encode(digest::digest(&digest::SHA256, &bytes).as_ref())
    }

    /// Whether the stored hash matches the fields.
    pub fn hash_is_valid(&self) -> bool {
        self.compute_hash() == self.hash
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// An event to be appended with [`AuditChain::log`](crate::AuditChain::log).
///
/// ```
/// use custodian_audit::{AuditEvent, EventType, Severity};
///
/// let event = AuditEvent::new(EventType::SecretAccessed, "acme", "read crm api key")
///     .actor("svc-renewals")
///     .severity(Severity::Info)
///     .meta("category", "crm");
/// ```
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub(crate) event_type: EventType,
    pub(crate) owner_id: String,
    pub(crate) description: String,
    pub(crate) actor_id: Option<String>,
    pub(crate) severity: Severity,
    pub(crate) metadata: BTreeMap<String, serde_json::Value>,
}

impl AuditEvent {
    pub fn new(
        event_type: EventType,
        owner_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            owner_id: owner_id.into(),
            description: description.into(),
            actor_id: None,
            severity: Severity::default(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn actor(mut self, actor_id: impl Into<String>) -> Self {
        self.actor_id = Some(actor_id.into());
        self
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    /// Add one metadata field.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merge a metadata map into the event.
    pub fn metadata(mut self, metadata: BTreeMap<String, serde_json::Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Stamp, link and hash the event.
    pub(crate) fn into_entry(self, previous_hash: String) -> AuditEntry {
        let mut entry = AuditEntry {
            event_id: uuid::Uuid::now_v7().to_string(),
            timestamp: Utc::now().trunc_subsecs(6),
            event_type: self.event_type,
            owner_id: self.owner_id,
            actor_id: self.actor_id,
            severity: self.severity,
            description: self.description,
            metadata: self.metadata,
            previous_hash,
            hash: String::new(),
        };
        entry.hash = entry.compute_hash();
        entry
    }
}
