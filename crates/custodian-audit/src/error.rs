//! Audit chain error types.
//!
//! A broken chain is *not* an error: [`verify_chain`](crate::AuditChain::verify_chain)
//! reports it as a result. [`AuditError`] covers configuration and storage
//! failures only.

/// Unified error type for the Custodian audit chain.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// A configuration value is present but unusable.
    #[error("invalid audit configuration: {reason}")]
    InvalidConfig { reason: String },

    /// The newest entry of an owner's chain cannot be parsed, so there is
    /// no trustworthy hash to chain the next entry to.
    #[error("audit chain tail is corrupt in {path}: {reason}")]
    CorruptTail { path: String, reason: String },

    /// The chain stored under this owner's directory belongs to another
    /// owner, so appending would interleave two chains.
    #[error("audit chain for {owner_id:?} is held by {found:?}")]
    OwnerCollision { owner_id: String, found: String },

    /// The in-memory chain head cache was poisoned by a panicking writer.
    #[error("audit chain head cache poisoned")]
    LockPoisoned,

    /// File primitive failure (I/O on the audit store, bad owner id).
    #[error("storage error: {0}")]
    Storage(#[from] custodian_store::StoreError),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error from the filesystem.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the audit crate.
pub type Result<T> = std::result::Result<T, AuditError>;
