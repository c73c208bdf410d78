//! Tamper-evident audit chain for Custodian.
//!
//! Every owner has an independent, append-only sequence of JSON-lines
//! entries. Each entry stores the SHA-256 of its own canonical encoding and
//! the hash of the entry before it, so editing, deleting, inserting or
//! reordering persisted entries is detectable by [`AuditChain::verify_chain`].
//!
//! # Modules
//!
//! - [`entry`] — event taxonomy, [`AuditEntry`] and the canonical hash.
//! - [`chain`] — append, rotation and retrieval.
//! - [`query`] — filters for retrieval.
//! - [`verify`] — integrity verification and reports.
//! - [`retention`] — purge and the chain anchor.
//! - [`export`] — compliance export documents.
//! - [`config`] — [`AuditConfig`] and its environment variables.
//! - [`error`] — unified error types.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use custodian_audit::{AuditChain, AuditConfig, AuditEvent, AuditQuery, EventType, Severity};
//!
//! # fn example() -> custodian_audit::Result<()> {
//! let chain = AuditChain::open(&AuditConfig::from_env()?)?;
//!
//! chain.log(
//!     AuditEvent::new(EventType::AuthFailure, "acme", "bad API token")
//!         .actor("svc-renewals")
//!         .severity(Severity::Warning)
//!         .meta("attempts", 3),
//! )?;
//!
//! let failures = chain.get("acme", &AuditQuery::new().event_type(EventType::AuthFailure))?;
//! println!("{} auth failures", failures.len());
//!
//! if !chain.verify_chain("acme")? {
//!     eprintln!("audit chain for acme has been tampered with");
//! }
//! # Ok(())
//! # }
//! ```

pub mod chain;
pub mod config;
pub mod entry;
pub mod error;
pub mod export;
pub mod query;
pub mod retention;
pub mod verify;

// Re-export the most commonly used types at the crate root for convenience.
pub use chain::AuditChain;
pub use config::AuditConfig;
pub use entry::{AuditEntry, AuditEvent, EventCategory, EventType, Severity};
pub use error::{AuditError, Result};
pub use export::{AuditExport, EXPORT_FORMAT, EXPORT_VERSION};
pub use query::AuditQuery;
pub use retention::{ANCHOR_FILE, ChainAnchor, PurgeReport};
pub use verify::{ChainReport, ChainStatus, ChainViolation, ViolationKind};
