//! # custodian-store
//!
//! File-backed storage primitives shared by the Custodian credential vault
//! and audit chain.
//!
//! Both components keep one set of files per owner. This crate owns the two
//! concerns they have in common:
//!
//! - [`paths`] — turning an arbitrary owner identifier into a safe,
//!   collision-free file stem.
//! - [`file`] — owner-only permissions, atomic whole-file replacement, and
//!   single-line appends.
//!
//! It carries no vault or audit semantics of its own.

pub mod error;
pub mod file;
pub mod paths;

// ── re-exports ───────────────────────────────────────────────────────

pub use error::{StoreError, StoreResult};
pub use file::{append_line, ensure_private_dir, read_last_line, restrict_to_owner, write_atomic};
pub use paths::owner_file_stem;
