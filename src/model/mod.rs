//! Data models for Issuekeeper.
//!
//! - Issue (the synchronized record)
//! - Dependency / Relation
//! - Provenance (origin of imported issues)

pub mod issue;

pub use issue::{Dependency, Issue, Provenance, Relation};
