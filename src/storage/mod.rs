//! Record storage.
//!
//! Issues live as individual JSON files; this module provides the store
//! accessor, atomic file primitives, and consistency checks.

pub mod file;
pub mod integrity;
pub mod store;

pub use integrity::{check, ensure_no_parent_cycle, Finding};
pub use store::{generate_id, id_from_file_name, record_file_name, IssueStore, NewIssue};
