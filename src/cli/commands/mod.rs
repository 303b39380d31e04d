//! Command implementations.

pub mod check;
pub mod completions;
pub mod import;
pub mod init;
pub mod issue;
pub mod sync;
pub mod version;
pub mod workspace;
