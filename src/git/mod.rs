//! Version-control transport for the sync engine.
//!
//! The sync branch is never checked out. Records travel as blobs under
//! `issues/` in commits built with plumbing commands, and the last commit
//! this clone agreed on with the remote is kept in a private ref.
//!
//! [`Vcs`] is the narrow surface the engine needs; [`GitCli`] implements it
//! over the `git` binary.

mod cli;

pub use cli::GitCli;

use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Directory inside sync-branch commits holding the record files.
pub const RECORDS_DIR: &str = "issues";

/// Ref holding the local sync baseline for `branch`.
#[must_use]
pub fn base_ref(branch: &str) -> String {
    format!("refs/issuekeeper/base/{branch}")
}

/// Ref holding the last fetched tip of `branch`.
#[must_use]
pub fn remote_ref(branch: &str) -> String {
    format!("refs/issuekeeper/remote/{branch}")
}

/// Errors from version-control commands.
#[derive(Debug, Error)]
pub enum GitError {
    #[error("Not a git repository: {}", path.display())]
    NotARepository { path: PathBuf },

    #[error("Failed to run git: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("git {command} failed: {stderr}")]
    Command { command: String, stderr: String },

    #[error("git {command} timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("Unexpected output from git {command}: {detail}")]
    Output { command: String, detail: String },
}

/// What a fetch learned about the sync branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteState {
    /// The remote could not be reached or refused the request.
    Unavailable(String),
    /// The remote is reachable but has no sync branch yet.
    Missing,
    /// The branch tip, now available locally.
    At(String),
}

/// Operations the sync engine performs against version control.
///
/// Blob and commit ids are opaque strings. Tree maps go from record file
/// name (`<ID>.json`) to blob id.
pub trait Vcs {
    /// Fetch `branch` from `remote` and report its tip.
    ///
    /// Network failures are reported as [`RemoteState::Unavailable`], not as
    /// errors.
    fn fetch(&self, remote: &str, branch: &str) -> Result<RemoteState, GitError>;

    /// Resolve a ref to a commit id, `None` when it does not exist.
    fn read_ref(&self, name: &str) -> Result<Option<String>, GitError>;

    /// Point a ref at a commit.
    fn update_ref(&self, name: &str, commit: &str) -> Result<(), GitError>;

    /// One-line descriptors of commits reachable from `tip` but not `base`.
    fn log_range(&self, base: Option<&str>, tip: &str) -> Result<Vec<String>, GitError>;

    /// Record files of a commit.
    fn record_tree(&self, commit: &str) -> Result<BTreeMap<String, String>, GitError>;

    fn read_blob(&self, blob: &str) -> Result<Vec<u8>, GitError>;

    /// Blob ids of the given files, in order. With `write` the blobs are
    /// also stored in the object database.
    fn hash_files(&self, paths: &[PathBuf], write: bool) -> Result<Vec<String>, GitError>;

    /// Build a commit whose `issues/` holds exactly `records`.
    fn commit_records(
        &self,
        records: &BTreeMap<String, String>,
        parent: Option<&str>,
        message: &str,
    ) -> Result<String, GitError>;

    /// Publish `commit` as the new tip of `branch`.
    fn push(&self, remote: &str, commit: &str, branch: &str) -> Result<(), GitError>;
}
