//! Sync types: errors, status snapshot and operation reports.

use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::storage::Finding;

/// Sync failures that are not plain git or I/O errors.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Remote '{remote}' is unavailable: {reason}")]
    RemoteUnavailable { remote: String, reason: String },

    #[error("Sync branch '{branch}' has commits that were not pulled yet")]
    RemoteAhead { branch: String },

    /// The losing copy of a conflict could not be written to the attic.
    #[error("Failed to quarantine {id} into {}: {source}", path.display())]
    Quarantine {
        id: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// How a local record differs from the sync baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added => write!(f, "added"),
            Self::Modified => write!(f, "modified"),
            Self::Deleted => write!(f, "deleted"),
        }
    }
}

/// A pending local change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocalChange {
    pub id: String,
    pub kind: ChangeKind,
}

impl fmt::Display for LocalChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.id)
    }
}

/// Snapshot of local and remote divergence. Computed fresh on every query.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// No local changes, no remote changes, and the remote was reachable.
    ///
    /// An unreachable remote leaves remote changes unknown, so the
    /// snapshot never claims to be in sync without having seen the remote.
    pub synced: bool,
    /// `"<kind> <id>"` descriptors.
    pub local_changes: Vec<String>,
    /// One-line descriptors of commits not yet pulled.
    pub remote_changes: Vec<String>,
    pub sync_branch: String,
    pub remote: String,
    pub remote_available: bool,
    /// Reachable remote without the sync branch (first sync pending).
    pub remote_branch_missing: bool,
}

/// Which copy of a conflicting record stays live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Local,
    Remote,
}

/// Why a conflict was decided the way it was.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    HigherVersion,
    LaterUpdate,
    /// Equal version and timestamp; the local copy is kept.
    Tie,
    /// The other side deleted the record.
    DeletedOnOtherSide,
    /// The other copy could not be parsed.
    Unparsable,
    /// `--force`: local wins, nothing quarantined.
    Forced,
}

/// Outcome of one conflicting record.
#[derive(Debug, Clone, Serialize)]
pub struct ConflictResolution {
    pub id: String,
    pub winner: Side,
    pub decision: Decision,
    /// Attic file holding the losing copy.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quarantined: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PullOutcome {
    /// The remote has no sync branch yet.
    NoRemoteBranch,
    UpToDate,
    Pulled,
}

/// Result of a pull.
#[derive(Debug, Clone, Serialize)]
pub struct PullReport {
    pub outcome: PullOutcome,
    /// Commits merged in, newest first.
    pub commits: Vec<String>,
    /// Records written from the remote.
    pub applied: Vec<String>,
    /// Records removed because the remote deleted them.
    pub removed: Vec<String>,
    pub conflicts: Vec<ConflictResolution>,
    /// Foreign records that now exist under more than one local id.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub duplicate_origins: Vec<Finding>,
}

impl PullReport {
    pub(crate) fn empty(outcome: PullOutcome) -> Self {
        Self {
            outcome,
            commits: Vec::new(),
            applied: Vec::new(),
            removed: Vec::new(),
            conflicts: Vec::new(),
            duplicate_origins: Vec::new(),
        }
    }

    /// Conflicts whose losing copy went to the attic.
    #[must_use]
    pub fn quarantined(&self) -> usize {
        self.conflicts.iter().filter(|c| c.quarantined.is_some()).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PushOutcome {
    NothingToPush,
    Pushed,
}

/// Result of a push.
#[derive(Debug, Clone, Serialize)]
pub struct PushReport {
    pub outcome: PushOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit: Option<String>,
    pub changes: Vec<LocalChange>,
}

/// Result of a full sync.
#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub pull: PullReport,
    pub push: PushReport,
    pub forced: bool,
}

impl SyncReport {
    /// Whether the run changed nothing locally or remotely.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.pull.outcome != PullOutcome::Pulled && self.push.outcome == PushOutcome::NothingToPush
    }
}
