//! Error types for Issuekeeper.
//!
//! Provides structured error handling with:
//! - Machine-readable error codes (`ErrorCode`)
//! - Category-based exit codes (2=store, 3=not_found, 4=validation, etc.)
//! - Retryability flags
//! - Context-aware recovery hints
//! - Structured JSON output for piped / non-TTY consumers

use std::path::PathBuf;
use thiserror::Error;

use crate::git::GitError;
use crate::sync::SyncError;

/// Result type alias for Issuekeeper operations.
pub type Result<T> = std::result::Result<T, Error>;

// ── Error Code ────────────────────────────────────────────────

/// Machine-readable error codes grouped by category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    // Store (exit 2)
    NotInitialized,
    AlreadyInitialized,

    // Not Found (exit 3)
    IssueNotFound,
    FileNotFound,
    WorkspaceNotFound,

    // Validation (exit 4)
    InvalidStatus,
    InvalidKind,
    InvalidPriority,
    InvalidArgument,
    InvalidWorkspaceName,
    NoWorkspaceSelected,

    // Integrity (exit 5)
    CycleDetected,
    DanglingReference,
    DuplicateOrigin,

    // Sync (exit 6)
    RemoteUnavailable,
    RemoteAhead,
    GitError,
    QuarantineFailed,

    // Config (exit 7)
    ConfigError,

    // I/O (exit 8)
    IoError,
    JsonError,

    // Internal (exit 1)
    InternalError,
}

impl ErrorCode {
    /// Machine-readable SCREAMING_SNAKE code string.
    #[must_use]
    pub const fn as_str(&self) -> &str {
        match self {
            Self::NotInitialized => "NOT_INITIALIZED",
            Self::AlreadyInitialized => "ALREADY_INITIALIZED",
            Self::IssueNotFound => "ISSUE_NOT_FOUND",
            Self::FileNotFound => "FILE_NOT_FOUND",
            Self::WorkspaceNotFound => "WORKSPACE_NOT_FOUND",
            Self::InvalidStatus => "INVALID_STATUS",
            Self::InvalidKind => "INVALID_KIND",
            Self::InvalidPriority => "INVALID_PRIORITY",
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::InvalidWorkspaceName => "INVALID_WORKSPACE_NAME",
            Self::NoWorkspaceSelected => "NO_WORKSPACE_SELECTED",
            Self::CycleDetected => "CYCLE_DETECTED",
            Self::DanglingReference => "DANGLING_REFERENCE",
            Self::DuplicateOrigin => "DUPLICATE_ORIGIN",
            Self::RemoteUnavailable => "REMOTE_UNAVAILABLE",
            Self::RemoteAhead => "REMOTE_AHEAD",
            Self::GitError => "GIT_ERROR",
            Self::QuarantineFailed => "QUARANTINE_FAILED",
            Self::ConfigError => "CONFIG_ERROR",
            Self::IoError => "IO_ERROR",
            Self::JsonError => "JSON_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Category-based exit code (1-8).
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::InternalError => 1,
            Self::NotInitialized | Self::AlreadyInitialized => 2,
            Self::IssueNotFound | Self::FileNotFound | Self::WorkspaceNotFound => 3,
            Self::InvalidStatus
            | Self::InvalidKind
            | Self::InvalidPriority
            | Self::InvalidArgument
            | Self::InvalidWorkspaceName
            | Self::NoWorkspaceSelected => 4,
            Self::CycleDetected | Self::DanglingReference | Self::DuplicateOrigin => 5,
            Self::RemoteUnavailable | Self::RemoteAhead | Self::GitError | Self::QuarantineFailed => 6,
            Self::ConfigError => 7,
            Self::IoError | Self::JsonError => 8,
        }
    }

    /// Whether retrying (with corrected input, or later) can succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::InvalidStatus
                | Self::InvalidKind
                | Self::InvalidPriority
                | Self::InvalidArgument
                | Self::InvalidWorkspaceName
                | Self::NoWorkspaceSelected
                | Self::RemoteUnavailable
                | Self::RemoteAhead
        )
    }
}

// ── Error Enum ────────────────────────────────────────────────

/// Errors that can occur in Issuekeeper operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Not initialized: run `ik init` first")]
    NotInitialized,

    #[error("Already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    #[error("Issue not found: {id} (did you mean: {}?)", similar.join(", "))]
    IssueNotFoundSimilar { id: String, similar: Vec<String> },

    #[error("File not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("Workspace not found: {name}")]
    WorkspaceNotFound { name: String },

    #[error("Invalid status: {value}")]
    InvalidStatus { value: String, suggestion: Option<String> },

    #[error("Invalid kind: {value}")]
    InvalidKind { value: String, suggestion: Option<String> },

    #[error("Invalid priority: {value}")]
    InvalidPriority { value: String, suggestion: Option<String> },

    #[error("Invalid workspace name: {name:?}")]
    InvalidWorkspaceName { name: String },

    #[error("No workspace selected")]
    NoWorkspaceSelected,

    #[error("Parent cycle detected: {}", path.join(" -> "))]
    CycleDetected { path: Vec<String> },

    #[error("Dangling reference from {from} to {target}")]
    DanglingReference { from: String, target: String },

    #[error("Issues {} were all imported from {source_name} {original_id}", ids.join(", "))]
    DuplicateOrigin {
        source_name: String,
        original_id: String,
        ids: Vec<String>,
    },

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("Git error: {0}")]
    Git(#[from] GitError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Map this error to its structured `ErrorCode`.
    #[must_use]
    pub const fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::AlreadyInitialized { .. } => ErrorCode::AlreadyInitialized,
            Self::IssueNotFound { .. } | Self::IssueNotFoundSimilar { .. } => {
                ErrorCode::IssueNotFound
            }
            Self::FileNotFound { .. } => ErrorCode::FileNotFound,
            Self::WorkspaceNotFound { .. } => ErrorCode::WorkspaceNotFound,
            Self::InvalidStatus { .. } => ErrorCode::InvalidStatus,
            Self::InvalidKind { .. } => ErrorCode::InvalidKind,
            Self::InvalidPriority { .. } => ErrorCode::InvalidPriority,
            Self::InvalidWorkspaceName { .. } => ErrorCode::InvalidWorkspaceName,
            Self::NoWorkspaceSelected => ErrorCode::NoWorkspaceSelected,
            Self::CycleDetected { .. } => ErrorCode::CycleDetected,
            Self::DanglingReference { .. } => ErrorCode::DanglingReference,
            Self::DuplicateOrigin { .. } => ErrorCode::DuplicateOrigin,
            Self::Sync(e) => match e {
                SyncError::RemoteUnavailable { .. } => ErrorCode::RemoteUnavailable,
                SyncError::RemoteAhead { .. } => ErrorCode::RemoteAhead,
                SyncError::Quarantine { .. } => ErrorCode::QuarantineFailed,
            },
            Self::Git(_) => ErrorCode::GitError,
            Self::InvalidArgument(_) => ErrorCode::InvalidArgument,
            Self::Config(_) => ErrorCode::ConfigError,
            Self::Io(_) => ErrorCode::IoError,
            Self::Json(_) => ErrorCode::JsonError,
            Self::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Category-based exit code, delegating to the `ErrorCode`.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        self.error_code().exit_code()
    }

    /// Context-aware recovery hint.
    ///
    /// Returns `None` if no actionable suggestion exists.
    #[must_use]
    pub fn hint(&self) -> Option<String> {
        match self {
            Self::NotInitialized => {
                Some("Run `ik init` at the repository root to create .issuekeeper/".to_string())
            }

            Self::AlreadyInitialized { path } => Some(format!(
                "Store already exists at {}. Use `--force` to rewrite its config.",
                path.display()
            )),

            Self::IssueNotFound { id } => Some(format!(
                "No issue with ID '{id}'. Use `ik issue list` to see available issues."
            )),
            Self::IssueNotFoundSimilar { similar, .. } => {
                Some(format!("Did you mean: {}?", similar.join(", ")))
            }

            Self::WorkspaceNotFound { .. } => {
                Some("Use `ik workspace list` to see existing workspaces.".to_string())
            }

            Self::InvalidStatus { suggestion, .. } => Some(match suggestion {
                Some(s) => format!("Did you mean '{s}'?"),
                None => "Valid statuses: backlog, open, in_progress, blocked, closed, deferred"
                    .to_string(),
            }),
            Self::InvalidKind { suggestion, .. } => Some(match suggestion {
                Some(s) => format!("Did you mean '{s}'?"),
                None => "Valid kinds: task, bug, feature, epic, chore".to_string(),
            }),
            Self::InvalidPriority { suggestion, .. } => Some(suggestion.clone().unwrap_or_else(
                || "Use 0-4, P0-P4, or: critical, high, medium, low, backlog".to_string(),
            )),

            Self::InvalidWorkspaceName { .. } => Some(
                "Workspace names use letters, digits, '.', '_' and '-', start with a letter \
                 or digit, and are at most 64 characters."
                    .to_string(),
            ),

            Self::NoWorkspaceSelected => Some(
                "Pass exactly one of --workspace <name>, --path <dir> or --outbox.".to_string(),
            ),

            Self::CycleDetected { .. } => {
                Some("Clear or change the parent of one issue in the cycle.".to_string())
            }

            Self::DanglingReference { .. } => {
                Some("Run `ik check` to list every unresolved reference.".to_string())
            }

            Self::DuplicateOrigin { ids, .. } => Some(format!(
                "Merge the copies by hand and delete the extras with `ik issue delete {}`.",
                ids.iter().skip(1).cloned().collect::<Vec<_>>().join(" ")
            )),

            Self::Sync(SyncError::RemoteAhead { .. }) => Some(
                "The sync branch moved since your last pull. Run `ik sync run` to pull then push."
                    .to_string(),
            ),
            Self::Sync(SyncError::RemoteUnavailable { remote, .. }) => Some(format!(
                "Check that remote '{remote}' exists and is reachable (`git remote -v`)."
            )),
            Self::Sync(SyncError::Quarantine { .. }) => Some(
                "The attic directory of the active workspace must be writable.".to_string(),
            ),

            Self::FileNotFound { .. }
            | Self::Git(_)
            | Self::Io(_)
            | Self::Json(_)
            | Self::InvalidArgument(_)
            | Self::Config(_)
            | Self::Other(_) => None,
        }
    }

    /// Structured JSON representation for machine consumption.
    #[must_use]
    pub fn to_structured_json(&self) -> serde_json::Value {
        let code = self.error_code();
        let mut obj = serde_json::json!({
            "error": {
                "code": code.as_str(),
                "message": self.to_string(),
                "retryable": code.is_retryable(),
                "exit_code": code.exit_code(),
            }
        });

        if let Some(hint) = self.hint() {
            obj["error"]["hint"] = serde_json::Value::String(hint);
        }

        obj
    }
}
