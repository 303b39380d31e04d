//! Workspaces: staging directories for backups, bulk edits and the outbox.
//!
//! Every workspace root has the same layout:
//!
//! ```text
//! <root>/
//!   issues/          record copies
//!   mappings/        identifier mapping copies
//!   attic/           conflict losers, written by sync and never read back
//!   workspace.json   watermark and timestamps
//! ```

mod save;

pub use save::{restore_from_workspace, save_to_workspace, RestoreReport, SaveMode, SaveOptions, SaveReport};

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::storage::file::{atomic_write, write_json_atomic};
use crate::storage::{id_from_file_name, record_file_name};

/// Reserved workspace selected by `--outbox`.
pub const OUTBOX: &str = "outbox";

const META_FILE: &str = "workspace.json";

/// Whether `name` may be used as a workspace name.
///
/// 1-64 characters from `[A-Za-z0-9._-]`, starting with a letter or digit.
#[must_use]
pub fn is_valid_workspace_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 64
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Persisted per-workspace state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceMeta {
    /// Last known sync point; records updated after it count as updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub watermark: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub saved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

/// A workspace directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    name: String,
    root: PathBuf,
}

impl Workspace {
    /// Named workspace under `workspaces_dir`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidWorkspaceName`] if the name is not allowed.
    pub fn named(workspaces_dir: &Path, name: &str) -> Result<Self> {
        if !is_valid_workspace_name(name) {
            return Err(Error::InvalidWorkspaceName {
                name: name.to_string(),
            });
        }
        Ok(Self {
            name: name.to_string(),
            root: workspaces_dir.join(name),
        })
    }

    /// Workspace rooted at an arbitrary directory.
    #[must_use]
    pub fn at(root: &Path) -> Self {
        Self {
            name: root.display().to_string(),
            root: root.to_path_buf(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn issues_dir(&self) -> PathBuf {
        self.root.join("issues")
    }

    #[must_use]
    pub fn mappings_dir(&self) -> PathBuf {
        self.root.join("mappings")
    }

    #[must_use]
    pub fn attic_dir(&self) -> PathBuf {
        self.root.join("attic")
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the root and its three subdirectories.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory cannot be created.
    pub fn ensure_layout(&self) -> Result<()> {
        for dir in [self.issues_dir(), self.mappings_dir(), self.attic_dir()] {
            fs::create_dir_all(&dir)?;
        }
        Ok(())
    }

    /// Read `workspace.json`; a missing file is an empty meta.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_meta(&self) -> Result<WorkspaceMeta> {
        match fs::read(self.root.join(META_FILE)) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(WorkspaceMeta::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save_meta(&self, meta: &WorkspaceMeta) -> Result<()> {
        write_json_atomic(&self.root.join(META_FILE), meta)?;
        Ok(())
    }

    /// Keep a conflict-losing copy of a record in the attic.
    ///
    /// The copy lands at `attic/<ID>.json`. If a different copy is already
    /// there, a timestamped name is used instead; existing attic files are
    /// never overwritten. Storing identical bytes twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the attic cannot be created or written.
    pub fn quarantine(&self, id: &str, bytes: &[u8]) -> std::io::Result<PathBuf> {
        let attic = self.attic_dir();
        fs::create_dir_all(&attic)?;

        let stamp = Utc::now().timestamp();
        let mut attempt = 0u32;
        loop {
            let name = match attempt {
                0 => record_file_name(id),
                1 => format!("{id}.{stamp}.json"),
                n => format!("{id}.{stamp}-{}.json", n - 1),
            };
            let path = attic.join(name);
            match fs::read(&path) {
                Ok(existing) if existing == bytes => return Ok(path),
                Ok(_) => attempt += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    atomic_write(&path, bytes)?;
                    debug!(id = %id, path = %path.display(), "Quarantined record");
                    return Ok(path);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Record ids currently in `issues/`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn issue_ids(&self) -> Result<Vec<String>> {
        list_record_ids(&self.issues_dir())
    }
}

fn list_record_ids(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir)? {
        let name = entry?.file_name().to_string_lossy().into_owned();
        if let Some(id) = id_from_file_name(&name) {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    Ok(ids)
}

/// How the caller designated a workspace.
#[derive(Debug, Clone, Default)]
pub struct WorkspaceSelector {
    pub name: Option<String>,
    pub path: Option<PathBuf>,
    pub outbox: bool,
}

/// Resolve the one workspace a selector designates.
///
/// # Errors
///
/// - [`Error::NoWorkspaceSelected`] when no selector is set
/// - [`Error::InvalidArgument`] when more than one is set
/// - [`Error::InvalidWorkspaceName`] for a bad name
pub fn target_directory(workspaces_dir: &Path, selector: &WorkspaceSelector) -> Result<Workspace> {
    match (&selector.name, &selector.path, selector.outbox) {
        (Some(name), None, false) => Workspace::named(workspaces_dir, name),
        (None, Some(path), false) => Ok(Workspace::at(path)),
        (None, None, true) => Workspace::named(workspaces_dir, OUTBOX),
        (None, None, false) => Err(Error::NoWorkspaceSelected),
        _ => Err(Error::InvalidArgument(
            "Select exactly one of a workspace name, a path or the outbox".to_string(),
        )),
    }
}

/// Summary of one workspace for listings.
#[derive(Debug, Clone, Serialize)]
pub struct WorkspaceInfo {
    pub name: String,
    pub path: PathBuf,
    pub issues: usize,
    pub attic: usize,
    #[serde(flatten)]
    pub meta: WorkspaceMeta,
}

/// Enumerate named workspaces, skipping entries that cannot be read.
///
/// # Errors
///
/// Returns an error only if `workspaces_dir` itself cannot be read.
pub fn list_workspaces(workspaces_dir: &Path) -> Result<Vec<WorkspaceInfo>> {
    if !workspaces_dir.exists() {
        return Ok(Vec::new());
    }

    let mut infos = Vec::new();
    for entry in fs::read_dir(workspaces_dir)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable workspace entry");
                continue;
            }
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if !entry.path().is_dir() || !is_valid_workspace_name(&name) {
            continue;
        }

        match describe(&Workspace::at(&entry.path()), name.clone()) {
            Ok(info) => infos.push(info),
            Err(e) => warn!(workspace = %name, error = %e, "Skipping unreadable workspace"),
        }
    }

    infos.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(infos)
}

fn describe(workspace: &Workspace, name: String) -> Result<WorkspaceInfo> {
    let issues = workspace.issue_ids()?.len();
    let attic = if workspace.attic_dir().exists() {
        fs::read_dir(workspace.attic_dir())?.count()
    } else {
        0
    };
    Ok(WorkspaceInfo {
        name,
        path: workspace.root().to_path_buf(),
        issues,
        attic,
        meta: workspace.load_meta()?,
    })
}

/// Remove a named workspace. Deleting an absent workspace is a no-op.
///
/// Returns whether anything was removed.
///
/// # Errors
///
/// Returns an error for an invalid name or if removal fails.
pub fn delete_workspace(workspaces_dir: &Path, name: &str) -> Result<bool> {
    let workspace = Workspace::named(workspaces_dir, name)?;
    match fs::remove_dir_all(workspace.root()) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspace_names() {
        assert!(is_valid_workspace_name("backup-2025.01"));
        assert!(is_valid_workspace_name("a"));
        assert!(!is_valid_workspace_name(""));
        assert!(!is_valid_workspace_name(".."));
        assert!(!is_valid_workspace_name("../etc"));
        assert!(!is_valid_workspace_name("-dash"));
        assert!(!is_valid_workspace_name("a/b"));
        assert!(!is_valid_workspace_name(&"x".repeat(65)));
    }

    #[test]
    fn test_target_directory_selectors() {
        let dir = Path::new("/ws");

        let none = target_directory(dir, &WorkspaceSelector::default());
        assert!(matches!(none, Err(Error::NoWorkspaceSelected)));

        let both = WorkspaceSelector {
            name: Some("a".into()),
            outbox: true,
            ..WorkspaceSelector::default()
        };
        assert!(matches!(
            target_directory(dir, &both),
            Err(Error::InvalidArgument(_))
        ));

        let outbox = WorkspaceSelector {
            outbox: true,
            ..WorkspaceSelector::default()
        };
        assert_eq!(
            target_directory(dir, &outbox).unwrap().root(),
            Path::new("/ws/outbox")
        );

        let bad = WorkspaceSelector {
            name: Some("../x".into()),
            ..WorkspaceSelector::default()
        };
        assert!(matches!(
            target_directory(dir, &bad),
            Err(Error::InvalidWorkspaceName { .. })
        ));

        let path = WorkspaceSelector {
            path: Some(PathBuf::from("/tmp/elsewhere")),
            ..WorkspaceSelector::default()
        };
        assert_eq!(
            target_directory(dir, &path).unwrap().root(),
            Path::new("/tmp/elsewhere")
        );
    }

    #[test]
    fn test_ensure_layout() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::named(temp.path(), "backup").unwrap();
        ws.ensure_layout().unwrap();

        assert!(ws.issues_dir().is_dir());
        assert!(ws.mappings_dir().is_dir());
        assert!(ws.attic_dir().is_dir());
    }

    #[test]
    fn test_quarantine_never_overwrites() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::named(temp.path(), "sync").unwrap();

        let first = ws.quarantine("IK-1", b"one").unwrap();
        assert_eq!(first, ws.attic_dir().join("IK-1.json"));

        let again = ws.quarantine("IK-1", b"one").unwrap();
        assert_eq!(again, first);

        let second = ws.quarantine("IK-1", b"two").unwrap();
        assert_ne!(second, first);
        assert_eq!(fs::read(&first).unwrap(), b"one");
        assert_eq!(fs::read(&second).unwrap(), b"two");

        let third = ws.quarantine("IK-1", b"three").unwrap();
        assert_ne!(third, second);
        assert_eq!(fs::read(&second).unwrap(), b"two");
    }

    #[test]
    fn test_meta_roundtrip() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::named(temp.path(), "sync").unwrap();
        assert_eq!(ws.load_meta().unwrap(), WorkspaceMeta::default());

        ws.ensure_layout().unwrap();
        let meta = WorkspaceMeta {
            watermark: Some(Utc::now()),
            ..WorkspaceMeta::default()
        };
        ws.save_meta(&meta).unwrap();
        assert_eq!(ws.load_meta().unwrap(), meta);
    }

    #[test]
    fn test_list_skips_unreadable() {
        let temp = TempDir::new().unwrap();
        let good = Workspace::named(temp.path(), "good").unwrap();
        good.ensure_layout().unwrap();
        fs::write(good.issues_dir().join("IK-1.json"), "{}").unwrap();

        let broken = Workspace::named(temp.path(), "broken").unwrap();
        broken.ensure_layout().unwrap();
        fs::write(broken.root().join(META_FILE), "not json").unwrap();

        fs::write(temp.path().join("stray-file"), "x").unwrap();

        let infos = list_workspaces(temp.path()).unwrap();
        assert_eq!(infos.len(), 1);
        assert_eq!(infos[0].name, "good");
        assert_eq!(infos[0].issues, 1);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let temp = TempDir::new().unwrap();
        assert!(list_workspaces(&temp.path().join("none")).unwrap().is_empty());
    }

    #[test]
    fn test_delete_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::named(temp.path(), "old").unwrap();
        ws.ensure_layout().unwrap();

        assert!(delete_workspace(temp.path(), "old").unwrap());
        assert!(!ws.exists());
        assert!(!delete_workspace(temp.path(), "old").unwrap());
        assert!(!delete_workspace(temp.path(), "never-existed").unwrap());
        assert!(delete_workspace(temp.path(), "../x").is_err());
    }
}
