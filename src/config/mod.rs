//! Configuration management.
//!
//! This module discovers the project's `.issuekeeper/` directory, names the
//! fixed paths inside it, and loads `.issuekeeper/config.json`.
//!
//! # Layout
//!
//! ```text
//! .issuekeeper/
//!   config.json
//!   issues/<ID>.json          record store
//!   mappings/<source>.json    identifier mappings
//!   workspaces/<name>/        staging directories (issues/, mappings/, attic/)
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::storage::file::write_json_atomic;
use crate::storage::IssueStore;

/// Name of the per-project data directory.
pub const DATA_DIR_NAME: &str = ".issuekeeper";

/// Paths inside a project's data directory.
#[derive(Debug, Clone)]
pub struct Layout {
    data_dir: PathBuf,
}

impl Layout {
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    /// Layout for the data directory directly under `project_root`.
    #[must_use]
    pub fn for_project(project_root: &Path) -> Self {
        Self::new(project_root.join(DATA_DIR_NAME))
    }

    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// The directory holding `.issuekeeper/` (normally the git work tree root).
    #[must_use]
    pub fn project_root(&self) -> &Path {
        self.data_dir.parent().unwrap_or(&self.data_dir)
    }

    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.data_dir.join("config.json")
    }

    #[must_use]
    pub fn issues_dir(&self) -> PathBuf {
        self.data_dir.join("issues")
    }

    #[must_use]
    pub fn mappings_dir(&self) -> PathBuf {
        self.data_dir.join("mappings")
    }

    #[must_use]
    pub fn mapping_path(&self, source: &str) -> PathBuf {
        self.mappings_dir().join(format!("{source}.json"))
    }

    #[must_use]
    pub fn workspaces_dir(&self) -> PathBuf {
        self.data_dir.join("workspaces")
    }

    #[must_use]
    pub fn store(&self) -> IssueStore {
        IssueStore::new(self.issues_dir())
    }

    #[must_use]
    pub fn exists(&self) -> bool {
        self.data_dir.is_dir()
    }
}

/// Discover the project's `.issuekeeper/` directory.
///
/// Resolution strategy:
/// 1. Check the **git root** first, so running from a subdirectory still
///    finds the project's data directory.
/// 2. Fall back to walking up from CWD (for non-git projects).
#[must_use]
pub fn discover_data_dir() -> Option<PathBuf> {
    if let Some(git_root) = git_toplevel() {
        let candidate = git_root.join(DATA_DIR_NAME);
        if candidate.is_dir() {
            return Some(candidate);
        }
    }

    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .map(|dir| dir.join(DATA_DIR_NAME))
        .find(|candidate| candidate.is_dir())
}

/// Get the git repository root directory.
fn git_toplevel() -> Option<PathBuf> {
    std::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| PathBuf::from(String::from_utf8_lossy(&o.stdout).trim().to_string()))
}

/// Resolve the layout for an initialized project.
///
/// Priority:
/// 1. `explicit_dir` (the `--dir` flag / `IK_DIR`): either the project root
///    or the `.issuekeeper` directory itself
/// 2. Discovery from the current directory
///
/// # Errors
///
/// Returns [`Error::NotInitialized`] if no data directory exists.
pub fn resolve_layout(explicit_dir: Option<&Path>) -> Result<Layout> {
    let layout = match explicit_dir {
        Some(dir) if dir.file_name().is_some_and(|n| n == DATA_DIR_NAME) => Layout::new(dir),
        Some(dir) => Layout::for_project(dir),
        None => Layout::new(discover_data_dir().ok_or(Error::NotInitialized)?),
    };

    if layout.exists() {
        Ok(layout)
    } else {
        Err(Error::NotInitialized)
    }
}

/// Sync transport settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Git remote carrying the sync branch.
    pub remote: String,
    /// Branch dedicated to issue state.
    pub branch: String,
    /// Workspace whose attic receives conflict losers.
    pub workspace: String,
    /// Upper bound for network git commands.
    pub fetch_timeout_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            remote: "origin".to_string(),
            branch: "issuekeeper-sync".to_string(),
            workspace: "sync".to_string(),
            fetch_timeout_secs: 30,
        }
    }
}

/// Contents of `.issuekeeper/config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Prefix for generated issue ids.
    pub id_prefix: String,
    pub sync: SyncSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id_prefix: "IK".to_string(),
            sync: SyncSettings::default(),
        }
    }
}

/// Load the project configuration with environment overrides applied.
///
/// A missing file yields defaults.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
pub fn load_config(layout: &Layout) -> Result<Config> {
    let path = layout.config_path();

    let mut config = if path.exists() {
        let content = fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))?
    } else {
        Config::default()
    };

    if let Some(remote) = env_override("IK_REMOTE") {
        config.sync.remote = remote;
    }
    if let Some(branch) = env_override("IK_SYNC_BRANCH") {
        config.sync.branch = branch;
    }

    Ok(config)
}

/// Write the project configuration.
///
/// # Errors
///
/// Returns [`Error::Config`] if the file cannot be written.
pub fn save_config(layout: &Layout, config: &Config) -> Result<()> {
    write_json_atomic(&layout.config_path(), config)
        .map_err(|e| Error::Config(format!("Failed to write config file: {e}")))
}

fn env_override(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout_paths() {
        let layout = Layout::for_project(Path::new("/repo"));
        assert_eq!(layout.data_dir(), Path::new("/repo/.issuekeeper"));
        assert_eq!(layout.project_root(), Path::new("/repo"));
        assert_eq!(layout.issues_dir(), PathBuf::from("/repo/.issuekeeper/issues"));
        assert_eq!(
            layout.mapping_path("jira"),
            PathBuf::from("/repo/.issuekeeper/mappings/jira.json")
        );
    }

    #[test]
    fn test_resolve_layout_requires_init() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(
            resolve_layout(Some(temp.path())),
            Err(Error::NotInitialized)
        ));

        fs::create_dir_all(temp.path().join(DATA_DIR_NAME)).unwrap();
        let from_root = resolve_layout(Some(temp.path())).unwrap();
        let from_data = resolve_layout(Some(&temp.path().join(DATA_DIR_NAME))).unwrap();
        assert_eq!(from_root.data_dir(), from_data.data_dir());
    }

    #[test]
    fn test_missing_config_uses_defaults() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::for_project(temp.path());
        let config = load_config(&layout).unwrap();
        assert_eq!(config.id_prefix, "IK");
        assert_eq!(config.sync.workspace, "sync");
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::for_project(temp.path());
        fs::create_dir_all(layout.data_dir()).unwrap();
        fs::write(layout.config_path(), r#"{"sync":{"fetch_timeout_secs":5}}"#).unwrap();

        let config = load_config(&layout).unwrap();
        assert_eq!(config.sync.fetch_timeout_secs, 5);
        assert_eq!(config.id_prefix, "IK");
    }

    #[test]
    fn test_save_and_load_config() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::for_project(temp.path());
        let config = Config {
            id_prefix: "OPS".into(),
            ..Config::default()
        };
        save_config(&layout, &config).unwrap();
        assert_eq!(load_config(&layout).unwrap().id_prefix, "OPS");
    }

    #[test]
    fn test_corrupt_config_is_an_error() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::for_project(temp.path());
        fs::create_dir_all(layout.data_dir()).unwrap();
        fs::write(layout.config_path(), "{").unwrap();
        assert!(matches!(load_config(&layout), Err(Error::Config(_))));
    }
}
