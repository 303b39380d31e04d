//! Initialize an Issuekeeper project.
//!
//! Creates `.issuekeeper/` with the record store, mapping and workspace
//! directories, a default `config.json`, and a `.gitignore` that keeps
//! workspaces and temp files out of the user's branches. Records reach
//! other clones through the sync branch, not through the working tree.

use crate::config::{save_config, Config, Layout, DATA_DIR_NAME};
use crate::error::{Error, Result};
use crate::storage::file::atomic_write;
use crate::validate::is_valid_name;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Serialize)]
struct InitOutput {
    path: PathBuf,
    id_prefix: String,
    sync_branch: String,
}

/// Ignore rules written to `.issuekeeper/.gitignore`.
#[must_use]
pub fn gitignore_content() -> &'static str {
    r"# Issuekeeper data directory
# Workspaces are local staging areas; the attic holds conflict losers
workspaces/

# Interrupted atomic writes
.*.tmp
"
}

/// Execute the init command.
///
/// `dir` is the project root or the data directory itself (default: the
/// current directory).
///
/// # Errors
///
/// Returns [`Error::AlreadyInitialized`] unless `force` is set, or an error
/// if the directories or config cannot be written.
pub fn execute(dir: Option<&Path>, prefix: Option<&str>, force: bool, json: bool) -> Result<()> {
    let layout = match dir {
        Some(dir) if dir.file_name().is_some_and(|n| n == DATA_DIR_NAME) => Layout::new(dir),
        Some(dir) => Layout::for_project(dir),
        None => Layout::for_project(&std::env::current_dir()?),
    };
    let output = initialize(&layout, prefix, force)?;

    if json {
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Initialized Issuekeeper in {}", output.path.display());
        println!("  ID prefix:   {}", output.id_prefix);
        println!("  Sync branch: {}", output.sync_branch);
    }
    Ok(())
}

fn initialize(layout: &Layout, prefix: Option<&str>, force: bool) -> Result<InitOutput> {
    if layout.exists() && !force {
        return Err(Error::AlreadyInitialized {
            path: layout.data_dir().to_path_buf(),
        });
    }

    let mut config = Config::default();
    if let Some(prefix) = prefix {
        if !is_valid_name(prefix) || prefix.contains('.') {
            return Err(Error::InvalidArgument(format!("Invalid ID prefix: {prefix:?}")));
        }
        config.id_prefix = prefix.to_string();
    }

    fs::create_dir_all(layout.issues_dir())?;
    fs::create_dir_all(layout.mappings_dir())?;
    fs::create_dir_all(layout.workspaces_dir())?;

    let gitignore_path = layout.data_dir().join(".gitignore");
    if !gitignore_path.exists() || force {
        atomic_write(&gitignore_path, gitignore_content().as_bytes())?;
    }

    save_config(layout, &config)?;
    tracing::info!(path = %layout.data_dir().display(), "Initialized data directory");

    Ok(InitOutput {
        path: layout.data_dir().to_path_buf(),
        id_prefix: config.id_prefix,
        sync_branch: config.sync.branch,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_layout() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::for_project(temp.path());

        let output = initialize(&layout, Some("PRJ"), false).unwrap();

        assert_eq!(output.id_prefix, "PRJ");
        assert!(layout.issues_dir().is_dir());
        assert!(layout.mappings_dir().is_dir());
        assert!(layout.workspaces_dir().is_dir());
        assert!(layout.data_dir().join(".gitignore").exists());
        assert_eq!(load_config(&layout).unwrap().id_prefix, "PRJ");
    }

    #[test]
    fn test_init_twice_requires_force() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::for_project(temp.path());
        initialize(&layout, None, false).unwrap();

        let err = initialize(&layout, None, false).unwrap_err();
        assert!(matches!(err, Error::AlreadyInitialized { .. }));

        assert!(initialize(&layout, Some("NEW"), true).is_ok());
        assert_eq!(load_config(&layout).unwrap().id_prefix, "NEW");
    }

    #[test]
    fn test_init_rejects_bad_prefix() {
        let temp = TempDir::new().unwrap();
        let layout = Layout::for_project(temp.path());

        let err = initialize(&layout, Some("a/b"), false).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(!layout.exists());
    }
}
