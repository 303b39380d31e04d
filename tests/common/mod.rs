//! Common test utilities for issuekeeper integration tests.
//!
//! Provides `TestRepo` (a git clone wired to a shared bare remote) so every
//! test runs `ik` against real git plumbing without touching the user's
//! repositories.

#![allow(dead_code)]

use assert_cmd::Command;
use std::path::{Path, PathBuf};
use std::process;
pub use tempfile::TempDir;

/// A bare repository acting as the shared remote.
pub struct Remote {
    pub dir: TempDir,
}

impl Remote {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "--bare", "--quiet"]);
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Create a clone-like repository pointing at this remote.
    pub fn clone_repo(&self) -> TestRepo {
        let repo = TestRepo::new();
        let url = self.path().to_string_lossy().into_owned();
        git(repo.path(), &["remote", "add", "origin", &url]);
        repo
    }
}

impl Default for Remote {
    fn default() -> Self {
        Self::new()
    }
}

/// A git working repository with its own `.issuekeeper/`.
pub struct TestRepo {
    pub dir: TempDir,
}

impl TestRepo {
    /// Create an empty git repository with a committer identity.
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        git(dir.path(), &["init", "--quiet"]);
        git(dir.path(), &["config", "user.email", "test@test.com"]);
        git(dir.path(), &["config", "user.name", "Test"]);
        Self { dir }
    }

    /// Create a repository and run `ik init` in it.
    pub fn init() -> Self {
        let repo = Self::new();
        repo.ik().arg("init").assert().success();
        repo
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.path().join(".issuekeeper")
    }

    /// A Command for the ik binary running inside this repository.
    ///
    /// Stdout is not a terminal under test, so output is JSON.
    pub fn ik(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_ik"));
        cmd.current_dir(self.path());
        cmd.env_remove("IK_DIR");
        cmd.env_remove("IK_REMOTE");
        cmd.env_remove("IK_SYNC_BRANCH");
        cmd.env_remove("RUST_LOG");
        cmd
    }

    /// Run ik and parse its stdout as JSON.
    pub fn ik_json(&self, args: &[&str]) -> serde_json::Value {
        let output = self.ik().args(args).output().unwrap();
        assert!(
            output.status.success(),
            "ik {args:?} failed: {}",
            String::from_utf8_lossy(&output.stderr)
        );
        serde_json::from_slice(&output.stdout).unwrap()
    }

    /// Create an issue and return its id.
    pub fn create_issue(&self, title: &str) -> String {
        let json = self.ik_json(&["issue", "create", title]);
        json["id"].as_str().unwrap().to_string()
    }

    pub fn show(&self, id: &str) -> serde_json::Value {
        self.ik_json(&["issue", "show", id])
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

/// Run git in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let output = process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run git");
    assert!(
        output.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}
