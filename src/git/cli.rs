//! `git` binary implementation of [`Vcs`].
//!
//! Only plumbing commands are used, so the working tree, index and HEAD of
//! the user's checkout are left alone.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::{remote_ref, GitError, RemoteState, Vcs, RECORDS_DIR};

/// Runs git commands inside one repository.
pub struct GitCli {
    repo: PathBuf,
    network_timeout: Duration,
}

impl GitCli {
    /// Open the repository containing `dir`.
    ///
    /// # Errors
    ///
    /// Returns [`GitError::NotARepository`] if `dir` is not inside a work tree.
    pub fn discover(dir: &Path, network_timeout: Duration) -> Result<Self, GitError> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(dir)
            .output()
            .map_err(GitError::Spawn)?;

        if !output.status.success() {
            return Err(GitError::NotARepository {
                path: dir.to_path_buf(),
            });
        }

        Ok(Self {
            repo: PathBuf::from(String::from_utf8_lossy(&output.stdout).trim()),
            network_timeout,
        })
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("git");
        cmd.args(args)
            .current_dir(&self.repo)
            .env("GIT_TERMINAL_PROMPT", "0");
        cmd
    }

    /// Run a local command and return its output, failing on non-zero exit.
    fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        debug!(args = ?args, "git");
        let output = self.command(args).output().map_err(GitError::Spawn)?;
        check(args, output)
    }

    fn run_with_input(&self, args: &[&str], input: &[u8]) -> Result<Output, GitError> {
        debug!(args = ?args, bytes = input.len(), "git (stdin)");
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(GitError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).map_err(GitError::Spawn)?;
        }

        let output = child.wait_with_output().map_err(GitError::Spawn)?;
        check(args, output)
    }

    /// Run a network command, killing it once the timeout expires.
    ///
    /// Returns the exit code and captured stdout/stderr. Outputs of the
    /// commands used here are small, so reading after exit cannot stall.
    fn run_bounded(&self, args: &[&str]) -> Result<(Option<i32>, String, String), GitError> {
        debug!(args = ?args, timeout_secs = self.network_timeout.as_secs(), "git (bounded)");
        let mut child = self
            .command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(GitError::Spawn)?;

        let Some(status) = child
            .wait_timeout(self.network_timeout)
            .map_err(GitError::Spawn)?
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(GitError::Timeout {
                command: args.first().copied().unwrap_or_default().to_string(),
                secs: self.network_timeout.as_secs(),
            });
        };

        let mut stdout = String::new();
        let mut stderr = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout).map_err(GitError::Spawn)?;
        }
        if let Some(mut err) = child.stderr.take() {
            err.read_to_string(&mut stderr).map_err(GitError::Spawn)?;
        }

        Ok((status.code(), stdout, stderr.trim().to_string()))
    }

    fn mktree(&self, lines: &[String]) -> Result<String, GitError> {
        let mut input = lines.join("\n");
        if !input.is_empty() {
            input.push('\n');
        }
        let output = self.run_with_input(&["mktree"], input.as_bytes())?;
        Ok(stdout_line(&output))
    }
}

fn check(args: &[&str], output: Output) -> Result<Output, GitError> {
    if output.status.success() {
        Ok(output)
    } else {
        Err(GitError::Command {
            command: args.first().copied().unwrap_or_default().to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

fn stdout_line(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

impl Vcs for GitCli {
    fn fetch(&self, remote: &str, branch: &str) -> Result<RemoteState, GitError> {
        let head = format!("refs/heads/{branch}");

        let probe = match self.run_bounded(&["ls-remote", "--exit-code", remote, &head]) {
            Ok(probe) => probe,
            Err(GitError::Timeout { secs, .. }) => {
                warn!(remote, secs, "Remote did not answer in time");
                return Ok(RemoteState::Unavailable(format!("timed out after {secs}s")));
            }
            Err(e) => return Err(e),
        };

        match probe {
            (Some(0), _, _) => {}
            // ls-remote --exit-code: reachable, but no matching ref
            (Some(2), _, _) => return Ok(RemoteState::Missing),
            (_, _, stderr) => {
                warn!(remote, %stderr, "Remote unavailable");
                return Ok(RemoteState::Unavailable(stderr));
            }
        }

        let refspec = format!("+{head}:{}", remote_ref(branch));
        match self.run_bounded(&["fetch", "--quiet", "--no-tags", remote, &refspec]) {
            Ok((Some(0), _, _)) => {}
            Ok((_, _, stderr)) => {
                warn!(remote, %stderr, "Fetch failed");
                return Ok(RemoteState::Unavailable(stderr));
            }
            Err(GitError::Timeout { secs, .. }) => {
                warn!(remote, secs, "Fetch timed out");
                return Ok(RemoteState::Unavailable(format!("timed out after {secs}s")));
            }
            Err(e) => return Err(e),
        }

        self.read_ref(&remote_ref(branch))?
            .map(RemoteState::At)
            .ok_or_else(|| GitError::Output {
                command: "fetch".to_string(),
                detail: format!("{} missing after fetch", remote_ref(branch)),
            })
    }

    fn read_ref(&self, name: &str) -> Result<Option<String>, GitError> {
        let spec = format!("{name}^{{commit}}");
        let output = self
            .command(&["rev-parse", "--verify", "--quiet", &spec])
            .output()
            .map_err(GitError::Spawn)?;

        if output.status.success() {
            Ok(Some(stdout_line(&output)))
        } else {
            Ok(None)
        }
    }

    fn update_ref(&self, name: &str, commit: &str) -> Result<(), GitError> {
        self.run(&["update-ref", name, commit]).map(|_| ())
    }

    fn log_range(&self, base: Option<&str>, tip: &str) -> Result<Vec<String>, GitError> {
        let range = match base {
            Some(base) => format!("{base}..{tip}"),
            None => tip.to_string(),
        };
        let output = self.run(&["log", "--format=%h %s", &range])?;
        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect())
    }

    fn record_tree(&self, commit: &str) -> Result<BTreeMap<String, String>, GitError> {
        let prefix = format!("{RECORDS_DIR}/");
        let output = self.run(&["ls-tree", "-z", commit, "--", &prefix])?;

        let mut entries = BTreeMap::new();
        for entry in output.stdout.split(|b| *b == 0).filter(|e| !e.is_empty()) {
            let entry = String::from_utf8_lossy(entry);
            // "<mode> <type> <id>\t<path>"
            let Some((meta, path)) = entry.split_once('\t') else {
                return Err(GitError::Output {
                    command: "ls-tree".to_string(),
                    detail: entry.to_string(),
                });
            };
            let mut fields = meta.split_whitespace();
            let (Some(_mode), Some(kind), Some(id)) = (fields.next(), fields.next(), fields.next())
            else {
                return Err(GitError::Output {
                    command: "ls-tree".to_string(),
                    detail: entry.to_string(),
                });
            };
            if kind != "blob" {
                continue;
            }
            if let Some(name) = path.strip_prefix(&prefix) {
                entries.insert(name.to_string(), id.to_string());
            }
        }
        Ok(entries)
    }

    fn read_blob(&self, blob: &str) -> Result<Vec<u8>, GitError> {
        Ok(self.run(&["cat-file", "blob", blob])?.stdout)
    }

    fn hash_files(&self, paths: &[PathBuf], write: bool) -> Result<Vec<String>, GitError> {
        if paths.is_empty() {
            return Ok(Vec::new());
        }

        let mut input = String::new();
        for path in paths {
            input.push_str(&path.to_string_lossy());
            input.push('\n');
        }

        let args: &[&str] = if write {
            &["hash-object", "-w", "--stdin-paths"]
        } else {
            &["hash-object", "--stdin-paths"]
        };
        let output = self.run_with_input(args, input.as_bytes())?;
        let ids: Vec<String> = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::to_string)
            .collect();

        if ids.len() != paths.len() {
            return Err(GitError::Output {
                command: "hash-object".to_string(),
                detail: format!("expected {} ids, got {}", paths.len(), ids.len()),
            });
        }
        Ok(ids)
    }

    fn commit_records(
        &self,
        records: &BTreeMap<String, String>,
        parent: Option<&str>,
        message: &str,
    ) -> Result<String, GitError> {
        let record_lines: Vec<String> = records
            .iter()
            .map(|(name, blob)| format!("100644 blob {blob}\t{name}"))
            .collect();

        let root_lines = if record_lines.is_empty() {
            Vec::new()
        } else {
            let subtree = self.mktree(&record_lines)?;
            vec![format!("040000 tree {subtree}\t{RECORDS_DIR}")]
        };
        let root = self.mktree(&root_lines)?;

        let mut args = vec!["commit-tree", root.as_str(), "-m", message];
        if let Some(parent) = parent {
            args.push("-p");
            args.push(parent);
        }
        let output = self.run(&args)?;
        Ok(stdout_line(&output))
    }

    fn push(&self, remote: &str, commit: &str, branch: &str) -> Result<(), GitError> {
        let refspec = format!("{commit}:refs/heads/{branch}");
        match self.run_bounded(&["push", "--quiet", remote, &refspec])? {
            (Some(0), _, _) => Ok(()),
            (_, _, stderr) => Err(GitError::Command {
                command: "push".to_string(),
                stderr,
            }),
        }
    }
}
