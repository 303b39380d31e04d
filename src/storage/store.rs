//! File-backed issue store.
//!
//! One pretty-printed JSON file per issue under a single directory
//! (`.issuekeeper/issues/<ID>.json`). All writes are atomic. The store
//! owns version bookkeeping: `create` starts at version 1 and `update`
//! always moves version and `updated_at` forward.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeDelta, Utc};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::model::{Dependency, Issue};
use crate::storage::file::{atomic_write, is_temp_name};
use crate::validate::{find_similar_ids, is_valid_name};

const RECORD_EXT: &str = "json";

/// Fields supplied when creating an issue.
#[derive(Debug, Clone)]
pub struct NewIssue {
    pub title: String,
    pub description: Option<String>,
    pub status: String,
    pub kind: String,
    pub priority: i32,
    pub parent_id: Option<String>,
    pub dependencies: Vec<Dependency>,
}

/// Directory of issue records.
#[derive(Debug, Clone)]
pub struct IssueStore {
    dir: PathBuf,
}

impl IssueStore {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the record file for `id`.
    #[must_use]
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(record_file_name(id))
    }

    /// Sorted ids of every record file in the store.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn ids(&self) -> Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(id) = id_from_file_name(&name) {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Load every parsable record, sorted by id.
    ///
    /// Unparsable files are logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn list(&self) -> Result<Vec<Issue>> {
        let mut issues = Vec::new();
        for id in self.ids()? {
            match self.get(&id) {
                Ok(Some(issue)) => issues.push(issue),
                Ok(None) => {}
                Err(e) => warn!(id = %id, error = %e, "Skipping unreadable issue record"),
            }
        }
        Ok(issues)
    }

    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn get(&self, id: &str) -> Result<Option<Issue>> {
        match self.read_raw(id)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Load an issue or fail with a not-found error carrying suggestions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IssueNotFound`] / [`Error::IssueNotFoundSimilar`].
    pub fn require(&self, id: &str) -> Result<Issue> {
        if let Some(issue) = self.get(id)? {
            return Ok(issue);
        }
        let similar = find_similar_ids(id, &self.ids()?, 3);
        if similar.is_empty() {
            Err(Error::IssueNotFound { id: id.to_string() })
        } else {
            Err(Error::IssueNotFoundSimilar {
                id: id.to_string(),
                similar,
            })
        }
    }

    /// Raw bytes of a record file, `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read.
    pub fn read_raw(&self, id: &str) -> Result<Option<Vec<u8>>> {
        if !is_valid_name(id) {
            return Ok(None);
        }
        match fs::read(self.path_for(id)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// When the record file was last written in this store.
    ///
    /// Every store write replaces the file, so this is the local write
    /// time regardless of the `updated_at` the record carries.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but its metadata cannot be read.
    pub fn written_at(&self, id: &str) -> Result<Option<DateTime<Utc>>> {
        match fs::metadata(self.path_for(id)).and_then(|meta| meta.modified()) {
            Ok(modified) => Ok(Some(DateTime::<Utc>::from(modified))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist an issue as-is.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is not a valid file name or the write fails.
    pub fn write(&self, issue: &Issue) -> Result<()> {
        self.write_raw(&issue.id, &issue.to_file_bytes()?)
    }

    /// Persist raw record bytes unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is not a valid file name or the write fails.
    pub fn write_raw(&self, id: &str, bytes: &[u8]) -> Result<()> {
        if !is_valid_name(id) {
            return Err(Error::InvalidArgument(format!("Invalid issue id: {id:?}")));
        }
        atomic_write(&self.path_for(id), bytes)?;
        debug!(id = %id, "Wrote issue record");
        Ok(())
    }

    /// Remove a record. Returns whether a file was removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    pub fn remove(&self, id: &str) -> Result<bool> {
        match fs::remove_file(self.path_for(id)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a new issue with a fresh id and version 1.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or written.
    pub fn create(&self, new: NewIssue, prefix: &str, now: DateTime<Utc>) -> Result<Issue> {
        let existing = self.ids()?;
        let id = generate_id(prefix, |candidate| {
            existing.binary_search_by(|e| e.as_str().cmp(candidate)).is_ok()
        });

        let issue = Issue {
            id,
            title: new.title,
            description: new.description,
            status: new.status,
            kind: new.kind,
            priority: new.priority,
            version: 1,
            parent_id: new.parent_id,
            dependencies: new.dependencies,
            created_at: now,
            updated_at: now,
            extensions: std::collections::BTreeMap::new(),
        };
        self.write(&issue)?;
        Ok(issue)
    }

    /// Persist a mutation of an existing issue.
    ///
    /// The stored version is the reference: the written copy gets
    /// `stored.version + 1` and an `updated_at` no earlier than `now` and
    /// strictly later than the stored `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns an error if the issue does not exist or the write fails.
    pub fn update(&self, mut issue: Issue, now: DateTime<Utc>) -> Result<Issue> {
        let stored = self.require(&issue.id)?;
        issue.version = stored.version + 1;
        issue.created_at = stored.created_at;
        issue.updated_at = now
            .max(stored.updated_at + TimeDelta::milliseconds(1))
            .max(issue.created_at);
        self.write(&issue)?;
        Ok(issue)
    }
}

/// File name for a record id.
#[must_use]
pub fn record_file_name(id: &str) -> String {
    format!("{id}.{RECORD_EXT}")
}

/// Record id encoded in a file name, if it is a record file.
#[must_use]
pub fn id_from_file_name(name: &str) -> Option<&str> {
    if is_temp_name(name) {
        return None;
    }
    name.strip_suffix(".json").filter(|id| is_valid_name(id))
}

/// Generate a short `<PREFIX>-<hex>` id that `is_taken` rejects.
///
/// Starts with four hex digits and widens on collision.
pub fn generate_id(prefix: &str, is_taken: impl Fn(&str) -> bool) -> String {
    let mut width = 4;
    loop {
        let hex = uuid::Uuid::new_v4().simple().to_string();
        let candidate = format!("{prefix}-{}", &hex[..width]);
        if !is_taken(&candidate) {
            return candidate;
        }
        width = (width + 2).min(hex.len());
    }
}
