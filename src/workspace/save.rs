//! Copying records between the store and a workspace.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::Result;
use crate::model::Issue;
use crate::storage::file::atomic_write;
use crate::storage::{record_file_name, IssueStore};

use super::Workspace;

/// Options for [`save_to_workspace`].
#[derive(Debug, Clone, Default)]
pub struct SaveOptions {
    /// Copy only records written or updated after `watermark`.
    pub updates_only: bool,
    /// Last sync point. Without one, an updates-only save degrades to a
    /// full copy and says so in its report.
    pub watermark: Option<DateTime<Utc>>,
}

/// Which copy a save actually performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveMode {
    Full,
    UpdatesOnly,
    /// Updates-only was requested but no watermark exists.
    DegradedFull,
}

/// Result of a save.
#[derive(Debug, Clone, Serialize)]
pub struct SaveReport {
    pub workspace: String,
    pub path: PathBuf,
    pub mode: SaveMode,
    /// Records written into `issues/`.
    pub copied: usize,
    /// Records left out by the watermark filter.
    pub unchanged: usize,
    /// Mapping files written into `mappings/`.
    pub mappings: usize,
}

/// Copy store records (and mapping files) into a workspace.
///
/// The workspace layout is created first. Unparsable records are always
/// copied since their age cannot be judged.
///
/// # Errors
///
/// Returns an error if the store or workspace cannot be read or written.
pub fn save_to_workspace(
    store: &IssueStore,
    mappings_dir: &Path,
    target: &Workspace,
    options: &SaveOptions,
) -> Result<SaveReport> {
    target.ensure_layout()?;

    let (mode, since) = match (options.updates_only, options.watermark) {
        (false, _) => (SaveMode::Full, None),
        (true, Some(watermark)) => (SaveMode::UpdatesOnly, Some(watermark)),
        (true, None) => {
            warn!(
                workspace = %target.name(),
                "No sync watermark recorded; copying every record"
            );
            (SaveMode::DegradedFull, None)
        }
    };

    let mut copied = 0;
    let mut unchanged = 0;
    for id in store.ids()? {
        let Some(bytes) = store.read_raw(&id)? else {
            continue;
        };

        if let Some(since) = since {
            if !changed_since(store, &id, &bytes, since)? {
                unchanged += 1;
                continue;
            }
        }

        atomic_write(&target.issues_dir().join(record_file_name(&id)), &bytes)?;
        copied += 1;
    }

    let mut mappings = 0;
    if mappings_dir.is_dir() {
        for entry in fs::read_dir(mappings_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") && path.is_file() {
                atomic_write(&target.mappings_dir().join(entry.file_name()), &fs::read(&path)?)?;
                mappings += 1;
            }
        }
    }

    let mut meta = target.load_meta()?;
    meta.saved_at = Some(Utc::now());
    target.save_meta(&meta)?;

    info!(workspace = %target.name(), copied, unchanged, mappings, ?mode, "Saved to workspace");

    Ok(SaveReport {
        workspace: target.name().to_string(),
        path: target.root().to_path_buf(),
        mode,
        copied,
        unchanged,
        mappings,
    })
}

/// Whether a record was written locally, or edited, after `since`.
///
/// The local write time catches records that arrived by import or pull
/// carrying an older `updated_at`.
fn changed_since(store: &IssueStore, id: &str, bytes: &[u8], since: DateTime<Utc>) -> Result<bool> {
    if store.written_at(id)?.is_none_or(|written| written > since) {
        return Ok(true);
    }
    match serde_json::from_slice::<Issue>(bytes) {
        Ok(issue) => Ok(issue.updated_at > since),
        Err(e) => {
            warn!(id = %id, error = %e, "Copying unparsable record");
            Ok(true)
        }
    }
}

/// Result of a restore.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RestoreReport {
    /// Existing records replaced by the workspace copy.
    pub updated: usize,
    /// Records that only existed in the workspace.
    pub created: usize,
    pub unchanged: usize,
    /// Workspace files that could not be parsed or written.
    pub failed: usize,
}

/// Bring edited workspace records back into the store.
///
/// Records whose content differs from the store go through
/// [`IssueStore::update`], so their version keeps increasing.
///
/// # Errors
///
/// Returns an error if the workspace or store directory cannot be read.
pub fn restore_from_workspace(
    store: &IssueStore,
    source: &Workspace,
    now: DateTime<Utc>,
) -> Result<RestoreReport> {
    let mut report = RestoreReport::default();

    for id in source.issue_ids()? {
        let path = source.issues_dir().join(record_file_name(&id));
        let issue = match fs::read(&path)
            .map_err(crate::error::Error::from)
            .and_then(|bytes| Ok(serde_json::from_slice::<Issue>(&bytes)?))
        {
            Ok(issue) if issue.id == id => issue,
            Ok(issue) => {
                warn!(file = %path.display(), id = %issue.id, "Record id does not match file name");
                report.failed += 1;
                continue;
            }
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Skipping unreadable workspace record");
                report.failed += 1;
                continue;
            }
        };

        let created = match store.get(&id) {
            Ok(Some(current)) if same_content(&current, &issue) => {
                report.unchanged += 1;
                continue;
            }
            Ok(Some(_)) => store.update(issue, now).map(|_| false),
            Ok(None) => store.write(&issue).map(|()| true),
            Err(e) => Err(e),
        };

        match created {
            Ok(true) => report.created += 1,
            Ok(false) => report.updated += 1,
            Err(e) => {
                warn!(id = %id, error = %e, "Failed to restore record");
                report.failed += 1;
            }
        }
    }

    info!(
        workspace = %source.name(),
        updated = report.updated,
        created = report.created,
        failed = report.failed,
        "Restored from workspace"
    );
    Ok(report)
}

/// Equal apart from the bookkeeping fields `update` rewrites.
fn same_content(a: &Issue, b: &Issue) -> bool {
    let mut b = b.clone();
    b.version = a.version;
    b.created_at = a.created_at;
    b.updated_at = a.updated_at;
    *a == b
}
