//! Pull, push and full sync against the sync branch.
//!
//! Local state is classified by hashing every record file and comparing the
//! result with the tree of the baseline commit (the last commit this clone
//! pulled or pushed). Remote state is the fetched branch tip. A record that
//! changed on both sides is a conflict: the winner stays live and the loser
//! is copied into the workspace attic before anything is overwritten.
//!
//! Records are keyed by local id, so two clones that imported the same
//! foreign record each publish their own copy. After a pull, any such
//! group touched by the pull is reported from its provenance.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::error::Result;
use crate::git::{base_ref, RemoteState, Vcs};
use crate::model::Issue;
use crate::storage::{check, id_from_file_name, record_file_name, Finding, IssueStore};
use crate::workspace::Workspace;

use super::types::{
    ChangeKind, ConflictResolution, Decision, LocalChange, PullOutcome, PullReport, PushOutcome,
    PushReport, Side, SyncError, SyncReport, SyncStatus,
};

/// Record file name → blob id.
type Tree = BTreeMap<String, String>;

/// Synchronizes one issue store with one remote branch.
pub struct SyncEngine<'a, V: Vcs> {
    vcs: &'a V,
    store: &'a IssueStore,
    workspace: &'a Workspace,
    remote: String,
    branch: String,
}

impl<'a, V: Vcs> SyncEngine<'a, V> {
    /// `workspace` is the active workspace: its attic receives conflict
    /// losers and its metadata records the sync watermark.
    #[must_use]
    pub fn new(
        vcs: &'a V,
        store: &'a IssueStore,
        workspace: &'a Workspace,
        settings: &SyncSettings,
    ) -> Self {
        Self {
            vcs,
            store,
            workspace,
            remote: settings.remote.clone(),
            branch: settings.branch.clone(),
        }
    }

    /// Observe local and remote divergence without changing either.
    ///
    /// An unreachable remote is reported, not raised.
    ///
    /// # Errors
    ///
    /// Returns an error if the store or local git objects cannot be read.
    pub fn status(&self) -> Result<SyncStatus> {
        let base = self.vcs.read_ref(&base_ref(&self.branch))?;
        let local = self.local_changes(base.as_deref())?;

        let state = self.vcs.fetch(&self.remote, &self.branch)?;
        let (remote_available, remote_branch_missing, remote_changes) = match &state {
            RemoteState::Unavailable(reason) => {
                warn!(remote = %self.remote, %reason, "Remote unknown; reporting local state only");
                (false, false, Vec::new())
            }
            RemoteState::Missing => (true, true, Vec::new()),
            RemoteState::At(tip) if base.as_deref() == Some(tip.as_str()) => {
                (true, false, Vec::new())
            }
            RemoteState::At(tip) => (true, false, self.vcs.log_range(base.as_deref(), tip)?),
        };

        Ok(SyncStatus {
            synced: remote_available && local.is_empty() && remote_changes.is_empty(),
            local_changes: local.iter().map(ToString::to_string).collect(),
            remote_changes,
            sync_branch: self.branch.clone(),
            remote: self.remote.clone(),
            remote_available,
            remote_branch_missing,
        })
    }

    /// Bring remote changes into the store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteUnavailable`] if the remote cannot be
    /// reached, [`SyncError::Quarantine`] if a conflict loser cannot be
    /// kept, or a git/store error.
    pub fn pull(&self, force: bool) -> Result<PullReport> {
        let tip = self.fetch_tip()?;
        self.pull_from(tip.as_deref(), force)
    }

    /// Publish local changes as a new commit on the sync branch.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RemoteAhead`] if the branch moved since the last
    /// pull, [`SyncError::RemoteUnavailable`], or a git/store error.
    pub fn push(&self) -> Result<PushReport> {
        let tip = self.fetch_tip()?;
        self.push_onto(tip.as_deref())
    }

    /// Pull then push, then advance the workspace watermark.
    ///
    /// With `force`, conflicts keep the local copy and nothing is
    /// quarantined.
    ///
    /// # Errors
    ///
    /// See [`SyncEngine::pull`] and [`SyncEngine::push`].
    pub fn sync(&self, force: bool) -> Result<SyncReport> {
        if force {
            warn!(branch = %self.branch, "Forced sync: conflicts keep the local copy, nothing is quarantined");
        }

        let tip = self.fetch_tip()?;
        let pull = self.pull_from(tip.as_deref(), force)?;
        let push = self.push_onto(tip.as_deref())?;

        let report = SyncReport {
            pull,
            push,
            forced: force,
        };
        self.mark_synced(&report)?;
        Ok(report)
    }

    fn fetch_tip(&self) -> Result<Option<String>> {
        match self.vcs.fetch(&self.remote, &self.branch)? {
            RemoteState::Unavailable(reason) => Err(SyncError::RemoteUnavailable {
                remote: self.remote.clone(),
                reason,
            }
            .into()),
            RemoteState::Missing => Ok(None),
            RemoteState::At(tip) => Ok(Some(tip)),
        }
    }

    fn pull_from(&self, tip: Option<&str>, force: bool) -> Result<PullReport> {
        let Some(tip) = tip else {
            info!(remote = %self.remote, branch = %self.branch, "No remote sync branch yet; nothing to pull");
            return Ok(PullReport::empty(PullOutcome::NoRemoteBranch));
        };

        let base_ref = base_ref(&self.branch);
        let base = self.vcs.read_ref(&base_ref)?;
        if base.as_deref() == Some(tip) {
            debug!(branch = %self.branch, "Already up to date");
            return Ok(PullReport::empty(PullOutcome::UpToDate));
        }

        let mut report = PullReport::empty(PullOutcome::Pulled);
        report.commits = self.vcs.log_range(base.as_deref(), tip)?;

        let base_tree = self.base_tree(base.as_deref())?;
        let remote_tree = self.vcs.record_tree(tip)?;
        let local_tree = self.local_tree(false)?;

        let names: BTreeSet<&String> = base_tree.keys().chain(remote_tree.keys()).collect();
        for name in names {
            let base_blob = base_tree.get(name);
            let remote_blob = remote_tree.get(name);
            if remote_blob == base_blob {
                continue;
            }
            let Some(id) = id_from_file_name(name) else {
                warn!(file = %name, "Ignoring non-record file on sync branch");
                continue;
            };

            let local_blob = local_tree.get(name);
            if local_blob == remote_blob {
                continue;
            }

            let remote_bytes = remote_blob.map(|blob| self.vcs.read_blob(blob)).transpose()?;
            if local_blob == base_blob {
                match remote_bytes {
                    Some(bytes) => {
                        self.store.write_raw(id, &bytes)?;
                        report.applied.push(id.to_string());
                    }
                    None => {
                        self.store.remove(id)?;
                        report.removed.push(id.to_string());
                    }
                }
            } else {
                let local_bytes = self.store.read_raw(id)?;
                report
                    .conflicts
                    .push(self.resolve(id, local_bytes, remote_bytes, force)?);
            }
        }

        self.vcs.update_ref(&base_ref, tip)?;
        report.duplicate_origins = self.duplicate_origins(&report)?;
        info!(
            commits = report.commits.len(),
            applied = report.applied.len(),
            removed = report.removed.len(),
            conflicts = report.conflicts.len(),
            "Pulled sync branch"
        );
        Ok(report)
    }

    fn push_onto(&self, tip: Option<&str>) -> Result<PushReport> {
        let base_ref = base_ref(&self.branch);
        let base = self.vcs.read_ref(&base_ref)?;
        if tip.is_some() && base.as_deref() != tip {
            return Err(SyncError::RemoteAhead {
                branch: self.branch.clone(),
            }
            .into());
        }

        let changes = self.local_changes(base.as_deref())?;
        let commit = match (&base, changes.is_empty()) {
            (None, true) => None,
            // The remote branch vanished; republish the baseline as-is.
            (Some(base), true) if tip.is_none() => Some(base.clone()),
            (Some(_), true) => None,
            (_, false) => {
                let tree = self.local_tree(true)?;
                let message = format!(
                    "issuekeeper: {} change{}",
                    changes.len(),
                    if changes.len() == 1 { "" } else { "s" }
                );
                Some(self.vcs.commit_records(&tree, base.as_deref(), &message)?)
            }
        };

        let Some(commit) = commit else {
            debug!(branch = %self.branch, "Nothing to push");
            return Ok(PushReport {
                outcome: PushOutcome::NothingToPush,
                commit: None,
                changes,
            });
        };

        self.vcs.push(&self.remote, &commit, &self.branch)?;
        self.vcs.update_ref(&base_ref, &commit)?;
        info!(commit = %commit, changes = changes.len(), "Pushed sync branch");

        Ok(PushReport {
            outcome: PushOutcome::Pushed,
            commit: Some(commit),
            changes,
        })
    }

    /// Decide a conflict, quarantine the loser, then apply the winner.
    fn resolve(
        &self,
        id: &str,
        local: Option<Vec<u8>>,
        remote: Option<Vec<u8>>,
        force: bool,
    ) -> Result<ConflictResolution> {
        let (winner, decision) = if force {
            warn!(id = %id, "Conflict overridden by force; keeping local copy");
            (Side::Local, Decision::Forced)
        } else {
            decide(id, local.as_deref(), remote.as_deref())
        };

        let loser = match winner {
            Side::Local => remote.as_deref(),
            Side::Remote => local.as_deref(),
        };
        let quarantined = match loser {
            Some(bytes) if !force => Some(self.workspace.quarantine(id, bytes).map_err(|source| {
                SyncError::Quarantine {
                    id: id.to_string(),
                    path: self.workspace.attic_dir(),
                    source,
                }
            })?),
            _ => None,
        };

        if winner == Side::Remote {
            match &remote {
                Some(bytes) => self.store.write_raw(id, bytes)?,
                None => {
                    self.store.remove(id)?;
                }
            }
        }

        info!(
            id = %id,
            ?winner,
            ?decision,
            attic = ?quarantined,
            "Resolved sync conflict"
        );
        Ok(ConflictResolution {
            id: id.to_string(),
            winner,
            decision,
            quarantined,
        })
    }

    /// Provenance duplicates involving a record the pull wrote or decided.
    fn duplicate_origins(&self, report: &PullReport) -> Result<Vec<Finding>> {
        if report.applied.is_empty() && report.conflicts.is_empty() {
            return Ok(Vec::new());
        }
        let touched: BTreeSet<&str> = report
            .applied
            .iter()
            .map(String::as_str)
            .chain(report.conflicts.iter().map(|c| c.id.as_str()))
            .collect();

        let duplicates: Vec<Finding> = check(&self.store.list()?)
            .into_iter()
            .filter(|f| matches!(f, Finding::DuplicateOrigin { .. }))
            .filter(|f| touched.iter().any(|id| f.involves(id)))
            .collect();
        for finding in &duplicates {
            warn!(%finding, "Foreign record imported on more than one clone");
        }
        Ok(duplicates)
    }

    fn mark_synced(&self, report: &SyncReport) -> Result<()> {
        let mut meta = self.workspace.load_meta()?;
        if report.is_noop() && meta.watermark.is_some() {
            return Ok(());
        }

        let now = Utc::now();
        meta.synced_at = Some(now);
        meta.watermark = Some(now);
        self.workspace.ensure_layout()?;
        self.workspace.save_meta(&meta)?;
        debug!(workspace = %self.workspace.name(), watermark = %now, "Advanced sync watermark");
        Ok(())
    }

    fn base_tree(&self, base: Option<&str>) -> Result<Tree> {
        match base {
            Some(commit) => Ok(self.vcs.record_tree(commit)?),
            None => Ok(Tree::new()),
        }
    }

    /// Blob ids of every record file in the store.
    fn local_tree(&self, write: bool) -> Result<Tree> {
        let ids = self.store.ids()?;
        let paths: Vec<_> = ids.iter().map(|id| self.store.path_for(id)).collect();
        let blobs = self.vcs.hash_files(&paths, write)?;
        Ok(ids
            .iter()
            .map(|id| record_file_name(id))
            .zip(blobs)
            .collect())
    }

    fn local_changes(&self, base: Option<&str>) -> Result<Vec<LocalChange>> {
        let base_tree = self.base_tree(base)?;
        let local_tree = self.local_tree(false)?;

        let names: BTreeSet<&String> = base_tree.keys().chain(local_tree.keys()).collect();
        let mut changes = Vec::new();
        for name in names {
            let kind = match (local_tree.get(name), base_tree.get(name)) {
                (Some(_), None) => ChangeKind::Added,
                (Some(local), Some(base)) if local != base => ChangeKind::Modified,
                (None, Some(_)) => ChangeKind::Deleted,
                _ => continue,
            };
            if let Some(id) = id_from_file_name(name) {
                changes.push(LocalChange {
                    id: id.to_string(),
                    kind,
                });
            }
        }
        Ok(changes)
    }
}

/// Precedence between two diverged copies of the same record.
///
/// A deleted side loses to a modified one, an unparsable copy loses to a
/// parsable one, then higher version and later `updated_at` win. Exact ties
/// keep the local copy.
fn decide(id: &str, local: Option<&[u8]>, remote: Option<&[u8]>) -> (Side, Decision) {
    let (local, remote) = match (local, remote) {
        (None, _) => return (Side::Remote, Decision::DeletedOnOtherSide),
        (_, None) => return (Side::Local, Decision::DeletedOnOtherSide),
        (Some(local), Some(remote)) => (parse(id, local), parse(id, remote)),
    };

    let (local, remote) = match (local, remote) {
        (Some(local), Some(remote)) => (local, remote),
        (Some(_), None) => return (Side::Local, Decision::Unparsable),
        (None, Some(_)) => return (Side::Remote, Decision::Unparsable),
        (None, None) => {
            warn!(id = %id, "Neither copy parses; keeping local copy");
            return (Side::Local, Decision::Tie);
        }
    };

    match local.version.cmp(&remote.version) {
        Ordering::Greater => (Side::Local, Decision::HigherVersion),
        Ordering::Less => (Side::Remote, Decision::HigherVersion),
        Ordering::Equal => match local.updated_at.cmp(&remote.updated_at) {
            Ordering::Greater => (Side::Local, Decision::LaterUpdate),
            Ordering::Less => (Side::Remote, Decision::LaterUpdate),
            Ordering::Equal => {
                warn!(
                    id = %id,
                    version = local.version,
                    updated_at = %local.updated_at,
                    "Conflicting copies tie on version and timestamp; keeping local copy"
                );
                (Side::Local, Decision::Tie)
            }
        },
    }
}

fn parse(id: &str, bytes: &[u8]) -> Option<Issue> {
    serde_json::from_slice(bytes)
        .map_err(|e| debug!(id = %id, error = %e, "Unparsable record copy"))
        .ok()
}
