//! Workspace command implementations.

use crate::cli::{WorkspaceCommands, WorkspaceTarget};
use crate::config::{load_config, resolve_layout, Config, Layout};
use crate::error::{Error, Result};
use crate::workspace::{
    delete_workspace, list_workspaces, restore_from_workspace, save_to_workspace,
    target_directory, SaveMode, SaveOptions, Workspace, WorkspaceSelector,
};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct DeleteOutput<'a> {
    name: &'a str,
    deleted: bool,
}

/// Execute workspace commands.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the selector is
/// missing or ambiguous, or the workspace cannot be read or written.
pub fn execute(command: &WorkspaceCommands, dir: Option<&Path>, json: bool) -> Result<()> {
    let layout = resolve_layout(dir)?;

    match command {
        WorkspaceCommands::Save {
            target,
            updates_only,
        } => save(&layout, target, *updates_only, json),
        WorkspaceCommands::Restore { target } => restore(&layout, target, json),
        WorkspaceCommands::List => list(&layout, json),
        WorkspaceCommands::Delete { name } => delete(&layout, name, json),
    }
}

fn selector(target: &WorkspaceTarget) -> WorkspaceSelector {
    WorkspaceSelector {
        name: target.workspace.clone(),
        path: target.path.clone(),
        outbox: target.outbox,
    }
}

/// The watermark an updates-only save filters on: the target's own, or the
/// sync workspace's when the target has never been synced.
fn watermark_for(layout: &Layout, config: &Config, target: &Workspace) -> Result<Option<DateTime<Utc>>> {
    if let Some(watermark) = target.load_meta()?.watermark {
        return Ok(Some(watermark));
    }
    let sync = Workspace::named(&layout.workspaces_dir(), &config.sync.workspace)?;
    Ok(sync.load_meta()?.watermark)
}

fn save(layout: &Layout, target: &WorkspaceTarget, updates_only: bool, json: bool) -> Result<()> {
    let config = load_config(layout)?;
    let workspace = target_directory(&layout.workspaces_dir(), &selector(target))?;

    let watermark = if updates_only {
        watermark_for(layout, &config, &workspace)?
    } else {
        None
    };
    let options = SaveOptions {
        updates_only,
        watermark,
    };
    let report = save_to_workspace(&layout.store(), &layout.mappings_dir(), &workspace, &options)?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    println!(
        "Saved {} record(s) and {} mapping file(s) to {}",
        report.copied,
        report.mappings,
        report.path.display()
    );
    match report.mode {
        SaveMode::UpdatesOnly => {
            println!("  {} unchanged record(s) left out", report.unchanged);
        }
        SaveMode::DegradedFull => println!(
            "  {}",
            "No previous sync recorded; saved every record.".yellow()
        ),
        SaveMode::Full => {}
    }
    Ok(())
}

fn restore(layout: &Layout, target: &WorkspaceTarget, json: bool) -> Result<()> {
    let workspace = target_directory(&layout.workspaces_dir(), &selector(target))?;
    if !workspace.exists() {
        return Err(Error::WorkspaceNotFound {
            name: workspace.name().to_string(),
        });
    }

    let report = restore_from_workspace(&layout.store(), &workspace, Utc::now())?;

    if json {
        println!("{}", serde_json::to_string(&report)?);
    } else {
        println!(
            "Restored from {}: {} updated, {} created, {} unchanged",
            workspace.name(),
            report.updated,
            report.created,
            report.unchanged
        );
        if report.failed > 0 {
            println!(
                "  {} {} record(s) could not be restored (see log)",
                "!".yellow().bold(),
                report.failed
            );
        }
    }
    Ok(())
}

fn list(layout: &Layout, json: bool) -> Result<()> {
    let workspaces = list_workspaces(&layout.workspaces_dir())?;

    if json {
        println!("{}", serde_json::to_string(&workspaces)?);
        return Ok(());
    }
    if workspaces.is_empty() {
        println!("No workspaces.");
        return Ok(());
    }

    println!("Workspaces ({}):", workspaces.len());
    println!();
    for ws in &workspaces {
        let synced = ws
            .meta
            .synced_at
            .map_or_else(|| "never synced".to_string(), |t| format!("synced {}", t.to_rfc3339()));
        let attic = if ws.attic > 0 {
            format!(", {} in attic", ws.attic).yellow().to_string()
        } else {
            String::new()
        };
        println!("  {} {} record(s){attic} ({synced})", ws.name.bold(), ws.issues);
    }
    Ok(())
}

fn delete(layout: &Layout, name: &str, json: bool) -> Result<()> {
    let deleted = delete_workspace(&layout.workspaces_dir(), name)?;

    if json {
        println!("{}", serde_json::to_string(&DeleteOutput { name, deleted })?);
    } else if deleted {
        println!("Deleted workspace: {name}");
    } else {
        println!("{}", format!("No workspace named {name}.").dimmed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workspace::WorkspaceMeta;
    use chrono::TimeZone;
    use std::fs;
    use tempfile::TempDir;

    fn layout() -> (TempDir, Layout) {
        let temp = TempDir::new().unwrap();
        let layout = Layout::for_project(temp.path());
        fs::create_dir_all(layout.issues_dir()).unwrap();
        fs::create_dir_all(layout.workspaces_dir()).unwrap();
        (temp, layout)
    }

    #[test]
    fn test_watermark_falls_back_to_sync_workspace() {
        let (_temp, layout) = layout();
        let config = Config::default();
        let synced = Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap();
        let sync = Workspace::named(&layout.workspaces_dir(), &config.sync.workspace).unwrap();
        sync.save_meta(&WorkspaceMeta {
            watermark: Some(synced),
            ..WorkspaceMeta::default()
        })
        .unwrap();

        let backup = Workspace::named(&layout.workspaces_dir(), "backup").unwrap();
        assert_eq!(watermark_for(&layout, &config, &backup).unwrap(), Some(synced));
    }

    #[test]
    fn test_watermark_prefers_target() {
        let (_temp, layout) = layout();
        let config = Config::default();
        let own = Utc.with_ymd_and_hms(2025, 4, 1, 0, 0, 0).unwrap();
        let backup = Workspace::named(&layout.workspaces_dir(), "backup").unwrap();
        backup
            .save_meta(&WorkspaceMeta {
                watermark: Some(own),
                ..WorkspaceMeta::default()
            })
            .unwrap();

        assert_eq!(watermark_for(&layout, &config, &backup).unwrap(), Some(own));
    }

    #[test]
    fn test_save_without_selector_fails() {
        let (_temp, layout) = layout();
        let err = save(&layout, &WorkspaceTarget::default(), false, true).unwrap_err();
        assert!(matches!(err, Error::NoWorkspaceSelected));
    }

    #[test]
    fn test_restore_missing_workspace() {
        let (_temp, layout) = layout();
        let target = WorkspaceTarget {
            workspace: Some("nothing-here".to_string()),
            ..WorkspaceTarget::default()
        };
        let err = restore(&layout, &target, true).unwrap_err();
        assert!(matches!(err, Error::WorkspaceNotFound { .. }));
    }
}
