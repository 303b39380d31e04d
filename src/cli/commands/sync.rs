//! Sync command implementations.
//!
//! Wires the project layout, configuration and the `git` binary into a
//! [`SyncEngine`]. The configured sync workspace receives conflict losers
//! in its attic and carries the sync watermark.

use crate::cli::SyncCommands;
use crate::config::{load_config, resolve_layout};
use crate::error::Result;
use crate::git::GitCli;
use crate::sync::{print_pull, print_push, print_status, print_sync, SyncEngine};
use crate::workspace::Workspace;
use std::path::Path;
use std::time::Duration;

/// Execute sync commands.
///
/// # Errors
///
/// Returns an error if the project is not initialized, the project is not
/// inside a git repository, or the sync operation fails.
pub fn execute(command: &SyncCommands, dir: Option<&Path>, json: bool) -> Result<()> {
    let layout = resolve_layout(dir)?;
    let config = load_config(&layout)?;
    let store = layout.store();

    let git = GitCli::discover(
        layout.project_root(),
        Duration::from_secs(config.sync.fetch_timeout_secs),
    )?;
    let workspace = Workspace::named(&layout.workspaces_dir(), &config.sync.workspace)?;
    let engine = SyncEngine::new(&git, &store, &workspace, &config.sync);

    match command {
        SyncCommands::Status => {
            let status = engine.status()?;
            if json {
                println!("{}", serde_json::to_string(&status)?);
            } else {
                print_status(&status);
            }
        }
        SyncCommands::Pull { force } => {
            let report = engine.pull(*force)?;
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                print_pull(&report);
            }
        }
        SyncCommands::Push => {
            let report = engine.push()?;
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                print_push(&report);
            }
        }
        SyncCommands::Run { force } => {
            let report = engine.sync(*force)?;
            if json {
                println!("{}", serde_json::to_string(&report)?);
            } else {
                print_sync(&report);
            }
        }
    }

    Ok(())
}
