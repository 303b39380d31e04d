//! Issue command implementations.

use crate::cli::{IssueCommands, IssueCreateArgs, IssueListArgs, IssueUpdateArgs};
use crate::config::{load_config, resolve_layout};
use crate::error::Result;
use crate::model::{Dependency, Issue, Relation};
use crate::storage::{ensure_no_parent_cycle, IssueStore, NewIssue};
use crate::validate::{normalize_kind, normalize_priority, normalize_status};
use chrono::Utc;
use colored::Colorize;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Output for issue create.
#[derive(Serialize)]
struct IssueCreateOutput<'a> {
    id: &'a str,
    title: &'a str,
    status: &'a str,
    kind: &'a str,
    priority: i32,
}

/// Output for issue list.
#[derive(Serialize)]
struct IssueListOutput {
    issues: Vec<Issue>,
    count: usize,
}

#[derive(Serialize)]
struct IssueDeleteOutput {
    deleted: Vec<String>,
    missing: Vec<String>,
}

/// Execute issue commands.
///
/// # Errors
///
/// Returns an error if the project is not initialized, input fails
/// validation, or the store cannot be read or written.
pub fn execute(command: &IssueCommands, dir: Option<&Path>, json: bool) -> Result<()> {
    let layout = resolve_layout(dir)?;
    let store = layout.store();

    match command {
        IssueCommands::Create(args) => {
            let prefix = load_config(&layout)?.id_prefix;
            create(&store, &prefix, args, json)
        }
        IssueCommands::Update(args) => update(&store, args, json),
        IssueCommands::Show { id } => show(&store, id, json),
        IssueCommands::List(args) => list(&store, args, json),
        IssueCommands::Delete { ids } => delete(&store, ids, json),
    }
}

fn dependencies_from(blocks: &[String], relates_to: &[String]) -> Vec<Dependency> {
    blocks
        .iter()
        .map(|t| Dependency::new(Relation::Blocks, t.trim()))
        .chain(
            relates_to
                .iter()
                .map(|t| Dependency::new(Relation::RelatesTo, t.trim())),
        )
        .filter(|d| !d.target_id.is_empty())
        .collect()
}

fn create(store: &IssueStore, prefix: &str, args: &IssueCreateArgs, json: bool) -> Result<()> {
    let mut dependencies = dependencies_from(&args.blocks, &args.relates_to);
    if let Some(ref target) = args.duplicates {
        dependencies.push(Dependency::new(Relation::Duplicates, target.trim()));
    }

    // Dependency targets may be created later; parents must already exist.
    if let Some(ref parent) = args.parent {
        store.require(parent)?;
    }

    let new = NewIssue {
        title: args.title.clone(),
        description: args.description.clone(),
        status: normalize_status(&args.status)?,
        kind: normalize_kind(&args.kind)?,
        priority: normalize_priority(&args.priority)?,
        parent_id: args.parent.clone(),
        dependencies,
    };

    let issue = store.create(new, prefix, Utc::now())?;
    info!(id = %issue.id, "Created issue");

    if json {
        let output = IssueCreateOutput {
            id: &issue.id,
            title: &issue.title,
            status: &issue.status,
            kind: &issue.kind,
            priority: issue.priority,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else {
        println!("Created issue: {} ({})", issue.id.bold(), issue.title);
    }
    Ok(())
}

fn update(store: &IssueStore, args: &IssueUpdateArgs, json: bool) -> Result<()> {
    let mut issue = store.require(&args.id)?;

    if let Some(ref title) = args.title {
        issue.title.clone_from(title);
    }
    if let Some(ref description) = args.description {
        issue.description = Some(description.clone()).filter(|d| !d.is_empty());
    }
    if let Some(ref status) = args.status {
        issue.status = normalize_status(status)?;
    }
    if let Some(ref kind) = args.kind {
        issue.kind = normalize_kind(kind)?;
    }
    if let Some(ref priority) = args.priority {
        issue.priority = normalize_priority(priority)?;
    }

    if args.clear_parent {
        issue.parent_id = None;
    } else if let Some(ref parent) = args.parent {
        store.require(parent)?;
        ensure_no_parent_cycle(&store.list()?, &issue.id, parent)?;
        issue.parent_id = Some(parent.clone());
    }

    if !args.remove_dep.is_empty() {
        issue
            .dependencies
            .retain(|d| !args.remove_dep.iter().any(|t| t.trim() == d.target_id));
    }
    for dep in dependencies_from(&args.blocks, &args.relates_to) {
        if !issue.dependencies.contains(&dep) {
            issue.dependencies.push(dep);
        }
    }

    let issue = store.update(issue, Utc::now())?;
    info!(id = %issue.id, version = issue.version, "Updated issue");

    if json {
        println!("{}", serde_json::to_string(&issue)?);
    } else {
        println!("Updated issue: {} (version {})", issue.id.bold(), issue.version);
    }
    Ok(())
}

fn show(store: &IssueStore, id: &str, json: bool) -> Result<()> {
    let issue = store.require(id)?;

    if json {
        println!("{}", serde_json::to_string(&issue)?);
        return Ok(());
    }

    println!("[{}] {}", issue.id, issue.title.bold());
    println!();
    println!("Status:   {}", issue.status);
    println!("Kind:     {}", issue.kind);
    println!("Priority: {}", issue.priority);
    println!("Version:  {}", issue.version);
    println!("Updated:  {}", issue.updated_at.to_rfc3339());
    if let Some(ref parent) = issue.parent_id {
        println!("Parent:   {parent}");
    }
    if !issue.dependencies.is_empty() {
        println!();
        println!("Dependencies:");
        for dep in &issue.dependencies {
            println!("  {} {}", dep.relation, dep.target_id);
        }
    }
    if let Some(ref desc) = issue.description {
        println!();
        println!("Description:");
        println!("{desc}");
    }
    for source in issue.extensions.keys() {
        if let Some(provenance) = issue.provenance(source) {
            println!();
            println!(
                "Imported from {source} as {} at {}",
                provenance.original_id,
                provenance.imported_at.to_rfc3339()
            );
        }
    }
    Ok(())
}

fn list(store: &IssueStore, args: &IssueListArgs, json: bool) -> Result<()> {
    let status = args.status.as_deref().map(normalize_status).transpose()?;
    let kind = args.kind.as_deref().map(normalize_kind).transpose()?;

    let mut issues: Vec<Issue> = store
        .list()?
        .into_iter()
        .filter(|i| status.as_ref().is_none_or(|s| &i.status == s))
        .filter(|i| kind.as_ref().is_none_or(|k| &i.kind == k))
        .collect();

    // Most urgent first, then most recently touched.
    issues.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    if let Some(limit) = args.limit {
        issues.truncate(limit);
    }

    if json {
        let output = IssueListOutput {
            count: issues.len(),
            issues,
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if issues.is_empty() {
        println!("No issues found.");
    } else {
        print_issue_list(&issues);
    }
    Ok(())
}

fn print_issue_list(issues: &[Issue]) {
    println!("Issues ({} found):", issues.len());
    println!();
    for issue in issues {
        let status_icon = match issue.status.as_str() {
            "backlog" => "·",
            "open" => "○",
            "in_progress" => "●",
            "blocked" => "⊘",
            "closed" => "✓",
            "deferred" => "◌",
            _ => "?",
        };
        let priority_str = match issue.priority {
            4 => "!!",
            3 => "! ",
            1 => "- ",
            0 => "--",
            _ => "  ",
        };
        println!(
            "{} [{}] {} {} ({})",
            status_icon, issue.id, priority_str, issue.title, issue.kind
        );
        if let Some(ref desc) = issue.description {
            let truncated = match desc.char_indices().nth(60) {
                Some((cut, _)) => format!("{}...", &desc[..cut]),
                None => desc.clone(),
            };
            println!("        {truncated}");
        }
    }
}

fn delete(store: &IssueStore, ids: &[String], json: bool) -> Result<()> {
    let mut deleted = Vec::new();
    let mut missing = Vec::new();
    for id in ids {
        if store.remove(id)? {
            info!(id = %id, "Deleted issue");
            deleted.push(id.clone());
        } else {
            missing.push(id.clone());
        }
    }

    if json {
        println!("{}", serde_json::to_string(&IssueDeleteOutput { deleted, missing })?);
    } else {
        for id in &deleted {
            println!("Deleted issue: {id}");
        }
        for id in &missing {
            println!("{} {id} (not found)", "Skipped".dimmed());
        }
    }
    Ok(())
}
