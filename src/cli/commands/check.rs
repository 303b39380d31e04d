//! Consistency check command.

use crate::config::resolve_layout;
use crate::error::{Error, Result};
use crate::storage::{check, Finding};
use colored::Colorize;
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct CheckOutput {
    issues: usize,
    findings: Vec<Finding>,
}

/// Execute the check command.
///
/// Findings are reported, never repaired. Any finding makes the command fail
/// with an integrity error ([`Error::DanglingReference`],
/// [`Error::CycleDetected`] or [`Error::DuplicateOrigin`]) so scripts can
/// gate on the exit code.
///
/// # Errors
///
/// Returns an error if the store cannot be read or a finding exists.
pub fn execute(dir: Option<&Path>, json: bool) -> Result<()> {
    let layout = resolve_layout(dir)?;
    let issues = layout.store().list()?;
    let findings = check(&issues);

    if json {
        let output = CheckOutput {
            issues: issues.len(),
            findings: findings.clone(),
        };
        println!("{}", serde_json::to_string(&output)?);
    } else if findings.is_empty() {
        println!("{} {} issue(s) checked, no findings.", "✓".green(), issues.len());
    } else {
        println!("{}", format!("{} finding(s):", findings.len()).yellow().bold());
        for finding in &findings {
            println!("  {finding}");
        }
    }

    match findings.into_iter().next() {
        None => Ok(()),
        Some(Finding::ParentCycle { cycle }) => Err(Error::CycleDetected { path: cycle }),
        Some(Finding::DanglingDependency { from, target, .. }) => {
            Err(Error::DanglingReference { from, target })
        }
        Some(Finding::DanglingParent { from, parent }) => Err(Error::DanglingReference {
            from,
            target: parent,
        }),
        Some(Finding::DuplicateOrigin {
            source,
            original_id,
            ids,
        }) => Err(Error::DuplicateOrigin {
            source_name: source,
            original_id,
            ids,
        }),
    }
}
