//! Human-readable rendering of sync status and reports.

use colored::Colorize;

use super::types::{PullOutcome, PullReport, PushOutcome, PushReport, Side, SyncReport, SyncStatus};

/// Print sync status to stdout in a human-readable format.
pub fn print_status(status: &SyncStatus) {
    println!("{}", "Sync Status".bold().underline());
    println!();
    println!("  Remote:  {}", status.remote);
    println!("  Branch:  {}", status.sync_branch);
    println!();

    if status.synced {
        println!("{}", "In sync with the remote branch.".green());
        return;
    }

    if status.local_changes.is_empty() {
        println!("{}", "No local changes.".dimmed());
    } else {
        println!("{}", "Local Changes:".yellow().bold());
        for change in &status.local_changes {
            println!("  {change}");
        }
    }
    println!();

    if !status.remote_available {
        println!("{}", "Remote unavailable; remote changes unknown.".red());
    } else if status.remote_branch_missing {
        println!(
            "{}",
            "Remote sync branch does not exist yet. Run 'ik sync push' to create it.".dimmed()
        );
    } else if status.remote_changes.is_empty() {
        println!("{}", "No remote changes.".dimmed());
    } else {
        println!("{}", "Remote Changes:".blue().bold());
        for change in &status.remote_changes {
            println!("  {change}");
        }
        println!();
        println!("{}", "Run 'ik sync run' to pull and push.".dimmed());
    }
}

/// Print the result of a pull.
pub fn print_pull(report: &PullReport) {
    match report.outcome {
        PullOutcome::NoRemoteBranch => {
            println!("{}", "No remote sync branch yet; nothing to pull.".dimmed());
            return;
        }
        PullOutcome::UpToDate => {
            println!("{}", "Already up to date.".green());
            return;
        }
        PullOutcome::Pulled => {}
    }

    println!(
        "Pulled {} commit(s): {} applied, {} removed, {} conflict(s)",
        report.commits.len(),
        report.applied.len(),
        report.removed.len(),
        report.conflicts.len()
    );

    for conflict in &report.conflicts {
        let winner = match conflict.winner {
            Side::Local => "local".green(),
            Side::Remote => "remote".blue(),
        };
        match &conflict.quarantined {
            Some(path) => println!(
                "  {} {} kept {winner} ({:?}), other copy in {}",
                "!".yellow().bold(),
                conflict.id,
                conflict.decision,
                path.display()
            ),
            None => println!(
                "  {} {} kept {winner} ({:?})",
                "!".yellow().bold(),
                conflict.id,
                conflict.decision
            ),
        }
    }

    if !report.duplicate_origins.is_empty() {
        println!();
        println!("{}", "Imported on more than one clone:".yellow().bold());
        for finding in &report.duplicate_origins {
            println!("  {finding}");
        }
        println!("{}", "Merge the copies by hand and delete the extras.".dimmed());
    }
}

/// Print the result of a push.
pub fn print_push(report: &PushReport) {
    match (&report.outcome, &report.commit) {
        (PushOutcome::Pushed, Some(commit)) => {
            let short = commit.get(..10).unwrap_or(commit);
            println!("Pushed {} change(s) as {short}", report.changes.len());
            for change in &report.changes {
                println!("  {change}");
            }
        }
        _ => println!("{}", "Nothing to push.".dimmed()),
    }
}

/// Print the result of a full sync.
pub fn print_sync(report: &SyncReport) {
    if report.forced {
        println!("{}", "Forced sync: conflicts kept the local copy.".yellow());
    }
    print_pull(&report.pull);
    print_push(&report.push);

    let quarantined = report.pull.quarantined();
    if quarantined > 0 {
        println!();
        println!(
            "{}",
            format!("{quarantined} conflicting copy(ies) kept in the attic for manual review.")
                .yellow()
        );
    }
}
