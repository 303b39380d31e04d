//! CLI definitions using clap.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

pub mod commands;

/// Issuekeeper - issue records that travel with your git repository
#[derive(Parser, Debug)]
#[command(name = "ik", author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Project directory or its .issuekeeper directory (default: discovered)
    #[arg(long, global = true, env = "IK_DIR")]
    pub dir: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Increase logging verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (no output except errors)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create .issuekeeper/ in the current directory
    Init {
        /// Prefix for generated issue ids
        #[arg(long)]
        prefix: Option<String>,

        /// Rewrite config.json if already initialized
        #[arg(long)]
        force: bool,
    },

    /// Print version information
    Version,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },

    /// Issue management
    Issue {
        #[command(subcommand)]
        command: IssueCommands,
    },

    /// Import issues exported from another tracker (one JSON object per line)
    Import(ImportArgs),

    /// Report dangling references and parent cycles
    Check,

    /// Staging directories for backups, bulk edits and the outbox
    Workspace {
        #[command(subcommand)]
        command: WorkspaceCommands,
    },

    /// Synchronize with the remote sync branch
    Sync {
        #[command(subcommand)]
        command: SyncCommands,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
    Elvish,
}

// ============================================================================
// Issue Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum IssueCommands {
    /// Create a new issue
    Create(IssueCreateArgs),

    /// Update an issue
    Update(IssueUpdateArgs),

    /// Show issue details
    Show {
        /// Issue ID
        id: String,
    },

    /// List issues
    List(IssueListArgs),

    /// Delete issue(s)
    Delete {
        /// Issue IDs (one or more)
        #[arg(required = true)]
        ids: Vec<String>,
    },
}

#[derive(Args, Debug)]
pub struct IssueCreateArgs {
    /// Issue title
    pub title: String,

    /// Issue description
    #[arg(short, long)]
    pub description: Option<String>,

    /// Issue kind (task, bug, feature, epic, chore)
    #[arg(short = 't', long, default_value = "task")]
    pub kind: String,

    /// Status (backlog, open, in_progress, blocked, closed, deferred)
    #[arg(short, long, default_value = "open")]
    pub status: String,

    /// Priority (0=lowest to 4=critical, P0-P4, or a name like "high")
    #[arg(short, long, default_value = "2")]
    pub priority: String,

    /// Parent issue ID
    #[arg(long)]
    pub parent: Option<String>,

    /// Issues this one blocks (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub blocks: Vec<String>,

    /// Related issues (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub relates_to: Vec<String>,

    /// Issue this one duplicates
    #[arg(long)]
    pub duplicates: Option<String>,
}

#[derive(Args, Debug)]
pub struct IssueUpdateArgs {
    /// Issue ID
    pub id: String,

    /// New title
    #[arg(long)]
    pub title: Option<String>,

    /// New description
    #[arg(short, long)]
    pub description: Option<String>,

    /// New kind
    #[arg(short = 't', long)]
    pub kind: Option<String>,

    /// New status
    #[arg(short, long)]
    pub status: Option<String>,

    /// New priority
    #[arg(short, long)]
    pub priority: Option<String>,

    /// New parent issue ID
    #[arg(long, conflicts_with = "clear_parent")]
    pub parent: Option<String>,

    /// Remove the parent
    #[arg(long)]
    pub clear_parent: bool,

    /// Add "blocks" dependencies (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub blocks: Vec<String>,

    /// Add "relates-to" dependencies (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub relates_to: Vec<String>,

    /// Remove every dependency on these targets (comma-separated)
    #[arg(long, value_delimiter = ',')]
    pub remove_dep: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct IssueListArgs {
    /// Filter by status (default: all)
    #[arg(short, long)]
    pub status: Option<String>,

    /// Filter by kind
    #[arg(short = 't', long)]
    pub kind: Option<String>,

    /// Maximum issues to return
    #[arg(short, long)]
    pub limit: Option<usize>,
}

// ============================================================================
// Import
// ============================================================================

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Newline-delimited JSON file
    pub file: PathBuf,

    /// Name of the foreign system (keys the mapping file and provenance)
    #[arg(short, long)]
    pub source: String,
}

// ============================================================================
// Workspace Commands
// ============================================================================

/// Exactly one of these selects the target workspace.
#[derive(Args, Debug, Default)]
pub struct WorkspaceTarget {
    /// Named workspace under .issuekeeper/workspaces/
    #[arg(short, long)]
    pub workspace: Option<String>,

    /// Arbitrary directory used as a workspace
    #[arg(long)]
    pub path: Option<PathBuf>,

    /// The reserved outbox workspace
    #[arg(long)]
    pub outbox: bool,
}

#[derive(Subcommand, Debug)]
pub enum WorkspaceCommands {
    /// Copy records and mappings into a workspace
    Save {
        #[command(flatten)]
        target: WorkspaceTarget,

        /// Only records updated since the last sync
        #[arg(long)]
        updates_only: bool,
    },

    /// Bring edited workspace records back into the store
    Restore {
        #[command(flatten)]
        target: WorkspaceTarget,
    },

    /// List named workspaces
    List,

    /// Delete a named workspace (no-op if absent)
    Delete {
        /// Workspace name
        name: String,
    },
}

// ============================================================================
// Sync Commands
// ============================================================================

#[derive(Subcommand, Debug)]
pub enum SyncCommands {
    /// Show local and remote changes without modifying anything
    Status,

    /// Apply remote changes to the store
    Pull {
        /// Keep the local copy of every conflict without quarantine
        #[arg(long)]
        force: bool,
    },

    /// Publish local changes to the sync branch
    Push,

    /// Pull, then push
    Run {
        /// Keep the local copy of every conflict without quarantine
        #[arg(long)]
        force: bool,
    },
}
