//! Git-branch synchronization of the issue store.
//!
//! - **Status**: classify local and remote divergence without mutating either
//! - **Pull**: apply remote changes, resolving conflicts into the attic
//! - **Push**: publish local changes as one commit on the sync branch
//! - **Sync**: pull then push, advancing the workspace watermark
//!
//! # Architecture
//!
//! The sync branch carries `issues/<ID>.json`. Each clone remembers the last
//! commit it agreed on with the remote (the baseline). Local changes are
//! record files whose blob differs from the baseline tree; remote changes
//! are the commits between the baseline and the fetched tip.
//!
//! # Example
//!
//! ```ignore
//! use ik::sync::SyncEngine;
//!
//! let engine = SyncEngine::new(&git, &store, &workspace, &config.sync);
//! let status = engine.status()?;
//! if !status.synced {
//!     let report = engine.sync(false)?;
//! }
//! ```

mod engine;
mod status;
mod types;

pub use engine::SyncEngine;
pub use status::{print_pull, print_push, print_status, print_sync};
pub use types::{
    ChangeKind, ConflictResolution, Decision, LocalChange, PullOutcome, PullReport, PushOutcome,
    PushReport, Side, SyncError, SyncReport, SyncStatus,
};
