//! Import from foreign trackers.
//!
//! - **Mapping**: persistent foreign→local id table per source
//! - **Foreign**: the newline-delimited JSON input format and link vocabulary
//! - **Translator**: two-pass batch conversion with provenance-aware merge
//!
//! # Example
//!
//! ```ignore
//! use ik::import::{IdMapper, Importer};
//!
//! let mut mapper = IdMapper::load(&layout.mapping_path("jira"), "jira", "IK");
//! let stats = Importer::new(&store, &mut mapper).import_file(&path)?;
//! ```

mod foreign;
mod mapping;
mod translator;
mod types;

pub use foreign::{translate_link_type, ForeignIssue, ForeignLink, ForeignPriority, LinkTranslation};
pub use mapping::{IdMapper, MappingConflict};
pub use translator::Importer;
pub use types::{GapReason, ImportStats, TranslationGap};
