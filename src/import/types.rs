//! Import result types.

use serde::Serialize;

use crate::storage::Finding;

/// Why a foreign link could not be carried over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GapReason {
    /// The link type has no local relation.
    UnsupportedRelation,
    /// The inverse edge would have to be written into an issue that is not
    /// part of this batch.
    InverseTargetOutsideBatch,
}

/// A foreign link that was recorded instead of translated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TranslationGap {
    /// Local id of the record carrying the link.
    pub issue_id: String,
    pub foreign_id: String,
    pub link_type: String,
    pub target: String,
    pub reason: GapReason,
}

/// Statistics for an import batch.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    /// Well-formed records read from the input.
    pub seen: usize,
    /// New issues written.
    pub imported: usize,
    /// Existing issues replaced by a strictly newer foreign copy.
    pub merged: usize,
    /// Existing issues left alone because the foreign copy was not newer.
    pub skipped: usize,
    /// Lines that were not valid foreign records.
    pub malformed: usize,
    /// Records repeating a foreign id already seen in the batch.
    pub duplicates: usize,
    /// Records whose write failed.
    pub failed: usize,
    /// Dependency or parent references whose target could not be resolved.
    pub dropped_references: usize,
    pub gaps: Vec<TranslationGap>,
    /// Consistency findings touching the written issues.
    pub findings: Vec<Finding>,
    /// Whether the identifier mapping was written at the end of the batch.
    pub mapping_saved: bool,
}

impl ImportStats {
    /// Records that ended up written.
    #[must_use]
    pub fn written(&self) -> usize {
        self.imported + self.merged
    }
}
