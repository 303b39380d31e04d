//! Foreign record format and relation translation.
//!
//! One JSON object per line:
//!
//! ```json
//! {"id":"PROJ-3","title":"Ship it","status":"To Do","type":"Story","priority":"High",
//!  "created_at":"2025-01-20T10:00:00Z","parent":"PROJ-1",
//!  "links":[{"type":"blocks","target":"PROJ-4"}]}
//! ```

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::model::Relation;

/// A record as exported by the foreign tracker.
#[derive(Debug, Clone, Deserialize)]
pub struct ForeignIssue {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub priority: Option<ForeignPriority>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub links: Vec<ForeignLink>,
}

/// Foreign priorities arrive either as numbers or as names.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ForeignPriority {
    Number(i64),
    Name(String),
}

impl ForeignPriority {
    #[must_use]
    pub fn as_text(&self) -> String {
        match self {
            Self::Number(n) => n.to_string(),
            Self::Name(s) => s.clone(),
        }
    }
}

/// A typed link from one foreign record to another.
#[derive(Debug, Clone, Deserialize)]
pub struct ForeignLink {
    #[serde(rename = "type")]
    pub link_type: String,
    pub target: String,
}

/// How a foreign link type maps into the local relation vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkTranslation {
    /// The edge stays on the record being converted.
    Direct(Relation),
    /// The edge belongs on the link target, pointing back at this record.
    Inverse(Relation),
    /// No local relation expresses this link.
    Unsupported,
}

/// Translate a foreign link type.
#[must_use]
pub fn translate_link_type(link_type: &str) -> LinkTranslation {
    match link_type.trim().to_lowercase().replace([' ', '_'], "-").as_str() {
        "blocks" => LinkTranslation::Direct(Relation::Blocks),
        "relates" | "related" | "relates-to" => LinkTranslation::Direct(Relation::RelatesTo),
        "duplicates" => LinkTranslation::Direct(Relation::Duplicates),
        "blocked-by" | "is-blocked-by" => LinkTranslation::Inverse(Relation::Blocks),
        "duplicated-by" | "is-duplicated-by" => LinkTranslation::Inverse(Relation::Duplicates),
        _ => LinkTranslation::Unsupported,
    }
}
