//! Issue record model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Relation between an issue and one of its dependency targets.
///
/// The edge is stored on the issue that owns it: `{blocks, IK-2}` on
/// `IK-1` reads "IK-1 blocks IK-2".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Relation {
    Blocks,
    RelatesTo,
    Duplicates,
}

impl Relation {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::RelatesTo => "relates-to",
            Self::Duplicates => "duplicates",
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Relation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blocks" => Ok(Self::Blocks),
            "relates-to" => Ok(Self::RelatesTo),
            "duplicates" => Ok(Self::Duplicates),
            _ => Err(format!("Unknown relation: {s}")),
        }
    }
}

/// A dependency edge owned by an issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dependency {
    pub relation: Relation,
    pub target_id: String,
}

impl Dependency {
    #[must_use]
    pub fn new(relation: Relation, target_id: impl Into<String>) -> Self {
        Self {
            relation,
            target_id: target_id.into(),
        }
    }
}

/// Provenance block stored under `extensions.<source>` for imported issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub original_id: String,
    pub imported_at: DateTime<Utc>,
}

/// The synchronized unit: one file under `issues/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: String,
    pub kind: String,
    pub priority: i32,
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub dependencies: Vec<Dependency>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Free-form blocks keyed by origin system.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extensions: BTreeMap<String, serde_json::Value>,
}

impl Issue {
    /// Provenance recorded by an import from `source`, if any.
    #[must_use]
    pub fn provenance(&self, source: &str) -> Option<Provenance> {
        self.extensions
            .get(source)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn set_provenance(&mut self, source: &str, provenance: &Provenance) {
        if let Ok(value) = serde_json::to_value(provenance) {
            self.extensions.insert(source.to_string(), value);
        }
    }

    /// Serialize to the on-disk representation (pretty JSON, trailing newline).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_file_bytes(&self) -> serde_json::Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }
}
