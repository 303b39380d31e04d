//! Consistency checks over a set of issues.
//!
//! Dangling dependency targets, dangling parents, parent cycles and
//! foreign records imported more than once are reported rather than
//! repaired.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::model::{Issue, Provenance, Relation};

/// A single consistency finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Finding {
    DanglingDependency {
        from: String,
        relation: Relation,
        target: String,
    },
    DanglingParent {
        from: String,
        parent: String,
    },
    ParentCycle {
        /// Issue ids in the cycle, starting at the smallest id.
        cycle: Vec<String>,
    },
    /// Several live issues carry provenance for the same foreign record,
    /// e.g. after two clones imported it independently and synced.
    DuplicateOrigin {
        source: String,
        original_id: String,
        /// Sorted issue ids.
        ids: Vec<String>,
    },
}

impl Finding {
    /// Whether this finding involves the given issue.
    #[must_use]
    pub fn involves(&self, id: &str) -> bool {
        match self {
            Self::DanglingDependency { from, .. } | Self::DanglingParent { from, .. } => from == id,
            Self::ParentCycle { cycle } => cycle.iter().any(|c| c == id),
            Self::DuplicateOrigin { ids, .. } => ids.iter().any(|i| i == id),
        }
    }
}

impl std::fmt::Display for Finding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DanglingDependency {
                from,
                relation,
                target,
            } => write!(f, "{from} {relation} unknown issue {target}"),
            Self::DanglingParent { from, parent } => {
                write!(f, "{from} has unknown parent {parent}")
            }
            Self::ParentCycle { cycle } => {
                write!(f, "parent cycle {} -> {}", cycle.join(" -> "), cycle[0])
            }
            Self::DuplicateOrigin {
                source,
                original_id,
                ids,
            } => write!(f, "{} all imported from {source} {original_id}", ids.join(", ")),
        }
    }
}

/// Check every issue against the full set.
#[must_use]
pub fn check(issues: &[Issue]) -> Vec<Finding> {
    let known: HashSet<&str> = issues.iter().map(|i| i.id.as_str()).collect();
    let mut findings = Vec::new();

    for issue in issues {
        for dep in &issue.dependencies {
            if !known.contains(dep.target_id.as_str()) {
                findings.push(Finding::DanglingDependency {
                    from: issue.id.clone(),
                    relation: dep.relation,
                    target: dep.target_id.clone(),
                });
            }
        }
        if let Some(parent) = &issue.parent_id {
            if !known.contains(parent.as_str()) {
                findings.push(Finding::DanglingParent {
                    from: issue.id.clone(),
                    parent: parent.clone(),
                });
            }
        }
    }

    findings.extend(
        parent_cycles(issues)
            .into_iter()
            .map(|cycle| Finding::ParentCycle { cycle }),
    );
    findings.extend(duplicate_origins(issues));
    findings
}

/// Groups of issues whose provenance names the same foreign record.
fn duplicate_origins(issues: &[Issue]) -> Vec<Finding> {
    let mut origins: BTreeMap<(&str, String), BTreeSet<&str>> = BTreeMap::new();
    for issue in issues {
        for (source, value) in &issue.extensions {
            if let Ok(prov) = serde_json::from_value::<Provenance>(value.clone()) {
                origins
                    .entry((source.as_str(), prov.original_id))
                    .or_default()
                    .insert(issue.id.as_str());
            }
        }
    }

    origins
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|((source, original_id), ids)| Finding::DuplicateOrigin {
            source: source.to_string(),
            original_id,
            ids: ids.into_iter().map(String::from).collect(),
        })
        .collect()
}

/// Every distinct parent cycle, each rotated to start at its smallest id.
fn parent_cycles(issues: &[Issue]) -> Vec<Vec<String>> {
    let parents: HashMap<&str, &str> = issues
        .iter()
        .filter_map(|i| i.parent_id.as_deref().map(|p| (i.id.as_str(), p)))
        .collect();

    let mut cycles = BTreeSet::new();
    let mut cleared: HashSet<&str> = HashSet::new();

    for issue in issues {
        let mut path: Vec<&str> = Vec::new();
        let mut current = issue.id.as_str();
        loop {
            if cleared.contains(current) {
                break;
            }
            if let Some(pos) = path.iter().position(|&p| p == current) {
                let mut cycle: Vec<String> = path[pos..].iter().map(ToString::to_string).collect();
                if let Some(min_pos) = cycle
                    .iter()
                    .enumerate()
                    .min_by(|a, b| a.1.cmp(b.1))
                    .map(|(i, _)| i)
                {
                    cycle.rotate_left(min_pos);
                }
                cycles.insert(cycle);
                break;
            }
            path.push(current);
            match parents.get(current) {
                Some(&next) => current = next,
                None => break,
            }
        }
        cleared.extend(path);
    }

    cycles.into_iter().collect()
}

/// Fail if making `new_parent` the parent of `child` would close a cycle.
///
/// # Errors
///
/// Returns [`Error::CycleDetected`] with the offending path.
pub fn ensure_no_parent_cycle(issues: &[Issue], child: &str, new_parent: &str) -> Result<()> {
    let parents: HashMap<&str, &str> = issues
        .iter()
        .filter(|i| i.id != child)
        .filter_map(|i| i.parent_id.as_deref().map(|p| (i.id.as_str(), p)))
        .collect();

    let mut path = vec![child.to_string()];
    let mut current = new_parent;
    let mut seen = HashSet::new();
    while seen.insert(current) {
        path.push(current.to_string());
        if current == child {
            return Err(Error::CycleDetected { path });
        }
        match parents.get(current) {
            Some(&next) => current = next,
            None => return Ok(()),
        }
    }
    Ok(())
}
