//! Field normalization and name validation.
//!
//! Statuses, kinds and priorities resolve in three tiers: exact match,
//! synonym lookup, then an error carrying the closest suggestion. Record
//! ids and workspace names share one restricted charset so they can be
//! used as file and directory names without path traversal.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use crate::error::{Error, Result};

pub static VALID_STATUSES: LazyLock<HashSet<&str>> = LazyLock::new(|| {
    ["backlog", "open", "in_progress", "blocked", "closed", "deferred"]
        .into_iter()
        .collect()
});

pub static VALID_KINDS: LazyLock<HashSet<&str>> =
    LazyLock::new(|| ["task", "bug", "feature", "epic", "chore"].into_iter().collect());

static STATUS_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("done", "closed"),
        ("resolved", "closed"),
        ("fixed", "closed"),
        ("wontfix", "closed"),
        ("to do", "open"),
        ("todo", "open"),
        ("new", "open"),
        ("in progress", "in_progress"),
        ("in-progress", "in_progress"),
        ("wip", "in_progress"),
        ("on hold", "deferred"),
        ("later", "deferred"),
        ("waiting", "blocked"),
    ]
    .into_iter()
    .collect()
});

static KIND_SYNONYMS: LazyLock<HashMap<&str, &str>> = LazyLock::new(|| {
    [
        ("story", "feature"),
        ("enhancement", "feature"),
        ("improvement", "feature"),
        ("defect", "bug"),
        ("incident", "bug"),
        ("sub-task", "task"),
        ("subtask", "task"),
        ("initiative", "epic"),
        ("cleanup", "chore"),
        ("refactor", "chore"),
    ]
    .into_iter()
    .collect()
});

/// Priority names map to 0-4 (0=lowest, 4=critical).
static PRIORITY_SYNONYMS: LazyLock<HashMap<&str, i32>> = LazyLock::new(|| {
    [
        ("critical", 4),
        ("blocker", 4),
        ("highest", 4),
        ("high", 3),
        ("major", 3),
        ("medium", 2),
        ("normal", 2),
        ("low", 1),
        ("minor", 1),
        ("lowest", 0),
        ("trivial", 0),
        ("backlog", 0),
    ]
    .into_iter()
    .collect()
});

/// Normalize a status string.
///
/// # Errors
///
/// Returns [`Error::InvalidStatus`] with the closest suggestion.
pub fn normalize_status(input: &str) -> Result<String> {
    normalize(input, &VALID_STATUSES, &STATUS_SYNONYMS).map_err(|suggestion| {
        Error::InvalidStatus {
            value: input.to_string(),
            suggestion,
        }
    })
}

/// Normalize an issue kind string.
///
/// # Errors
///
/// Returns [`Error::InvalidKind`] with the closest suggestion.
pub fn normalize_kind(input: &str) -> Result<String> {
    normalize(input, &VALID_KINDS, &KIND_SYNONYMS).map_err(|suggestion| Error::InvalidKind {
        value: input.to_string(),
        suggestion,
    })
}

/// Normalize a priority from a digit, P-notation or name.
///
/// # Errors
///
/// Returns [`Error::InvalidPriority`] when the value is out of range or unknown.
pub fn normalize_priority(input: &str) -> Result<i32> {
    let lower = input.trim().to_lowercase();
    let digits = lower.strip_prefix('p').unwrap_or(&lower);

    if let Ok(n) = digits.parse::<i32>() {
        if (0..=4).contains(&n) {
            return Ok(n);
        }
    } else if let Some(&n) = PRIORITY_SYNONYMS.get(lower.as_str()) {
        return Ok(n);
    }

    Err(Error::InvalidPriority {
        value: input.to_string(),
        suggestion: None,
    })
}

fn normalize(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> std::result::Result<String, Option<String>> {
    let lower = input.trim().to_lowercase();

    if valid.contains(lower.as_str()) {
        return Ok(lower);
    }
    if let Some(&canonical) = synonyms.get(lower.as_str()) {
        return Ok(canonical.to_string());
    }
    Err(find_closest_match(&lower, valid, synonyms))
}

/// Find the closest matching value across valid set and synonyms.
fn find_closest_match(
    input: &str,
    valid: &HashSet<&str>,
    synonyms: &HashMap<&str, &str>,
) -> Option<String> {
    valid
        .iter()
        .chain(synonyms.keys())
        .map(|&v| (levenshtein_distance(input, v), v))
        .filter(|(dist, _)| *dist <= 3)
        .min()
        .map(|(_, v)| synonyms.get(v).copied().unwrap_or(v).to_string())
}

/// Whether `name` is usable as a record id or workspace name.
///
/// 1-64 characters of `[A-Za-z0-9._-]`, starting with a letter or digit.
/// This rules out empty names, `.`/`..` and any path separator.
#[must_use]
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    name.len() <= 64
        && first.is_ascii_alphanumeric()
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}

/// Compute the Levenshtein edit distance between two strings.
#[must_use]
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 1..=a.len() {
        curr[0] = i;
        for j in 1..=b.len() {
            let cost = usize::from(a[i - 1] != b[j - 1]);
            curr[j] = (prev[j] + 1)
                .min(curr[j - 1] + 1)
                .min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// Find existing IDs similar to the searched ID.
///
/// Returns up to `max` suggestions with edit distance ≤ 3,
/// sorted by distance then alphabetically.
#[must_use]
pub fn find_similar_ids(searched: &str, existing: &[String], max: usize) -> Vec<String> {
    let mut candidates: Vec<(usize, &str)> = existing
        .iter()
        .map(|id| (levenshtein_distance(searched, id), id.as_str()))
        .filter(|(dist, _)| *dist <= 3)
        .collect();

    candidates.sort_unstable();

    candidates
        .into_iter()
        .take(max)
        .map(|(_, id)| id.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_status() {
        assert_eq!(normalize_status("open").unwrap(), "open");
        assert_eq!(normalize_status("Done").unwrap(), "closed");
        assert_eq!(normalize_status("In Progress").unwrap(), "in_progress");
        assert!(matches!(
            normalize_status("clsoed"),
            Err(Error::InvalidStatus { suggestion: Some(ref s), .. }) if s == "closed"
        ));
    }

    #[test]
    fn test_normalize_kind() {
        assert_eq!(normalize_kind("bug").unwrap(), "bug");
        assert_eq!(normalize_kind("Story").unwrap(), "feature");
        assert!(normalize_kind("nonsense-kind-value").is_err());
    }

    #[test]
    fn test_normalize_priority() {
        assert_eq!(normalize_priority("2").unwrap(), 2);
        assert_eq!(normalize_priority("P3").unwrap(), 3);
        assert_eq!(normalize_priority("Blocker").unwrap(), 4);
        assert!(normalize_priority("7").is_err());
        assert!(normalize_priority("nonsense").is_err());
    }

    #[test]
    fn test_is_valid_name() {
        assert!(is_valid_name("backup-2025.01"));
        assert!(is_valid_name("IK-a1b2"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("."));
        assert!(!is_valid_name(".."));
        assert!(!is_valid_name("../etc"));
        assert!(!is_valid_name("a/b"));
        assert!(!is_valid_name("-leading"));
        assert!(!is_valid_name(&"x".repeat(65)));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
    }

    #[test]
    fn test_find_similar_ids() {
        let ids = vec!["IK-a1b2".to_string(), "IK-a1b3".to_string(), "IK-zzzzzz".to_string()];
        let result = find_similar_ids("IK-a1b1", &ids, 3);
        assert_eq!(result, vec!["IK-a1b2".to_string(), "IK-a1b3".to_string()]);
    }
}
