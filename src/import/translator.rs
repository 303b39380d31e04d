//! Batch import of foreign records.
//!
//! The import runs in two passes over the whole batch:
//!
//! 1. **Assign**: every foreign record gets its local id, either from an
//!    existing issue whose provenance names the foreign id, or from the
//!    [`IdMapper`]. The output is a complete foreign→local table.
//! 2. **Convert**: each record is rebuilt as a local [`Issue`], translating
//!    links and parents through that table. Inverse links (`blocked-by`) are
//!    collected and injected into their target's converted record once the
//!    whole batch is converted.
//!
//! Writes are per record and best-effort; a failed write is logged and
//! counted. The mapping table is persisted once, after the last write.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::import::foreign::{translate_link_type, ForeignIssue, LinkTranslation};
use crate::import::mapping::IdMapper;
use crate::import::types::{GapReason, ImportStats, TranslationGap};
use crate::model::{Dependency, Issue, Provenance};
use crate::storage::{check, IssueStore};
use crate::validate::{normalize_kind, normalize_priority, normalize_status};

const DEFAULT_STATUS: &str = "open";
const DEFAULT_KIND: &str = "task";
const DEFAULT_PRIORITY: i32 = 2;

/// Pass-1 output for one foreign record.
struct Assignment {
    foreign: ForeignIssue,
    local_id: String,
    existing: Option<Issue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Imported,
    Merged,
}

/// Importer for one foreign source.
pub struct Importer<'a> {
    store: &'a IssueStore,
    mapper: &'a mut IdMapper,
    now: DateTime<Utc>,
}

impl<'a> Importer<'a> {
    #[must_use]
    pub fn new(store: &'a IssueStore, mapper: &'a mut IdMapper) -> Self {
        Self {
            store,
            mapper,
            now: Utc::now(),
        }
    }

    /// Use a fixed batch time instead of the wall clock.
    #[must_use]
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    /// Import a newline-delimited JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FileNotFound`] if the file is missing, or an error if
    /// the store cannot be read. Bad lines and failed writes are counted.
    pub fn import_file(&mut self, path: &Path) -> Result<ImportStats> {
        if !path.exists() {
            return Err(Error::FileNotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path)?;
        self.import_reader(BufReader::new(file))
    }

    /// Import newline-delimited JSON from any reader.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails or the store cannot be read.
    pub fn import_reader<R: BufRead>(&mut self, reader: R) -> Result<ImportStats> {
        let mut batch = Vec::new();
        let mut batch_ids = HashSet::new();
        let mut malformed = 0;
        let mut duplicates = 0;

        for (line_num, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<ForeignIssue>(&line) {
                Ok(record) if record.id.trim().is_empty() => {
                    malformed += 1;
                    warn!(line = line_num + 1, "Skipping import line with empty id");
                }
                Ok(record) => {
                    if batch_ids.insert(record.id.clone()) {
                        batch.push(record);
                    } else {
                        duplicates += 1;
                        warn!(line = line_num + 1, foreign_id = %record.id, "Skipping repeated foreign id");
                    }
                }
                Err(e) => {
                    malformed += 1;
                    warn!(line = line_num + 1, error = %e, "Skipping malformed import line");
                }
            }
        }

        let mut stats = self.import_batch(batch)?;
        stats.malformed = malformed;
        stats.duplicates = duplicates;
        Ok(stats)
    }

    /// Import an already-parsed batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn import_batch(&mut self, batch: Vec<ForeignIssue>) -> Result<ImportStats> {
        let mut stats = ImportStats {
            seen: batch.len(),
            ..ImportStats::default()
        };

        let existing = self.store.list()?;
        let assignments = self.assign_ids(batch, &existing);

        let table: HashMap<String, String> = assignments
            .iter()
            .map(|a| (a.foreign.id.clone(), a.local_id.clone()))
            .collect();
        let known: HashSet<String> = existing
            .iter()
            .map(|i| i.id.clone())
            .chain(assignments.iter().map(|a| a.local_id.clone()))
            .collect();

        let converted = self.convert_all(&assignments, &table, &known, &mut stats);

        let mut written = Vec::new();
        for (issue, outcome) in converted {
            match self.store.write(&issue) {
                Ok(()) => {
                    match outcome {
                        Outcome::Imported => stats.imported += 1,
                        Outcome::Merged => stats.merged += 1,
                    }
                    written.push(issue.id);
                }
                Err(e) => {
                    stats.failed += 1;
                    warn!(id = %issue.id, error = %e, "Failed to write imported issue");
                }
            }
        }

        stats.mapping_saved = match self.mapper.persist() {
            Ok(()) => true,
            Err(e) => {
                warn!(source = self.mapper.source(), error = %e, "Failed to persist identifier mapping");
                false
            }
        };

        if !written.is_empty() {
            let all = self.store.list()?;
            stats.findings = check(&all)
                .into_iter()
                .filter(|f| written.iter().any(|id| f.involves(id)))
                .collect();
            for finding in &stats.findings {
                warn!(%finding, "Integrity problem after import");
            }
        }

        info!(
            source = self.mapper.source(),
            seen = stats.seen,
            imported = stats.imported,
            merged = stats.merged,
            skipped = stats.skipped,
            failed = stats.failed,
            "Import finished"
        );
        Ok(stats)
    }

    /// Pass 1: give every record of the batch its local id.
    fn assign_ids(&mut self, batch: Vec<ForeignIssue>, existing: &[Issue]) -> Vec<Assignment> {
        let source = self.mapper.source().to_string();

        let mut by_provenance: HashMap<String, &Issue> = HashMap::new();
        for issue in existing {
            if let Some(prov) = issue.provenance(&source) {
                if let Some(other) = by_provenance.get(&prov.original_id) {
                    warn!(
                        foreign_id = %prov.original_id,
                        kept = %other.id,
                        ignored = %issue.id,
                        "Two issues claim the same foreign origin"
                    );
                    continue;
                }
                by_provenance.insert(prov.original_id, issue);
            }
        }
        let by_id: HashMap<&str, &Issue> = existing.iter().map(|i| (i.id.as_str(), i)).collect();

        self.mapper.reserve(existing.iter().map(|i| i.id.clone()));

        batch
            .into_iter()
            .map(|foreign| {
                if let Some(&matched) = by_provenance.get(&foreign.id) {
                    if let Err(conflict) = self.mapper.bind(&foreign.id, &matched.id) {
                        warn!(%conflict, "Keeping provenance match over mapping entry");
                    }
                    return Assignment {
                        local_id: matched.id.clone(),
                        existing: Some(matched.clone()),
                        foreign,
                    };
                }

                let local_id = self.mapper.assign(&foreign.id);
                let existing = by_id.get(local_id.as_str()).map(|&i| i.clone());
                Assignment {
                    foreign,
                    local_id,
                    existing,
                }
            })
            .collect()
    }

    /// Pass 2: convert every assignment, then inject inverse edges.
    fn convert_all(
        &self,
        assignments: &[Assignment],
        table: &HashMap<String, String>,
        known: &HashSet<String>,
        stats: &mut ImportStats,
    ) -> Vec<(Issue, Outcome)> {
        let resolve = |foreign: &str| -> Option<String> {
            table
                .get(foreign)
                .cloned()
                .or_else(|| self.mapper.lookup(foreign).map(String::from))
                .filter(|local| known.contains(local))
        };

        let mut converted: Vec<(Issue, Outcome)> = Vec::new();
        let mut inverse: Vec<(String, Dependency, TranslationGap)> = Vec::new();

        for assignment in assignments {
            let foreign = &assignment.foreign;
            let updated_at = foreign_updated_at(foreign);

            if let Some(local) = &assignment.existing {
                // An undated foreign copy is never newer than a stored one.
                if updated_at.is_none_or(|at| at <= local.updated_at) {
                    debug!(id = %local.id, foreign_id = %foreign.id, "Foreign copy not newer; skipping");
                    stats.skipped += 1;
                    continue;
                }
            }

            let mut dependencies = Vec::new();
            for link in &foreign.links {
                let translation = translate_link_type(&link.link_type);
                let gap = TranslationGap {
                    issue_id: assignment.local_id.clone(),
                    foreign_id: foreign.id.clone(),
                    link_type: link.link_type.clone(),
                    target: link.target.clone(),
                    reason: GapReason::UnsupportedRelation,
                };

                if translation == LinkTranslation::Unsupported {
                    debug!(foreign_id = %foreign.id, link_type = %link.link_type, "Untranslatable link type");
                    stats.gaps.push(gap);
                    continue;
                }

                let Some(target) = resolve(&link.target) else {
                    stats.dropped_references += 1;
                    warn!(foreign_id = %foreign.id, target = %link.target, "Dropping link to unknown record");
                    continue;
                };

                match translation {
                    LinkTranslation::Direct(relation) => {
                        push_unique(&mut dependencies, Dependency::new(relation, target));
                    }
                    LinkTranslation::Inverse(relation) => inverse.push((
                        target,
                        Dependency::new(relation, assignment.local_id.clone()),
                        TranslationGap {
                            reason: GapReason::InverseTargetOutsideBatch,
                            ..gap
                        },
                    )),
                    LinkTranslation::Unsupported => {}
                }
            }

            let parent_id = foreign.parent.as_deref().and_then(|p| {
                let resolved = resolve(p);
                if resolved.is_none() {
                    stats.dropped_references += 1;
                    warn!(foreign_id = %foreign.id, parent = %p, "Dropping unknown parent");
                }
                resolved
            });

            let (issue, outcome) =
                self.build_issue(assignment, updated_at, dependencies, parent_id);
            converted.push((issue, outcome));
        }

        // Second-order rewrite: inverse edges belong to their target.
        for (target, dependency, gap) in inverse {
            match converted.iter_mut().find(|(issue, _)| issue.id == target) {
                Some((issue, _)) => push_unique(&mut issue.dependencies, dependency),
                None => {
                    debug!(target = %target, "Inverse link target outside batch");
                    stats.gaps.push(gap);
                }
            }
        }

        converted
    }

    fn build_issue(
        &self,
        assignment: &Assignment,
        updated_at: Option<DateTime<Utc>>,
        dependencies: Vec<Dependency>,
        parent_id: Option<String>,
    ) -> (Issue, Outcome) {
        let foreign = &assignment.foreign;
        let existing = assignment.existing.as_ref();
        let source = self.mapper.source();

        let status = field_or(
            foreign.status.as_deref().map(normalize_status),
            existing.map(|e| e.status.clone()),
            DEFAULT_STATUS.to_string(),
            &foreign.id,
        );
        let kind = field_or(
            foreign.kind.as_deref().map(normalize_kind),
            existing.map(|e| e.kind.clone()),
            DEFAULT_KIND.to_string(),
            &foreign.id,
        );
        let priority = field_or(
            foreign.priority.as_ref().map(|p| normalize_priority(&p.as_text())),
            existing.map(|e| e.priority),
            DEFAULT_PRIORITY,
            &foreign.id,
        );

        let created_at = existing.map_or_else(
            || {
                foreign
                    .created_at
                    .or(foreign.updated_at)
                    .unwrap_or(self.now)
            },
            |e| e.created_at,
        );
        let updated_at = updated_at.map_or(created_at, |at| at.max(created_at));

        let mut issue = Issue {
            id: assignment.local_id.clone(),
            title: foreign.title.clone(),
            description: foreign.description.clone(),
            status,
            kind,
            priority,
            version: existing.map_or(1, |e| e.version + 1),
            parent_id,
            dependencies,
            created_at,
            updated_at,
            extensions: existing.map(|e| e.extensions.clone()).unwrap_or_default(),
        };
        issue.set_provenance(
            source,
            &Provenance {
                original_id: foreign.id.clone(),
                imported_at: self.now,
            },
        );

        let outcome = if existing.is_some() {
            Outcome::Merged
        } else {
            Outcome::Imported
        };
        (issue, outcome)
    }
}

/// Foreign `updated_at`, falling back to `created_at`.
fn foreign_updated_at(foreign: &ForeignIssue) -> Option<DateTime<Utc>> {
    foreign.updated_at.or(foreign.created_at)
}

/// Normalized foreign value, else the existing local value, else a default.
fn field_or<T>(
    foreign: Option<Result<T>>,
    existing: Option<T>,
    default: T,
    foreign_id: &str,
) -> T {
    match foreign {
        Some(Ok(value)) => value,
        Some(Err(e)) => {
            warn!(foreign_id, error = %e, "Unrecognized field value; keeping fallback");
            existing.unwrap_or(default)
        }
        None => existing.unwrap_or(default),
    }
}

fn push_unique(dependencies: &mut Vec<Dependency>, dependency: Dependency) {
    if !dependencies.contains(&dependency) {
        dependencies.push(dependency);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Relation;
    use chrono::TimeZone;
    use std::io::Cursor;
    use tempfile::TempDir;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 1, hour, 0, 0).unwrap()
    }

    fn run(store: &IssueStore, mapper: &mut IdMapper, input: &str) -> ImportStats {
        Importer::new(store, mapper)
            .at(at(12))
            .import_reader(Cursor::new(input.to_string()))
            .unwrap()
    }

    fn setup() -> (TempDir, IssueStore, IdMapper) {
        let temp = TempDir::new().unwrap();
        let store = IssueStore::new(temp.path().join("issues"));
        let mapper = IdMapper::load(&temp.path().join("mappings/jira.json"), "jira", "IK");
        (temp, store, mapper)
    }

    #[test]
    fn test_malformed_line_and_dependency_on_earlier_line() {
        let (_temp, store, mut mapper) = setup();
        let input = concat!(
            r#"{"id":"P-1","title":"one","updated_at":"2025-01-01T00:00:00Z"}"#,
            "\n",
            r#"{"id":"P-2","title": oops"#,
            "\n",
            r#"{"id":"P-3","title":"three","links":[{"type":"blocks","target":"P-1"}]}"#,
            "\n",
        );

        let stats = run(&store, &mut mapper, input);

        assert_eq!(stats.imported, 2);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.malformed, 1);
        assert_eq!(stats.seen, 2);

        let p1 = mapper.lookup("P-1").unwrap().to_string();
        let p3 = store.require(mapper.lookup("P-3").unwrap()).unwrap();
        assert_eq!(p3.dependencies, vec![Dependency::new(Relation::Blocks, p1)]);
    }

    #[test]
    fn test_forward_reference_resolves() {
        let (_temp, store, mut mapper) = setup();
        let input = concat!(
            r#"{"id":"X","title":"x","links":[{"type":"relates","target":"Y"}]}"#,
            "\n",
            r#"{"id":"Y","title":"y"}"#,
            "\n",
        );

        let stats = run(&store, &mut mapper, input);
        assert_eq!(stats.imported, 2);
        assert_eq!(stats.dropped_references, 0);

        let x = store.require(mapper.lookup("X").unwrap()).unwrap();
        assert_eq!(x.dependencies[0].target_id, mapper.lookup("Y").unwrap());
        assert!(stats.findings.is_empty());
    }

    #[test]
    fn test_reimport_is_idempotent() {
        let (_temp, store, mut mapper) = setup();
        let input = concat!(
            r#"{"id":"A","title":"a","updated_at":"2025-01-05T00:00:00Z"}"#,
            "\n",
            r#"{"id":"B","title":"b","created_at":"2025-01-01T00:00:00Z","parent":"A"}"#,
            "\n",
        );

        let first = run(&store, &mut mapper, input);
        assert_eq!(first.imported, 2);
        assert!(first.mapping_saved);

        let before = store.list().unwrap();
        let second = run(&store, &mut mapper, input);
        assert_eq!(second.imported, 0);
        assert_eq!(second.merged, 0);
        assert_eq!(second.skipped, 2);
        assert_eq!(store.list().unwrap(), before);
    }

    #[test]
    fn test_undated_reimport_skipped_at_later_batch_time() {
        let (_temp, store, mut mapper) = setup();
        let input = "{\"id\":\"A\",\"title\":\"a\"}\n";

        let first = Importer::new(&store, &mut mapper)
            .at(at(12))
            .import_reader(Cursor::new(input))
            .unwrap();
        assert_eq!(first.imported, 1);
        let id = mapper.lookup("A").unwrap().to_string();
        let before = store.require(&id).unwrap();
        assert_eq!(before.created_at, at(12));

        let later = at(12) + chrono::Duration::minutes(5);
        let second = Importer::new(&store, &mut mapper)
            .at(later)
            .import_reader(Cursor::new(input))
            .unwrap();
        assert_eq!(second.merged, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(store.require(&id).unwrap(), before);
    }

    #[test]
    fn test_missing_created_at_uses_foreign_updated_at() {
        let (_temp, store, mut mapper) = setup();
        run(&store, &mut mapper, r#"{"id":"A","title":"a","updated_at":"2025-01-05T00:00:00Z"}"#);
        let id = mapper.lookup("A").unwrap().to_string();

        let stored = store.require(&id).unwrap();
        let foreign_time = Utc.with_ymd_and_hms(2025, 1, 5, 0, 0, 0).unwrap();
        assert_eq!(stored.created_at, foreign_time);
        assert_eq!(stored.updated_at, foreign_time);

        // A later foreign edit, still before the batch time, is picked up.
        let stats = run(&store, &mut mapper, r#"{"id":"A","title":"a2","updated_at":"2025-01-20T00:00:00Z"}"#);
        assert_eq!(stats.merged, 1);
        assert_eq!(store.require(&id).unwrap().title, "a2");
    }

    #[test]
    fn test_provenance_match_survives_lost_mapping() {
        let (temp, store, mut mapper) = setup();
        run(&store, &mut mapper, r#"{"id":"A","title":"a","updated_at":"2025-01-05T00:00:00Z"}"#);
        let local = mapper.lookup("A").unwrap().to_string();

        std::fs::remove_file(temp.path().join("mappings/jira.json")).unwrap();
        let mut fresh = IdMapper::load(&temp.path().join("mappings/jira.json"), "jira", "IK");
        let stats = run(
            &store,
            &mut fresh,
            r#"{"id":"A","title":"a2","updated_at":"2025-01-06T00:00:00Z"}"#,
        );

        assert_eq!(stats.merged, 1);
        assert_eq!(fresh.lookup("A"), Some(local.as_str()));
        assert_eq!(store.ids().unwrap(), vec![local]);
    }

    #[test]
    fn test_newer_foreign_copy_merges_with_local_versioning() {
        let (_temp, store, mut mapper) = setup();
        run(&store, &mut mapper, r#"{"id":"A","title":"a","updated_at":"2025-01-05T00:00:00Z"}"#);
        let id = mapper.lookup("A").unwrap().to_string();

        let mut local = store.require(&id).unwrap();
        local.title = "edited locally".into();
        let local = store.update(local, at(1)).unwrap();
        assert_eq!(local.version, 2);

        // Older than the local edit: skipped.
        let stats = run(&store, &mut mapper, r#"{"id":"A","title":"old","updated_at":"2025-01-06T00:00:00Z"}"#);
        assert_eq!(stats.skipped, 1);
        assert_eq!(store.require(&id).unwrap().title, "edited locally");

        // Strictly newer: replaced, version continues from the local one.
        let stats = run(&store, &mut mapper, r#"{"id":"A","title":"new","updated_at":"2025-03-01T00:00:00Z"}"#);
        assert_eq!(stats.merged, 1);
        let merged = store.require(&id).unwrap();
        assert_eq!(merged.title, "new");
        assert_eq!(merged.version, 3);
        assert_eq!(merged.created_at, local.created_at);
        assert!(merged.updated_at > local.updated_at);
    }

    #[test]
    fn test_blocked_by_injected_into_target() {
        let (_temp, store, mut mapper) = setup();
        let input = concat!(
            r#"{"id":"X","title":"x","links":[{"type":"blocked-by","target":"Y"}]}"#,
            "\n",
            r#"{"id":"Y","title":"y"}"#,
            "\n",
        );

        let stats = run(&store, &mut mapper, input);
        assert!(stats.gaps.is_empty());

        let x = store.require(mapper.lookup("X").unwrap()).unwrap();
        let y = store.require(mapper.lookup("Y").unwrap()).unwrap();
        assert!(x.dependencies.is_empty());
        assert_eq!(y.dependencies, vec![Dependency::new(Relation::Blocks, x.id)]);
    }

    #[test]
    fn test_blocked_by_outside_batch_is_a_gap() {
        let (_temp, store, mut mapper) = setup();
        run(&store, &mut mapper, r#"{"id":"Y","title":"y"}"#);
        let y_before = store.require(mapper.lookup("Y").unwrap()).unwrap();

        let stats = run(
            &store,
            &mut mapper,
            r#"{"id":"X","title":"x","links":[{"type":"blocked-by","target":"Y"}]}"#,
        );

        assert_eq!(stats.gaps.len(), 1);
        assert_eq!(stats.gaps[0].reason, GapReason::InverseTargetOutsideBatch);
        assert_eq!(store.require(&y_before.id).unwrap(), y_before);
    }

    #[test]
    fn test_unsupported_and_unresolved_links() {
        let (_temp, store, mut mapper) = setup();
        let stats = run(
            &store,
            &mut mapper,
            r#"{"id":"X","title":"x","parent":"NOPE","links":[{"type":"clones","target":"Z"},{"type":"blocks","target":"GONE"}]}"#,
        );

        assert_eq!(stats.imported, 1);
        assert_eq!(stats.gaps.len(), 1);
        assert_eq!(stats.gaps[0].reason, GapReason::UnsupportedRelation);
        assert_eq!(stats.dropped_references, 2);

        let x = store.require(mapper.lookup("X").unwrap()).unwrap();
        assert!(x.dependencies.is_empty());
        assert!(x.parent_id.is_none());
    }

    #[test]
    fn test_fields_normalized_with_fallbacks() {
        let (_temp, store, mut mapper) = setup();
        run(
            &store,
            &mut mapper,
            r#"{"id":"X","title":"x","status":"In Progress","type":"Story","priority":"High"}
{"id":"Y","title":"y","status":"Bizarre","priority":99}"#,
        );

        let x = store.require(mapper.lookup("X").unwrap()).unwrap();
        assert_eq!((x.status.as_str(), x.kind.as_str(), x.priority), ("in_progress", "feature", 3));
        let y = store.require(mapper.lookup("Y").unwrap()).unwrap();
        assert_eq!((y.status.as_str(), y.kind.as_str(), y.priority), ("open", "task", 2));
        assert_eq!(y.provenance("jira").unwrap().original_id, "Y");
    }

    #[test]
    fn test_duplicate_foreign_ids_in_batch() {
        let (_temp, store, mut mapper) = setup();
        let stats = run(
            &store,
            &mut mapper,
            "{\"id\":\"X\",\"title\":\"first\"}\n{\"id\":\"X\",\"title\":\"second\"}\n",
        );
        assert_eq!(stats.imported, 1);
        assert_eq!(stats.duplicates, 1);
        assert_eq!(store.require(mapper.lookup("X").unwrap()).unwrap().title, "first");
    }

    #[test]
    fn test_injective_across_batches() {
        let (_temp, store, mut mapper) = setup();
        run(&store, &mut mapper, "{\"id\":\"A\",\"title\":\"a\"}\n{\"id\":\"B\",\"title\":\"b\"}");
        run(&store, &mut mapper, "{\"id\":\"C\",\"title\":\"c\"}\n{\"id\":\"A\",\"title\":\"a\"}");

        let locals: HashSet<&String> = mapper.entries().values().collect();
        assert_eq!(locals.len(), 3);
        assert_eq!(store.ids().unwrap().len(), 3);
    }

    #[test]
    fn test_missing_file() {
        let (temp, store, mut mapper) = setup();
        let err = Importer::new(&store, &mut mapper)
            .import_file(&temp.path().join("nope.jsonl"))
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound { .. }));
    }
}
