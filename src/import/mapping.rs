//! Foreign-to-local identifier mapping.
//!
//! One table per foreign source, persisted at `mappings/<source>.json` as a
//! JSON object with sorted keys. The table is advisory: a missing or corrupt
//! file loads as empty, because the provenance block on each imported issue
//! can rebuild it.
//!
//! Invariants:
//! - injective: two foreign ids never map to the same local id
//! - stable: an entry is never overwritten with a different local id

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::storage::file::write_json_atomic;
use crate::storage::generate_id;

/// Refusal to record a mapping that would break stability or injectivity.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingConflict {
    #[error("{foreign} is already mapped to {existing}, not {requested}")]
    ForeignAlreadyMapped {
        foreign: String,
        existing: String,
        requested: String,
    },
    #[error("{local} is already the mapping of {existing}, not {requested}")]
    LocalAlreadyMapped {
        local: String,
        existing: String,
        requested: String,
    },
}

/// Identifier table for one foreign source.
#[derive(Debug, Clone)]
pub struct IdMapper {
    source: String,
    prefix: String,
    path: Option<PathBuf>,
    entries: BTreeMap<String, String>,
    reverse: HashMap<String, String>,
    reserved: HashSet<String>,
}

impl IdMapper {
    /// An empty table that is never written to disk.
    #[must_use]
    pub fn in_memory(source: &str, prefix: &str) -> Self {
        Self {
            source: source.to_string(),
            prefix: prefix.to_string(),
            path: None,
            entries: BTreeMap::new(),
            reverse: HashMap::new(),
            reserved: HashSet::new(),
        }
    }

    /// Load the table at `path`, or start empty if it is absent or unreadable.
    #[must_use]
    pub fn load(path: &Path, source: &str, prefix: &str) -> Self {
        let mut mapper = Self::in_memory(source, prefix);
        mapper.path = Some(path.to_path_buf());

        let raw: BTreeMap<String, String> = match fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                warn!(path = %path.display(), error = %e, "Ignoring corrupt mapping file");
                BTreeMap::new()
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable mapping file");
                BTreeMap::new()
            }
        };

        for (foreign, local) in raw {
            if let Err(conflict) = mapper.bind(&foreign, &local) {
                warn!(%conflict, "Dropping non-injective mapping entry");
            }
        }
        debug!(source, entries = mapper.len(), "Loaded identifier mapping");
        mapper
    }

    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    #[must_use]
    pub fn lookup(&self, foreign: &str) -> Option<&str> {
        self.entries.get(foreign).map(String::as_str)
    }

    /// Mark local ids as taken so freshly generated ids never collide.
    pub fn reserve<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.reserved.extend(ids.into_iter().map(Into::into));
    }

    /// Return the local id for `foreign`, generating one if absent.
    pub fn assign(&mut self, foreign: &str) -> String {
        if let Some(local) = self.entries.get(foreign) {
            return local.clone();
        }

        let local = generate_id(&self.prefix, |candidate| {
            self.reserved.contains(candidate) || self.reverse.contains_key(candidate)
        });
        self.insert(foreign, &local);
        local
    }

    /// Record an already-known pairing (e.g. found through provenance).
    ///
    /// Binding a pair that is already present is a no-op.
    ///
    /// # Errors
    ///
    /// Returns a [`MappingConflict`] instead of overwriting anything.
    pub fn bind(&mut self, foreign: &str, local: &str) -> Result<(), MappingConflict> {
        if let Some(existing) = self.entries.get(foreign) {
            if existing == local {
                return Ok(());
            }
            return Err(MappingConflict::ForeignAlreadyMapped {
                foreign: foreign.to_string(),
                existing: existing.clone(),
                requested: local.to_string(),
            });
        }
        if let Some(existing) = self.reverse.get(local) {
            return Err(MappingConflict::LocalAlreadyMapped {
                local: local.to_string(),
                existing: existing.clone(),
                requested: foreign.to_string(),
            });
        }
        self.insert(foreign, local);
        Ok(())
    }

    fn insert(&mut self, foreign: &str, local: &str) {
        self.entries.insert(foreign.to_string(), local.to_string());
        self.reverse.insert(local.to_string(), foreign.to_string());
        self.reserved.insert(local.to_string());
    }

    /// Write the table atomically. In-memory tables are not written.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn persist(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_json_atomic(path, &self.entries)?;
        debug!(path = %path.display(), entries = self.len(), "Persisted identifier mapping");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_assign_is_idempotent() {
        let mut mapper = IdMapper::in_memory("jira", "IK");
        let first = mapper.assign("PROJ-1");
        let second = mapper.assign("PROJ-1");
        assert_eq!(first, second);
        assert_eq!(mapper.lookup("PROJ-1"), Some(first.as_str()));
        assert_eq!(mapper.len(), 1);
    }

    #[test]
    fn test_assign_is_injective() {
        let mut mapper = IdMapper::in_memory("jira", "IK");
        let locals: HashSet<String> = (0..200).map(|n| mapper.assign(&format!("PROJ-{n}"))).collect();
        assert_eq!(locals.len(), 200);
    }

    #[test]
    fn test_assign_avoids_reserved_ids() {
        let mut mapper = IdMapper::in_memory("jira", "IK");
        let mut taken = Vec::new();
        for n in 0..50 {
            taken.push(mapper.assign(&format!("A-{n}")));
        }

        let mut other = IdMapper::in_memory("github", "IK");
        other.reserve(taken.clone());
        for n in 0..50 {
            let id = other.assign(&format!("B-{n}"));
            assert!(!taken.contains(&id));
        }
    }

    #[test]
    fn test_bind_never_overwrites() {
        let mut mapper = IdMapper::in_memory("jira", "IK");
        mapper.bind("PROJ-1", "IK-aaaa").unwrap();
        mapper.bind("PROJ-1", "IK-aaaa").unwrap();

        assert!(matches!(
            mapper.bind("PROJ-1", "IK-bbbb"),
            Err(MappingConflict::ForeignAlreadyMapped { .. })
        ));
        assert!(matches!(
            mapper.bind("PROJ-2", "IK-aaaa"),
            Err(MappingConflict::LocalAlreadyMapped { .. })
        ));
        assert_eq!(mapper.lookup("PROJ-1"), Some("IK-aaaa"));
        assert_eq!(mapper.lookup("PROJ-2"), None);
    }

    #[test]
    fn test_persist_and_reload_sorted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("mappings").join("jira.json");

        let mut mapper = IdMapper::load(&path, "jira", "IK");
        assert!(mapper.is_empty());
        mapper.bind("Z-1", "IK-0001").unwrap();
        mapper.bind("A-1", "IK-0002").unwrap();
        mapper.persist().unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.find("A-1").unwrap() < text.find("Z-1").unwrap());

        let reloaded = IdMapper::load(&path, "jira", "IK");
        assert_eq!(reloaded.entries(), mapper.entries());
    }

    #[test]
    fn test_corrupt_file_loads_empty() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jira.json");
        fs::write(&path, "{not json").unwrap();

        let mapper = IdMapper::load(&path, "jira", "IK");
        assert!(mapper.is_empty());
    }

    #[test]
    fn test_non_injective_file_keeps_first_entry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("jira.json");
        fs::write(&path, r#"{"A-1":"IK-0001","B-1":"IK-0001"}"#).unwrap();

        let mapper = IdMapper::load(&path, "jira", "IK");
        assert_eq!(mapper.len(), 1);
        assert_eq!(mapper.lookup("A-1"), Some("IK-0001"));
    }

    #[test]
    fn test_in_memory_persist_is_noop() {
        let mut mapper = IdMapper::in_memory("jira", "IK");
        mapper.assign("X");
        mapper.persist().unwrap();
    }
}
