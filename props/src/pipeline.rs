use std::collections::BTreeMap;

use svn_objstore::{FileMode, ObjectId, Repository, Tree, TreeEntry};

use crate::auto_props::{self, AutoPropRule};
use crate::error::Result;
use crate::names;

const IGNORE_DOTFILE: &[u8] = b".svnignore";
const AUTO_PROPS_DOTFILE: &[u8] = b".svnprops";
const SNIFF_WINDOW: usize = 8000;

/// Memoises whether a blob's content was classified as binary, keyed by
/// `(filter name, blob id)` (§3, §9: "caches keyed by content hash are
/// inherently safe... append-only concurrent maps; do not invalidate").
/// Implemented by the embedding binary crate on top of `svn-persist` so this
/// crate stays free of a SQLite dependency.
pub trait ClassificationCache: Send + Sync {
    fn get(&self, filter_name: &str, blob_id: ObjectId) -> Option<bool>;
    fn put(&self, filter_name: &str, blob_id: ObjectId, is_binary: bool);
}

/// An in-memory cache for tests and for embeddings that don't need
/// persistence across restarts.
#[derive(Debug, Default)]
pub struct MemoryClassificationCache {
    inner: std::sync::RwLock<std::collections::HashMap<(String, ObjectId), bool>>,
}

impl ClassificationCache for MemoryClassificationCache {
    fn get(&self, filter_name: &str, blob_id: ObjectId) -> Option<bool> {
        self.inner
            .read()
            .unwrap()
            .get(&(filter_name.to_string(), blob_id))
            .copied()
    }

    fn put(&self, filter_name: &str, blob_id: ObjectId, is_binary: bool) {
        self.inner
            .write()
            .unwrap()
            .insert((filter_name.to_string(), blob_id), is_binary);
    }
}

/// The path-property pipeline (§2): derives per-path attributes by scanning
/// `.svnignore`/`.svnprops` dotfiles found while walking trees, mode flags
/// from the tree entry itself, and a content sniff for MIME type.
pub struct Pipeline<'a> {
    cache: &'a dyn ClassificationCache,
}

impl<'a> Pipeline<'a> {
    pub fn new(cache: &'a dyn ClassificationCache) -> Self {
        Self { cache }
    }

    /// Properties that apply to a directory itself: presently just
    /// `svn:ignore`, sourced from a `.svnignore` entry inside it.
    pub fn dir_properties(&self, repo: &Repository, dir: &Tree) -> Result<BTreeMap<String, String>> {
        let mut props = BTreeMap::new();

        if let Some(entry) = dir.get(IGNORE_DOTFILE) {
            if !entry.mode.is_dir() {
                let content = repo.read_blob(entry.id)?;
                props.insert(names::IGNORE.to_string(), String::from_utf8_lossy(&content).into_owned());
            }
        }

        Ok(props)
    }

    /// Parses the auto-props rule set for a directory, if it has a
    /// `.svnprops` dotfile.
    pub fn auto_props_for_dir(&self, repo: &Repository, dir: &Tree) -> Result<Vec<AutoPropRule>> {
        match dir.get(AUTO_PROPS_DOTFILE) {
            Some(entry) if !entry.mode.is_dir() => {
                let content = repo.read_blob(entry.id)?;
                Ok(auto_props::parse(&content)?)
            }
            _ => Ok(Vec::new()),
        }
    }

    /// Properties for a single file entry: mode-derived flags, then
    /// matching auto-props rules, then (absent an explicit mime-type from
    /// auto-props) a content sniff for binary-ness.
    pub fn file_properties(
        &self,
        repo: &Repository,
        file_name: &str,
        entry: &TreeEntry,
        auto_props: &[AutoPropRule],
    ) -> Result<BTreeMap<String, String>> {
        let mut props = BTreeMap::new();

        match entry.mode {
            FileMode::Executable => {
                props.insert(names::EXECUTABLE.to_string(), names::PRESENT.to_string());
            }
            FileMode::Symlink => {
                props.insert(names::SPECIAL.to_string(), names::PRESENT.to_string());
            }
            _ => {}
        }

        for rule in auto_props {
            if rule.matches(file_name) {
                for (name, value) in &rule.props {
                    props.insert(name.clone(), value.clone());
                }
            }
        }

        if !props.contains_key(names::MIME_TYPE) && entry.mode != FileMode::Symlink {
            if self.is_binary(repo, entry.id)? {
                props.insert(
                    names::MIME_TYPE.to_string(),
                    "application/octet-stream".to_string(),
                );
            }
        }

        Ok(props)
    }

    fn is_binary(&self, repo: &Repository, blob_id: ObjectId) -> Result<bool> {
        const FILTER: &str = "sniff";

        if let Some(cached) = self.cache.get(FILTER, blob_id) {
            return Ok(cached);
        }

        let content = repo.read_blob(blob_id)?;
        let window = &content[..content.len().min(SNIFF_WINDOW)];
        let is_binary = window.contains(&0u8);

        self.cache.put(FILTER, blob_id, is_binary);
        Ok(is_binary)
    }
}

#[cfg(test)]
mod tests {
    use svn_objstore::FileMode;

    use super::*;

    fn entry(name: &[u8], mode: FileMode, id: ObjectId) -> TreeEntry {
        TreeEntry {
            name: name.to_vec(),
            mode,
            id,
        }
    }

    #[test]
    fn test_dir_properties_reads_ignore_file() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;
        let ignore_blob = repo.insert_blob(b"*.o\n*.tmp\n")?;
        let tree_id = repo.insert_tree(&[entry(b".svnignore", FileMode::Regular, ignore_blob)])?;
        let tree = repo.find_tree(tree_id)?;

        let cache = MemoryClassificationCache::default();
        let pipeline = Pipeline::new(&cache);
        let props = pipeline.dir_properties(&repo, &tree)?;

        assert_eq!(props.get(names::IGNORE).unwrap(), "*.o\n*.tmp\n");
        Ok(())
    }

    #[test]
    fn test_file_properties_executable_flag() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;
        let blob = repo.insert_blob(b"#!/bin/sh\n")?;
        let e = entry(b"run.sh", FileMode::Executable, blob);

        let cache = MemoryClassificationCache::default();
        let pipeline = Pipeline::new(&cache);
        let props = pipeline.file_properties(&repo, "run.sh", &e, &[])?;

        assert_eq!(props.get(names::EXECUTABLE).unwrap(), names::PRESENT);
        Ok(())
    }

    #[test]
    fn test_file_properties_binary_sniff_is_cached() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;
        let blob = repo.insert_blob(&[0u8, 1, 2, 3])?;
        let e = entry(b"data.bin", FileMode::Regular, blob);

        let cache = MemoryClassificationCache::default();
        let pipeline = Pipeline::new(&cache);
        let props = pipeline.file_properties(&repo, "data.bin", &e, &[])?;
        assert_eq!(props.get(names::MIME_TYPE).unwrap(), "application/octet-stream");
        assert_eq!(cache.get("sniff", blob), Some(true));
        Ok(())
    }

    #[test]
    fn test_auto_props_override_sniffed_mime_type() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;
        let blob = repo.insert_blob(&[0u8, 1, 2, 3])?;
        let e = entry(b"data.bin", FileMode::Regular, blob);

        let rules = auto_props::parse(b"*.bin = svn:mime-type=application/x-custom\n")?;
        let cache = MemoryClassificationCache::default();
        let pipeline = Pipeline::new(&cache);
        let props = pipeline.file_properties(&repo, "data.bin", &e, &rules)?;

        assert_eq!(props.get(names::MIME_TYPE).unwrap(), "application/x-custom");
        Ok(())
    }
}
