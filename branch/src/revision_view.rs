use std::collections::BTreeMap;
use std::time::SystemTime;

use md5::{Digest, Md5};
use svn_objstore::{FileMode, ObjectId, Repository, Tree, TreeEntry};
use svn_props::Pipeline;

use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::path_history::PathHistory;
use crate::paths;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

/// A stat-style description of a path as it existed at a given revision
/// (§2's `stat`/`list-dir` operations): kind, properties, and — for files —
/// size and an MD5 checksum of the content, plus the path's last-changed
/// revision, author and date (§4.6).
#[derive(Debug, Clone)]
pub struct Entry {
    pub kind: EntryKind,
    pub created_revision: u64,
    pub author: String,
    pub date: SystemTime,
    pub properties: BTreeMap<String, String>,
    pub size: Option<u64>,
    pub checksum: Option<String>,
}

/// Combines the branch engine, path resolution, the property pipeline and
/// path history into the read-side view the session/delta layers query
/// (§2, §4.6).
pub struct RevisionView<'a> {
    engine: &'a Engine,
    history: &'a PathHistory<'a>,
    pipeline: Pipeline<'a>,
}

impl<'a> RevisionView<'a> {
    pub fn new(engine: &'a Engine, history: &'a PathHistory<'a>, pipeline: Pipeline<'a>) -> Self {
        Self {
            engine,
            history,
            pipeline,
        }
    }

    /// Describes `path` as of `revision`, or `None` if it doesn't exist.
    pub fn stat(&self, path: &[u8], revision: u64) -> Result<Option<Entry>> {
        let root = self.engine.tree_for_revision(revision)?;
        let repo = self.engine.repo();
        let repo = repo.lock().unwrap();

        let resolved = match paths::resolve(&repo, root, path)? {
            Some(resolved) => resolved,
            None => return Ok(None),
        };

        let (auto_props, file_name) = self.auto_props_and_name(&repo, path, revision)?;
        self.build_entry(&repo, path, resolved, &auto_props, file_name.as_deref(), revision)
            .map(Some)
    }

    /// Lists the children of the directory at `path` as of `revision`, or
    /// `None` if `path` doesn't exist or isn't a directory.
    pub fn list_dir(&self, path: &[u8], revision: u64) -> Result<Option<Vec<(Vec<u8>, Entry)>>> {
        let root = self.engine.tree_for_revision(revision)?;
        let repo = self.engine.repo();
        let repo = repo.lock().unwrap();

        let entries = match paths::list(&repo, root, path)? {
            Some(entries) => entries,
            None => return Ok(None),
        };

        let dir_tree = Tree::new(entries.clone());
        let auto_props = self.pipeline.auto_props_for_dir(&repo, &dir_tree)?;

        let mut out = Vec::with_capacity(entries.len());
        for entry in entries {
            let child_path = join(path, &entry.name);
            let name = String::from_utf8_lossy(&entry.name).into_owned();
            let value = self.build_entry(
                &repo,
                &child_path,
                (entry.mode, entry.id),
                &auto_props,
                Some(&name),
                revision,
            )?;
            out.push((entry.name, value));
        }

        Ok(Some(out))
    }

    fn auto_props_and_name(
        &self,
        repo: &Repository,
        path: &[u8],
        revision: u64,
    ) -> Result<(Vec<svn_props::AutoPropRule>, Option<String>)> {
        match paths::split_parent(path) {
            None => Ok((Vec::new(), None)),
            Some((parent, name)) => {
                let root = self.engine.tree_for_revision(revision)?;
                let parent_entries = paths::list(repo, root, &parent)?.unwrap_or_default();
                let parent_tree = Tree::new(parent_entries);
                let auto_props = self.pipeline.auto_props_for_dir(repo, &parent_tree)?;
                Ok((auto_props, Some(String::from_utf8_lossy(&name).into_owned())))
            }
        }
    }

    fn build_entry(
        &self,
        repo: &Repository,
        path: &[u8],
        (mode, id): (FileMode, ObjectId),
        auto_props: &[svn_props::AutoPropRule],
        file_name: Option<&str>,
        revision: u64,
    ) -> Result<Entry> {
        let last_change = self.history.last_change(path, revision)?;
        let created_revision = if last_change < 0 { 0 } else { last_change as u64 };
        let commit = self.engine.commit_for_revision(created_revision)?;
        let (author, date) = match &commit {
            Some(commit) => (commit.author.name.clone(), commit.author.time),
            None => (String::new(), SystemTime::UNIX_EPOCH),
        };

        if mode.is_dir() {
            let tree = repo.find_tree(id)?;
            let properties = self.pipeline.dir_properties(repo, &tree)?;
            return Ok(Entry {
                kind: EntryKind::Directory,
                created_revision,
                author,
                date,
                properties,
                size: None,
                checksum: None,
            });
        }

        let entry = TreeEntry {
            name: file_name.map(|n| n.as_bytes().to_vec()).unwrap_or_default(),
            mode,
            id,
        };
        let name = file_name.ok_or_else(|| Error::NoSuchPath(String::from_utf8_lossy(path).into_owned(), revision))?;
        let properties = self.pipeline.file_properties(repo, name, &entry, auto_props)?;

        let content = repo.read_blob(id)?;
        let mut hasher = Md5::new();
        hasher.update(&content);
        let checksum = format!("{:x}", hasher.finalize());

        Ok(Entry {
            kind: EntryKind::File,
            created_revision,
            author,
            date,
            properties,
            size: Some(content.len() as u64),
            checksum: Some(checksum),
        })
    }
}

fn join(parent: &[u8], name: &[u8]) -> Vec<u8> {
    if parent.is_empty() {
        return name.to_vec();
    }
    let mut out = parent.to_vec();
    out.push(b'/');
    out.extend_from_slice(name);
    out
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use svn_objstore::Signature;
    use svn_persist::Connection;
    use svn_props::MemoryClassificationCache;

    use super::*;

    fn sig() -> Signature {
        Signature {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            time: SystemTime::now(),
        }
    }

    fn setup() -> anyhow::Result<(tempfile::TempDir, Engine)> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let blob = repo.insert_blob(b"hello\n")?;
        let script = repo.insert_blob(b"#!/bin/sh\necho hi\n")?;
        let tree = repo.insert_tree(&[
            TreeEntry {
                name: b"README".to_vec(),
                mode: FileMode::Regular,
                id: blob,
            },
            TreeEntry {
                name: b"run.sh".to_vec(),
                mode: FileMode::Executable,
                id: script,
            },
        ])?;
        let c1 = repo.insert_commit(&[], tree, &sig(), &sig(), "initial\n")?;
        repo.compare_and_set_ref("refs/heads/trunk", None, c1)?;

        let repo = Arc::new(Mutex::new(repo));
        let store = Arc::new(Mutex::new(Connection::open_in_memory()?));
        let engine = Engine::new(repo, store, "trunk");
        engine.sync()?;

        Ok((dir, engine))
    }

    #[test]
    fn test_stat_file_reports_size_and_checksum() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let pipeline = Pipeline::new(&cache);
        let view = RevisionView::new(&engine, &history, pipeline);

        let entry = view.stat(b"README", 1)?.unwrap();
        assert_eq!(entry.kind, EntryKind::File);
        assert_eq!(entry.size, Some(6));
        assert_eq!(entry.created_revision, 1);
        assert!(entry.checksum.is_some());
        Ok(())
    }

    #[test]
    fn test_stat_executable_file_has_property() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let pipeline = Pipeline::new(&cache);
        let view = RevisionView::new(&engine, &history, pipeline);

        let entry = view.stat(b"run.sh", 1)?.unwrap();
        assert_eq!(
            entry.properties.get(svn_props::property_names::EXECUTABLE).unwrap(),
            svn_props::property_names::PRESENT
        );
        Ok(())
    }

    #[test]
    fn test_list_dir_root() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let pipeline = Pipeline::new(&cache);
        let view = RevisionView::new(&engine, &history, pipeline);

        let entries = view.list_dir(b"", 1)?.unwrap();
        assert_eq!(entries.len(), 2);
        Ok(())
    }

    #[test]
    fn test_stat_missing_path_is_none() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, false);
        let cache = MemoryClassificationCache::default();
        let pipeline = Pipeline::new(&cache);
        let view = RevisionView::new(&engine, &history, pipeline);

        assert!(view.stat(b"missing", 1)?.is_none());
        Ok(())
    }
}
