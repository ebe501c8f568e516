use std::sync::Mutex;

use clru::CLruCache;
use svn_objstore::{FileMode, ObjectId};

use crate::diff;
use crate::engine::Engine;
use crate::error::Result;
use crate::paths;

const ENTRY_CACHE_CAPACITY: usize = 4096;
const RESULT_CACHE_CAPACITY: usize = 4096;

type EntryKey = (u64, Vec<u8>);
type EntryValue = Option<(FileMode, ObjectId)>;

/// `last-change`/`copy-from` (§4.6): walks the first-parent chain comparing
/// tree entries, memoising both the per-`(path, revision)` entry lookup and
/// the final `last-change` result in bounded LRU caches, as §4.6 specifies.
pub struct PathHistory<'e> {
    engine: &'e Engine,
    entry_cache: Mutex<CLruCache<EntryKey, EntryValue>>,
    last_change_cache: Mutex<CLruCache<EntryKey, i64>>,
    rename_detection: bool,
}

impl<'e> PathHistory<'e> {
    pub fn new(engine: &'e Engine, rename_detection: bool) -> Self {
        Self {
            engine,
            entry_cache: Mutex::new(CLruCache::new(ENTRY_CACHE_CAPACITY.try_into().unwrap())),
            last_change_cache: Mutex::new(CLruCache::new(RESULT_CACHE_CAPACITY.try_into().unwrap())),
            rename_detection,
        }
    }

    fn entry_at(&self, path: &[u8], revision: u64) -> Result<EntryValue> {
        let key = (revision, path.to_vec());
        if let Some(cached) = self.entry_cache.lock().unwrap().get(&key) {
            return Ok(*cached);
        }

        let tree = self.engine.tree_for_revision(revision)?;
        let repo = self.engine.repo();
        let repo = repo.lock().unwrap();
        let value = paths::resolve(&repo, tree, path)?;

        self.entry_cache.lock().unwrap().put(key, value);
        Ok(value)
    }

    /// The largest `r' <= revision` at which `path`'s entry changed, or
    /// `-1` if it was never present up to `revision` (§3).
    pub fn last_change(&self, path: &[u8], revision: u64) -> Result<i64> {
        if revision == 0 {
            return Ok(-1);
        }

        let key = (revision, path.to_vec());
        if let Some(cached) = self.last_change_cache.lock().unwrap().get(&key) {
            return Ok(*cached);
        }

        let mut next = self.entry_at(path, revision)?;
        let mut result = -1;
        for r in (1..=revision).rev() {
            let prev = self.entry_at(path, r - 1)?;
            if prev != next {
                result = r as i64;
                break;
            }
            next = prev;
        }

        self.last_change_cache.lock().unwrap().put(key, result);
        Ok(result)
    }

    /// If `path` was newly added at `revision` because of a rename or copy
    /// with identical content, returns `(source_path, source_revision)`.
    /// Returns `None` if rename detection is disabled for this repository,
    /// the path wasn't newly added, or the match is ambiguous (§3, §4.6).
    pub fn copy_from(&self, path: &[u8], revision: u64) -> Result<Option<(Vec<u8>, u64)>> {
        if !self.rename_detection || revision == 0 {
            return Ok(None);
        }

        let current = match self.entry_at(path, revision)? {
            Some(entry) => entry,
            None => return Ok(None),
        };
        if self.entry_at(path, revision - 1)?.is_some() {
            // Already present before this revision: a content change, not
            // an add, so there is no copy source to report.
            return Ok(None);
        }

        let old_tree = self.engine.tree_for_revision(revision - 1)?;
        let new_tree = self.engine.tree_for_revision(revision)?;
        let repo = self.engine.repo();
        let repo = repo.lock().unwrap();

        let removed = diff::removed_paths(&repo, old_tree, new_tree)?;
        let mut candidates = removed
            .into_iter()
            .filter(|(_, mode, id)| (*mode, *id) == current)
            .map(|(path, _, _)| path);

        match (candidates.next(), candidates.next()) {
            (Some(source), None) => Ok(Some((source, revision - 1))),
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};
    use std::time::SystemTime;

    use svn_objstore::{Repository, Signature, TreeEntry};
    use svn_persist::Connection;

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

        let blob_a = repo.insert_blob(b"a\n")?;
        let tree1 = repo.insert_tree(&[TreeEntry {
            name: b"a".to_vec(),
            mode: FileMode::Regular,
            id: blob_a,
        }])?;
        let c1 = repo.insert_commit(&[], tree1, &sig(), &sig(), "add a\n")?;

        // Rev 2: rename a -> b (same content).
        let tree2 = repo.insert_tree(&[TreeEntry {
            name: b"b".to_vec(),
            mode: FileMode::Regular,
            id: blob_a,
        }])?;
        let c2 = repo.insert_commit(&[c1], tree2, &sig(), &sig(), "rename a to b\n")?;

        // Rev 3: modify b's content.
        let blob_b2 = repo.insert_blob(b"b2\n")?;
        let tree3 = repo.insert_tree(&[TreeEntry {
            name: b"b".to_vec(),
            mode: FileMode::Regular,
            id: blob_b2,
        }])?;
        let c3 = repo.insert_commit(&[c2], tree3, &sig(), &sig(), "modify b\n")?;

        repo.compare_and_set_ref("refs/heads/trunk", None, c3)?;

        let repo = Arc::new(StdMutex::new(repo));
        let store = Arc::new(StdMutex::new(Connection::open_in_memory()?));
        let engine = Engine::new(repo, store, "trunk");
        engine.sync()?;

        Ok((dir, engine))
    }

    #[test]
    fn test_last_change_tracks_modifications() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, true);

        assert_eq!(history.last_change(b"a", 1)?, 1);
        assert_eq!(history.last_change(b"b", 2)?, 2);
        assert_eq!(history.last_change(b"b", 3)?, 3);
        // "a" no longer exists at rev 3: the entry comparison walk still
        // finds it was last present (then removed) at revision 2.
        assert_eq!(history.last_change(b"a", 2)?, 2);
        Ok(())
    }

    #[test]
    fn test_last_change_never_present_is_negative_one() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, true);
        assert_eq!(history.last_change(b"never", 3)?, -1);
        Ok(())
    }

    #[test]
    fn test_copy_from_detects_rename() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, true);

        let (source, rev) = history.copy_from(b"b", 2)?.unwrap();
        assert_eq!(source, b"a");
        assert_eq!(rev, 1);
        Ok(())
    }

    #[test]
    fn test_copy_from_is_none_for_content_only_changes() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, true);
        assert_eq!(history.copy_from(b"b", 3)?, None);
        Ok(())
    }

    #[test]
    fn test_copy_from_disabled() -> anyhow::Result<()> {
        let (_dir, engine) = setup()?;
        let history = PathHistory::new(&engine, false);
        assert_eq!(history.copy_from(b"b", 2)?, None);
        Ok(())
    }
}
