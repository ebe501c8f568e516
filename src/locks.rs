//! Lock registry business logic (§4.5): token issuance, steal/break
//! semantics, and the atomic-across-targets `lock` call, layered over
//! `svn-persist`'s durable `lock_table`.

use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use svn_persist::{Connection, LockRow};

use crate::error::{Error, Result};

/// One requested lock target: the path and the revision the client last
/// saw it at (currently unused for conflict detection, but carried through
/// since `lock`'s wire schema includes it, §6).
pub struct LockTarget {
    pub path: Vec<u8>,
    pub current_rev: Option<i64>,
}

/// Guards a repository's lock table with an explicit read-write mutex on
/// top of the `Mutex<Connection>` every repository already shares (§5):
/// the inner mutex only protects the SQLite handle, while this outer lock
/// models the "reads under a read lock, writes under a write lock"
/// semantics §4.5 calls for, and is what a caller should hold across a
/// multi-row atomic `lock`/`unlock` call.
pub struct LockRegistry {
    store: Arc<Mutex<Connection>>,
    branch: String,
    guard: RwLock<()>,
}

impl LockRegistry {
    pub fn new(store: Arc<Mutex<Connection>>, branch: String) -> Self {
        Self {
            store,
            branch,
            guard: RwLock::new(()),
        }
    }

    /// Locks every target atomically: either every path succeeds or none of
    /// them are locked (§4.5). `steal` replaces an existing lock rather
    /// than failing on it.
    pub fn lock(
        &self,
        owner: &str,
        targets: &[LockTarget],
        comment: Option<String>,
        steal: bool,
    ) -> Result<Vec<LockRow>> {
        let _guard = self.guard.write().unwrap();
        let store = self.store.lock().unwrap();

        if !steal {
            for target in targets {
                if store.get_lock(&self.branch, &target.path)?.is_some() {
                    return Err(Error::PathAlreadyLocked(String::from_utf8_lossy(&target.path).into_owned()));
                }
            }
        }

        let mut rows = Vec::with_capacity(targets.len());
        for target in targets {
            let row = LockRow {
                path: target.path.clone(),
                token: format!("opaquelocktoken:{}", uuid::Uuid::new_v4()),
                owner: owner.to_string(),
                comment: comment.clone(),
                created_at: SystemTime::now(),
                branch: self.branch.clone(),
            };
            store.put_lock(&row)?;
            rows.push(row);
        }

        Ok(rows)
    }

    /// Releases locks by token, atomically across the target list. `force`
    /// bypasses the token check (an admin "break").
    pub fn unlock(&self, targets: &[(Vec<u8>, Option<String>)], force: bool) -> Result<()> {
        let _guard = self.guard.write().unwrap();
        let store = self.store.lock().unwrap();

        for (path, token) in targets {
            let existing = store
                .get_lock(&self.branch, path)?
                .ok_or_else(|| Error::NoSuchLock(String::from_utf8_lossy(path).into_owned()))?;

            if !force && token.as_deref() != Some(existing.token.as_str()) {
                return Err(Error::LockOwnerMismatch(String::from_utf8_lossy(path).into_owned()));
            }
        }

        for (path, _) in targets {
            store.delete_lock(&self.branch, path)?;
        }

        Ok(())
    }

    pub fn get_lock(&self, path: &[u8]) -> Result<Option<LockRow>> {
        let _guard = self.guard.read().unwrap();
        Ok(self.store.lock().unwrap().get_lock(&self.branch, path)?)
    }

    pub fn get_locks(&self, prefix: &[u8]) -> Result<Vec<LockRow>> {
        let _guard = self.guard.read().unwrap();
        Ok(self.store.lock().unwrap().get_locks(&self.branch, prefix)?)
    }

    /// Verifies every path the commit actually modifies against the lock
    /// set (§4.5: "the commit editor checks every modified path against the
    /// lock set; a lock not presented or not owned by the committer
    /// fails"). `modified_paths` comes from diffing the commit's base and
    /// new trees, so it carries no leading slash; `presented` is the
    /// client's own `(path, token)` list off the wire, which does. Both are
    /// normalized to the lock table's leading-slash convention before
    /// comparison.
    pub fn check_commit_tokens(&self, owner: &str, modified_paths: &[Vec<u8>], presented: &[(Vec<u8>, Option<String>)]) -> Result<()> {
        let _guard = self.guard.read().unwrap();
        let store = self.store.lock().unwrap();

        for raw_path in modified_paths {
            let path = with_leading_slash(raw_path);
            let existing = match store.get_lock(&self.branch, &path)? {
                Some(existing) => existing,
                None => continue,
            };

            let token = presented
                .iter()
                .find(|(p, _)| with_leading_slash(p) == path)
                .and_then(|(_, t)| t.as_deref());

            match token {
                None => return Err(Error::NoUser(String::from_utf8_lossy(&path).into_owned())),
                Some(t) if t == existing.token && existing.owner == owner => {}
                Some(_) => return Err(Error::LockOwnerMismatch(String::from_utf8_lossy(&path).into_owned())),
            }
        }

        Ok(())
    }
}

fn with_leading_slash(path: &[u8]) -> Vec<u8> {
    if path.first() == Some(&b'/') {
        path.to_vec()
    } else {
        let mut v = Vec::with_capacity(path.len() + 1);
        v.push(b'/');
        v.extend_from_slice(path);
        v
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LockRegistry {
        let store = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        LockRegistry::new(store, "trunk".to_string())
    }

    fn target(path: &[u8]) -> LockTarget {
        LockTarget {
            path: path.to_vec(),
            current_rev: None,
        }
    }

    #[test]
    fn test_lock_then_conflicting_lock_fails_without_steal() -> anyhow::Result<()> {
        let registry = registry();
        registry.lock("alice", &[target(b"/a")], None, false)?;

        let err = registry.lock("bob", &[target(b"/a")], None, false).unwrap_err();
        assert!(matches!(err, Error::PathAlreadyLocked(_)));
        Ok(())
    }

    #[test]
    fn test_steal_replaces_existing_lock() -> anyhow::Result<()> {
        let registry = registry();
        let first = registry.lock("alice", &[target(b"/a")], None, false)?;
        registry.lock("bob", &[target(b"/a")], None, true)?;

        let current = registry.get_lock(b"/a")?.unwrap();
        assert_eq!(current.owner, "bob");
        assert_ne!(current.token, first[0].token);
        Ok(())
    }

    #[test]
    fn test_lock_is_atomic_across_targets() -> anyhow::Result<()> {
        let registry = registry();
        registry.lock("alice", &[target(b"/a")], None, false)?;

        let err = registry
            .lock("bob", &[target(b"/b"), target(b"/a")], None, false)
            .unwrap_err();
        assert!(matches!(err, Error::PathAlreadyLocked(_)));
        assert!(registry.get_lock(b"/b")?.is_none());
        Ok(())
    }

    #[test]
    fn test_unlock_requires_matching_token_unless_forced() -> anyhow::Result<()> {
        let registry = registry();
        let rows = registry.lock("alice", &[target(b"/a")], None, false)?;

        assert!(registry.unlock(&[(b"/a".to_vec(), Some("wrong".to_string()))], false).is_err());
        registry.unlock(&[(b"/a".to_vec(), Some(rows[0].token.clone()))], false)?;
        assert!(registry.get_lock(b"/a")?.is_none());
        Ok(())
    }

    #[test]
    fn test_check_commit_tokens_requires_owner_match() -> anyhow::Result<()> {
        let registry = registry();
        let rows = registry.lock("alice", &[target(b"/a")], None, false)?;

        assert!(registry
            .check_commit_tokens("alice", &[b"a".to_vec()], &[(b"/a".to_vec(), Some(rows[0].token.clone()))])
            .is_ok());
        assert!(registry.check_commit_tokens("alice", &[b"a".to_vec()], &[(b"/a".to_vec(), None)]).is_err());
        assert!(registry
            .check_commit_tokens("bob", &[b"a".to_vec()], &[(b"/a".to_vec(), Some(rows[0].token.clone()))])
            .is_err());
        Ok(())
    }

    #[test]
    fn test_check_commit_tokens_ignores_unmodified_locked_paths() -> anyhow::Result<()> {
        let registry = registry();
        registry.lock("alice", &[target(b"/a")], None, false)?;

        // "/a" is locked by alice but isn't in the modified set, so bob's
        // commit (which never presents a token for it) still passes.
        assert!(registry.check_commit_tokens("bob", &[b"b".to_vec()], &[]).is_ok());
        Ok(())
    }

    #[test]
    fn test_check_commit_tokens_rejects_a_modified_locked_path_with_no_presented_token() -> anyhow::Result<()> {
        let registry = registry();
        registry.lock("alice", &[target(b"/a")], None, false)?;

        let err = registry.check_commit_tokens("bob", &[b"a".to_vec()], &[]).unwrap_err();
        assert!(matches!(err, Error::NoUser(_)));
        Ok(())
    }
}
