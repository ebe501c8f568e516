use std::sync::{Arc, Mutex};
use std::time::SystemTime;

use svn_objstore::{Commit, ObjectId, Repository};
use svn_persist::Connection;

use crate::error::{Error, Result};

/// Synthesises the linear revision sequence from a branch's first-parent
/// chain (§2's "branch engine"), and maintains the revision↔commit-id
/// mapping durably via `svn-persist` so a restart doesn't require re-walking
/// the whole history (§3's "Invariant: the mapping revision↔commit-id is
/// stable within a server's lifetime").
pub struct Engine {
    repo: Arc<Mutex<Repository>>,
    store: Arc<Mutex<Connection>>,
    ref_name: String,
    branch_name: String,
}

impl Engine {
    pub fn new(
        repo: Arc<Mutex<Repository>>,
        store: Arc<Mutex<Connection>>,
        branch_name: impl Into<String>,
    ) -> Self {
        let branch_name = branch_name.into();
        let ref_name = format!("refs/heads/{}", branch_name);
        Self {
            repo,
            store,
            ref_name,
            branch_name,
        }
    }

    pub fn branch_name(&self) -> &str {
        &self.branch_name
    }

    pub fn ref_name(&self) -> &str {
        &self.ref_name
    }

    /// Extends the durable revision map with any commits reachable from the
    /// branch tip (by first parent) that haven't been assigned a revision
    /// number yet. Returns the new latest revision. Idempotent: calling this
    /// with nothing new to map is a cheap no-op.
    pub fn sync(&self) -> Result<u64> {
        let repo = self.repo.lock().unwrap();
        let store = self.store.lock().unwrap();

        let tip = repo.resolve_ref(&self.ref_name)?;
        let tip = match tip {
            Some(tip) => tip,
            None => return Ok(store.highest_mapped_revision(&self.branch_name)?.unwrap_or(0)),
        };

        let highest_mapped = store.highest_mapped_revision(&self.branch_name)?.unwrap_or(0);
        let last_mapped_commit = if highest_mapped == 0 {
            None
        } else {
            let bytes = store
                .get_commit_for_revision(&self.branch_name, highest_mapped)?
                .ok_or_else(|| Error::CorruptRevisionMap {
                    branch: self.branch_name.clone(),
                    revision: highest_mapped,
                })?;
            Some(ObjectId::from_bytes(&bytes)?)
        };

        // Walk backward from the tip until we reach the last commit we
        // already mapped (or the root), collecting the new commits.
        let mut new_commits = Vec::new();
        let mut cursor = Some(tip);
        while let Some(id) = cursor {
            if Some(id) == last_mapped_commit {
                break;
            }

            let commit = repo.find_commit(id)?;
            cursor = commit.first_parent();
            new_commits.push(id);
        }

        // `new_commits` is tip-to-root; reverse to assign revisions in
        // history order (root-most new commit gets the lowest number).
        new_commits.reverse();

        let mut revision = highest_mapped;
        for id in new_commits {
            revision += 1;
            store.put_revision(&self.branch_name, revision, id.as_bytes())?;
        }

        Ok(revision)
    }

    pub fn latest_revision(&self) -> Result<u64> {
        let store = self.store.lock().unwrap();
        Ok(store.highest_mapped_revision(&self.branch_name)?.unwrap_or(0))
    }

    /// The commit at `revision`, or `None` for revision 0 (the well-defined
    /// empty tree, §3).
    pub fn commit_id_for_revision(&self, revision: u64) -> Result<Option<ObjectId>> {
        if revision == 0 {
            return Ok(None);
        }

        let store = self.store.lock().unwrap();
        match store.get_commit_for_revision(&self.branch_name, revision)? {
            Some(bytes) => Ok(Some(ObjectId::from_bytes(&bytes)?)),
            None => Err(Error::NoSuchRevision(revision)),
        }
    }

    pub fn revision_for_commit(&self, id: ObjectId) -> Result<Option<u64>> {
        let store = self.store.lock().unwrap();
        Ok(store.get_revision_for_commit(&self.branch_name, id.as_bytes())?)
    }

    pub fn commit_for_revision(&self, revision: u64) -> Result<Option<Commit>> {
        match self.commit_id_for_revision(revision)? {
            Some(id) => {
                let repo = self.repo.lock().unwrap();
                Ok(Some(repo.find_commit(id)?))
            }
            None => Ok(None),
        }
    }

    /// The root tree object for `revision`: the empty tree for revision 0,
    /// else the commit's tree.
    pub fn tree_for_revision(&self, revision: u64) -> Result<ObjectId> {
        match self.commit_for_revision(revision)? {
            Some(commit) => Ok(commit.tree),
            None => Ok(ObjectId::empty_tree()),
        }
    }

    /// The highest revision whose commit time is `<= when` (`get-dated-rev`,
    /// §4.2). Revision 0 always qualifies, since it has no timestamp of its
    /// own and precedes every real commit.
    pub fn dated_revision(&self, when: SystemTime) -> Result<u64> {
        let latest = self.latest_revision()?;
        for revision in (1..=latest).rev() {
            if let Some(commit) = self.commit_for_revision(revision)? {
                if commit.committer.time <= when {
                    return Ok(revision);
                }
            }
        }
        Ok(0)
    }

    pub fn repo(&self) -> Arc<Mutex<Repository>> {
        self.repo.clone()
    }

    pub(crate) fn store(&self) -> Arc<Mutex<Connection>> {
        self.store.clone()
    }
}
