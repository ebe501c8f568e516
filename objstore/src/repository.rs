use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::commit::{Commit, Signature};
use crate::error::{Error, Result};
use crate::id::ObjectId;
use crate::tree::{FileMode, Tree, TreeEntry};

/// A handle onto the content-addressed backing store (§3, §6). This is the
/// "object store adapter" leaf component: abstract access to commits, trees,
/// blobs, and refs, with an inserter for the write path. Every method takes
/// `&self` — `git2::Repository` is not `Sync`, so callers that need to share
/// one across worker threads wrap it in a `Mutex` (the shared-context does
/// this; see the root crate's `shared` module).
pub struct Repository {
    repo: git2::Repository,
}

impl Repository {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            repo: git2::Repository::open(path)?,
        })
    }

    /// Creates a bare repository with no commits. Revision 0 (the empty
    /// tree) is implicit and needs no object to be written for it (§3).
    pub fn init_bare<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self {
            repo: git2::Repository::init_bare(path)?,
        })
    }

    pub fn find_commit(&self, id: ObjectId) -> Result<Commit> {
        let commit = self
            .repo
            .find_commit(id.into())
            .map_err(|_| Error::NotACommit(id))?;

        Ok(Commit {
            id,
            parents: commit.parent_ids().map(ObjectId::from).collect(),
            tree: commit.tree_id().into(),
            author: signature_from_git(&commit.author()),
            committer: signature_from_git(&commit.committer()),
            message: commit.message().unwrap_or("").to_string(),
        })
    }

    pub fn find_tree(&self, id: ObjectId) -> Result<Tree> {
        if id == ObjectId::empty_tree() {
            return Ok(Tree::new(Vec::new()));
        }

        let tree = self
            .repo
            .find_tree(id.into())
            .map_err(|_| Error::NotATree(id))?;

        let entries = tree
            .iter()
            .map(|entry| TreeEntry {
                name: entry.name_bytes().to_vec(),
                mode: FileMode::from_git(entry.filemode()),
                id: entry.id().into(),
            })
            .collect();

        Ok(Tree::new(entries))
    }

    pub fn read_blob(&self, id: ObjectId) -> Result<Vec<u8>> {
        let blob = self
            .repo
            .find_blob(id.into())
            .map_err(|_| Error::NotABlob(id))?;
        Ok(blob.content().to_vec())
    }

    pub fn blob_size(&self, id: ObjectId) -> Result<u64> {
        let blob = self
            .repo
            .find_blob(id.into())
            .map_err(|_| Error::NotABlob(id))?;
        Ok(blob.size() as u64)
    }

    /// Resolves a ref (e.g. `refs/heads/trunk`) to the commit it currently
    /// points at, or `None` if the branch has no commits yet (revision 0).
    pub fn resolve_ref(&self, refname: &str) -> Result<Option<ObjectId>> {
        match self.repo.find_reference(refname) {
            Ok(reference) => Ok(Some(
                reference
                    .target()
                    .ok_or_else(|| Error::DanglingRef(refname.to_string()))?
                    .into(),
            )),
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Fast-forward-only compare-and-set of a branch ref (§4.4). Returns
    /// `true` if the update succeeded, `false` if `expected_old` no longer
    /// matches the ref's current value (a concurrent commit landed first).
    /// Callers are expected to hold the branch's write lock around this
    /// call; the check-then-set here closes the remaining race against any
    /// external mutation of the same bare repository.
    pub fn compare_and_set_ref(
        &self,
        refname: &str,
        expected_old: Option<ObjectId>,
        new: ObjectId,
    ) -> Result<bool> {
        let current = self.resolve_ref(refname)?;
        if current != expected_old {
            return Ok(false);
        }

        self.repo
            .reference(refname, new.into(), true, "svn bridge commit")?;
        Ok(true)
    }

    pub fn insert_blob(&self, data: &[u8]) -> Result<ObjectId> {
        Ok(self.repo.blob(data)?.into())
    }

    /// Builds a new tree object from a flat list of entries (§4.4's
    /// "serialised into new tree objects, post-order"). Callers assemble
    /// child trees first and pass their object ids in as ordinary entries.
    pub fn insert_tree(&self, entries: &[TreeEntry]) -> Result<ObjectId> {
        let mut builder = self.repo.treebuilder(None)?;
        for entry in entries {
            builder.insert(&entry.name, entry.id.into(), entry.mode.to_git())?;
        }
        Ok(builder.write()?.into())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn insert_commit(
        &self,
        parents: &[ObjectId],
        tree: ObjectId,
        author: &Signature,
        committer: &Signature,
        message: &str,
    ) -> Result<ObjectId> {
        let tree = self.repo.find_tree(tree.into())?;
        let parent_commits = parents
            .iter()
            .map(|id| self.repo.find_commit((*id).into()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        let parent_refs: Vec<&git2::Commit> = parent_commits.iter().collect();

        let author = signature_to_git(author)?;
        let committer = signature_to_git(committer)?;

        Ok(self
            .repo
            .commit(None, &author, &committer, message, &tree, &parent_refs)?
            .into())
    }
}

fn signature_from_git(sig: &git2::Signature) -> Signature {
    let when = sig.when();
    let time = UNIX_EPOCH + std::time::Duration::from_secs(when.seconds().max(0) as u64);
    Signature {
        name: sig.name().unwrap_or("").to_string(),
        email: sig.email().unwrap_or("").to_string(),
        time,
    }
}

fn signature_to_git(sig: &Signature) -> Result<git2::Signature<'static>> {
    let secs = sig
        .time
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;
    Ok(git2::Signature::new(
        &sig.name,
        &sig.email,
        &git2::Time::new(secs, 0),
    )?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sig() -> Signature {
        Signature {
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            time: SystemTime::now(),
        }
    }

    #[test]
    fn test_insert_blob_and_read_it_back() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let id = repo.insert_blob(b"hello\n")?;
        assert_eq!(repo.read_blob(id)?, b"hello\n");
        Ok(())
    }

    #[test]
    fn test_insert_tree_and_commit_round_trip() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let blob = repo.insert_blob(b"x")?;
        let tree = repo.insert_tree(&[TreeEntry {
            name: b"foo".to_vec(),
            mode: FileMode::Regular,
            id: blob,
        }])?;

        let commit_id = repo.insert_commit(&[], tree, &sig(), &sig(), "initial\n")?;
        let commit = repo.find_commit(commit_id)?;

        assert!(commit.parents.is_empty());
        assert_eq!(commit.tree, tree);

        let read_tree = repo.find_tree(commit.tree)?;
        let entry = read_tree.get(b"foo").unwrap();
        assert_eq!(entry.id, blob);
        assert_eq!(repo.read_blob(entry.id)?, b"x");
        Ok(())
    }

    #[test]
    fn test_compare_and_set_ref_detects_conflict() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let tree = repo.insert_tree(&[])?;
        let c1 = repo.insert_commit(&[], tree, &sig(), &sig(), "c1\n")?;
        let c2 = repo.insert_commit(&[c1], tree, &sig(), &sig(), "c2\n")?;

        assert!(repo.compare_and_set_ref("refs/heads/trunk", None, c1)?);
        assert!(repo.compare_and_set_ref("refs/heads/trunk", Some(c1), c2)?);
        assert!(!repo.compare_and_set_ref("refs/heads/trunk", Some(c1), c2)?);
        Ok(())
    }

    #[test]
    fn test_empty_tree_has_no_entries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;
        assert!(repo.find_tree(ObjectId::empty_tree())?.entries().is_empty());
        Ok(())
    }
}
