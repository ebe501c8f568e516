use svn_objstore::{FileMode, ObjectId, Repository, TreeEntry};

use crate::error::Result;

/// A full, recursive listing of every file and directory removed when
/// moving from `old_root` to `new_root` — i.e. present in `old_root`,
/// absent (or of a different kind) in `new_root`. Skips subtrees whose
/// object id is unchanged between the two roots, so unrelated parts of a
/// large tree are never walked (§9: caches keyed by content hash are safe
/// because the id determines the value; the same property lets us prune
/// identical subtrees without even reading them).
pub fn removed_paths(
    repo: &Repository,
    old_root: ObjectId,
    new_root: ObjectId,
) -> Result<Vec<(Vec<u8>, FileMode, ObjectId)>> {
    let mut out = Vec::new();
    walk(repo, Some(old_root), Some(new_root), &mut Vec::new(), &mut out)?;
    Ok(out)
}

fn walk(
    repo: &Repository,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
    prefix: &mut Vec<u8>,
    out: &mut Vec<(Vec<u8>, FileMode, ObjectId)>,
) -> Result<()> {
    if old == new {
        return Ok(());
    }

    let old_entries = match old {
        Some(id) => repo.find_tree(id)?.entries().to_vec(),
        None => Vec::new(),
    };
    let new_entries: Vec<TreeEntry> = match new {
        Some(id) => repo.find_tree(id)?.entries().to_vec(),
        None => Vec::new(),
    };

    for old_entry in &old_entries {
        let matching = new_entries.iter().find(|e| e.name == old_entry.name);

        let path_len = prefix.len();
        prefix.extend_from_slice(&old_entry.name);

        match matching {
            None => collect_all(repo, old_entry, prefix, out)?,
            Some(new_entry) if old_entry.id == new_entry.id => {}
            Some(new_entry) => {
                if old_entry.mode.is_dir() && new_entry.mode.is_dir() {
                    prefix.push(b'/');
                    walk(repo, Some(old_entry.id), Some(new_entry.id), prefix, out)?;
                    prefix.pop();
                } else if old_entry.mode.is_dir() {
                    collect_all(repo, old_entry, prefix, out)?;
                } else {
                    out.push((prefix.clone(), old_entry.mode, old_entry.id));
                }
            }
        }

        prefix.truncate(path_len);
    }

    Ok(())
}

fn collect_all(
    repo: &Repository,
    entry: &TreeEntry,
    prefix: &mut Vec<u8>,
    out: &mut Vec<(Vec<u8>, FileMode, ObjectId)>,
) -> Result<()> {
    if !entry.mode.is_dir() {
        out.push((prefix.clone(), entry.mode, entry.id));
        return Ok(());
    }

    let tree = repo.find_tree(entry.id)?;
    for child in tree.entries() {
        let path_len = prefix.len();
        prefix.push(b'/');
        prefix.extend_from_slice(&child.name);
        collect_all(repo, child, prefix, out)?;
        prefix.truncate(path_len);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use svn_objstore::TreeEntry;

    use super::*;

    #[test]
    fn test_removed_paths_detects_rename() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let blob = repo.insert_blob(b"content\n")?;
        let old_tree = repo.insert_tree(&[TreeEntry {
            name: b"a".to_vec(),
            mode: FileMode::Regular,
            id: blob,
        }])?;
        let new_tree = repo.insert_tree(&[TreeEntry {
            name: b"b".to_vec(),
            mode: FileMode::Regular,
            id: blob,
        }])?;

        let removed = removed_paths(&repo, old_tree, new_tree)?;
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].0, b"a");
        assert_eq!(removed[0].2, blob);
        Ok(())
    }

    #[test]
    fn test_removed_paths_skips_identical_subtrees() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let blob = repo.insert_blob(b"same\n")?;
        let sub = repo.insert_tree(&[TreeEntry {
            name: b"file".to_vec(),
            mode: FileMode::Regular,
            id: blob,
        }])?;
        let old_tree = repo.insert_tree(&[TreeEntry {
            name: b"sub".to_vec(),
            mode: FileMode::Tree,
            id: sub,
        }])?;
        // new_tree is identical: no removals expected.
        let removed = removed_paths(&repo, old_tree, old_tree)?;
        assert!(removed.is_empty());
        Ok(())
    }
}
