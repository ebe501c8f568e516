//! A minimal two-tree diff shared by `log`'s changed-paths list and the
//! commit editor's lock enforcement: added/deleted/modified file paths
//! between two root trees, walked directly against `svn_objstore::Tree`
//! since the rename-aware version in `svn_branch::diff` is private to that
//! crate. Doesn't attempt rename detection — just the presence/absence/
//! identity comparison both callers need (§4.2's `changed-paths` record,
//! §4.5's "every modified path").

use svn_objstore::{FileMode, ObjectId, Repository};

use crate::error::Result;

/// `path` carries no leading slash and uses `/` to join segments, matching
/// the convention `svn_branch::paths` normalizes report/lock paths to.
pub fn changed_paths(repo: &Repository, old_root: ObjectId, new_root: ObjectId) -> Result<Vec<(Vec<u8>, char)>> {
    let mut out = Vec::new();
    walk_changed(repo, Some(old_root), Some(new_root), &mut Vec::new(), &mut out)?;
    Ok(out)
}

fn walk_changed(
    repo: &Repository,
    old: Option<ObjectId>,
    new: Option<ObjectId>,
    prefix: &mut Vec<u8>,
    out: &mut Vec<(Vec<u8>, char)>,
) -> Result<()> {
    if old == new {
        return Ok(());
    }

    let old_entries = match old {
        Some(id) => repo.find_tree(id)?.entries().to_vec(),
        None => Vec::new(),
    };
    let new_entries = match new {
        Some(id) => repo.find_tree(id)?.entries().to_vec(),
        None => Vec::new(),
    };

    for old_entry in &old_entries {
        if new_entries.iter().any(|e| e.name == old_entry.name) {
            continue;
        }
        let path_len = prefix.len();
        prefix.extend_from_slice(&old_entry.name);
        mark_subtree(repo, old_entry.mode, old_entry.id, prefix, 'D', out)?;
        prefix.truncate(path_len);
    }

    for new_entry in &new_entries {
        let path_len = prefix.len();
        prefix.extend_from_slice(&new_entry.name);

        match old_entries.iter().find(|e| e.name == new_entry.name) {
            None => mark_subtree(repo, new_entry.mode, new_entry.id, prefix, 'A', out)?,
            Some(old_entry) if old_entry.id == new_entry.id && old_entry.mode == new_entry.mode => {}
            Some(old_entry) => {
                if old_entry.mode.is_dir() && new_entry.mode.is_dir() {
                    prefix.push(b'/');
                    walk_changed(repo, Some(old_entry.id), Some(new_entry.id), prefix, out)?;
                    prefix.pop();
                } else {
                    mark_subtree(repo, new_entry.mode, new_entry.id, prefix, 'M', out)?;
                }
            }
        }
        prefix.truncate(path_len);
    }

    Ok(())
}

fn mark_subtree(repo: &Repository, mode: FileMode, id: ObjectId, prefix: &mut Vec<u8>, action: char, out: &mut Vec<(Vec<u8>, char)>) -> Result<()> {
    if !mode.is_dir() {
        out.push((prefix.clone(), action));
        return Ok(());
    }
    let tree = repo.find_tree(id)?;
    for child in tree.entries() {
        let path_len = prefix.len();
        prefix.push(b'/');
        prefix.extend_from_slice(&child.name);
        mark_subtree(repo, child.mode, child.id, prefix, action, out)?;
        prefix.truncate(path_len);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use svn_objstore::TreeEntry;

    #[test]
    fn test_added_file_is_reported_as_add() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;
        let blob = repo.insert_blob(b"hi\n")?;
        let tree = repo.insert_tree(&[TreeEntry {
            name: b"a.txt".to_vec(),
            mode: FileMode::Regular,
            id: blob,
        }])?;
        let empty = repo.insert_tree(&[])?;

        let diffs = changed_paths(&repo, empty, tree)?;
        assert_eq!(diffs, vec![(b"a.txt".to_vec(), 'A')]);
        Ok(())
    }

    #[test]
    fn test_modified_nested_file_reports_its_full_path() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let repo = Repository::init_bare(dir.path())?;

        let blob1 = repo.insert_blob(b"old\n")?;
        let sub1 = repo.insert_tree(&[TreeEntry {
            name: b"f.txt".to_vec(),
            mode: FileMode::Regular,
            id: blob1,
        }])?;
        let root1 = repo.insert_tree(&[TreeEntry {
            name: b"sub".to_vec(),
            mode: FileMode::Tree,
            id: sub1,
        }])?;

        let blob2 = repo.insert_blob(b"new\n")?;
        let sub2 = repo.insert_tree(&[TreeEntry {
            name: b"f.txt".to_vec(),
            mode: FileMode::Regular,
            id: blob2,
        }])?;
        let root2 = repo.insert_tree(&[TreeEntry {
            name: b"sub".to_vec(),
            mode: FileMode::Tree,
            id: sub2,
        }])?;

        let diffs = changed_paths(&repo, root1, root2)?;
        assert_eq!(diffs, vec![(b"sub/f.txt".to_vec(), 'M')]);
        Ok(())
    }
}
