use svn_objstore::{FileMode, ObjectId, Repository, TreeEntry};

use crate::error::Result;

/// Splits a `/`-separated path into its byte components, dropping any
/// leading/trailing/empty segments. Paths are opaque bytes end-to-end
/// (§9); this never interprets them as UTF-8.
pub fn components(path: &[u8]) -> Vec<&[u8]> {
    path.split(|&b| b == b'/').filter(|c| !c.is_empty()).collect()
}

/// Resolves `path` against the tree rooted at `root`, returning the entry's
/// mode and object id, or `None` if any component along the way is missing
/// or is a file where a directory was expected.
pub fn resolve(repo: &Repository, root: ObjectId, path: &[u8]) -> Result<Option<(FileMode, ObjectId)>> {
    let parts = components(path);
    if parts.is_empty() {
        return Ok(Some((FileMode::Tree, root)));
    }

    let mut current = root;
    for (i, part) in parts.iter().enumerate() {
        let tree = repo.find_tree(current)?;
        match tree.get(part) {
            Some(entry) => {
                if i + 1 == parts.len() {
                    return Ok(Some((entry.mode, entry.id)));
                }
                if !entry.mode.is_dir() {
                    return Ok(None);
                }
                current = entry.id;
            }
            None => return Ok(None),
        }
    }

    Ok(None)
}

/// The children of the directory at `path`, or `None` if `path` doesn't
/// exist or isn't a directory.
pub fn list(repo: &Repository, root: ObjectId, path: &[u8]) -> Result<Option<Vec<TreeEntry>>> {
    match resolve(repo, root, path)? {
        Some((mode, id)) if mode.is_dir() => Ok(Some(repo.find_tree(id)?.entries().to_vec())),
        _ => Ok(None),
    }
}

/// The parent path and final component name of `path` (e.g. `a/b/c` ->
/// (`a/b`, `c`)). The root path (`""`) has no parent.
pub fn split_parent(path: &[u8]) -> Option<(Vec<u8>, Vec<u8>)> {
    let parts = components(path);
    let (name, parent_parts) = parts.split_last()?;
    Some((parent_parts.join(&b'/'), name.to_vec()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_components_strips_slashes() {
        assert_eq!(components(b"/a/b/"), vec![b"a".as_ref(), b"b".as_ref()]);
        assert_eq!(components(b""), Vec::<&[u8]>::new());
    }

    #[test]
    fn test_split_parent() {
        assert_eq!(
            split_parent(b"a/b/c"),
            Some((b"a/b".to_vec(), b"c".to_vec()))
        );
        assert_eq!(split_parent(b"README"), Some((b"".to_vec(), b"README".to_vec())));
        assert_eq!(split_parent(b""), None);
    }
}
