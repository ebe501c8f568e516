use crate::ObjectId;

/// The mode of a tree entry (§3). Mirrors the small, closed set of modes Git
/// itself supports; "nested-repository link" is a submodule gitlink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    Regular,
    Executable,
    Symlink,
    Tree,
    Gitlink,
}

impl FileMode {
    pub(crate) fn from_git(mode: i32) -> Self {
        match mode {
            0o040000 => FileMode::Tree,
            0o120000 => FileMode::Symlink,
            0o160000 => FileMode::Gitlink,
            0o100755 => FileMode::Executable,
            _ => FileMode::Regular,
        }
    }

    pub(crate) fn to_git(self) -> i32 {
        match self {
            FileMode::Tree => 0o040000,
            FileMode::Symlink => 0o120000,
            FileMode::Gitlink => 0o160000,
            FileMode::Executable => 0o100755,
            FileMode::Regular => 0o100644,
        }
    }

    pub fn is_dir(self) -> bool {
        matches!(self, FileMode::Tree)
    }
}

/// A single entry in a [`Tree`] (§3). `name` is raw bytes: names are opaque
/// end-to-end and compared byte-wise, never interpreted as UTF-8 (SPEC_FULL
/// §9's open question on non-UTF-8 names is resolved this way).
#[derive(Debug, Clone)]
pub struct TreeEntry {
    pub name: Vec<u8>,
    pub mode: FileMode,
    pub id: ObjectId,
}

/// A directory listing: an ordered set of [`TreeEntry`]s.
#[derive(Debug, Clone, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn new(entries: Vec<TreeEntry>) -> Self {
        Self { entries }
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn get(&self, name: &[u8]) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name == name)
    }
}
