use std::fmt;

/// An opaque 20-byte digest identifying a commit, tree, or blob (§3). Wraps
/// [`git2::Oid`] rather than re-exporting it so the rest of the workspace
/// never has to name `git2` directly — the backing store is an
/// implementation detail of this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub(crate) git2::Oid);

impl ObjectId {
    pub const LEN: usize = 20;

    pub fn from_bytes(bytes: &[u8]) -> crate::Result<Self> {
        Ok(Self(git2::Oid::from_bytes(bytes)?))
    }

    pub fn from_hex(hex: &str) -> crate::Result<Self> {
        Ok(Self(git2::Oid::from_str(hex)?))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_string()
    }

    /// The well-defined empty tree (revision 0, §3).
    pub fn empty_tree() -> Self {
        // The empty tree hash is a constant of the SHA-1 object format and
        // is identical across every Git repository.
        Self(git2::Oid::from_str("4b825dc642cb6eb9a060e54bf8d69288fbee4904").unwrap())
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<git2::Oid> for ObjectId {
    fn from(oid: git2::Oid) -> Self {
        Self(oid)
    }
}

impl From<ObjectId> for git2::Oid {
    fn from(id: ObjectId) -> Self {
        id.0
    }
}
