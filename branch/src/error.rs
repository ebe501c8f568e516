use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    ObjStore(#[from] svn_objstore::Error),

    #[error(transparent)]
    Persist(#[from] svn_persist::Error),

    #[error(transparent)]
    Props(#[from] svn_props::Error),

    #[error("revision {0} does not exist on this branch")]
    NoSuchRevision(u64),

    #[error("path {0:?} does not exist at revision {1}")]
    NoSuchPath(String, u64),

    #[error("revision map is corrupt: branch {branch:?} revision {revision} maps to an unreadable commit")]
    CorruptRevisionMap { branch: String, revision: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
