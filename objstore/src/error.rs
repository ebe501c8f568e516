use thiserror::Error;

use crate::ObjectId;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Git(#[from] git2::Error),

    #[error("object {0} not found")]
    NotFound(ObjectId),

    #[error("object {0} is not a tree")]
    NotATree(ObjectId),

    #[error("object {0} is not a blob")]
    NotABlob(ObjectId),

    #[error("object {0} is not a commit")]
    NotACommit(ObjectId),

    #[error("ref {0:?} points outside the repository")]
    DanglingRef(String),
}

pub type Result<T> = std::result::Result<T, Error>;
