use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    ObjStore(#[from] svn_objstore::Error),

    #[error("malformed .svnprops line: {0}")]
    MalformedAutoProps(String),
}

pub type Result<T> = std::result::Result<T, Error>;
