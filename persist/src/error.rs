use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] io::Error),

    #[error(transparent)]
    Refinery(#[from] refinery::Error),

    #[error(transparent)]
    Rusqlite(#[from] rusqlite::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
