use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("error spawning hook: {0:?}")]
    Spawn(std::io::Error),

    #[error("error waiting for hook to exit: {0:?}")]
    Wait(std::io::Error),

    #[error("cannot establish a {pipe} pipe to hook: {err:?}")]
    OutputPipeCreate { err: std::io::Error, pipe: String },
}

pub type Result<T> = std::result::Result<T, Error>;
