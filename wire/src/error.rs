use thiserror::Error;

/// The maximum number of bytes a single token (a byte-string payload or a
/// bare word) may occupy before the reader gives up and treats the stream as
/// malformed. This mirrors the `svn://` wire protocol's own framing limit.
pub const MAX_TOKEN_LEN: usize = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("unbalanced list: unexpected ')'")]
    UnbalancedList,

    #[error("token of {len} bytes exceeds the {MAX_TOKEN_LEN} byte framing limit")]
    TokenTooLarge { len: usize },

    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("unexpected end of stream while reading a token")]
    UnexpectedEof,

    #[error("expected a {want}, found {have}")]
    UnexpectedItem { want: &'static str, have: String },

    #[error("missing required field {0:?}")]
    MissingField(&'static str),

    #[error("field {field:?} has the wrong type")]
    FieldType { field: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;
