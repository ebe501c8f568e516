use svn_wire::{error_code, ProtocolError};
use thiserror::Error;

/// The server's internal error type (§7's "semantic errors"). Every
/// subsystem that isn't already a `thiserror` library crate in its own
/// right (the session/delta/commit-editor layer) produces this; `main`
/// wraps everything in `anyhow` at the process boundary, per §2a.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Wire(#[from] svn_wire::Error),

    #[error(transparent)]
    ObjStore(#[from] svn_objstore::Error),

    #[error(transparent)]
    Persist(#[from] svn_persist::Error),

    #[error(transparent)]
    Props(#[from] svn_props::Error),

    #[error(transparent)]
    Branch(#[from] svn_branch::Error),

    #[error(transparent)]
    Hooks(#[from] svn_hooks::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("path {0:?} not found")]
    NotFound(String),

    #[error("path {0:?} is not a directory")]
    NotDirectory(String),

    #[error("path {0:?} is not a file")]
    NotFile(String),

    #[error("no repository is mapped for url {0:?}")]
    UnknownRepository(String),

    #[error("protocol version {0} is not supported")]
    UnsupportedVersion(i64),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("not authorized to read {0:?}")]
    Unreadable(String),

    #[error("not authorized to write {0:?}")]
    Unwritable(String),

    #[error("path {0:?} is already locked")]
    PathAlreadyLocked(String),

    #[error("no lock held on {0:?}")]
    NoSuchLock(String),

    #[error("lock on {0:?} is owned by another user")]
    LockOwnerMismatch(String),

    #[error("no lock token presented for locked path {0:?}")]
    NoUser(String),

    #[error("checksum mismatch on {0:?}")]
    ChecksumMismatch(String),

    #[error("branch is not up to date")]
    NotUpToDate,

    #[error("conflicting concurrent commit")]
    Conflict,

    #[error("hook failed")]
    HookFailure,

    #[error("unknown command {0:?}")]
    UnknownCommand(String),

    #[error("request cancelled")]
    RequestCancelled,
}

impl Error {
    /// Maps an internal error onto the numeric wire code space clients key
    /// behaviour off (§7).
    pub fn to_protocol_error(&self) -> ProtocolError {
        use error_code::*;

        let (code, message) = match self {
            Error::NotFound(p) => (ENTRY_NOT_FOUND, format!("'{}' path not found", p)),
            Error::NotDirectory(p) => (FS_NOT_DIRECTORY, format!("'{}' is not a directory", p)),
            Error::NotFile(p) => (FS_NOT_FILE, format!("'{}' is not a file", p)),
            Error::UnknownRepository(url) => (FS_NOT_FOUND, format!("no repository for '{}'", url)),
            Error::UnsupportedVersion(v) => (RA_SVN_MALFORMED_DATA, format!("unsupported protocol version {}", v)),
            Error::AuthenticationFailed => (AUTHN_FAILED, "authentication failed".to_string()),
            Error::Unreadable(p) => (AUTHZ_UNREADABLE, format!("'{}' is not readable", p)),
            Error::Unwritable(p) => (AUTHZ_UNWRITABLE, format!("'{}' is not writable", p)),
            Error::PathAlreadyLocked(p) => (FS_PATH_ALREADY_LOCKED, format!("'{}' is already locked", p)),
            Error::NoSuchLock(p) => (FS_NO_SUCH_LOCK, format!("no lock on '{}'", p)),
            Error::LockOwnerMismatch(p) => (FS_LOCK_OWNER_MISMATCH, format!("lock on '{}' is owned by someone else", p)),
            Error::NoUser(p) => (FS_NO_USER, format!("no lock token presented for '{}'", p)),
            Error::ChecksumMismatch(p) => (FS_CHECKSUM_MISMATCH, format!("checksum mismatch on '{}'", p)),
            Error::NotUpToDate => (FS_NOT_UP_TO_DATE, "not up to date".to_string()),
            Error::Conflict => (FS_CONFLICT, "conflicting update".to_string()),
            Error::HookFailure => (REPOS_HOOK_FAILURE, "hook failed".to_string()),
            Error::UnknownCommand(cmd) => (RA_SVN_UNKNOWN_CMD, format!("unknown command '{}'", cmd)),
            Error::RequestCancelled => (RA_SVN_REQUEST_CANCELLED, "request cancelled".to_string()),
            Error::Wire(_) => (RA_SVN_MALFORMED_DATA, self.to_string()),
            Error::Io(_) => (IO_WRITE_ERROR, self.to_string()),
            _ => (RA_SVN_CMD_ERR, self.to_string()),
        };

        ProtocolError::new(code, message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
