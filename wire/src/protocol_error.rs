/// A single `(code msg file line)` error record as carried in a `failure`
/// response (§7). `code` lives in the numeric space of the protocol's
/// cousin implementation, since clients key behaviour off specific values.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    pub code: i64,
    pub message: String,
    pub file: Option<String>,
    pub line: Option<u32>,
}

impl ProtocolError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            file: None,
            line: None,
        }
    }

    pub fn with_origin(mut self, file: impl Into<String>, line: u32) -> Self {
        self.file = Some(file.into());
        self.line = Some(line);
        self
    }

    /// True if this code belongs to the "warning set" (§4.2): logged at info
    /// level rather than error level, because the condition is an expected
    /// part of normal client/server disagreement rather than a bug.
    pub fn is_warning(&self) -> bool {
        matches!(
            self.code,
            error::RA_SVN_CMD_ERR
                | error::ENTRY_NOT_FOUND
                | error::AUTHZ_UNREADABLE
                | error::FS_NO_SUCH_REVISION
                | error::IO_WRITE_ERROR
                | error::RA_SVN_REQUEST_CANCELLED
                | error::REPOS_HOOK_FAILURE
                | error::FS_NOT_UP_TO_DATE
        )
    }
}

impl std::fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({} {})", self.code, self.message)
    }
}

impl std::error::Error for ProtocolError {}

/// The numeric error-code space, named the way the reference
/// implementation's `svn_error_codes.h` names them, since clients pattern
/// match on these exact values.
pub mod error {
    pub const RA_SVN_UNKNOWN_CMD: i64 = 210001;
    pub const RA_SVN_CMD_ERR: i64 = 210002;
    pub const RA_SVN_REQUEST_CANCELLED: i64 = 210003;
    pub const RA_SVN_MALFORMED_DATA: i64 = 210004;

    pub const ENTRY_NOT_FOUND: i64 = 160013;
    pub const AUTHN_FAILED: i64 = 170001;
    pub const AUTHZ_UNREADABLE: i64 = 170002;
    pub const AUTHZ_UNWRITABLE: i64 = 170003;

    pub const FS_NOT_FOUND: i64 = 160005;
    pub const FS_ALREADY_EXISTS: i64 = 160020;
    pub const FS_NOT_DIRECTORY: i64 = 160016;
    pub const FS_NOT_FILE: i64 = 160017;
    pub const FS_CONFLICT: i64 = 160024;
    pub const FS_NOT_UP_TO_DATE: i64 = 160028;
    pub const FS_PATH_ALREADY_LOCKED: i64 = 160035;
    pub const FS_NO_SUCH_LOCK: i64 = 160036;
    pub const FS_LOCK_OWNER_MISMATCH: i64 = 160038;
    pub const FS_NO_SUCH_REVISION: i64 = 160006;
    pub const FS_NO_USER: i64 = 160041;
    pub const FS_CHECKSUM_MISMATCH: i64 = 160052;

    pub const IO_WRITE_ERROR: i64 = 160031;
    pub const IO_PIPE_READ_ERROR: i64 = 160032;

    pub const REPOS_HOOK_FAILURE: i64 = 165001;
}
