//! The protocol-defined property names this server knows how to compute
//! (§3's "Properties are a string→string map whose keys are protocol-defined
//! names").

pub const EXECUTABLE: &str = "svn:executable";
pub const SPECIAL: &str = "svn:special";
pub const MIME_TYPE: &str = "svn:mime-type";
pub const IGNORE: &str = "svn:ignore";
pub const EXTERNALS: &str = "svn:externals";

/// Value used for boolean-valued properties like [`EXECUTABLE`] and
/// [`SPECIAL`]: their presence, not their content, carries the meaning.
pub const PRESENT: &str = "*";
