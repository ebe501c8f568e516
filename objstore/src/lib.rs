//! Content-addressed object store adapter (§3, §6's "object store adapter"
//! leaf component). Wraps `git2` so the rest of the workspace only ever
//! talks to 20-byte [`ObjectId`]s, [`Commit`]s, and [`Tree`]s rather than
//! `git2` types directly.

mod commit;
mod error;
mod id;
mod repository;
mod tree;

pub use commit::{Commit, Signature};
pub use error::{Error, Result};
pub use id::ObjectId;
pub use repository::Repository;
pub use tree::{FileMode, Tree, TreeEntry};
