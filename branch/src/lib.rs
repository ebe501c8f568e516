//! Branch engine, path resolution and the read-side revision view (§2, §4.6).

mod diff;
mod engine;
mod error;
mod locations;
mod path_history;
mod paths;
mod revision_view;

pub use engine::Engine;
pub use error::{Error, Result};
pub use locations::{get_locations, location_segments, PathSegment};
pub use path_history::PathHistory;
pub use paths::{components, list, resolve, split_parent};
pub use revision_view::{Entry, EntryKind, RevisionView};
