//! Path-property pipeline and content filters (§2, §4.6's glossary entry for
//! "content filter"). Pure functions from `(file name, blob bytes)` to
//! attribute sets and byte transforms, as §1 specifies.

mod auto_props;
mod error;
mod filter;
mod names;
mod pipeline;

pub use auto_props::AutoPropRule;
pub use error::{Error, Result};
pub use filter::{ContentFilter, IdentityFilter, LargeObjectFilter, SymlinkFilter};
pub use pipeline::{ClassificationCache, MemoryClassificationCache, Pipeline};
pub mod property_names {
    pub use crate::names::*;
}
