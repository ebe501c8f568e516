mod binary_classification;
mod connection;
mod error;
mod locks;
mod migrations;
mod revision_map;
mod sql;

pub use connection::Connection;
pub use error::{Error, Result};
pub use locks::LockRow;
