use std::path::Path;

use crate::error::Result;
use crate::migrations;

/// One `rusqlite` connection to a repository's on-disk store, migrated to the
/// latest schema on open. Unlike the grounding codebase's `store::Connection`
/// (which hides rusqlite behind a worker thread so tokio tasks never block on
/// it), this server already runs one blocking OS thread per session, so
/// there's no runtime to protect: callers serialize access themselves via the
/// surrounding read-write lock (§5) and talk to SQLite directly.
#[derive(Debug)]
pub struct Connection {
    pub(crate) conn: rusqlite::Connection,
}

impl Connection {
    pub fn open(path: &Path) -> Result<Self> {
        let mut conn = rusqlite::Connection::open(path)?;
        migrations::migrations::runner().run(&mut conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let mut conn = rusqlite::Connection::open_in_memory()?;
        migrations::migrations::runner().run(&mut conn)?;
        Ok(Self { conn })
    }
}
