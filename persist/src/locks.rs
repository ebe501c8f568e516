use std::time::SystemTime;

use rusqlite::{params, OptionalExtension};

use crate::connection::Connection;
use crate::error::Result;
use crate::sql;

/// A row from `lock_table` (§6). `path` is raw bytes, not UTF-8 (names are
/// opaque end-to-end per SPEC_FULL.md §9).
#[derive(Debug, Clone)]
pub struct LockRow {
    pub path: Vec<u8>,
    pub token: String,
    pub owner: String,
    pub comment: Option<String>,
    pub created_at: SystemTime,
    pub branch: String,
}

impl Connection {
    pub fn put_lock(&self, lock: &LockRow) -> Result<()> {
        self.conn.execute(
            "REPLACE INTO lock_table (path, token, owner, comment, created_at, branch)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                lock.path,
                lock.token,
                lock.owner,
                lock.comment,
                sql::time(&lock.created_at),
                lock.branch,
            ],
        )?;
        Ok(())
    }

    pub fn delete_lock(&self, branch: &str, path: &[u8]) -> Result<()> {
        self.conn.execute(
            "DELETE FROM lock_table WHERE branch = ?1 AND path = ?2",
            params![branch, path],
        )?;
        Ok(())
    }

    pub fn get_lock(&self, branch: &str, path: &[u8]) -> Result<Option<LockRow>> {
        self.conn
            .query_row(
                "SELECT path, token, owner, comment, created_at, branch
                 FROM lock_table WHERE branch = ?1 AND path = ?2",
                params![branch, path],
                row_to_lock,
            )
            .optional()
            .map_err(Into::into)
    }

    /// Every lock in `branch` whose path starts with `prefix` (`get-locks`, §4.2).
    pub fn get_locks(&self, branch: &str, prefix: &[u8]) -> Result<Vec<LockRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT path, token, owner, comment, created_at, branch
             FROM lock_table WHERE branch = ?1",
        )?;
        let rows = stmt
            .query_map(params![branch], row_to_lock)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows
            .into_iter()
            .filter(|row| row.path.starts_with(prefix))
            .collect())
    }
}

fn row_to_lock(row: &rusqlite::Row) -> rusqlite::Result<LockRow> {
    let created_secs: i64 = row.get(4)?;
    Ok(LockRow {
        path: row.get(0)?,
        token: row.get(1)?,
        owner: row.get(2)?,
        comment: row.get(3)?,
        created_at: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(created_secs as u64),
        branch: row.get(5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lock(path: &[u8], branch: &str) -> LockRow {
        LockRow {
            path: path.to_vec(),
            token: "opaquelocktoken:test".to_string(),
            owner: "alice".to_string(),
            comment: None,
            created_at: SystemTime::now(),
            branch: branch.to_string(),
        }
    }

    #[test]
    fn test_put_and_get_lock() -> anyhow::Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.put_lock(&lock(b"/a", "trunk"))?;

        let found = conn.get_lock("trunk", b"/a")?.unwrap();
        assert_eq!(found.owner, "alice");
        assert!(conn.get_lock("trunk", b"/b")?.is_none());
        Ok(())
    }

    #[test]
    fn test_delete_lock() -> anyhow::Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.put_lock(&lock(b"/a", "trunk"))?;
        conn.delete_lock("trunk", b"/a")?;
        assert!(conn.get_lock("trunk", b"/a")?.is_none());
        Ok(())
    }

    #[test]
    fn test_get_locks_by_prefix() -> anyhow::Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.put_lock(&lock(b"/dir/a", "trunk"))?;
        conn.put_lock(&lock(b"/dir/b", "trunk"))?;
        conn.put_lock(&lock(b"/other", "trunk"))?;

        let locks = conn.get_locks("trunk", b"/dir/")?;
        assert_eq!(locks.len(), 2);
        Ok(())
    }
}
