use rusqlite::{params, OptionalExtension};

use crate::connection::Connection;
use crate::error::Result;

/// Persists the revision-number ↔ commit-id mapping (§3, §6) so it survives a
/// restart without re-walking the whole first-parent chain.
impl Connection {
    pub fn get_commit_for_revision(&self, branch: &str, revision: u64) -> Result<Option<Vec<u8>>> {
        self.conn
            .query_row(
                "SELECT commit_id FROM revision_map WHERE branch = ?1 AND revision = ?2",
                params![branch, revision as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_revision_for_commit(&self, branch: &str, commit_id: &[u8]) -> Result<Option<u64>> {
        self.conn
            .query_row(
                "SELECT revision FROM revision_map WHERE branch = ?1 AND commit_id = ?2",
                params![branch, commit_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.map(|v| v as u64))
            .map_err(Into::into)
    }

    pub fn highest_mapped_revision(&self, branch: &str) -> Result<Option<u64>> {
        self.conn
            .query_row(
                "SELECT MAX(revision) FROM revision_map WHERE branch = ?1",
                params![branch],
                |row| row.get::<_, Option<i64>>(0),
            )
            .optional()
            .map(|v| v.flatten().map(|v| v as u64))
            .map_err(Into::into)
    }

    pub fn put_revision(&self, branch: &str, revision: u64, commit_id: &[u8]) -> Result<()> {
        self.conn.execute(
            "REPLACE INTO revision_map (branch, revision, commit_id) VALUES (?1, ?2, ?3)",
            params![branch, revision as i64, commit_id],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_map_round_trip() -> anyhow::Result<()> {
        let conn = Connection::open_in_memory()?;
        conn.put_revision("trunk", 1, b"0123456789abcdef0123")?;

        assert_eq!(
            conn.get_commit_for_revision("trunk", 1)?,
            Some(b"0123456789abcdef0123".to_vec())
        );
        assert_eq!(
            conn.get_revision_for_commit("trunk", b"0123456789abcdef0123")?,
            Some(1)
        );
        assert_eq!(conn.highest_mapped_revision("trunk")?, Some(1));
        Ok(())
    }

    #[test]
    fn test_highest_mapped_revision_empty() -> anyhow::Result<()> {
        let conn = Connection::open_in_memory()?;
        assert_eq!(conn.highest_mapped_revision("trunk")?, None);
        Ok(())
    }
}
