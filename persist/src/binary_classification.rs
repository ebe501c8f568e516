use rusqlite::{params, OptionalExtension};

use crate::connection::Connection;
use crate::error::Result;

/// Caches the result of sniffing whether a blob's content is binary for a
/// given named filter (§4.6's path-property pipeline consults this so the
/// same blob is never re-sniffed twice).
impl Connection {
    pub fn get_binary_classification(
        &self,
        filter_name: &str,
        blob_id: &[u8],
    ) -> Result<Option<bool>> {
        self.conn
            .query_row(
                "SELECT is_binary FROM binary_classification
                 WHERE filter_name = ?1 AND blob_id = ?2",
                params![filter_name, blob_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()
            .map(|v| v.map(|v| v != 0))
            .map_err(Into::into)
    }

    pub fn put_binary_classification(
        &self,
        filter_name: &str,
        blob_id: &[u8],
        is_binary: bool,
    ) -> Result<()> {
        self.conn.execute(
            "REPLACE INTO binary_classification (filter_name, blob_id, is_binary)
             VALUES (?1, ?2, ?3)",
            params![filter_name, blob_id, is_binary as i64],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification_round_trip() -> anyhow::Result<()> {
        let conn = Connection::open_in_memory()?;
        assert!(conn.get_binary_classification("identity", b"deadbeef")?.is_none());

        conn.put_binary_classification("identity", b"deadbeef", true)?;
        assert_eq!(
            conn.get_binary_classification("identity", b"deadbeef")?,
            Some(true)
        );
        Ok(())
    }
}
