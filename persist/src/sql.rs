//! Helpers for types that don't natively implement ToSql.

use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::ToSql;

pub(crate) fn time(time: &SystemTime) -> impl ToSql {
    time.duration_since(UNIX_EPOCH).unwrap().as_secs() as i64
}
