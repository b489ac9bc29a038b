use crate::core::error::ModsetError;
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Busy timeout applied to every live-store connection.
const BUSY_TIMEOUT_SECS: u64 = 5;

pub fn db_connect(db_path: &Path) -> Result<Connection, ModsetError> {
    if let Some(parent) = db_path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(db_path)?;
    conn.busy_timeout(Duration::from_secs(BUSY_TIMEOUT_SECS))?;
    conn.query_row("PRAGMA journal_mode=WAL;", [], |_| Ok(()))?;
    Ok(conn)
}
