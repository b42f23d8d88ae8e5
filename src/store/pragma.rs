//! Connection tuning shared by every SQLite handle.
//!
//! WAL lets the scraper keep writing while feature extraction reads the same
//! file; NORMAL synchronous is sufficient because batches commit in a single
//! transaction.

use rusqlite::Connection;

pub fn apply_connection_pragmas(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    Ok(())
}
