//! SQLite persistence for validated market events.
//!
//! Two tables, `orders` and `trades`, keyed by the exchange's own identifiers
//! so that a crash-retry of the same batch never duplicates rows. The write
//! side ([`EventStore`]) belongs to the scraper daemon; the read side
//! ([`EventReader`]) is opened per worker during feature extraction.

pub mod pragma;
pub mod reader;
pub mod writer;

pub use reader::EventReader;
pub use writer::EventStore;

#[derive(Debug)]
pub enum StoreError {
    Database(rusqlite::Error),
    Io(std::io::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err)
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err)
    }
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::Database(e) => write!(f, "Database error: {}", e),
            StoreError::Io(e) => write!(f, "IO error: {}", e),
        }
    }
}

impl std::error::Error for StoreError {}
