//! Connection helpers for the embedded store.
//!
//! Callers own the connection and its transaction boundaries; these helpers
//! only open one and map failures into `StorageError`. A
//! `rusqlite::Transaction` derefs to `Connection`, so every mapping
//! operation works unchanged inside a caller-managed transaction.

use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::StorageError;

/// Open (creating if necessary) a database file.
pub fn open<P: AsRef<Path>>(path: P) -> Result<Connection, StorageError> {
    debug!(path = %path.as_ref().display(), "opening database");

    Connection::open(path).map_err(|e| StorageError::Storage(e.to_string()))
}

/// Open a private in-memory database.
pub fn open_in_memory() -> Result<Connection, StorageError> {
    Connection::open_in_memory().map_err(|e| StorageError::Storage(e.to_string()))
}
