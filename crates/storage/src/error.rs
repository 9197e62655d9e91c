//! Storage error types

use std::io;
use thiserror::Error;

/// Result type alias for store operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Errors raised by a store connection
#[derive(Debug, Error)]
pub enum StorageError {
    /// SQLite backend failure
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem failure
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Table creation collided with an existing table
    #[error("Table {table} already exists")]
    TableExists {
        /// Table name
        table: String,
    },

    /// Table does not exist
    #[error("No such table: {table}")]
    NoSuchTable {
        /// Table name
        table: String,
    },

    /// Commit or rollback without an open transaction
    #[error("No transaction is open")]
    NoTransaction,

    /// Begin while a transaction is already open
    #[error("A transaction is already open")]
    TransactionOpen,

    /// Failure injected by a test hook
    #[error("Injected fault: {0}")]
    Injected(String),

    /// Name does not follow the table layout
    #[error("Invalid table name: {name}")]
    InvalidTableName {
        /// Offending name
        name: String,
    },

    /// Stored row could not be interpreted
    #[error("Invalid row in {table}: {reason}")]
    InvalidRow {
        /// Table holding the row
        table: String,
        /// What was wrong
        reason: String,
    },
}

impl StorageError {
    /// Create a missing table error
    pub fn no_such_table(table: impl ToString) -> Self {
        Self::NoSuchTable {
            table: table.to_string(),
        }
    }

    /// Create an invalid row error
    pub fn invalid_row(table: impl ToString, reason: impl Into<String>) -> Self {
        Self::InvalidRow {
            table: table.to_string(),
            reason: reason.into(),
        }
    }
}
