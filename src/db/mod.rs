pub mod sqlite;

pub use sqlite::*;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid table identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Schema setup failed for {table}: {reason}")]
    SchemaFailed { table: String, reason: String },
}
