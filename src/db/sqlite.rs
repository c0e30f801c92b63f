use std::fmt;
use std::path::Path;

use rusqlite::Connection;

use super::DatabaseError;

const NEWS_TABLES_SQL: &str = include_str!("../../resources/schema/news_tables.sql");

/// Open a SQLite connection to the given path
pub fn open_database(path: &Path) -> Result<Connection, DatabaseError> {
    let conn = Connection::open(path)?;
    configure_pragmas(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing)
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    configure_pragmas(&conn)?;
    Ok(conn)
}

fn configure_pragmas(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "PRAGMA journal_mode=DELETE;
         PRAGMA busy_timeout=5000;"
    )?;
    Ok(())
}

/// Fully-qualified `project.dataset.table` name.
///
/// Each part is restricted to ASCII alphanumerics, `_` and `-`, so the
/// double-quoted form is always a safe SQLite identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableName(String);

impl TableName {
    pub fn qualified(project_id: &str, dataset_id: &str, table_id: &str) -> Result<Self, DatabaseError> {
        for part in [project_id, dataset_id, table_id] {
            let valid = !part.is_empty()
                && part
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
            if !valid {
                return Err(DatabaseError::InvalidIdentifier(part.to_string()));
            }
        }
        Ok(Self(format!("{project_id}.{dataset_id}.{table_id}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier form usable inside SQL text.
    pub fn quoted(&self) -> String {
        format!("\"{}\"", self.0)
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The input/output table pair a job runs against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewsTables {
    pub input: TableName,
    pub output: TableName,
}

/// Create the input and output tables if they do not exist yet.
pub fn ensure_news_tables(conn: &Connection, tables: &NewsTables) -> Result<(), DatabaseError> {
    let sql = NEWS_TABLES_SQL
        .replace("{input}", &tables.input.quoted())
        .replace("{output}", &tables.output.quoted());

    conn.execute_batch(&sql).map_err(|e| DatabaseError::SchemaFailed {
        table: format!("{}, {}", tables.input, tables.output),
        reason: e.to_string(),
    })?;

    tracing::debug!(
        input = %tables.input,
        output = %tables.output,
        "News tables ready"
    );
    Ok(())
}
