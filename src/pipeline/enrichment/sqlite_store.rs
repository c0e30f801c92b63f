//! SQLite-backed input and output tables.
//!
//! Reads are `SELECT DISTINCT *`, so any column beyond the named record
//! fields is carried through to the output row. Inserts are column-by-name:
//! a row carrying a column the output table does not have is rejected on
//! its own and reported by index.

use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use rusqlite::types::{Type, Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, Row};
use serde_json::{Map, Value};

use super::error::EnrichmentError;
use super::traits::{OutputStore, SourceStore};
use super::types::*;
use crate::db::{ensure_news_tables, DatabaseError, NewsTables};

/// Input and output tables living in one SQLite database.
pub struct SqliteNewsStore {
    conn: Connection,
    tables: NewsTables,
}

impl SqliteNewsStore {
    /// Wrap a connection, creating the tables if needed.
    pub fn new(conn: Connection, tables: NewsTables) -> Result<Self, EnrichmentError> {
        ensure_news_tables(&conn, &tables)?;
        Ok(Self { conn, tables })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn tables(&self) -> &NewsTables {
        &self.tables
    }
}

fn sqlite_err(e: rusqlite::Error) -> EnrichmentError {
    EnrichmentError::Database(DatabaseError::Sqlite(e))
}

impl SourceStore for SqliteNewsStore {
    fn count_unprocessed(&self) -> Result<u64, EnrichmentError> {
        let count: i64 = self
            .conn
            .query_row(
                &format!(
                    "SELECT COUNT(*) FROM {} WHERE processed_flag = 0",
                    self.tables.input.quoted()
                ),
                [],
                |row| row.get(0),
            )
            .map_err(sqlite_err)?;
        Ok(count.max(0) as u64)
    }

    fn fetch_unprocessed(&self, limit: u32) -> Result<Vec<Record>, EnrichmentError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT DISTINCT * FROM {} WHERE processed_flag = 0 LIMIT ?1",
                self.tables.input.quoted()
            ))
            .map_err(sqlite_err)?;

        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = stmt.query(params![limit]).map_err(sqlite_err)?;

        // A row that cannot be decoded is skipped and stays unprocessed; the
        // rest of the page is still returned.
        let mut records = Vec::new();
        while let Some(row) = rows.next().map_err(sqlite_err)? {
            match record_from_row(row, &columns) {
                Ok(record) => records.push(record),
                Err(e) => match hash_pair_from_row(row, &columns) {
                    Some(pair) => {
                        let err = EnrichmentError::RecordProcessing {
                            pair,
                            reason: e.to_string(),
                        };
                        tracing::error!(error = %err, "Skipping undecodable input row");
                    }
                    None => tracing::error!(error = %e, "Skipping undecodable input row"),
                },
            }
        }
        Ok(records)
    }

    fn mark_processed(&self, pairs: &[HashPair]) -> Result<Vec<MarkFailure>, EnrichmentError> {
        let tx = self.conn.unchecked_transaction().map_err(sqlite_err)?;
        let sql = format!(
            "UPDATE {} SET processed_flag = 1
             WHERE title_hash = ?1 AND description_hash = ?2",
            self.tables.input.quoted()
        );

        let mut failures = Vec::new();
        for pair in pairs {
            if let Err(e) = tx.execute(&sql, params![pair.title_hash, pair.description_hash]) {
                failures.push(MarkFailure {
                    pair: *pair,
                    error: e.to_string(),
                });
            }
        }

        tx.commit().map_err(sqlite_err)?;
        Ok(failures)
    }
}

impl OutputStore for SqliteNewsStore {
    fn distinct_hash_pairs(&self) -> Result<HashSet<HashPair>, EnrichmentError> {
        let mut stmt = self
            .conn
            .prepare(&format!(
                "SELECT DISTINCT title_hash, description_hash FROM {}",
                self.tables.output.quoted()
            ))
            .map_err(sqlite_err)?;

        let rows = stmt
            .query_map([], |row| Ok(HashPair::new(row.get(0)?, row.get(1)?)))
            .map_err(sqlite_err)?;

        let mut pairs = HashSet::new();
        for row in rows {
            pairs.insert(row.map_err(sqlite_err)?);
        }
        Ok(pairs)
    }

    fn insert_rows(&self, rows: &[EnrichedRow]) -> Result<Vec<InsertFailure>, EnrichmentError> {
        let tx = self.conn.unchecked_transaction().map_err(sqlite_err)?;

        let mut failures = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            if let Err(error) = insert_row(&tx, &self.tables, row) {
                failures.push(InsertFailure { index, error });
            }
        }

        tx.commit().map_err(sqlite_err)?;
        Ok(failures)
    }
}

fn insert_row(conn: &Connection, tables: &NewsTables, row: &EnrichedRow) -> Result<(), String> {
    let fields = match serde_json::to_value(row).map_err(|e| e.to_string())? {
        Value::Object(fields) => fields,
        other => return Err(format!("row serialized to non-object: {other}")),
    };

    let columns: Vec<String> = fields.keys().map(|k| quote_column(k)).collect();
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        tables.output.quoted(),
        columns.join(", "),
        placeholders.join(", ")
    );

    conn.execute(&sql, params_from_iter(fields.into_iter().map(|(_, v)| json_to_sql(v))))
        .map(|_| ())
        .map_err(|e| e.to_string())
}

fn quote_column(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn record_from_row(row: &Row<'_>, columns: &[String]) -> rusqlite::Result<Record> {
    let mut title = String::new();
    let mut description = String::new();
    let mut title_hash = 0i64;
    let mut description_hash = 0i64;
    let mut date = NaiveDateTime::default();
    let mut processed_flag = false;
    let mut extra = Map::new();

    for (idx, column) in columns.iter().enumerate() {
        match column.as_str() {
            "title" => title = row.get::<_, Option<String>>(idx)?.unwrap_or_default(),
            "description" => description = row.get::<_, Option<String>>(idx)?.unwrap_or_default(),
            "title_hash" => title_hash = row.get(idx)?,
            "description_hash" => description_hash = row.get(idx)?,
            "date" => date = date_from_sql(row.get_ref(idx)?).ok_or_else(|| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    row.get_ref(idx).map(|v| v.data_type()).unwrap_or(Type::Null),
                    "unrecognized date format".into(),
                )
            })?,
            "processed_flag" => processed_flag = row.get(idx)?,
            other => {
                extra.insert(other.to_string(), sql_to_json(row.get_ref(idx)?));
            }
        }
    }

    Ok(Record {
        title,
        description,
        title_hash,
        description_hash,
        date,
        processed_flag,
        extra,
    })
}

fn hash_pair_from_row(row: &Row<'_>, columns: &[String]) -> Option<HashPair> {
    let get = |name: &str| {
        let idx = columns.iter().position(|c| c == name)?;
        row.get::<_, i64>(idx).ok()
    };
    Some(HashPair::new(get("title_hash")?, get("description_hash")?))
}

/// Accepts `%F %T%.f`, ISO 8601 with `T`, RFC 3339 (converted to UTC), a bare
/// date (midnight) and Unix epoch seconds.
fn date_from_sql(value: ValueRef<'_>) -> Option<NaiveDateTime> {
    match value {
        ValueRef::Text(bytes) => {
            let text = std::str::from_utf8(bytes).ok()?.trim();
            ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                .or_else(|| {
                    DateTime::parse_from_rfc3339(text)
                        .ok()
                        .map(|dt| dt.naive_utc())
                })
                .or_else(|| {
                    NaiveDate::parse_from_str(text, "%Y-%m-%d")
                        .ok()
                        .and_then(|d| d.and_hms_opt(0, 0, 0))
                })
                // TEXT affinity stores integer epochs as their decimal text.
                .or_else(|| {
                    let secs = text.parse::<i64>().ok()?;
                    DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc())
                })
        }
        ValueRef::Integer(secs) => DateTime::from_timestamp(secs, 0).map(|dt| dt.naive_utc()),
        ValueRef::Real(secs) if secs.is_finite() => {
            let whole = secs.floor();
            let nanos = ((secs - whole) * 1e9) as u32;
            DateTime::from_timestamp(whole as i64, nanos).map(|dt| dt.naive_utc())
        }
        _ => None,
    }
}

fn sql_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            Value::String(String::from_utf8_lossy(t).into_owned())
        }
    }
}

fn json_to_sql(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(b)),
        Value::Number(n) => match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => n.as_f64().map(SqlValue::Real).unwrap_or(SqlValue::Null),
        },
        Value::String(s) => SqlValue::Text(s),
        other => SqlValue::Text(other.to_string()),
    }
}
