use std::str::FromStr;

use rusqlite::{params, Connection};
use uuid::Uuid;

use super::lab_test::{parse_timestamp, TIMESTAMP_FORMAT};
use crate::db::DatabaseError;
use crate::models::enums::*;
use crate::models::RunLogEntry;

/// Insert `entry` as the newest log line and drop everything beyond `capacity`.
pub fn prepend_run_log_entry(
    conn: &Connection,
    entry: &RunLogEntry,
    capacity: usize,
) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO run_log (timestamp, filename, status, record_id, category, message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            entry.filename,
            entry.status.as_str(),
            entry.record_id.map(|id| id.to_string()),
            entry.category.map(|c| c.as_str()),
            entry.message,
        ],
    )?;
    tx.execute(
        "DELETE FROM run_log WHERE id NOT IN
         (SELECT id FROM run_log ORDER BY id DESC LIMIT ?1)",
        params![capacity as i64],
    )?;
    tx.commit()?;
    Ok(())
}

/// Newest first.
pub fn read_run_log(conn: &Connection) -> Result<Vec<RunLogEntry>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT timestamp, filename, status, record_id, category, message
         FROM run_log ORDER BY id DESC",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(RunLogRow {
                timestamp: row.get(0)?,
                filename: row.get(1)?,
                status: row.get(2)?,
                record_id: row.get(3)?,
                category: row.get(4)?,
                message: row.get(5)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter().map(run_log_from_row).collect()
}

struct RunLogRow {
    timestamp: String,
    filename: String,
    status: String,
    record_id: Option<String>,
    category: Option<String>,
    message: String,
}

fn run_log_from_row(row: RunLogRow) -> Result<RunLogEntry, DatabaseError> {
    Ok(RunLogEntry {
        timestamp: parse_timestamp(&row.timestamp),
        filename: row.filename,
        status: LogStatus::from_str(&row.status)?,
        record_id: row.record_id.and_then(|s| Uuid::parse_str(&s).ok()),
        category: row.category.map(|s| TestCategory::from_str(&s)).transpose()?,
        message: row.message,
    })
}
