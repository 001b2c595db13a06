use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::lab_test::{parse_timestamp, TIMESTAMP_FORMAT};
use crate::db::DatabaseError;

const LAST_RUN_KEY: &str = "last_run";

pub fn set_setting(conn: &Connection, key: &str, value: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO settings (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

pub fn get_setting(conn: &Connection, key: &str) -> Result<Option<String>, DatabaseError> {
    let value = conn
        .query_row(
            "SELECT value FROM settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

pub fn set_last_run(conn: &Connection, at: &NaiveDateTime) -> Result<(), DatabaseError> {
    set_setting(conn, LAST_RUN_KEY, &at.format(TIMESTAMP_FORMAT).to_string())
}

pub fn get_last_run(conn: &Connection) -> Result<Option<NaiveDateTime>, DatabaseError> {
    Ok(get_setting(conn, LAST_RUN_KEY)?.map(|s| parse_timestamp(&s)))
}

/// Take the single-row run lock. A lock older than `ttl_secs` is considered
/// abandoned and is taken over. Returns false while another holder is live.
pub fn try_acquire_run_lock(
    conn: &Connection,
    holder: &str,
    now: &NaiveDateTime,
    ttl_secs: i64,
) -> Result<bool, DatabaseError> {
    // IMMEDIATE so two processes cannot both read an empty lock row.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

    let current: Option<(String, String)> = tx
        .query_row(
            "SELECT holder, acquired_at FROM run_lock WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    if let Some((current_holder, acquired_at)) = current {
        let age = now.signed_duration_since(parse_timestamp(&acquired_at));
        if age.num_seconds() < ttl_secs {
            tracing::debug!(holder = %current_holder, "Run lock held");
            return Ok(false);
        }
        tracing::warn!(
            holder = %current_holder,
            age_secs = age.num_seconds(),
            "Taking over stale run lock"
        );
    }

    tx.execute(
        "INSERT INTO run_lock (id, holder, acquired_at) VALUES (1, ?1, ?2)
         ON CONFLICT(id) DO UPDATE SET holder = excluded.holder, acquired_at = excluded.acquired_at",
        params![holder, now.format(TIMESTAMP_FORMAT).to_string()],
    )?;
    tx.commit()?;
    Ok(true)
}

/// Release the lock if `holder` still owns it.
pub fn release_run_lock(conn: &Connection, holder: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "DELETE FROM run_lock WHERE id = 1 AND holder = ?1",
        params![holder],
    )?;
    Ok(())
}
