pub mod accounts;
pub mod attempts;
pub mod bookings;
pub mod catalog;
pub mod models;

use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, SqlitePool, Transaction};

use crate::config::{DB_BUSY_TIMEOUT_SECS, DB_MAX_CONNECTIONS};
use crate::error::{AppError, Result};

/// Open (creating if needed) the SQLite database and apply migrations.
pub async fn connect(db_path: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{db_path}"))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(DB_BUSY_TIMEOUT_SECS));

    let pool = SqlitePoolOptions::new()
        .max_connections(DB_MAX_CONNECTIONS)
        .connect_with(options)
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    Ok(pool)
}

/// Timestamps are stored as epoch milliseconds.
pub fn to_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}

pub fn from_ms(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp_millis(ms)
        .ok_or_else(|| AppError::CorruptRecord(format!("timestamp out of range: {ms}")))
}

/// Drop sub-millisecond precision so in-memory state matches what is stored.
pub fn truncate_ms(at: DateTime<Utc>) -> DateTime<Utc> {
    at.with_nanosecond(at.nanosecond() / 1_000_000 * 1_000_000).unwrap_or(at)
}

/// Current time at storage precision.
pub fn now() -> DateTime<Utc> {
    truncate_ms(Utc::now())
}

/// Start a write transaction. `BEGIN IMMEDIATE` takes the write lock up front,
/// so a transaction that reads before writing never fails on a stale snapshot.
pub async fn begin_write(pool: &SqlitePool) -> Result<Transaction<'static, Sqlite>> {
    Ok(pool.begin_with("BEGIN IMMEDIATE").await?)
}

/// Single-connection in-memory database with migrations applied.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .unwrap()
        .foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await
        .unwrap();
    sqlx::migrate!("./migrations").run(&pool).await.unwrap();
    pool
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn truncation_matches_stored_precision() {
        let at = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap() + chrono::Duration::nanoseconds(123_456_789);
        let truncated = truncate_ms(at);
        assert_eq!(truncated.nanosecond(), 123_000_000);
        assert_eq!(from_ms(to_ms(at)).unwrap(), truncated);
        assert_eq!(now().nanosecond() % 1_000_000, 0);
    }

    #[test]
    fn out_of_range_timestamp_is_corrupt() {
        assert!(matches!(from_ms(i64::MIN), Err(AppError::CorruptRecord(_))));
    }
}
