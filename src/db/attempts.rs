//! Durable surge state: the storage side of the pricing engine.
//!
//! Counter mode keeps one `flight_attempts` row per flight and writes it with
//! compare-and-swap on `version`. Log mode appends to `pricing_attempts`.

use chrono::{DateTime, Duration, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info, warn};

use crate::config::MAX_CONFLICT_RETRIES;
use crate::db::models::AttemptRow;
use crate::db::{from_ms, to_ms, truncate_ms};
use crate::error::{AppError, Result};
use crate::pricing::{AttemptState, Demand, Quote, SurgeEngine, SurgeMode};
use crate::types::Flight;

/// What recording one attempt did to the flight's demand state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub state: AttemptState,
    /// This attempt moved the flight into a surge.
    pub surge_started: bool,
}

pub struct SurgeStore {
    engine: SurgeEngine,
}

impl SurgeStore {
    pub fn new(engine: SurgeEngine) -> Self {
        Self { engine }
    }

    /// Record one booking attempt at `now`. Runs on the caller's connection so
    /// it commits or rolls back with the surrounding transaction.
    pub async fn record_attempt(
        &self,
        conn: &mut SqliteConnection,
        flight_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome> {
        match self.engine.mode() {
            SurgeMode::Counter => self.record_counter(conn, flight_id, now).await,
            SurgeMode::Log => self.record_log(conn, flight_id, now).await,
        }
    }

    async fn record_counter(
        &self,
        conn: &mut SqliteConnection,
        flight_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome> {
        let row = load_row(conn, flight_id).await?;
        let prev = row.as_ref().map(AttemptRow::state).transpose()?;
        let next = self.engine.record_attempt(prev.as_ref(), now);

        write_state(conn, flight_id, &next, row.map(|r| r.version)).await?;

        let was_surging = prev.as_ref().is_some_and(|s| s.is_surging(now));
        debug!(
            flight_id,
            attempt_count = next.attempt_count,
            phase = %next.phase(now),
            "Recorded booking attempt"
        );
        Ok(AttemptOutcome {
            surge_started: !was_surging && next.is_surging(now),
            state: next,
        })
    }

    async fn record_log(
        &self,
        conn: &mut SqliteConnection,
        flight_id: i64,
        now: DateTime<Utc>,
    ) -> Result<AttemptOutcome> {
        let policy = self.engine.policy();
        let horizon = now - policy.surge_duration.max(policy.window);
        let mut times = load_log(conn, flight_id, horizon, now).await?;
        let was_surging = self.engine.summarize_log(&times, now).is_surging(now);

        sqlx::query("INSERT INTO pricing_attempts (flight_id, attempt_ms) VALUES (?, ?)")
            .bind(flight_id)
            .bind(to_ms(now))
            .execute(&mut *conn)
            .await?;
        times.push(now);

        let state = self.engine.summarize_log(&times, now);
        debug!(flight_id, attempt_count = state.attempt_count, "Logged booking attempt");
        Ok(AttemptOutcome {
            surge_started: !was_surging && state.is_surging(now),
            state,
        })
    }

    /// Quote on the caller's connection, single try. In counter mode a lapsed
    /// surge is cleared here; the CAS fails if another writer got in first.
    pub async fn quote_in(&self, conn: &mut SqliteConnection, flight: &Flight, now: DateTime<Utc>) -> Result<Quote> {
        match self.engine.mode() {
            SurgeMode::Counter => {
                let row = load_row(conn, flight.id).await?;
                let state = row.as_ref().map(AttemptRow::state).transpose()?;
                let (quote, reset) = self.engine.quote(flight.base_price, Demand::Counter(state.as_ref()), now);
                if let (Some(reset), Some(row)) = (reset, row) {
                    write_state(conn, flight.id, &reset, Some(row.version)).await?;
                    info!(flight_id = flight.id, "Surge expired, demand state cleared");
                }
                Ok(quote)
            }
            SurgeMode::Log => {
                let times = load_log(conn, flight.id, now - self.engine.policy().surge_duration, now).await?;
                let (quote, _) = self.engine.quote(flight.base_price, Demand::Log(&times), now);
                Ok(quote)
            }
        }
    }

    /// Standalone quote for the catalog path, retrying CAS collisions.
    pub async fn quote_price(&self, pool: &SqlitePool, flight: &Flight, now: DateTime<Utc>) -> Result<Quote> {
        let now = truncate_ms(now);
        let mut attempt = 1;
        loop {
            let mut conn = pool.acquire().await?;
            match self.quote_in(&mut conn, flight, now).await {
                Err(e) if e.is_retryable() && attempt < MAX_CONFLICT_RETRIES => {
                    warn!(flight_id = flight.id, attempt, "Quote hit a concurrent update, retrying: {e}");
                    attempt += 1;
                }
                other => return other,
            }
        }
    }

    /// Current counter state, if the flight has ever been booked.
    pub async fn load_state(&self, conn: &mut SqliteConnection, flight_id: i64) -> Result<Option<AttemptState>> {
        load_row(conn, flight_id).await?.map(|r| r.state()).transpose()
    }

    /// Read-only view of a flight's demand in either mode. `None` when no
    /// attempt has been seen (or, in log mode, none is retained).
    pub async fn demand(
        &self,
        conn: &mut SqliteConnection,
        flight_id: i64,
        now: DateTime<Utc>,
    ) -> Result<Option<AttemptState>> {
        match self.engine.mode() {
            SurgeMode::Counter => self.load_state(conn, flight_id).await,
            SurgeMode::Log => {
                let times = load_log(conn, flight_id, now - self.retention(), now).await?;
                Ok((!times.is_empty()).then(|| self.engine.summarize_log(&times, now)))
            }
        }
    }

    /// Delete log entries older than the lookback. Returns rows removed.
    pub async fn prune_log(&self, pool: &SqlitePool, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = now - self.retention();
        let removed = sqlx::query("DELETE FROM pricing_attempts WHERE attempt_ms < ?")
            .bind(to_ms(cutoff))
            .execute(pool)
            .await?
            .rows_affected();
        Ok(removed)
    }

    /// Log entries must outlive both the window and the surge lookback.
    fn retention(&self) -> Duration {
        let policy = self.engine.policy();
        policy.surge_duration.max(policy.window)
    }
}

async fn load_row(conn: &mut SqliteConnection, flight_id: i64) -> Result<Option<AttemptRow>> {
    let row = sqlx::query_as::<_, AttemptRow>(
        r#"
        SELECT attempt_count, window_start_ms, surge_expires_at_ms, version
        FROM flight_attempts
        WHERE flight_id = ?
        "#,
    )
    .bind(flight_id)
    .fetch_optional(&mut *conn)
    .await?;
    Ok(row)
}

/// Insert (no expected version) or compare-and-swap update. Zero rows
/// affected means another writer changed the row since it was read.
async fn write_state(
    conn: &mut SqliteConnection,
    flight_id: i64,
    state: &AttemptState,
    expected_version: Option<i64>,
) -> Result<()> {
    let window_start = state.window_start.map(to_ms);
    let surge_expires_at = state.surge_expires_at.map(to_ms);
    let attempt_count = i64::from(state.attempt_count);

    let result = match expected_version {
        None => {
            sqlx::query(
                r#"
                INSERT INTO flight_attempts (flight_id, attempt_count, window_start_ms, surge_expires_at_ms, version)
                VALUES (?, ?, ?, ?, 1)
                ON CONFLICT(flight_id) DO NOTHING
                "#,
            )
            .bind(flight_id)
            .bind(attempt_count)
            .bind(window_start)
            .bind(surge_expires_at)
            .execute(&mut *conn)
            .await?
        }
        Some(version) => {
            sqlx::query(
                r#"
                UPDATE flight_attempts
                SET attempt_count = ?, window_start_ms = ?, surge_expires_at_ms = ?, version = version + 1
                WHERE flight_id = ? AND version = ?
                "#,
            )
            .bind(attempt_count)
            .bind(window_start)
            .bind(surge_expires_at)
            .bind(flight_id)
            .bind(version)
            .execute(&mut *conn)
            .await?
        }
    };

    if result.rows_affected() == 0 {
        return Err(AppError::ConcurrentUpdateConflict { flight_id });
    }
    Ok(())
}

/// Ascending attempt timestamps in `[from, to]`.
async fn load_log(
    conn: &mut SqliteConnection,
    flight_id: i64,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>> {
    let rows: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT attempt_ms FROM pricing_attempts
        WHERE flight_id = ? AND attempt_ms >= ? AND attempt_ms <= ?
        ORDER BY attempt_ms ASC
        "#,
    )
    .bind(flight_id)
    .bind(to_ms(from))
    .bind(to_ms(to))
    .fetch_all(&mut *conn)
    .await?;
    rows.into_iter().map(from_ms).collect()
}
