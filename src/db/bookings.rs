//! Booking transaction and booking reads.
//!
//! A booking records one demand attempt, prices the flight, debits the wallet
//! and writes the booking row in a single SQLite transaction. Writers on the
//! same flight (and on the same wallet) are serialized in-process through
//! [`BookingLocks`]; the CAS on `flight_attempts.version` catches anything
//! that slips past them, and the whole transaction is retried.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::Rng;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{info, warn};

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::config::{MAX_CONFLICT_RETRIES, PNR_MAX_DRAWS};
use crate::db::accounts;
use crate::db::attempts::{AttemptOutcome, SurgeStore};
use crate::db::catalog::fetch_flight;
use crate::db::models::BookingRow;
use crate::db::{begin_write, to_ms, truncate_ms};
use crate::error::{AppError, Result};
use crate::pricing::money::to_cents;
use crate::state::BookingLocks;
use crate::types::{Booking, BookingDetails, NewBooking};

const BOOKING_SELECT: &str = r#"
    SELECT b.id, b.pnr, b.passenger_name, b.flight_id, b.user_id, b.final_price_cents, b.booked_at_ms,
           f.flight_code, f.airline, f.departure_city, f.arrival_city, f.base_price_cents
    FROM bookings b
    JOIN flights f ON f.id = b.flight_id
"#;

pub struct BookingService {
    pool: SqlitePool,
    surge: Arc<SurgeStore>,
    locks: Arc<BookingLocks>,
    health: Arc<HealthState>,
    latency: Arc<LatencyStats>,
}

impl BookingService {
    pub fn new(
        pool: SqlitePool,
        surge: Arc<SurgeStore>,
        locks: Arc<BookingLocks>,
        health: Arc<HealthState>,
        latency: Arc<LatencyStats>,
    ) -> Self {
        Self {
            pool,
            surge,
            locks,
            health,
            latency,
        }
    }

    /// Book a seat at the current (possibly surged) price.
    ///
    /// On `InsufficientBalance` nothing is written except the demand attempt,
    /// which is recorded in its own transaction.
    pub async fn create_booking(&self, request: &NewBooking, now: DateTime<Utc>) -> Result<BookingDetails> {
        let passenger_name = request.passenger_name.trim();
        if passenger_name.is_empty() {
            return Err(AppError::Validation("passenger_name must not be empty".to_string()));
        }

        let now = truncate_ms(now);
        let started = Instant::now();
        let _guards = self.locks.acquire(request.flight_id, request.user_id).await;

        let mut attempt = 1;
        let result = loop {
            match self.try_create(request, passenger_name, now).await {
                Err(e) if e.is_retryable() && attempt < MAX_CONFLICT_RETRIES => {
                    warn!(
                        flight_id = request.flight_id,
                        user_id = request.user_id,
                        attempt,
                        "Booking hit a concurrent update, retrying: {e}"
                    );
                    attempt += 1;
                }
                other => break other,
            }
        };

        let result = match result {
            Err(AppError::InsufficientBalance { required, available }) => {
                self.record_rejected_attempt(request.flight_id, now).await?;
                Err(AppError::InsufficientBalance { required, available })
            }
            other => other,
        };

        self.latency.record(started.elapsed());
        match &result {
            Ok(details) => {
                self.health.record_commit(to_ms(details.booking.booked_at));
                info!(
                    pnr = %details.booking.pnr,
                    flight_id = details.flight.id,
                    user_id = details.booking.user_id,
                    price = %details.booking.final_price,
                    "Booking confirmed"
                );
            }
            Err(e) => {
                self.health.record_rejection();
                warn!(flight_id = request.flight_id, user_id = request.user_id, "Booking rejected: {e}");
            }
        }
        result
    }

    async fn try_create(&self, request: &NewBooking, passenger_name: &str, now: DateTime<Utc>) -> Result<BookingDetails> {
        let mut tx = begin_write(&self.pool).await?;

        let flight = fetch_flight(&mut tx, request.flight_id)
            .await?
            .ok_or(AppError::FlightNotFound(request.flight_id))?;
        accounts::require_user(&mut tx, request.user_id).await?;

        let outcome = self.surge.record_attempt(&mut tx, flight.id, now).await?;
        let quote = self.surge.quote_in(&mut tx, &flight, now).await?;

        // Dropping `tx` on any error below rolls everything back.
        accounts::debit(&mut tx, request.user_id, quote.price).await?;
        let pnr = unused_pnr(&mut tx).await?;
        let price_cents = to_cents(quote.price)
            .ok_or_else(|| AppError::Validation(format!("price out of range: {}", quote.price)))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO bookings (pnr, passenger_name, flight_id, user_id, final_price_cents, booked_at_ms)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(&pnr)
        .bind(passenger_name)
        .bind(flight.id)
        .bind(request.user_id)
        .bind(price_cents)
        .bind(to_ms(now))
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        self.note_surge(flight.id, &outcome);

        Ok(BookingDetails {
            booking: Booking {
                id,
                pnr,
                passenger_name: passenger_name.to_string(),
                flight_id: flight.id,
                user_id: request.user_id,
                final_price: quote.price,
                booked_at: now,
            },
            flight,
        })
    }

    /// Demand still counts when the wallet falls short.
    async fn record_rejected_attempt(&self, flight_id: i64, now: DateTime<Utc>) -> Result<()> {
        let mut attempt = 1;
        loop {
            let mut tx = begin_write(&self.pool).await?;
            match self.surge.record_attempt(&mut tx, flight_id, now).await {
                Ok(outcome) => {
                    tx.commit().await?;
                    self.note_surge(flight_id, &outcome);
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < MAX_CONFLICT_RETRIES => {
                    warn!(flight_id, attempt, "Attempt record hit a concurrent update, retrying: {e}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn note_surge(&self, flight_id: i64, outcome: &AttemptOutcome) {
        if outcome.surge_started {
            self.health.record_surge();
            info!(
                flight_id,
                attempts = outcome.state.attempt_count,
                expires_at = ?outcome.state.surge_expires_at,
                "Surge pricing activated"
            );
        }
    }

    /// All bookings of a user, newest first.
    pub async fn list_for_user(&self, user_id: i64) -> Result<Vec<BookingDetails>> {
        let mut conn = self.pool.acquire().await?;
        accounts::require_user(&mut conn, user_id).await?;

        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "{BOOKING_SELECT} WHERE b.user_id = ? ORDER BY b.booked_at_ms DESC, b.id DESC"
        ))
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;

        rows.into_iter().map(into_details).collect()
    }

    /// One booking by PNR. Only its owner may read it.
    pub async fn get_by_pnr(&self, pnr: &str, user_id: i64) -> Result<BookingDetails> {
        let pnr = pnr.trim().to_ascii_uppercase();
        let row = sqlx::query_as::<_, BookingRow>(&format!("{BOOKING_SELECT} WHERE b.pnr = ?"))
            .bind(&pnr)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::BookingNotFound(pnr.clone()))?;

        if row.user_id != user_id {
            return Err(AppError::Forbidden("Not authorized to view this booking".to_string()));
        }
        into_details(row)
    }
}

fn into_details(row: BookingRow) -> Result<BookingDetails> {
    let (booking, flight) = row.into_parts()?;
    Ok(BookingDetails { booking, flight })
}

/// "PNR" followed by six digits.
fn random_pnr() -> String {
    format!("PNR{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

async fn unused_pnr(conn: &mut SqliteConnection) -> Result<String> {
    for _ in 0..PNR_MAX_DRAWS {
        let candidate = random_pnr();
        let taken: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE pnr = ?")
            .bind(&candidate)
            .fetch_one(&mut *conn)
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
    }
    Err(AppError::Conflict("could not allocate a unique PNR".to_string()))
}
