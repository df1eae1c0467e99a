//! Database row types matching `migrations/0001_init.sql`.
//! Money columns are integer cents, time columns epoch milliseconds.

use crate::db::from_ms;
use crate::error::{AppError, Result};
use crate::pricing::money::from_cents;
use crate::pricing::AttemptState;
use crate::types::{Booking, Flight, User};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct FlightRow {
    pub id: i64,
    pub flight_code: String,
    pub airline: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub base_price_cents: i64,
}

impl From<FlightRow> for Flight {
    fn from(r: FlightRow) -> Self {
        Flight {
            id: r.id,
            flight_code: r.flight_code,
            airline: r.airline,
            departure_city: r.departure_city,
            arrival_city: r.arrival_city,
            base_price: from_cents(r.base_price_cents),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct UserRow {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub full_name: Option<String>,
    pub wallet_balance_cents: i64,
    pub created_at_ms: i64,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(r: UserRow) -> Result<Self> {
        Ok(User {
            id: r.id,
            username: r.username,
            email: r.email,
            full_name: r.full_name,
            wallet_balance: from_cents(r.wallet_balance_cents),
            created_at: from_ms(r.created_at_ms)?,
        })
    }
}

/// Booking joined with its flight.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct BookingRow {
    pub id: i64,
    pub pnr: String,
    pub passenger_name: String,
    pub flight_id: i64,
    pub user_id: i64,
    pub final_price_cents: i64,
    pub booked_at_ms: i64,
    pub flight_code: String,
    pub airline: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub base_price_cents: i64,
}

impl BookingRow {
    pub fn into_parts(self) -> Result<(Booking, Flight)> {
        let booking = Booking {
            id: self.id,
            pnr: self.pnr,
            passenger_name: self.passenger_name,
            flight_id: self.flight_id,
            user_id: self.user_id,
            final_price: from_cents(self.final_price_cents),
            booked_at: from_ms(self.booked_at_ms)?,
        };
        let flight = Flight {
            id: self.flight_id,
            flight_code: self.flight_code,
            airline: self.airline,
            departure_city: self.departure_city,
            arrival_city: self.arrival_city,
            base_price: from_cents(self.base_price_cents),
        };
        Ok((booking, flight))
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AttemptRow {
    pub attempt_count: i64,
    pub window_start_ms: Option<i64>,
    pub surge_expires_at_ms: Option<i64>,
    pub version: i64,
}

impl AttemptRow {
    pub fn state(&self) -> Result<AttemptState> {
        let attempt_count = u32::try_from(self.attempt_count)
            .map_err(|_| AppError::CorruptRecord(format!("attempt_count out of range: {}", self.attempt_count)))?;
        Ok(AttemptState {
            attempt_count,
            window_start: self.window_start_ms.map(from_ms).transpose()?,
            surge_expires_at: self.surge_expires_at_ms.map(from_ms).transpose()?,
        })
    }
}
