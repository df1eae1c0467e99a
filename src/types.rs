use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Flight {
    pub id: i64,
    /// Public flight number, e.g. "AI-101".
    pub flight_code: String,
    pub airline: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub base_price: Decimal,
}

/// Catalog entry used for seeding.
#[derive(Debug, Clone, Copy)]
pub struct FlightSeed {
    pub flight_code: &'static str,
    pub airline: &'static str,
    pub departure_city: &'static str,
    pub arrival_city: &'static str,
    pub base_price_cents: i64,
}

pub const SAMPLE_FLIGHTS: &[FlightSeed] = &[
    FlightSeed { flight_code: "AI-101", airline: "Air India", departure_city: "Mumbai", arrival_city: "Delhi", base_price_cents: 250_000 },
    FlightSeed { flight_code: "AI-202", airline: "Air India", departure_city: "Delhi", arrival_city: "Bengaluru", base_price_cents: 260_000 },
    FlightSeed { flight_code: "6E-303", airline: "IndiGo", departure_city: "Mumbai", arrival_city: "Bengaluru", base_price_cents: 255_000 },
    FlightSeed { flight_code: "6E-404", airline: "IndiGo", departure_city: "Chennai", arrival_city: "Mumbai", base_price_cents: 240_000 },
    FlightSeed { flight_code: "UK-505", airline: "Vistara", departure_city: "Hyderabad", arrival_city: "Delhi", base_price_cents: 230_000 },
    FlightSeed { flight_code: "UK-606", airline: "Vistara", departure_city: "Mumbai", arrival_city: "Kolkata", base_price_cents: 274_950 },
    FlightSeed { flight_code: "G8-707", airline: "GoAir", departure_city: "Pune", arrival_city: "Ahmedabad", base_price_cents: 212_500 },
    FlightSeed { flight_code: "SG-808", airline: "SpiceJet", departure_city: "Chennai", arrival_city: "Kochi", base_price_cents: 219_900 },
    FlightSeed { flight_code: "AI-909", airline: "Air India", departure_city: "Jaipur", arrival_city: "Delhi", base_price_cents: 205_000 },
    FlightSeed { flight_code: "6E-110", airline: "IndiGo", departure_city: "Delhi", arrival_city: "Goa", base_price_cents: 289_900 },
    FlightSeed { flight_code: "UK-211", airline: "Vistara", departure_city: "Bengaluru", arrival_city: "Hyderabad", base_price_cents: 221_000 },
    FlightSeed { flight_code: "G8-312", airline: "GoAir", departure_city: "Kolkata", arrival_city: "Pune", base_price_cents: 296_500 },
];

// ---------------------------------------------------------------------------
// Accounts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub wallet_balance: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Registration input, already deserialized by the API layer.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub password: String,
}

// ---------------------------------------------------------------------------
// Bookings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Booking {
    pub id: i64,
    pub pnr: String,
    pub passenger_name: String,
    pub flight_id: i64,
    pub user_id: i64,
    pub final_price: Decimal,
    pub booked_at: DateTime<Utc>,
}

/// A booking together with the flight it was made on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookingDetails {
    #[serde(flatten)]
    pub booking: Booking,
    pub flight: Flight,
}

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub user_id: i64,
    pub flight_id: i64,
    pub passenger_name: String,
}
