use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::api::health::{HealthSnapshot, HealthState};
use crate::api::latency::{LatencyStats, LatencySummary};
use crate::config::Config;
use crate::db::{self, accounts};
use crate::db::attempts::SurgeStore;
use crate::db::bookings::BookingService;
use crate::db::catalog::{self, FlightFilter};
use crate::error::AppError;
use crate::pricing::{AttemptState, SurgePhase};
use crate::types::{BookingDetails, Flight, NewBooking, NewUser, User, SAMPLE_FLIGHTS};

#[derive(Clone)]
pub struct ApiState {
    pub pool: sqlx::SqlitePool,
    pub config: Arc<Config>,
    pub surge: Arc<SurgeStore>,
    pub bookings: Arc<BookingService>,
    pub health: Arc<HealthState>,
    pub latency: Arc<LatencyStats>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/flights", get(get_flights))
        .route("/flights/seed", post(seed_flights))
        .route("/flights/:id", get(get_flight))
        .route("/flights/:id/demand", get(get_flight_demand))
        .route("/users", get(get_users))
        .route("/users/register", post(register_user))
        .route("/users/login", post(login_user))
        .route("/users/:id", get(get_user))
        .route("/users/:id/topup", post(top_up_wallet))
        .route("/bookings", get(get_bookings).post(create_booking))
        .route("/bookings/:pnr", get(get_booking))
        .route("/health", get(get_health))
        .route("/stats/latency", get(get_stats_latency))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query / body structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct FlightsQuery {
    pub departure_city: Option<String>,
    pub arrival_city: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub full_name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct TopUpQuery {
    pub amount: Decimal,
}

#[derive(Deserialize)]
pub struct BookingRequest {
    pub user_id: Option<i64>,
    pub passenger_name: String,
    pub flight_id: i64,
}

#[derive(Deserialize)]
pub struct OwnerQuery {
    pub user_id: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct FlightResponse {
    pub id: i64,
    pub flight_code: String,
    pub airline: String,
    pub departure_city: String,
    pub arrival_city: String,
    pub base_price: Decimal,
    /// Current price, surged while demand is high.
    pub price: Decimal,
    pub surge_active: bool,
    pub surge_expires_at: Option<DateTime<Utc>>,
}

/// Demand tracking for one flight, as the surge detector sees it now.
#[derive(Debug, Serialize)]
pub struct DemandResponse {
    pub flight_id: i64,
    pub mode: String,
    pub phase: SurgePhase,
    pub attempt_count: u32,
    pub window_start: Option<DateTime<Utc>>,
    pub surge_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SeedResponse {
    pub seeded: usize,
}

#[derive(Debug, Serialize)]
pub struct TopUpResponse {
    pub user_id: i64,
    pub wallet_balance: Decimal,
}

// ---------------------------------------------------------------------------
// Handlers: catalog
// ---------------------------------------------------------------------------

async fn get_flights(
    State(state): State<ApiState>,
    Query(params): Query<FlightsQuery>,
) -> Result<Json<Vec<FlightResponse>>, AppError> {
    let filter = FlightFilter {
        departure_city: params.departure_city.filter(|s| !s.trim().is_empty()),
        arrival_city: params.arrival_city.filter(|s| !s.trim().is_empty()),
        limit: params
            .limit
            .filter(|n| *n > 0)
            .unwrap_or(state.config.default_page_limit),
    };

    let flights = {
        let mut conn = state.pool.acquire().await?;
        catalog::list_flights(&mut conn, &filter).await?
    };

    let now = db::now();
    let mut priced = Vec::with_capacity(flights.len());
    for flight in flights {
        priced.push(price_flight(&state, flight, now).await?);
    }
    Ok(Json(priced))
}

async fn get_flight(
    State(state): State<ApiState>,
    Path(flight_id): Path<i64>,
) -> Result<Json<FlightResponse>, AppError> {
    let flight = {
        let mut conn = state.pool.acquire().await?;
        catalog::fetch_flight(&mut conn, flight_id)
            .await?
            .ok_or(AppError::FlightNotFound(flight_id))?
    };
    Ok(Json(price_flight(&state, flight, db::now()).await?))
}

async fn get_flight_demand(
    State(state): State<ApiState>,
    Path(flight_id): Path<i64>,
) -> Result<Json<DemandResponse>, AppError> {
    let now = db::now();
    let mut conn = state.pool.acquire().await?;
    if catalog::fetch_flight(&mut conn, flight_id).await?.is_none() {
        return Err(AppError::FlightNotFound(flight_id));
    }
    let demand = state.surge.demand(&mut conn, flight_id, now).await?.unwrap_or_else(AttemptState::cleared);
    Ok(Json(DemandResponse {
        flight_id,
        mode: state.config.surge_mode.to_string(),
        phase: demand.phase(now),
        attempt_count: demand.attempt_count,
        window_start: demand.window_start,
        surge_expires_at: demand.surge_expires_at,
    }))
}

async fn seed_flights(State(state): State<ApiState>) -> Result<Json<SeedResponse>, AppError> {
    let mut conn = state.pool.acquire().await?;
    let seeded = catalog::seed_flights(&mut conn, SAMPLE_FLIGHTS, db::now()).await?;
    Ok(Json(SeedResponse { seeded }))
}

async fn price_flight(state: &ApiState, flight: Flight, now: DateTime<Utc>) -> Result<FlightResponse, AppError> {
    let quote = state.surge.quote_price(&state.pool, &flight, now).await?;
    Ok(FlightResponse {
        id: flight.id,
        flight_code: flight.flight_code,
        airline: flight.airline,
        departure_city: flight.departure_city,
        arrival_city: flight.arrival_city,
        base_price: flight.base_price,
        price: quote.price,
        surge_active: quote.surge_active,
        surge_expires_at: quote.surge_expires_at,
    })
}

// ---------------------------------------------------------------------------
// Handlers: users & wallet
// ---------------------------------------------------------------------------

async fn register_user(
    State(state): State<ApiState>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let new_user = NewUser {
        username: body.username,
        email: body.email,
        full_name: body.full_name,
        password: body.password,
    };
    let mut conn = state.pool.acquire().await?;
    let user = accounts::register(&mut conn, &new_user, state.config.default_wallet_balance, db::now()).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

async fn login_user(
    State(state): State<ApiState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<User>, AppError> {
    let mut conn = state.pool.acquire().await?;
    let user = accounts::authenticate(&mut conn, &body.email, &body.password).await?;
    Ok(Json(user))
}

async fn get_users(State(state): State<ApiState>) -> Result<Json<Vec<User>>, AppError> {
    let mut conn = state.pool.acquire().await?;
    Ok(Json(accounts::list_users(&mut conn).await?))
}

async fn get_user(State(state): State<ApiState>, Path(user_id): Path<i64>) -> Result<Json<User>, AppError> {
    let mut conn = state.pool.acquire().await?;
    Ok(Json(accounts::require_user(&mut conn, user_id).await?))
}

async fn top_up_wallet(
    State(state): State<ApiState>,
    Path(user_id): Path<i64>,
    Query(params): Query<TopUpQuery>,
) -> Result<Json<TopUpResponse>, AppError> {
    let mut conn = state.pool.acquire().await?;
    let wallet_balance = accounts::top_up(&mut conn, user_id, params.amount).await?;
    Ok(Json(TopUpResponse { user_id, wallet_balance }))
}

// ---------------------------------------------------------------------------
// Handlers: bookings
// ---------------------------------------------------------------------------

async fn create_booking(
    State(state): State<ApiState>,
    Json(body): Json<BookingRequest>,
) -> Result<(StatusCode, Json<BookingDetails>), AppError> {
    let user_id = require_owner(body.user_id)?;
    let request = NewBooking {
        user_id,
        flight_id: body.flight_id,
        passenger_name: body.passenger_name,
    };
    let details = state.bookings.create_booking(&request, db::now()).await?;
    Ok((StatusCode::CREATED, Json(details)))
}

async fn get_bookings(
    State(state): State<ApiState>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<Vec<BookingDetails>>, AppError> {
    let user_id = require_owner(params.user_id)?;
    Ok(Json(state.bookings.list_for_user(user_id).await?))
}

async fn get_booking(
    State(state): State<ApiState>,
    Path(pnr): Path<String>,
    Query(params): Query<OwnerQuery>,
) -> Result<Json<BookingDetails>, AppError> {
    let user_id = require_owner(params.user_id)?;
    Ok(Json(state.bookings.get_by_pnr(&pnr, user_id).await?))
}

fn require_owner(user_id: Option<i64>) -> Result<i64, AppError> {
    user_id.ok_or_else(|| AppError::Unauthorized("User must be logged in".to_string()))
}

// ---------------------------------------------------------------------------
// Handlers: observability
// ---------------------------------------------------------------------------

async fn get_health(State(state): State<ApiState>) -> Json<HealthSnapshot> {
    Json(state.health.snapshot())
}

async fn get_stats_latency(State(state): State<ApiState>) -> Json<LatencySummary> {
    Json(state.latency.summary())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::pricing::{SurgeEngine, SurgeMode};
    use crate::state::BookingLocks;
    use std::str::FromStr;

    async fn state() -> ApiState {
        let pool = test_pool().await;
        let config = Arc::new(Config::from_lookup(|_| None).unwrap());
        let surge = Arc::new(SurgeStore::new(SurgeEngine::new(config.pricing.clone(), SurgeMode::Counter)));
        let health = Arc::new(HealthState::new());
        let latency = Arc::new(LatencyStats::new());
        let bookings = Arc::new(BookingService::new(
            pool.clone(),
            Arc::clone(&surge),
            BookingLocks::new(),
            Arc::clone(&health),
            Arc::clone(&latency),
        ));
        ApiState {
            pool,
            config,
            surge,
            bookings,
            health,
            latency,
        }
    }

    async fn registered(state: &ApiState, name: &str) -> User {
        let body = RegisterRequest {
            username: name.to_string(),
            email: format!("{name}@example.com"),
            password: "pw".to_string(),
            full_name: None,
        };
        let (status, Json(user)) = register_user(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);
        user
    }

    #[tokio::test]
    async fn seeding_is_idempotent_and_listing_pages() {
        let state = state().await;
        let Json(first) = seed_flights(State(state.clone())).await.unwrap();
        let Json(second) = seed_flights(State(state.clone())).await.unwrap();
        assert_eq!(first.seeded, SAMPLE_FLIGHTS.len());
        assert_eq!(second.seeded, 0);

        let query = FlightsQuery { departure_city: None, arrival_city: None, limit: None };
        let Json(page) = get_flights(State(state.clone()), Query(query)).await.unwrap();
        assert_eq!(page.len(), 10);
        assert!(page.iter().all(|f| f.price == f.base_price && !f.surge_active));

        let query = FlightsQuery {
            departure_city: Some("mumbai".to_string()),
            arrival_city: None,
            limit: Some(50),
        };
        let Json(from_mumbai) = get_flights(State(state), Query(query)).await.unwrap();
        assert!(!from_mumbai.is_empty());
        assert!(from_mumbai.iter().all(|f| f.departure_city == "Mumbai"));
    }

    #[tokio::test]
    async fn unknown_flight_is_404() {
        let state = state().await;
        let err = get_flight(State(state), Path(12345)).await.unwrap_err();
        assert!(matches!(err, AppError::FlightNotFound(12345)));
    }

    #[tokio::test]
    async fn booking_without_user_is_unauthorized() {
        let state = state().await;
        let body = BookingRequest {
            user_id: None,
            passenger_name: "Jane".to_string(),
            flight_id: 1,
        };
        let err = create_booking(State(state), Json(body)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn register_login_topup_and_book() {
        let state = state().await;
        seed_flights(State(state.clone())).await.unwrap();
        let user = registered(&state, "dana").await;
        assert_eq!(user.wallet_balance, Decimal::from_str("50000.00").unwrap());

        let login = LoginRequest { email: "dana@example.com".to_string(), password: "pw".to_string() };
        let Json(logged_in) = login_user(State(state.clone()), Json(login)).await.unwrap();
        assert_eq!(logged_in.id, user.id);

        let bad = LoginRequest { email: "dana@example.com".to_string(), password: "nope".to_string() };
        let err = login_user(State(state.clone()), Json(bad)).await.unwrap_err();
        assert!(matches!(err, AppError::Unauthorized(_)));

        let topup = TopUpQuery { amount: Decimal::from_str("100.50").unwrap() };
        let Json(topped) = top_up_wallet(State(state.clone()), Path(user.id), Query(topup)).await.unwrap();
        assert_eq!(topped.wallet_balance, Decimal::from_str("50100.50").unwrap());

        let body = BookingRequest {
            user_id: Some(user.id),
            passenger_name: "Dana D".to_string(),
            flight_id: 1,
        };
        let (status, Json(details)) = create_booking(State(state.clone()), Json(body)).await.unwrap();
        assert_eq!(status, StatusCode::CREATED);

        let owner = OwnerQuery { user_id: Some(user.id) };
        let Json(fetched) = get_booking(State(state.clone()), Path(details.booking.pnr.clone()), Query(owner))
            .await
            .unwrap();
        assert_eq!(fetched.booking.id, details.booking.id);

        let Json(demand) = get_flight_demand(State(state.clone()), Path(1)).await.unwrap();
        assert_eq!(demand.attempt_count, 1);
        assert_eq!(demand.phase, SurgePhase::Tracking);

        let Json(health) = get_health(State(state.clone())).await;
        assert_eq!(health.bookings_committed, 1);
        let Json(latency) = get_stats_latency(State(state)).await;
        assert_eq!(latency.samples, 1);
    }

    #[tokio::test]
    async fn duplicate_registration_conflicts() {
        let state = state().await;
        registered(&state, "erin").await;
        let body = RegisterRequest {
            username: "erin".to_string(),
            email: "other@example.com".to_string(),
            password: "pw".to_string(),
            full_name: None,
        };
        let err = register_user(State(state), Json(body)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
