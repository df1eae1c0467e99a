use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;
use tracing::info;

use crate::db::models::FlightRow;
use crate::db::to_ms;
use crate::error::Result;
use crate::types::{Flight, FlightSeed};

const FLIGHT_COLUMNS: &str =
    "id, flight_code, airline, departure_city, arrival_city, base_price_cents";

/// Search filters for the flight listing.
#[derive(Debug, Clone, Default)]
pub struct FlightFilter {
    /// Case-insensitive substring of the departure city.
    pub departure_city: Option<String>,
    /// Case-insensitive substring of the arrival city.
    pub arrival_city: Option<String>,
    pub limit: i64,
}

pub async fn fetch_flight(conn: &mut SqliteConnection, flight_id: i64) -> Result<Option<Flight>> {
    let row = sqlx::query_as::<_, FlightRow>(&format!("SELECT {FLIGHT_COLUMNS} FROM flights WHERE id = ?"))
        .bind(flight_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.map(Flight::from))
}

pub async fn list_flights(conn: &mut SqliteConnection, filter: &FlightFilter) -> Result<Vec<Flight>> {
    let departure = filter.departure_city.as_deref().map(like_pattern);
    let arrival = filter.arrival_city.as_deref().map(like_pattern);

    let rows = sqlx::query_as::<_, FlightRow>(&format!(
        r#"
        SELECT {FLIGHT_COLUMNS}
        FROM flights
        WHERE (?1 IS NULL OR departure_city LIKE ?1 ESCAPE '\')
          AND (?2 IS NULL OR arrival_city LIKE ?2 ESCAPE '\')
        ORDER BY id
        LIMIT ?3
        "#
    ))
    .bind(departure)
    .bind(arrival)
    .bind(filter.limit)
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows.into_iter().map(Flight::from).collect())
}

/// Insert the sample catalog if no flights exist. Returns how many were added.
pub async fn seed_flights(conn: &mut SqliteConnection, seeds: &[FlightSeed], now: DateTime<Utc>) -> Result<usize> {
    let existing: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM flights")
        .fetch_one(&mut *conn)
        .await?;
    if existing > 0 {
        return Ok(0);
    }

    let created_at = to_ms(now);
    for seed in seeds {
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO flights
                (flight_code, airline, departure_city, arrival_city, base_price_cents, created_at_ms)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(seed.flight_code)
        .bind(seed.airline)
        .bind(seed.departure_city)
        .bind(seed.arrival_city)
        .bind(seed.base_price_cents)
        .bind(created_at)
        .execute(&mut *conn)
        .await?;
    }

    info!(count = seeds.len(), "Seeded flight catalog");
    Ok(seeds.len())
}

/// `%term%` with LIKE wildcards in the term escaped. SQLite LIKE is
/// case-insensitive for ASCII.
fn like_pattern(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len() + 2);
    escaped.push('%');
    for c in term.trim().chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_pool;
    use crate::types::SAMPLE_FLIGHTS;

    #[tokio::test]
    async fn seeding_is_idempotent() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();

        let first = seed_flights(&mut conn, SAMPLE_FLIGHTS, Utc::now()).await.unwrap();
        let second = seed_flights(&mut conn, SAMPLE_FLIGHTS, Utc::now()).await.unwrap();
        assert_eq!(first, SAMPLE_FLIGHTS.len());
        assert_eq!(second, 0);
    }

    #[tokio::test]
    async fn filters_are_case_insensitive_substrings() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        seed_flights(&mut conn, SAMPLE_FLIGHTS, Utc::now()).await.unwrap();

        let filter = FlightFilter {
            departure_city: Some("mum".to_string()),
            arrival_city: Some("DEL".to_string()),
            limit: 10,
        };
        let flights = list_flights(&mut conn, &filter).await.unwrap();
        assert_eq!(flights.len(), 1);
        assert_eq!(flights[0].flight_code, "AI-101");
        assert_eq!(flights[0].base_price.to_string(), "2500.00");
    }

    #[tokio::test]
    async fn limit_caps_results() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        seed_flights(&mut conn, SAMPLE_FLIGHTS, Utc::now()).await.unwrap();

        let flights = list_flights(&mut conn, &FlightFilter { limit: 4, ..Default::default() })
            .await
            .unwrap();
        assert_eq!(flights.len(), 4);
    }

    #[tokio::test]
    async fn missing_flight_is_none() {
        let pool = test_pool().await;
        let mut conn = pool.acquire().await.unwrap();
        assert!(fetch_flight(&mut conn, 404).await.unwrap().is_none());
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("De_l%"), "%De\\_l\\%%");
    }
}
