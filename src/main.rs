mod api;
mod config;
mod db;
mod error;
mod maintenance;
mod pricing;
mod state;
mod types;

use std::sync::Arc;

use chrono::Utc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::health::HealthState;
use crate::api::latency::LatencyStats;
use crate::api::routes::{router, ApiState};
use crate::config::Config;
use crate::db::accounts;
use crate::db::attempts::SurgeStore;
use crate::db::bookings::BookingService;
use crate::db::catalog;
use crate::error::{AppError, Result};
use crate::maintenance::AttemptLogPruner;
use crate::pricing::{SurgeEngine, SurgeMode};
use crate::state::BookingLocks;
use crate::types::{NewUser, SAMPLE_FLIGHTS};

const DEMO_EMAIL: &str = "demo@example.com";
const DEMO_PASSWORD: &str = "demo123";

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = db::connect(&cfg.db_path).await?;
    info!("Database ready at {}", cfg.db_path);

    bootstrap(&pool, &cfg).await?;

    // --- Pricing ---
    let engine = SurgeEngine::new(cfg.pricing.clone(), cfg.surge_mode);
    info!(
        mode = %cfg.surge_mode,
        threshold = cfg.pricing.threshold,
        window_minutes = cfg.pricing.window.num_minutes(),
        surge_minutes = cfg.pricing.surge_duration.num_minutes(),
        multiplier = %cfg.pricing.multiplier,
        "Surge pricing configured"
    );
    let surge = Arc::new(SurgeStore::new(engine));

    // Attempt log pruner (log mode only, every 60s)
    if cfg.surge_mode == SurgeMode::Log {
        let pruner = AttemptLogPruner::new(pool.clone(), Arc::clone(&surge));
        tokio::spawn(async move { pruner.run().await });
    }

    // --- Booking service ---
    let health = Arc::new(HealthState::new());
    let latency = Arc::new(LatencyStats::new());
    let bookings = Arc::new(BookingService::new(
        pool.clone(),
        Arc::clone(&surge),
        BookingLocks::new(),
        Arc::clone(&health),
        Arc::clone(&latency),
    ));

    // HTTP API server
    let api_state = ApiState {
        pool,
        config: Arc::new(cfg.clone()),
        surge,
        bookings,
        health,
        latency,
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}

/// Demo account and sample catalog, each only when missing.
async fn bootstrap(pool: &sqlx::SqlitePool, cfg: &Config) -> Result<()> {
    let mut conn = pool.acquire().await?;
    let now = Utc::now();

    if accounts::fetch_user_by_username(&mut conn, &cfg.demo_username).await?.is_none() {
        let demo = NewUser {
            username: cfg.demo_username.clone(),
            email: DEMO_EMAIL.to_string(),
            full_name: Some("Demo User".to_string()),
            password: DEMO_PASSWORD.to_string(),
        };
        match accounts::register(&mut conn, &demo, cfg.default_wallet_balance, now).await {
            Ok(user) => info!(user_id = user.id, "Seeded demo user {}", user.username),
            Err(AppError::Conflict(e)) => warn!("Demo user not seeded: {e}"),
            Err(e) => return Err(e),
        }
    }

    let seeded = catalog::seed_flights(&mut conn, SAMPLE_FLIGHTS, now).await?;
    if seeded > 0 {
        info!("Seeded {seeded} sample flights");
    }
    Ok(())
}
