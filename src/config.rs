use std::str::FromStr;

use chrono::Duration;
use rust_decimal::Decimal;

use crate::error::{AppError, Result};
use crate::pricing::{PricingPolicy, SurgeMode};

/// Attempts per booking before a CAS / busy collision is surfaced to the caller.
pub const MAX_CONFLICT_RETRIES: u32 = 3;

/// How often the attempt-log pruner sweeps expired entries (seconds).
pub const ATTEMPT_PRUNE_INTERVAL_SECS: u64 = 60;

/// SQLite pool sizing.
pub const DB_MAX_CONNECTIONS: u32 = 8;
pub const DB_BUSY_TIMEOUT_SECS: u64 = 5;

/// PNR draws before giving up on finding an unused code.
pub const PNR_MAX_DRAWS: u32 = 20;

/// Surge defaults.
pub mod surge_defaults {
    pub const ATTEMPTS: &str = "3";
    pub const WINDOW_MINUTES: &str = "5";
    pub const DURATION_MINUTES: &str = "10";
    pub const MULTIPLIER: &str = "1.10";
    pub const MODE: &str = "counter";
}

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub pricing: PricingPolicy,
    /// Which surge detector runs (SURGE_MODE: counter | log)
    pub surge_mode: SurgeMode,
    /// Balance credited to new accounts (DEFAULT_WALLET_BALANCE)
    pub default_wallet_balance: Decimal,
    /// Flight listing page size when the request gives none (DEFAULT_PAGE_LIMIT)
    pub default_page_limit: i64,
    /// Username of the demo account seeded at startup (DEMO_USERNAME)
    pub demo_username: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Pricing values are strict: a bad value is
    /// an `InvalidConfiguration`, never silently defaulted.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let threshold = parse_strict::<u32>("SURGE_ATTEMPTS", &var("SURGE_ATTEMPTS", surge_defaults::ATTEMPTS))?;
        let window_minutes =
            parse_strict::<i64>("SURGE_WINDOW_MINUTES", &var("SURGE_WINDOW_MINUTES", surge_defaults::WINDOW_MINUTES))?;
        let duration_minutes = parse_strict::<i64>(
            "SURGE_DURATION_MINUTES",
            &var("SURGE_DURATION_MINUTES", surge_defaults::DURATION_MINUTES),
        )?;
        let multiplier =
            parse_strict::<Decimal>("SURGE_MULTIPLIER", &var("SURGE_MULTIPLIER", surge_defaults::MULTIPLIER))?;

        let pricing = PricingPolicy::new(
            threshold,
            minutes("SURGE_WINDOW_MINUTES", window_minutes)?,
            minutes("SURGE_DURATION_MINUTES", duration_minutes)?,
            multiplier,
        )?;

        let default_wallet_balance = parse_strict::<Decimal>(
            "DEFAULT_WALLET_BALANCE",
            &var("DEFAULT_WALLET_BALANCE", "50000.00"),
        )?;
        if default_wallet_balance.is_sign_negative() {
            return Err(AppError::InvalidConfiguration(
                "DEFAULT_WALLET_BALANCE must not be negative".to_string(),
            ));
        }

        Ok(Self {
            log_level: var("LOG_LEVEL", "info"),
            db_path: var("DB_PATH", "flights.db"),
            api_port: var("API_PORT", "8000")
                .parse::<u16>()
                .map_err(|_| AppError::InvalidConfiguration("API_PORT must be a valid port number".to_string()))?,
            pricing,
            surge_mode: SurgeMode::from_str(&var("SURGE_MODE", surge_defaults::MODE))?,
            default_wallet_balance,
            default_page_limit: var("DEFAULT_PAGE_LIMIT", "10")
                .parse::<i64>()
                .ok()
                .filter(|n| *n > 0)
                .unwrap_or(10),
            demo_username: var("DEMO_USERNAME", "demo_user"),
        })
    }
}

fn parse_strict<T: FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| AppError::InvalidConfiguration(format!("{key} has an invalid value: '{raw}'")))
}

fn minutes(key: &str, value: i64) -> Result<Duration> {
    Duration::try_minutes(value)
        .ok_or_else(|| AppError::InvalidConfiguration(format!("{key} is out of range: {value}")))
}
