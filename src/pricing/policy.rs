use chrono::Duration;
use rust_decimal::Decimal;

use crate::error::{AppError, Result};

/// Surge tuning, fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq)]
pub struct PricingPolicy {
    /// Attempts inside one window needed to trigger a surge.
    pub threshold: u32,
    pub window: Duration,
    /// How long a triggered surge lasts. Also the attempt-log lookback.
    pub surge_duration: Duration,
    pub multiplier: Decimal,
}

impl PricingPolicy {
    pub fn new(
        threshold: u32,
        window: Duration,
        surge_duration: Duration,
        multiplier: Decimal,
    ) -> Result<Self> {
        let policy = Self { threshold, window, surge_duration, multiplier };
        policy.validate()?;
        Ok(policy)
    }

    pub fn validate(&self) -> Result<()> {
        if self.threshold == 0 {
            return Err(AppError::InvalidConfiguration(
                "surge threshold must be at least 1".to_string(),
            ));
        }
        if self.window <= Duration::zero() {
            return Err(AppError::InvalidConfiguration(
                "surge window must be positive".to_string(),
            ));
        }
        if self.surge_duration <= Duration::zero() {
            return Err(AppError::InvalidConfiguration(
                "surge duration must be positive".to_string(),
            ));
        }
        if self.multiplier <= Decimal::ONE {
            return Err(AppError::InvalidConfiguration(format!(
                "surge multiplier must be greater than 1, got {}",
                self.multiplier
            )));
        }
        Ok(())
    }
}

/// Which surge detector the process runs. Exactly one is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurgeMode {
    /// Mutable per-flight counter; qualifying attempts re-arm the surge.
    Counter,
    /// Append-only attempt log; surge anchored to the first trigger time.
    Log,
}

impl std::str::FromStr for SurgeMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" => Ok(SurgeMode::Counter),
            "log" => Ok(SurgeMode::Log),
            other => Err(AppError::InvalidConfiguration(format!(
                "SURGE_MODE must be 'counter' or 'log', got '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for SurgeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurgeMode::Counter => write!(f, "counter"),
            SurgeMode::Log => write!(f, "log"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn multiplier(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn accepts_default_policy() {
        let policy = PricingPolicy::new(
            3,
            Duration::minutes(5),
            Duration::minutes(10),
            multiplier("1.10"),
        );
        assert!(policy.is_ok());
    }

    #[test]
    fn rejects_zero_threshold() {
        let err = PricingPolicy::new(0, Duration::minutes(5), Duration::minutes(10), multiplier("1.1"))
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidConfiguration(_)));
    }

    #[test]
    fn rejects_non_positive_durations() {
        assert!(PricingPolicy::new(3, Duration::zero(), Duration::minutes(10), multiplier("1.1")).is_err());
        assert!(PricingPolicy::new(3, Duration::minutes(5), Duration::minutes(-1), multiplier("1.1")).is_err());
    }

    #[test]
    fn rejects_multiplier_at_or_below_one() {
        assert!(PricingPolicy::new(3, Duration::minutes(5), Duration::minutes(10), multiplier("1.00")).is_err());
        assert!(PricingPolicy::new(3, Duration::minutes(5), Duration::minutes(10), multiplier("0.9")).is_err());
    }

    #[test]
    fn parses_surge_mode() {
        assert_eq!(SurgeMode::from_str("counter").unwrap(), SurgeMode::Counter);
        assert_eq!(SurgeMode::from_str(" LOG ").unwrap(), SurgeMode::Log);
        assert!(SurgeMode::from_str("sliding").is_err());
    }
}
