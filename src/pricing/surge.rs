//! Counter-based surge state machine.
//!
//! One `AttemptState` per flight. Absence of state (`None`) is the `Idle` phase;
//! the first recorded attempt is the explicit initialize transition.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;

use crate::pricing::money::apply_multiplier;
use crate::pricing::policy::PricingPolicy;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SurgePhase {
    /// No attempts in an open window.
    Idle,
    /// Window open, threshold not reached (or surge already lapsed).
    Tracking,
    /// Surge active.
    Surging,
}

impl std::fmt::Display for SurgePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SurgePhase::Idle => "idle",
            SurgePhase::Tracking => "tracking",
            SurgePhase::Surging => "surging",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptState {
    pub attempt_count: u32,
    pub window_start: Option<DateTime<Utc>>,
    pub surge_expires_at: Option<DateTime<Utc>>,
}

impl AttemptState {
    /// State after the first attempt of a new window.
    fn opened_at(now: DateTime<Utc>) -> Self {
        Self {
            attempt_count: 1,
            window_start: Some(now),
            surge_expires_at: None,
        }
    }

    /// State after an expired surge has been cleared.
    pub fn cleared() -> Self {
        Self {
            attempt_count: 0,
            window_start: None,
            surge_expires_at: None,
        }
    }

    pub fn is_surging(&self, now: DateTime<Utc>) -> bool {
        self.surge_expires_at.is_some_and(|expires| now <= expires)
    }

    pub fn phase(&self, now: DateTime<Utc>) -> SurgePhase {
        if self.is_surging(now) {
            SurgePhase::Surging
        } else if self.window_start.is_some() {
            SurgePhase::Tracking
        } else {
            SurgePhase::Idle
        }
    }

    /// Apply one booking attempt at `now`.
    ///
    /// Inside the window every attempt at or past the threshold re-arms the
    /// surge to `now + surge_duration`. An attempt after the window has elapsed
    /// starts a fresh window and drops any surge. An opening attempt only
    /// starts the window; it never triggers a surge on its own.
    pub fn record(prev: Option<&AttemptState>, now: DateTime<Utc>, policy: &PricingPolicy) -> Self {
        let state = match prev {
            Some(state) => state,
            None => return AttemptState::opened_at(now),
        };
        let start = match state.window_start {
            Some(start) if now - start <= policy.window => start,
            _ => return AttemptState::opened_at(now),
        };

        let attempt_count = state.attempt_count.saturating_add(1);
        let surge_expires_at = if policy.threshold > 0 && attempt_count >= policy.threshold {
            Some(now + policy.surge_duration)
        } else {
            state.surge_expires_at
        };
        AttemptState {
            attempt_count,
            window_start: Some(start),
            surge_expires_at,
        }
    }
}

/// Result of pricing a flight at an instant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub price: Decimal,
    pub surge_active: bool,
    pub surge_expires_at: Option<DateTime<Utc>>,
}

impl Quote {
    pub fn base(price: Decimal) -> Self {
        Self {
            price,
            surge_active: false,
            surge_expires_at: None,
        }
    }

    pub fn surged(base: Decimal, policy: &PricingPolicy, expires_at: DateTime<Utc>) -> Self {
        Self {
            price: apply_multiplier(base, policy.multiplier),
            surge_active: true,
            surge_expires_at: Some(expires_at),
        }
    }
}

/// Price `base` against the counter state.
///
/// Returns the quote and, when a surge has lapsed, the cleared state the
/// caller must persist. An already-cleared state yields no second reset, so
/// repeated quotes at the same instant are identical.
pub fn quote(
    base: Decimal,
    state: Option<&AttemptState>,
    now: DateTime<Utc>,
    policy: &PricingPolicy,
) -> (Quote, Option<AttemptState>) {
    let Some(state) = state else {
        return (Quote::base(base), None);
    };

    match state.surge_expires_at {
        Some(expires) if now <= expires => (Quote::surged(base, policy, expires), None),
        Some(_) => (Quote::base(base), Some(AttemptState::cleared())),
        None => (Quote::base(base), None),
    }
}
