use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use crate::pricing::policy::{PricingPolicy, SurgeMode};
use crate::pricing::surge::{self, AttemptState, Quote};
use crate::pricing::window;

/// Pure surge pricing engine. Owns the policy and the active detector; all
/// state is handed in by the caller and any state to persist is handed back.
#[derive(Debug, Clone)]
pub struct SurgeEngine {
    policy: PricingPolicy,
    mode: SurgeMode,
}

/// Demand evidence for one flight, in the shape the active detector needs.
#[derive(Debug, Clone)]
pub enum Demand<'a> {
    Counter(Option<&'a AttemptState>),
    /// Ascending attempt timestamps covering at least the surge lookback.
    Log(&'a [DateTime<Utc>]),
}

impl SurgeEngine {
    pub fn new(policy: PricingPolicy, mode: SurgeMode) -> Self {
        Self { policy, mode }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    pub fn mode(&self) -> SurgeMode {
        self.mode
    }

    /// Counter transition for one booking attempt.
    pub fn record_attempt(&self, prev: Option<&AttemptState>, now: DateTime<Utc>) -> AttemptState {
        AttemptState::record(prev, now, &self.policy)
    }

    /// Log-backed view of the flight's demand after appending `now`.
    pub fn summarize_log(&self, times: &[DateTime<Utc>], now: DateTime<Utc>) -> AttemptState {
        window::summarize(times, now, &self.policy)
    }

    /// Effective price of `base` at `now`. The second element is a cleared
    /// counter state to persist when a surge has lapsed (counter mode only).
    pub fn quote(&self, base: Decimal, demand: Demand<'_>, now: DateTime<Utc>) -> (Quote, Option<AttemptState>) {
        match demand {
            Demand::Counter(state) => surge::quote(base, state, now, &self.policy),
            Demand::Log(times) => (window::quote(base, times, now, &self.policy), None),
        }
    }
}
