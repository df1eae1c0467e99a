//! Sliding-window surge detector over an attempt timestamp log.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::pricing::policy::PricingPolicy;
use crate::pricing::surge::{AttemptState, Quote};

/// First instant at which `threshold` attempts fell inside one `window`.
///
/// `times` must be sorted ascending. Two pointers: for each `end`, advance
/// `start` until `times[end] - times[start] <= window`; the first `end` whose
/// span holds `threshold` entries is the trigger.
pub fn find_trigger_time(
    times: &[DateTime<Utc>],
    threshold: usize,
    window: Duration,
) -> Option<DateTime<Utc>> {
    if threshold == 0 {
        return None;
    }

    let mut start = 0;
    for end in 0..times.len() {
        while times[end] - times[start] > window {
            start += 1;
        }
        if end - start + 1 >= threshold {
            return Some(times[end]);
        }
    }
    None
}

/// Attempts inside the lookback `[now - surge_duration, now]`.
pub fn lookback_slice<'a>(
    times: &'a [DateTime<Utc>],
    now: DateTime<Utc>,
    policy: &PricingPolicy,
) -> &'a [DateTime<Utc>] {
    let from = now - policy.surge_duration;
    let lo = times.partition_point(|t| *t < from);
    let hi = times.partition_point(|t| *t <= now);
    &times[lo..hi]
}

/// Surge expiry implied by the log at `now`, if a surge is running.
pub fn active_surge_expiry(
    times: &[DateTime<Utc>],
    now: DateTime<Utc>,
    policy: &PricingPolicy,
) -> Option<DateTime<Utc>> {
    let recent = lookback_slice(times, now, policy);
    let trigger = find_trigger_time(recent, policy.threshold as usize, policy.window)?;
    let expires = trigger + policy.surge_duration;
    (now <= expires).then_some(expires)
}

/// Price `base` from the attempt log. Never mutates anything.
pub fn quote(base: Decimal, times: &[DateTime<Utc>], now: DateTime<Utc>, policy: &PricingPolicy) -> Quote {
    match active_surge_expiry(times, now, policy) {
        Some(expires) => Quote::surged(base, policy, expires),
        None => Quote::base(base),
    }
}

/// Project the log onto the counter-shaped `AttemptState`: attempts in the
/// window ending at `now`, the earliest of them, and the trigger-anchored expiry.
pub fn summarize(times: &[DateTime<Utc>], now: DateTime<Utc>, policy: &PricingPolicy) -> AttemptState {
    let window_from = now - policy.window;
    let lo = times.partition_point(|t| *t < window_from);
    let hi = times.partition_point(|t| *t <= now);
    let in_window = &times[lo..hi];

    AttemptState {
        attempt_count: u32::try_from(in_window.len()).unwrap_or(u32::MAX),
        window_start: in_window.first().copied(),
        surge_expires_at: active_surge_expiry(times, now, policy),
    }
}
