//! In-memory latency histogram for the booking transaction.
//! Covers lock wait, attempt recording, pricing, debit and commit.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

/// Booking latency in microseconds. BookingService records, API reads.
pub struct LatencyStats {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

#[derive(Debug, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: Option<f64>,
    pub p95_ms: Option<f64>,
    pub p99_ms: Option<f64>,
}

impl LatencyStats {
    /// 1us to 100s, 3 significant figures.
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 100_000_000, 3)
            .expect("valid histogram bounds");
        Self {
            inner: Mutex::new(histogram),
        }
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().clamp(1, 100_000_000) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us);
        }
    }

    pub fn summary(&self) -> LatencySummary {
        let Ok(h) = self.inner.lock() else {
            return LatencySummary { samples: 0, p50_ms: None, p95_ms: None, p99_ms: None };
        };
        let at = |q: f64| (h.len() > 0).then(|| h.value_at_quantile(q) as f64 / 1_000.0);
        LatencySummary {
            samples: h.len(),
            p50_ms: at(0.5),
            p95_ms: at(0.95),
            p99_ms: at(0.99),
        }
    }
}

impl Default for LatencyStats {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_histogram_has_no_percentiles() {
        let stats = LatencyStats::new();
        let summary = stats.summary();
        assert_eq!(summary.samples, 0);
        assert!(summary.p50_ms.is_none());
    }

    #[test]
    fn percentiles_are_reported_in_millis() {
        let stats = LatencyStats::new();
        for ms in 1..=100 {
            stats.record(Duration::from_millis(ms));
        }
        let summary = stats.summary();
        assert_eq!(summary.samples, 100);
        let p50 = summary.p50_ms.unwrap();
        assert!((p50 - 50.0).abs() < 1.0, "p50={p50}");
        assert!(summary.p99_ms.unwrap() >= summary.p95_ms.unwrap());
    }
}
