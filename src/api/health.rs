//! Shared health counters for the /health endpoint.
//! Updated by BookingService, read by the API.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

#[derive(Default)]
pub struct HealthState {
    /// Bookings committed (wallet debited, booking row written).
    pub bookings_committed: AtomicU64,
    /// Booking submissions that failed and left no booking behind.
    pub bookings_rejected: AtomicU64,
    /// Attempts that moved a flight into surge.
    pub surges_triggered: AtomicU64,
    /// Epoch millis of the last committed booking (0 = none).
    pub last_booking_at_ms: AtomicU64,
}

#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub bookings_committed: u64,
    pub bookings_rejected: u64,
    pub surges_triggered: u64,
    pub last_booking_at_ms: Option<u64>,
}

impl HealthState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_commit(&self, at_ms: i64) {
        self.bookings_committed.fetch_add(1, Ordering::Relaxed);
        self.last_booking_at_ms.store(at_ms.max(0) as u64, Ordering::Relaxed);
    }

    pub fn record_rejection(&self) {
        self.bookings_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_surge(&self) {
        self.surges_triggered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let last = self.last_booking_at_ms.load(Ordering::Relaxed);
        HealthSnapshot {
            status: "ok",
            bookings_committed: self.bookings_committed.load(Ordering::Relaxed),
            bookings_rejected: self.bookings_rejected.load(Ordering::Relaxed),
            surges_triggered: self.surges_triggered.load(Ordering::Relaxed),
            last_booking_at_ms: (last > 0).then_some(last),
        }
    }
}
