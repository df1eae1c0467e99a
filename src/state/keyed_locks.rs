use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

// ---------------------------------------------------------------------------
// KeyedLocks: one async mutex per id, created on first use
// ---------------------------------------------------------------------------

/// Serializes writers per key (flight id, user id). Entries are never
/// removed; the key space is bounded by the catalog and the user table.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    locks: DashMap<i64, Arc<Mutex<()>>>,
}

impl KeyedLocks {
    /// Wait for exclusive access to `key`. The guard releases on drop.
    pub async fn lock(&self, key: i64) -> OwnedMutexGuard<()> {
        // Clone the Arc out so the shard lock is released before awaiting.
        let mutex = Arc::clone(self.locks.entry(key).or_default().value());
        mutex.lock_owned().await
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}

// ---------------------------------------------------------------------------
// BookingLocks
// ---------------------------------------------------------------------------

/// Write locks taken by a booking: always flight first, then user.
#[derive(Debug, Default)]
pub struct BookingLocks {
    pub flights: KeyedLocks,
    pub users: KeyedLocks,
}

impl BookingLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn acquire(&self, flight_id: i64, user_id: i64) -> (OwnedMutexGuard<()>, OwnedMutexGuard<()>) {
        let flight = self.flights.lock(flight_id).await;
        let user = self.users.lock(user_id).await;
        (flight, user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn same_key_is_mutually_exclusive() {
        let locks = Arc::new(KeyedLocks::default());
        let inside = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let locks = Arc::clone(&locks);
            let inside = Arc::clone(&inside);
            let max_seen = Arc::clone(&max_seen);
            tasks.spawn(async move {
                let _guard = locks.lock(42).await;
                let now_inside = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now_inside, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            });
        }
        while let Some(res) = tasks.join_next().await {
            res.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert_eq!(locks.len(), 1);
    }

    #[tokio::test]
    async fn different_keys_do_not_block() {
        let locks = KeyedLocks::default();
        let _a = locks.lock(1).await;
        let b = tokio::time::timeout(Duration::from_millis(100), locks.lock(2)).await;
        assert!(b.is_ok());
    }
}
