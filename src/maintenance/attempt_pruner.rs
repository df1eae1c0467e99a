use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info};

use crate::config::ATTEMPT_PRUNE_INTERVAL_SECS;
use crate::db::attempts::SurgeStore;
use crate::error::Result;

/// Background task that trims the `pricing_attempts` log every 60 seconds.
/// Only spawned when the process runs the sliding-window detector.
pub struct AttemptLogPruner {
    pool: sqlx::SqlitePool,
    surge: Arc<SurgeStore>,
}

impl AttemptLogPruner {
    pub fn new(pool: sqlx::SqlitePool, surge: Arc<SurgeStore>) -> Self {
        Self { pool, surge }
    }

    pub async fn run(self) {
        let mut interval = tokio::time::interval(Duration::from_secs(ATTEMPT_PRUNE_INTERVAL_SECS));
        interval.tick().await; // consume immediate first tick

        loop {
            interval.tick().await;
            if let Err(e) = self.prune_once(Utc::now()).await {
                error!("Attempt log pruner error: {e}");
            }
        }
    }

    async fn prune_once(&self, now: DateTime<Utc>) -> Result<u64> {
        let removed = self.surge.prune_log(&self.pool, now).await?;
        if removed > 0 {
            info!(removed, "Pruned expired pricing attempts");
        } else {
            debug!("No pricing attempts to prune");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::catalog::seed_flights;
    use crate::db::test_pool;
    use crate::pricing::{PricingPolicy, SurgeEngine, SurgeMode};
    use crate::types::SAMPLE_FLIGHTS;
    use chrono::TimeZone;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn prune_once_drops_only_expired_entries() {
        let pool = test_pool().await;
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
        let policy = PricingPolicy::new(
            3,
            chrono::Duration::minutes(5),
            chrono::Duration::minutes(10),
            Decimal::new(110, 2),
        )
        .unwrap();
        let surge = Arc::new(SurgeStore::new(SurgeEngine::new(policy, SurgeMode::Log)));

        {
            let mut conn = pool.acquire().await.unwrap();
            seed_flights(&mut conn, SAMPLE_FLIGHTS, t0).await.unwrap();
            for minute in [0, 1, 20] {
                surge
                    .record_attempt(&mut conn, 1, t0 + chrono::Duration::minutes(minute))
                    .await
                    .unwrap();
            }
        }

        let pruner = AttemptLogPruner::new(pool.clone(), surge);
        let now = t0 + chrono::Duration::minutes(21);
        assert_eq!(pruner.prune_once(now).await.unwrap(), 2);
        assert_eq!(pruner.prune_once(now).await.unwrap(), 0);
    }
}
