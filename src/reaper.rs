use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::engine::{Engine, now_ms};
use crate::model::{Ms, date_of_ms};

/// Background task that periodically releases expired reservation locks.
/// Readers already treat expired locks as free, so the sweep only reclaims
/// memory and makes the release durable.
pub async fn run_reaper(engine: Arc<Engine>) {
    let mut interval = tokio::time::interval(Duration::from_secs(5));
    loop {
        interval.tick().await;
        let expired = engine.collect_expired_locks().await;
        for lock_id in expired {
            match engine.release_lock(lock_id).await {
                Ok(()) => {
                    metrics::counter!(crate::observability::LOCKS_REAPED_TOTAL).increment(1);
                    info!("reaped expired lock {lock_id}");
                }
                Err(e) => {
                    // May already have been released or finalized
                    debug!("reaper skip {lock_id}: {e}");
                }
            }
        }
    }
}

/// Background task that rewrites the WAL once enough appends accumulate.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(()) => info!("compacted WAL after {appends} appends"),
            Err(e) => warn!("compaction failed: {e}"),
        }
    }
}

/// Background task that drops staff-days older than the retention window.
/// Hourly is plenty for day-granularity retention.
pub async fn run_gc(engine: Arc<Engine>, retention_ms: Ms) {
    let mut interval = tokio::time::interval(Duration::from_secs(3600));
    loop {
        interval.tick().await;
        let Some(cutoff) = date_of_ms(now_ms() - retention_ms) else {
            continue;
        };
        let removed = engine.gc_stale_days(cutoff).await;
        if removed > 0 {
            info!("gc dropped {removed} staff-days before {cutoff}");
        }
    }
}
