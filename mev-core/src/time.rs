//! Cached wall-clock time for hot-path timestamping.
//!
//! Per-sample timestamps are taken constantly across the pipeline (latency
//! samples, trade records, alert creation). Rather than a syscall per sample,
//! a background task refreshes a single atomic nanosecond counter and every
//! call site reads it directly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone)]
pub struct CachedClock {
    current_time_ns: Arc<AtomicU64>,
}

impl CachedClock {
    /// Builds a clock and spawns its background refresh task on the current
    /// tokio runtime. Must be called from within a runtime context.
    pub fn spawn(update_interval: Duration) -> Self {
        let clock = CachedClock {
            current_time_ns: Arc::new(AtomicU64::new(Self::fetch_real_time_ns())),
        };
        let handle = clock.current_time_ns.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(update_interval);
            loop {
                ticker.tick().await;
                handle.store(CachedClock::fetch_real_time_ns(), Ordering::Relaxed);
            }
        });
        clock
    }

    pub fn spawn_default() -> Self {
        Self::spawn(DEFAULT_UPDATE_INTERVAL)
    }

    #[inline]
    pub fn now_ns(&self) -> u64 {
        self.current_time_ns.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.now_ns() / 1_000_000
    }

    fn fetch_real_time_ns() -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64
    }
}

/// Direct, uncached timestamp for call sites outside a running pipeline
/// (tests, one-shot CLI invocations) where the syscall cost is irrelevant.
pub fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ns_is_monotonic_enough() {
        let a = now_ns();
        let b = now_ns();
        assert!(b >= a);
    }

    #[tokio::test]
    async fn cached_clock_tracks_real_time() {
        let clock = CachedClock::spawn(Duration::from_millis(1));
        let before = clock.now_ns();
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after = clock.now_ns();
        assert!(after > before);
    }
}
