//! ForkManager (C2) — a pool of `Fork`s with lifecycle, health, and
//! load-balancing.
//!
//! Mirrors the `parking_lot::RwLock`-guarded bookkeeping style used by
//! `detector.rs`'s opportunity-id counter and the `pool_cache` adapter:
//! available forks live in a `VecDeque` behind one lock, busy/failed counts
//! are tracked alongside. A background `tokio::spawn`ed task runs a
//! health-check/top-up loop on `health_interval`, the idiom `gas_price.rs`
//! would use for a periodic refresh.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::{watch, Semaphore};
use tokio::time::timeout;

use crate::config::ForkPoolConfig;
use crate::error::PoolError;
use crate::fork::{Fork, ForkId, SharedFork};
use crate::{log_error, log_fork};

#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub busy: usize,
    pub failed: u64,
    pub avg_acquire_latency: Duration,
}

struct Inner {
    available: VecDeque<SharedFork>,
    busy: usize,
    next_id: ForkId,
}

/// Pool of `Fork`s with configurable `min_size`/`max_size`, base URL, health
/// check period, and acquisition timeout.
pub struct ForkManager {
    config: ForkPoolConfig,
    inner: RwLock<Inner>,
    failed_total: AtomicU64,
    acquire_latency_ns_total: AtomicU64,
    acquire_count: AtomicU64,
    notify: Semaphore,
    stop_tx: watch::Sender<bool>,
}

impl ForkManager {
    /// Eagerly creates `min_size` forks. Creation errors are logged and the
    /// manager keeps running as long as at least one fork is ready.
    pub async fn new(config: ForkPoolConfig) -> Result<Arc<Self>, PoolError> {
        let (stop_tx, _stop_rx) = watch::channel(false);
        let manager = Arc::new(ForkManager {
            config: config.clone(),
            inner: RwLock::new(Inner {
                available: VecDeque::new(),
                busy: 0,
                next_id: 0,
            }),
            failed_total: AtomicU64::new(0),
            acquire_latency_ns_total: AtomicU64::new(0),
            acquire_count: AtomicU64::new(0),
            notify: Semaphore::new(0),
            stop_tx,
        });

        let mut created = 0usize;
        for _ in 0..config.min_size {
            match manager.create_fork().await {
                Ok(fork) => {
                    manager.inner.write().available.push_back(fork);
                    manager.notify.add_permits(1);
                    created += 1;
                }
                Err(e) => log_error!("failed to eagerly create fork: {e}"),
            }
        }
        if created == 0 && config.min_size > 0 {
            log_error!("ForkManager started with zero healthy forks out of {}", config.min_size);
        }

        manager.clone().spawn_health_check_loop();
        Ok(manager)
    }

    async fn create_fork(&self) -> Result<SharedFork, PoolError> {
        let mut inner = self.inner.write();
        let id = inner.next_id;
        inner.next_id += 1;
        drop(inner);

        let url = format!("{}:{}", self.config.base_url, self.config.base_port);
        let fork = Fork::connect(id, &url, 0)
            .await
            .map_err(PoolError::Fork)?;
        Ok(Arc::new(fork))
    }

    /// Takes an available fork from the queue. If the dequeued fork fails
    /// its health check, it is replaced and acquisition retried. Blocks up
    /// to `acquire_timeout`, honoring cancellation via `stop_rx`.
    pub async fn acquire(&self) -> Result<SharedFork, PoolError> {
        let started = std::time::Instant::now();
        let mut stop_rx = self.stop_tx.subscribe();

        let result = timeout(self.config.acquire_timeout, async {
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => return Err(PoolError::Cancelled),
                    permit = self.notify.acquire() => {
                        let permit = permit.map_err(|_| PoolError::Cancelled)?;
                        permit.forget();
                        let candidate = {
                            let mut inner = self.inner.write();
                            inner.available.pop_front()
                        };
                        let Some(fork) = candidate else { continue; };
                        if fork.is_healthy().await {
                            self.inner.write().busy += 1;
                            return Ok(fork);
                        }
                        log_fork!("discarding unhealthy fork {} on acquire", fork.id());
                        self.failed_total.fetch_add(1, Ordering::Relaxed);
                        if let Ok(replacement) = self.create_fork().await {
                            self.inner.write().available.push_back(replacement);
                            self.notify.add_permits(1);
                        }
                    }
                }
            }
        })
        .await;

        let elapsed = started.elapsed();
        self.acquire_latency_ns_total
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);
        self.acquire_count.fetch_add(1, Ordering::Relaxed);

        match result {
            Ok(inner_result) => inner_result,
            Err(_) => Err(PoolError::AcquireTimeout(self.config.acquire_timeout)),
        }
    }

    /// Resets `fork` and returns it to the available queue. On reset
    /// failure the fork is discarded and a replacement created
    /// asynchronously.
    pub async fn release(&self, fork: SharedFork) -> Result<(), PoolError> {
        match fork.reset().await {
            Ok(()) => {
                self.inner.write().busy -= 1;
                self.inner.write().available.push_back(fork);
                self.notify.add_permits(1);
                Ok(())
            }
            Err(e) => {
                log_error!("fork {} failed reset on release, replacing: {e}", fork.id());
                fork.close();
                self.inner.write().busy -= 1;
                self.failed_total.fetch_add(1, Ordering::Relaxed);
                if let Ok(replacement) = self.create_fork().await {
                    self.inner.write().available.push_back(replacement);
                    self.notify.add_permits(1);
                }
                Err(PoolError::Fork(e))
            }
        }
    }

    /// `total = available + busy + failed` at every snapshot.
    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.read();
        let available = inner.available.len();
        let busy = inner.busy;
        let failed = self.failed_total.load(Ordering::Relaxed);
        let count = self.acquire_count.load(Ordering::Relaxed).max(1);
        let avg_ns = self.acquire_latency_ns_total.load(Ordering::Relaxed) / count;
        PoolStats {
            total: available + busy + failed as usize,
            available,
            busy,
            failed,
            avg_acquire_latency: Duration::from_nanos(avg_ns),
        }
    }

    /// Drains unhealthy forks and stops the background loop. Does not wait
    /// for busy forks to be released.
    pub fn cleanup(&self) {
        let _ = self.stop_tx.send(true);
    }

    fn spawn_health_check_loop(self: Arc<Self>) {
        let interval_dur = self.config.health_interval;
        let min_size = self.config.min_size;
        let mut stop_rx = self.stop_tx.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_dur);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        self.health_check_and_top_up(min_size).await;
                    }
                }
            }
        });
    }

    async fn health_check_and_top_up(&self, min_size: usize) {
        let candidates: Vec<SharedFork> = self.inner.write().available.drain(..).collect();
        let mut still_healthy = Vec::with_capacity(candidates.len());
        for fork in candidates {
            if fork.is_healthy().await {
                still_healthy.push(fork);
            } else {
                log_fork!("replacing unhealthy fork {} during health check", fork.id());
                self.failed_total.fetch_add(1, Ordering::Relaxed);
                if let Ok(replacement) = self.create_fork().await {
                    still_healthy.push(replacement);
                }
            }
        }
        while still_healthy.len() < min_size {
            match self.create_fork().await {
                Ok(fork) => still_healthy.push(fork),
                Err(e) => {
                    log_error!("top-up fork creation failed: {e}");
                    break;
                }
            }
        }
        let mut inner = self.inner.write();
        let added = still_healthy.len();
        for fork in still_healthy {
            inner.available.push_back(fork);
        }
        drop(inner);
        self.notify.add_permits(added);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_relation_holds_when_empty() {
        let stats = PoolStats::default();
        assert_eq!(stats.total, stats.available + stats.busy + stats.failed as usize);
    }

    #[test]
    fn stats_relation_holds_with_failures_counted() {
        let stats = PoolStats {
            total: 5,
            available: 2,
            busy: 1,
            failed: 2,
            avg_acquire_latency: Duration::ZERO,
        };
        assert_eq!(stats.total, stats.available + stats.busy + stats.failed as usize);
    }
}
