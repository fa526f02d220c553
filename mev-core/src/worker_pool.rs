//! WorkerPool (C5) — prioritized job queue with timeouts and stats.
//!
//! `submit` is non-blocking: a `try_send` on the bounded intake channel
//! returns `WorkerPoolError::QueueFull` immediately under saturation (the
//! back-pressure contract). A dispatcher task drains the channel into a
//! `BinaryHeap` so equal-priority jobs keep insertion order (a `Reverse`-free
//! max-heap keyed by `(priority, sequence)`), and `size` worker tasks pull
//! from it under a `tokio::sync::Mutex`.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex, Notify};
use tokio::time::timeout;

use crate::config::WorkerPoolConfig;
use crate::error::WorkerPoolError;
use crate::{log_error, log_search};

/// Contract a unit of pipeline work must implement.
#[async_trait]
pub trait Job: Send + Sync {
    async fn execute(&self) -> Result<(), anyhow::Error>;
    fn priority(&self) -> i32;
    fn id(&self) -> String;
    fn timeout(&self) -> Duration;
}

struct QueuedJob {
    job: Arc<dyn Job>,
    sequence: u64,
}

impl PartialEq for QueuedJob {
    fn eq(&self, other: &Self) -> bool {
        self.job.priority() == other.job.priority() && self.sequence == other.sequence
    }
}
impl Eq for QueuedJob {}

impl PartialOrd for QueuedJob {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedJob {
    /// Higher priority first; among equal priorities, lower sequence
    /// (earlier insertion) first — `BinaryHeap` is a max-heap, so insertion
    /// order is inverted on `sequence`.
    fn cmp(&self, other: &Self) -> CmpOrdering {
        self.job
            .priority()
            .cmp(&other.job.priority())
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPoolStats {
    pub completed: u64,
    pub failed: u64,
    pub total_latency: Duration,
    pub jobs_submitted: u64,
    pub queue_depth: usize,
}

struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
    total_latency_ns: AtomicU64,
    jobs_submitted: AtomicU64,
}

pub struct WorkerPool {
    config: WorkerPoolConfig,
    intake_tx: mpsc::Sender<Arc<dyn Job>>,
    heap: Arc<Mutex<BinaryHeap<QueuedJob>>>,
    heap_notify: Arc<Notify>,
    counters: Arc<Counters>,
    stop_tx: watch::Sender<bool>,
    sequence: AtomicU64,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Arc<Self> {
        let (intake_tx, intake_rx) = mpsc::channel(config.queue_size);
        let (stop_tx, _stop_rx) = watch::channel(false);
        let pool = Arc::new(WorkerPool {
            config: config.clone(),
            intake_tx,
            heap: Arc::new(Mutex::new(BinaryHeap::new())),
            heap_notify: Arc::new(Notify::new()),
            counters: Arc::new(Counters {
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                total_latency_ns: AtomicU64::new(0),
                jobs_submitted: AtomicU64::new(0),
            }),
            stop_tx,
            sequence: AtomicU64::new(0),
        });
        pool.clone().start(intake_rx);
        pool
    }

    fn start(self: Arc<Self>, mut intake_rx: mpsc::Receiver<Arc<dyn Job>>) {
        let dispatcher_pool = self.clone();
        let mut dispatcher_stop = self.stop_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = dispatcher_stop.changed() => break,
                    maybe_job = intake_rx.recv() => {
                        let Some(job) = maybe_job else { break; };
                        let sequence = dispatcher_pool.sequence.fetch_add(1, Ordering::Relaxed);
                        dispatcher_pool.heap.lock().await.push(QueuedJob { job, sequence });
                        dispatcher_pool.heap_notify.notify_one();
                    }
                }
            }
        });

        for worker_id in 0..self.config.size {
            let worker_pool = self.clone();
            let mut worker_stop = self.stop_tx.subscribe();
            tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = worker_stop.changed() => break,
                        _ = worker_pool.heap_notify.notified() => {
                            worker_pool.drain_one(worker_id).await;
                        }
                    }
                }
            });
        }
    }

    async fn drain_one(&self, worker_id: usize) {
        let queued = self.heap.lock().await.pop();
        let Some(queued) = queued else { return };
        let job = queued.job;
        let effective_timeout = job.timeout().min(self.config.max_job_timeout);
        let started = std::time::Instant::now();
        log_search!("worker {worker_id} executing job {}", job.id());

        let outcome = timeout(effective_timeout, job.execute()).await;
        let elapsed = started.elapsed();
        self.counters
            .total_latency_ns
            .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);

        match outcome {
            Ok(Ok(())) => {
                self.counters.completed.fetch_add(1, Ordering::Relaxed);
            }
            Ok(Err(e)) => {
                log_error!("job {} failed: {e}", job.id());
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
            Err(_) => {
                log_error!("job {} timed out after {:?}", job.id(), effective_timeout);
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Non-blocking: returns `QueueFull` immediately when the intake
    /// channel is saturated.
    pub fn submit(&self, job: Arc<dyn Job>) -> Result<(), WorkerPoolError> {
        self.counters.jobs_submitted.fetch_add(1, Ordering::Relaxed);
        self.intake_tx
            .try_send(job)
            .map_err(|_| WorkerPoolError::QueueFull)
    }

    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            completed: self.counters.completed.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            total_latency: Duration::from_nanos(
                self.counters.total_latency_ns.load(Ordering::Relaxed),
            ),
            jobs_submitted: self.counters.jobs_submitted.load(Ordering::Relaxed),
            queue_depth: self.heap.try_lock().map(|h| h.len()).unwrap_or(0),
        }
    }

    /// Closes the intake queue and waits for drain up to
    /// `shutdown_timeout`; returns `ShutdownTimeout` if it does not drain in
    /// time.
    pub async fn stop(&self) -> Result<(), WorkerPoolError> {
        let deadline = std::time::Instant::now() + self.config.shutdown_timeout;
        loop {
            let depth = self.heap.lock().await.len();
            if depth == 0 {
                let _ = self.stop_tx.send(true);
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(WorkerPoolError::ShutdownTimeout(self.config.shutdown_timeout));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    struct NoopJob {
        id: String,
        priority: i32,
        ran: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Job for NoopJob {
        async fn execute(&self) -> Result<(), anyhow::Error> {
            self.ran.store(true, Ordering::SeqCst);
            Ok(())
        }
        fn priority(&self) -> i32 {
            self.priority
        }
        fn id(&self) -> String {
            self.id.clone()
        }
        fn timeout(&self) -> Duration {
            Duration::from_secs(1)
        }
    }

    #[tokio::test]
    async fn submit_executes_job() {
        let pool = WorkerPool::new(WorkerPoolConfig {
            size: 2,
            queue_size: 4,
            max_job_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(1),
        });
        let ran = Arc::new(AtomicBool::new(false));
        pool.submit(Arc::new(NoopJob {
            id: "j1".into(),
            priority: 0,
            ran: ran.clone(),
        }))
        .unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(ran.load(Ordering::SeqCst));
        assert_eq!(pool.stats().completed, 1);
    }

    #[tokio::test]
    async fn submit_rejects_when_queue_full() {
        let pool = WorkerPool::new(WorkerPoolConfig {
            size: 0,
            queue_size: 2,
            max_job_timeout: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(1),
        });
        let ran = Arc::new(AtomicBool::new(false));
        for i in 0..2 {
            pool.submit(Arc::new(NoopJob {
                id: format!("j{i}"),
                priority: 0,
                ran: ran.clone(),
            }))
            .unwrap();
        }
        let third = pool.submit(Arc::new(NoopJob {
            id: "j3".into(),
            priority: 0,
            ran,
        }));
        assert!(matches!(third, Err(WorkerPoolError::QueueFull)));
    }
}
