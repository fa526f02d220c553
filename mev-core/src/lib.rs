//! # MEV Core — research pipeline for detecting and quantifying MEV
//! opportunities on forked EVM chains.
//!
//! ## Purpose
//!
//! Replays observed mempool transactions against isolated chain forks,
//! decodes their effects, scores candidate MEV strategies for expected
//! profit net of gas and slippage, and tracks realized outcomes well enough
//! to shut the pipeline down automatically if it starts losing money.
//!
//! ## Architecture
//!
//! ```mermaid
//! graph LR
//!     TX[Mempool tx] --> FM[ForkManager]
//!     FM --> Fork[Fork: execute]
//!     Fork --> SA[StateAnalyzer]
//!     SA --> Dec[EventDecoder]
//!     Dec --> SE[StrategyEngine]
//!     SE --> PC[ProfitCalculator]
//!     PC --> GE[GasEstimator]
//!     PC --> SC[SlippageCalculator]
//!     PC --> Cal[CalibrationSystem]
//!     PC --> WP[WorkerPool: execution]
//!     WP --> MC[MetricsCollector]
//!     MC --> SM[ShutdownManager]
//!     MC --> AM[AlertManager]
//!     SM --> AM
//!     LM[LatencyMonitor] --> AM
//!
//!     classDef exec fill:#E8F5E8
//!     classDef analysis fill:#F3E5F5
//!     classDef safety fill:#FFF3E0
//!     class Fork,FM,WP exec
//!     class SA,Dec,SE,PC,GE,SC,Cal analysis
//!     class MC,SM,AM,LM safety
//! ```
//!
//! `MetricsCollector` and `AlertManager` are shared, read-only dependencies
//! of `ShutdownManager` (constructor injection) — neither calls back into
//! it, breaking what would otherwise be a three-way cycle (spec §9).
//!
//! [`MevCore::submit_transaction`] hands one transaction to the worker pool
//! as a [`pipeline::TransactionJob`]: simulate, decode, detect, score.
//! Profitable opportunities publish onto the channel
//! [`MevCore::take_opportunity_receiver`] hands to its single downstream
//! consumer.
//!
//! ## Non-goals
//!
//! No network listener, no execution-signing/broadcast, no persistent
//! storage backend, no bridge-specific ABI decoding — see `SPEC_FULL.md`.

pub mod alerts;
pub mod calibration;
pub mod config;
pub mod decoder;
pub mod error;
pub mod fork;
pub mod fork_manager;
pub mod gas_estimator;
pub mod latency_monitor;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod profit_calculator;
pub mod shutdown;
pub mod slippage_calculator;
pub mod state_analyzer;
pub mod strategy;
pub mod time;
pub mod types;
pub mod worker_pool;

use std::sync::Arc;

use crate::alerts::{sink_from_config, AlertManager};
use crate::calibration::CalibrationSystem;
use crate::config::MevCoreConfig;
use crate::decoder::EventDecoder;
use crate::error::WorkerPoolError;
use crate::fork_manager::ForkManager;
use crate::gas_estimator::GasEstimator;
use crate::metrics::MetricsCollector;
use crate::pipeline::TransactionJob;
use crate::profit_calculator::ProfitCalculator;
use crate::shutdown::ShutdownManager;
use crate::slippage_calculator::SlippageCalculator;
use crate::state_analyzer::StateAnalyzer;
use crate::strategy::StrategyEngine;
use crate::time::CachedClock;
use crate::types::{MEVOpportunity, Transaction};
use crate::worker_pool::WorkerPool;
use tokio::sync::mpsc;

/// Wires all fourteen components together from one `MevCoreConfig`.
///
/// Construction is fallible only for `ForkManager` (it dials the fork
/// backend); every other component is infallible to build. Background
/// tasks (fork health checks, alert rule evaluation, alert cleanup) start
/// eagerly inside their owning component's constructor — `MevCore` itself
/// owns no extra tasks beyond the shared clock.
pub struct MevCore {
    pub clock: CachedClock,
    pub fork_manager: Arc<ForkManager>,
    pub state_analyzer: Arc<StateAnalyzer>,
    pub strategy_engine: Arc<StrategyEngine>,
    pub worker_pool: Arc<WorkerPool>,
    pub gas_estimator: Arc<GasEstimator>,
    pub slippage_calculator: Arc<SlippageCalculator>,
    pub calibration: Arc<CalibrationSystem>,
    pub profit_calculator: Arc<ProfitCalculator>,
    pub metrics: Arc<MetricsCollector>,
    pub alerts: Arc<AlertManager>,
    pub shutdown: Arc<ShutdownManager>,
    opportunity_tx: mpsc::Sender<MEVOpportunity>,
    opportunity_rx: parking_lot::Mutex<Option<mpsc::Receiver<MEVOpportunity>>>,
}

impl MevCore {
    /// Must run inside a tokio runtime — several components spawn
    /// background tasks at construction.
    pub async fn new(config: MevCoreConfig, rng_seed: u64) -> anyhow::Result<Self> {
        config.validate()?;

        let clock = CachedClock::spawn_default();

        let fork_manager = ForkManager::new(config.fork_pool.clone()).await?;
        let state_analyzer = Arc::new(StateAnalyzer::new(EventDecoder::new()));
        let strategy_engine = Arc::new(StrategyEngine::new());
        let worker_pool = WorkerPool::new(config.worker_pool.clone());

        let gas_estimator = Arc::new(GasEstimator::new(config.gas_estimator.clone()));
        let slippage_calculator = Arc::new(SlippageCalculator::new(
            config.slippage_calculator.clone(),
            config.metrics.max_opportunities,
        ));
        let calibration = Arc::new(CalibrationSystem::new(config.calibration.clone()));
        let profit_calculator = Arc::new(ProfitCalculator::new(
            config.profit_calculator.clone(),
            gas_estimator.clone(),
            slippage_calculator.clone(),
            calibration.clone(),
            rng_seed,
        ));

        let metrics = Arc::new(MetricsCollector::new(
            config.metrics.max_trades,
            config.metrics.max_latencies,
            config.metrics.max_opportunities,
            config.metrics.window_sizes.clone(),
        ));

        let sink = sink_from_config(&config.alert_manager.sink);
        let alerts = AlertManager::new(config.alert_manager.clone(), sink, metrics.clone());

        let shutdown = Arc::new(ShutdownManager::new(
            config.shutdown_manager.clone(),
            metrics.clone(),
            alerts.clone(),
        ));

        let (opportunity_tx, opportunity_rx) = mpsc::channel(config.metrics.max_opportunities);

        log_success!("mev-core initialized: fork_pool={:?} worker_pool={:?}",
            config.fork_pool.min_size, config.worker_pool.size);

        Ok(MevCore {
            clock,
            fork_manager,
            state_analyzer,
            strategy_engine,
            worker_pool,
            gas_estimator,
            slippage_calculator,
            calibration,
            profit_calculator,
            metrics,
            alerts,
            shutdown,
            opportunity_tx,
            opportunity_rx: parking_lot::Mutex::new(Some(opportunity_rx)),
        })
    }

    /// Submits one transaction to the processing pipeline: simulate on a
    /// fork, decode events, run strategy detectors, score profitability,
    /// and publish any profitable opportunity to the outbound stream.
    /// Non-blocking — fails fast with `WorkerPoolError::QueueFull` under
    /// back-pressure, matching `WorkerPool::submit`'s contract.
    pub fn submit_transaction(&self, tx: Transaction, priority: i32) -> Result<(), WorkerPoolError> {
        let job = Arc::new(TransactionJob {
            tx,
            priority,
            job_timeout: std::time::Duration::from_secs(5),
            fork_manager: self.fork_manager.clone(),
            state_analyzer: self.state_analyzer.clone(),
            strategy_engine: self.strategy_engine.clone(),
            profit_calculator: self.profit_calculator.clone(),
            metrics: self.metrics.clone(),
            opportunity_tx: self.opportunity_tx.clone(),
        });
        self.worker_pool.submit(job)
    }

    /// Hands the outbound `MEVOpportunity` stream to its single consumer.
    /// Per §6, this is a push channel the pipeline owns; only the first
    /// caller gets a receiver — later calls return `None`.
    pub fn take_opportunity_receiver(&self) -> Option<mpsc::Receiver<MEVOpportunity>> {
        self.opportunity_rx.lock().take()
    }

    /// Graceful teardown: stop accepting new work, drain the worker pool,
    /// close the fork pool, stop background alert tasks.
    pub async fn stop(&self) -> anyhow::Result<()> {
        self.worker_pool.stop().await?;
        self.fork_manager.cleanup();
        self.alerts.stop();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn config_validation_runs_before_any_component_is_built() {
        let mut config = MevCoreConfig::default();
        config.fork_pool.min_size = 0;
        config.fork_pool.max_size = 0;
        config.worker_pool.size = 0;
        let result = MevCore::new(config, 1).await;
        assert!(result.is_err(), "zero-sized worker pool must fail validation");
    }

    #[tokio::test]
    async fn opportunity_receiver_is_handed_out_exactly_once() {
        let core = MevCore::new(MevCoreConfig::default(), 1).await.unwrap();
        assert!(core.take_opportunity_receiver().is_some());
        assert!(core.take_opportunity_receiver().is_none());
    }
}
