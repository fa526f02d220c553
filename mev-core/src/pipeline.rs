//! Transaction pipeline job — the concrete `Job` the `WorkerPool` (C5)
//! drives through simulation, event parsing, strategy detection, and
//! profit calculation for one mempool transaction, exactly the flow §2
//! describes for the processing pipeline.
//!
//! An `MEVOpportunity` is owned by this job until it publishes the
//! opportunity to `opportunity_tx`; the profit calculator mutates the
//! opportunity's gas/net/confidence fields in place before that publish,
//! after which it is read-only to downstream consumers.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::decoder::ParsedEvent;
use crate::fork_manager::ForkManager;
use crate::metrics::MetricsCollector;
use crate::profit_calculator::ProfitCalculator;
use crate::state_analyzer::StateAnalyzer;
use crate::strategy::StrategyEngine;
use crate::types::{MEVOpportunity, OpportunityStatus, Transaction};
use crate::worker_pool::Job;
use crate::{log_error, log_profit};

pub struct TransactionJob {
    pub tx: Transaction,
    pub priority: i32,
    pub job_timeout: Duration,
    pub fork_manager: Arc<ForkManager>,
    pub state_analyzer: Arc<StateAnalyzer>,
    pub strategy_engine: Arc<StrategyEngine>,
    pub profit_calculator: Arc<ProfitCalculator>,
    pub metrics: Arc<MetricsCollector>,
    pub opportunity_tx: mpsc::Sender<MEVOpportunity>,
}

#[async_trait]
impl Job for TransactionJob {
    async fn execute(&self) -> Result<(), anyhow::Error> {
        let started = std::time::Instant::now();
        let now_ns = crate::time::now_ns();

        let fork = self.fork_manager.acquire().await?;
        let result = fork.execute(&self.tx).await;
        let release_result = self.fork_manager.release(fork).await;
        if let Err(e) = release_result {
            log_error!("fork release failed for tx {}: {e}", self.tx.hash);
        }
        let simulation = result?;

        self.metrics.record_latency("simulate", now_ns, started.elapsed());
        if !simulation.success {
            return Ok(());
        }

        let swaps: Vec<_> = self
            .state_analyzer
            .extract_events(&simulation)
            .into_iter()
            .filter_map(|event| match event {
                ParsedEvent::Swap(swap) => Some(swap),
                ParsedEvent::Bridge(_) => None,
            })
            .collect();

        let candidates = self.strategy_engine.analyze(&self.tx, &simulation, &swaps);
        for mut opportunity in candidates {
            let estimate = match self.profit_calculator.calculate(&opportunity, now_ns) {
                Ok(estimate) => estimate,
                Err(e) => {
                    log_error!("profit calculation failed for {}: {e}", opportunity.id);
                    continue;
                }
            };

            opportunity.estimated_gas_cost = estimate.gas_cost;
            opportunity.net_profit = estimate.net;
            opportunity.confidence = estimate.confidence;
            opportunity.status = if self.profit_calculator.validate(&opportunity, &estimate) {
                OpportunityStatus::Profitable
            } else {
                OpportunityStatus::Unprofitable
            };

            log_profit!(
                "{} opportunity {} net={} confidence={:.2}",
                opportunity.strategy, opportunity.id, opportunity.net_profit, opportunity.confidence
            );
            self.metrics.record_opportunity(opportunity.clone());

            if matches!(opportunity.status, OpportunityStatus::Profitable) {
                if self.opportunity_tx.try_send(opportunity).is_err() {
                    log_error!("opportunity stream is full or closed, dropping publish");
                }
            }
        }

        Ok(())
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn id(&self) -> String {
        self.tx.hash.clone()
    }

    fn timeout(&self) -> Duration {
        self.job_timeout
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OpportunityStatus;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    fn opportunity(status: OpportunityStatus) -> MEVOpportunity {
        MEVOpportunity {
            id: "opp-1".into(),
            strategy: crate::types::StrategyKind::Backrun,
            target_tx_hash: "0xabc".into(),
            expected_gross_profit: dec!(100),
            estimated_gas_cost: dec!(0),
            net_profit: dec!(0),
            confidence: 0.0,
            status,
            execution_txs: vec![],
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn only_profitable_opportunities_are_eligible_for_publish() {
        assert!(matches!(opportunity(OpportunityStatus::Profitable).status, OpportunityStatus::Profitable));
        assert!(!matches!(opportunity(OpportunityStatus::Unprofitable).status, OpportunityStatus::Profitable));
    }
}
