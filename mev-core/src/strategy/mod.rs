//! StrategyEngine (C7) — orchestrates per-strategy detectors, produces
//! opportunities.
//!
//! Per-strategy polymorphism is modeled as a closed variant set
//! (`StrategyKind`), per spec §9's design note against inheritance: the
//! engine holds a map strategy→detector, and each detector implements the
//! same `Detector` capability set. The engine's only obligations are
//! registration/routing and tagging the emitted `MEVOpportunity` — it does
//! not know how any individual detector decides.

pub mod backrun;
pub mod cross_layer;
pub mod frontrun;
pub mod sandwich;
pub mod time_bandit;

use std::collections::HashMap;

use parking_lot::RwLock;

use crate::decoder::SwapEvent;
use crate::types::{MEVOpportunity, OpportunityStatus, SimulationResult, StrategyKind, Transaction};

/// Intermediate candidate a detector proposes before the engine stamps it
/// into a full `MEVOpportunity`. Execution-tx construction is a separate
/// step (`Detector::construct`, §4.7) run once the engine has accepted
/// the candidate.
#[derive(Debug, Clone)]
pub struct OpportunityCandidate {
    pub expected_gross_profit: rust_decimal::Decimal,
    pub metadata: HashMap<String, String>,
}

/// Per-strategy detector contract. Detectors are pure with respect to
/// engine state — only their own `config()` may vary their behavior.
pub trait Detector: Send + Sync {
    fn kind(&self) -> StrategyKind;
    fn detect(
        &self,
        tx: &Transaction,
        sim: &SimulationResult,
        swaps: &[SwapEvent],
    ) -> Option<OpportunityCandidate>;
    /// Builds the skeletal execution-tx envelope(s) for a detected
    /// candidate (§4.7 `Construct`). Calldata encoding is left empty —
    /// that belongs to the execution subsystem this core hands
    /// opportunities off to (§1 non-goal: submission, not construction).
    fn construct(&self, trigger: &Transaction, candidate: &OpportunityCandidate) -> Vec<Transaction>;
}

/// Shared helper: a skeletal execution `Transaction` derived from the
/// trigger tx's chain id and gas price, distinguished by `suffix` so
/// multi-leg strategies (e.g. sandwich) produce distinct hashes.
fn skeletal_execution_tx(trigger: &Transaction, to: Option<String>, gas_limit: u64, suffix: &str) -> Transaction {
    Transaction {
        hash: format!("{}-{suffix}", trigger.hash),
        from: trigger.from.clone(),
        to,
        value: rust_decimal::Decimal::ZERO,
        gas_price: trigger.gas_price,
        gas_limit,
        nonce: trigger.nonce,
        data: Vec::new(),
        chain_id: trigger.chain_id,
    }
}

pub struct StrategyEngine {
    detectors: HashMap<StrategyKind, Box<dyn Detector>>,
    enabled: RwLock<HashMap<StrategyKind, bool>>,
    next_id: RwLock<u64>,
}

impl StrategyEngine {
    pub fn new() -> Self {
        let mut detectors: HashMap<StrategyKind, Box<dyn Detector>> = HashMap::new();
        detectors.insert(StrategyKind::Sandwich, Box::new(sandwich::SandwichDetector::default()));
        detectors.insert(StrategyKind::Backrun, Box::new(backrun::BackrunDetector::default()));
        detectors.insert(StrategyKind::Frontrun, Box::new(frontrun::FrontrunDetector::default()));
        detectors.insert(StrategyKind::TimeBandit, Box::new(time_bandit::TimeBanditDetector::default()));
        detectors.insert(StrategyKind::CrossLayer, Box::new(cross_layer::CrossLayerDetector::default()));

        let enabled = StrategyKind::ALL.iter().map(|k| (*k, true)).collect();

        StrategyEngine {
            detectors,
            enabled: RwLock::new(enabled),
            next_id: RwLock::new(0),
        }
    }

    pub fn set_enabled(&self, strategy: StrategyKind, enabled: bool) {
        self.enabled.write().insert(strategy, enabled);
    }

    pub fn is_enabled(&self, strategy: StrategyKind) -> bool {
        *self.enabled.read().get(&strategy).unwrap_or(&false)
    }

    /// Iterates active detectors; each returns at most one candidate.
    pub fn analyze(
        &self,
        tx: &Transaction,
        sim: &SimulationResult,
        swaps: &[SwapEvent],
    ) -> Vec<MEVOpportunity> {
        let mut opportunities = Vec::new();
        for (kind, detector) in &self.detectors {
            if !self.is_enabled(*kind) {
                continue;
            }
            if let Some(candidate) = detector.detect(tx, sim, swaps) {
                let execution_txs = detector.construct(tx, &candidate);

                let mut next_id = self.next_id.write();
                let id = format!("{}-{}", kind.as_str(), *next_id);
                *next_id += 1;
                drop(next_id);

                opportunities.push(MEVOpportunity {
                    id,
                    strategy: *kind,
                    target_tx_hash: tx.hash.clone(),
                    expected_gross_profit: candidate.expected_gross_profit,
                    estimated_gas_cost: rust_decimal::Decimal::ZERO,
                    net_profit: rust_decimal::Decimal::ZERO,
                    confidence: 0.0,
                    status: OpportunityStatus::Detected,
                    execution_txs,
                    metadata: candidate.metadata,
                });
            }
        }
        opportunities
    }
}

impl Default for StrategyEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabling_a_strategy_suppresses_its_detector() {
        let engine = StrategyEngine::new();
        engine.set_enabled(StrategyKind::Sandwich, false);
        assert!(!engine.is_enabled(StrategyKind::Sandwich));
        assert!(engine.is_enabled(StrategyKind::Backrun));
    }
}
