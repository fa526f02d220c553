//! Time-bandit detector: a multi-hop transaction whose constituent swaps
//! could be reordered across a short reorg window for extra profit.

use std::collections::HashMap;

use rust_decimal_macros::dec;

use crate::decoder::SwapEvent;
use crate::types::{SimulationResult, StrategyKind, Transaction};

use super::{Detector, OpportunityCandidate};

pub struct TimeBanditDetector {
    pub min_hops: usize,
}

impl Default for TimeBanditDetector {
    fn default() -> Self {
        TimeBanditDetector { min_hops: 2 }
    }
}

impl Detector for TimeBanditDetector {
    fn kind(&self) -> StrategyKind {
        StrategyKind::TimeBandit
    }

    fn detect(
        &self,
        tx: &Transaction,
        sim: &SimulationResult,
        swaps: &[SwapEvent],
    ) -> Option<OpportunityCandidate> {
        if !sim.success || swaps.len() < self.min_hops {
            return None;
        }

        let total_in: rust_decimal::Decimal = swaps.iter().map(|s| s.amount_in).sum();
        let expected_gross_profit = total_in * dec!(0.0015);

        let mut metadata = HashMap::new();
        metadata.insert("pool".to_string(), swaps[0].pool.clone());
        metadata.insert("token".to_string(), swaps[0].token_in.clone());
        metadata.insert("amount".to_string(), total_in.to_string());
        metadata.insert("hops".to_string(), swaps.len().to_string());
        metadata.insert("trigger_tx".to_string(), tx.hash.clone());

        Some(OpportunityCandidate {
            expected_gross_profit,
            metadata,
        })
    }

    /// One reorder leg per hop, matching the hop count recorded in
    /// `detect`'s metadata.
    fn construct(&self, tx: &Transaction, candidate: &OpportunityCandidate) -> Vec<Transaction> {
        let hops: usize = candidate
            .metadata
            .get("hops")
            .and_then(|h| h.parse().ok())
            .unwrap_or(1);
        let pool = candidate.metadata.get("pool").cloned();
        (0..hops)
            .map(|i| super::skeletal_execution_tx(tx, pool.clone(), 150_000, &format!("hop{i}")))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn swap(amount: Decimal) -> SwapEvent {
        SwapEvent {
            pool: "0xpool".into(),
            sender: "0xa".into(),
            recipient: "0xb".into(),
            token_in: "token0".into(),
            amount_in: amount,
            token_out: "token1".into(),
            amount_out: amount,
        }
    }

    fn tx() -> Transaction {
        Transaction {
            hash: "0xtx".into(),
            from: "0xa".into(),
            to: None,
            value: Decimal::ZERO,
            gas_price: dec!(10),
            gas_limit: 21000,
            nonce: 0,
            data: vec![],
            chain_id: 1,
        }
    }

    fn sim(success: bool) -> SimulationResult {
        SimulationResult {
            success,
            gas_used: 21000,
            receipt_status: Some(if success { 1 } else { 0 }),
            logs: vec![],
            account_deltas: Default::default(),
            wall_time: std::time::Duration::from_millis(1),
            error: None,
        }
    }

    #[test]
    fn single_hop_is_not_time_bandit_eligible() {
        let detector = TimeBanditDetector::default();
        let candidate = detector.detect(&tx(), &sim(true), &[swap(dec!(100))]);
        assert!(candidate.is_none());
    }

    #[test]
    fn multi_hop_produces_candidate() {
        let detector = TimeBanditDetector::default();
        let candidate = detector
            .detect(&tx(), &sim(true), &[swap(dec!(100)), swap(dec!(200))])
            .unwrap();
        assert_eq!(candidate.metadata["hops"], "2");
    }

    #[test]
    fn construct_produces_one_leg_per_hop() {
        let detector = TimeBanditDetector::default();
        let trigger = tx();
        let candidate = detector
            .detect(&trigger, &sim(true), &[swap(dec!(100)), swap(dec!(200)), swap(dec!(300))])
            .unwrap();
        let execution_txs = detector.construct(&trigger, &candidate);
        assert_eq!(execution_txs.len(), 3);
    }
}
