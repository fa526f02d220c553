//! Backrun detector: places a transaction immediately after the target to
//! capture a state change it created (e.g. arbitraging a price move).

use std::collections::HashMap;

use rust_decimal_macros::dec;

use crate::decoder::SwapEvent;
use crate::types::{SimulationResult, StrategyKind, Transaction};

use super::{Detector, OpportunityCandidate};

pub struct BackrunDetector {
    pub min_price_impact: rust_decimal::Decimal,
}

impl Default for BackrunDetector {
    fn default() -> Self {
        BackrunDetector { min_price_impact: dec!(500) }
    }
}

impl Detector for BackrunDetector {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Backrun
    }

    fn detect(
        &self,
        tx: &Transaction,
        sim: &SimulationResult,
        swaps: &[SwapEvent],
    ) -> Option<OpportunityCandidate> {
        if !sim.success {
            return None;
        }
        let swap = swaps
            .iter()
            .find(|s| s.amount_out >= self.min_price_impact)?;

        let expected_gross_profit = swap.amount_out * dec!(0.001);

        let mut metadata = HashMap::new();
        metadata.insert("pool".to_string(), swap.pool.clone());
        metadata.insert("token".to_string(), swap.token_out.clone());
        metadata.insert("amount".to_string(), swap.amount_out.to_string());
        metadata.insert("trigger_tx".to_string(), tx.hash.clone());

        Some(OpportunityCandidate {
            expected_gross_profit,
            metadata,
        })
    }

    fn construct(&self, tx: &Transaction, candidate: &OpportunityCandidate) -> Vec<Transaction> {
        vec![super::skeletal_execution_tx(tx, candidate.metadata.get("pool").cloned(), 150_000, "backrun")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn failed_simulation_is_never_backrun() {
        let detector = BackrunDetector::default();
        let tx = Transaction {
            hash: "0xtx".into(),
            from: "0xa".into(),
            to: None,
            value: Decimal::ZERO,
            gas_price: dec!(10),
            gas_limit: 21000,
            nonce: 0,
            data: vec![],
            chain_id: 1,
        };
        let sim = SimulationResult {
            success: false,
            gas_used: 0,
            receipt_status: Some(0),
            logs: vec![],
            account_deltas: Default::default(),
            wall_time: std::time::Duration::from_millis(1),
            error: Some("reverted".into()),
        };
        let swap = SwapEvent {
            pool: "0xpool".into(),
            sender: "0xa".into(),
            recipient: "0xb".into(),
            token_in: "token0".into(),
            amount_in: dec!(1000),
            token_out: "token1".into(),
            amount_out: dec!(900),
        };
        assert!(detector.detect(&tx, &sim, &[swap]).is_none());
    }

    #[test]
    fn construct_targets_the_detected_pool() {
        let detector = BackrunDetector::default();
        let tx = Transaction {
            hash: "0xtx".into(),
            from: "0xa".into(),
            to: None,
            value: Decimal::ZERO,
            gas_price: dec!(10),
            gas_limit: 21000,
            nonce: 0,
            data: vec![],
            chain_id: 1,
        };
        let sim = SimulationResult {
            success: true,
            gas_used: 21000,
            receipt_status: Some(1),
            logs: vec![],
            account_deltas: Default::default(),
            wall_time: std::time::Duration::from_millis(1),
            error: None,
        };
        let swap = SwapEvent {
            pool: "0xpool".into(),
            sender: "0xa".into(),
            recipient: "0xb".into(),
            token_in: "token0".into(),
            amount_in: dec!(1000),
            token_out: "token1".into(),
            amount_out: dec!(900),
        };
        let candidate = detector.detect(&tx, &sim, &[swap]).unwrap();
        let execution_txs = detector.construct(&tx, &candidate);
        assert_eq!(execution_txs.len(), 1);
        assert_eq!(execution_txs[0].to.as_deref(), Some("0xpool"));
    }
}
