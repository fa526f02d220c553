//! Frontrun detector: replicates the target's trade ahead of it to capture
//! the price move before the victim's transaction lands.

use std::collections::HashMap;

use rust_decimal_macros::dec;

use crate::decoder::SwapEvent;
use crate::types::{SimulationResult, StrategyKind, Transaction};

use super::{Detector, OpportunityCandidate};

pub struct FrontrunDetector {
    pub min_amount_in: rust_decimal::Decimal,
}

impl Default for FrontrunDetector {
    fn default() -> Self {
        FrontrunDetector { min_amount_in: dec!(2000) }
    }
}

impl Detector for FrontrunDetector {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Frontrun
    }

    fn detect(
        &self,
        tx: &Transaction,
        _sim: &SimulationResult,
        swaps: &[SwapEvent],
    ) -> Option<OpportunityCandidate> {
        let swap = swaps.iter().find(|s| s.amount_in >= self.min_amount_in)?;

        // Only a standing gas-price advantage makes frontrunning viable;
        // absent a faster replacement bid, skip.
        if tx.gas_price <= rust_decimal::Decimal::ZERO {
            return None;
        }

        let expected_gross_profit = swap.amount_in * dec!(0.002);

        let mut metadata = HashMap::new();
        metadata.insert("pool".to_string(), swap.pool.clone());
        metadata.insert("token".to_string(), swap.token_in.clone());
        metadata.insert("amount".to_string(), swap.amount_in.to_string());
        metadata.insert("target_tx".to_string(), tx.hash.clone());

        Some(OpportunityCandidate {
            expected_gross_profit,
            metadata,
        })
    }

    fn construct(&self, tx: &Transaction, candidate: &OpportunityCandidate) -> Vec<Transaction> {
        vec![super::skeletal_execution_tx(tx, candidate.metadata.get("pool").cloned(), 150_000, "frontrun")]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    #[test]
    fn requires_minimum_swap_size() {
        let detector = FrontrunDetector::default();
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
            amount_in: dec!(100),
            token_out: "token1".into(),
            amount_out: dec!(99),
        };
        assert!(detector.detect(&tx, &sim, &[swap]).is_none());
    }

    #[test]
    fn construct_produces_one_leg_against_the_pool() {
        let detector = FrontrunDetector::default();
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
            amount_in: dec!(5000),
            token_out: "token1".into(),
            amount_out: dec!(4990),
        };
        let candidate = detector.detect(&tx, &sim, &[swap]).unwrap();
        let execution_txs = detector.construct(&tx, &candidate);
        assert_eq!(execution_txs.len(), 1);
        assert_eq!(execution_txs[0].to.as_deref(), Some("0xpool"));
    }
}
