//! Sandwich detector: a large pending swap that can be front-run and
//! back-run around to capture the price impact it creates.

use std::collections::HashMap;

use rust_decimal_macros::dec;

use crate::decoder::SwapEvent;
use crate::types::{SimulationResult, Transaction};

use super::{Detector, OpportunityCandidate};

pub struct SandwichDetector {
    pub min_amount_in: rust_decimal::Decimal,
}

impl Default for SandwichDetector {
    fn default() -> Self {
        SandwichDetector { min_amount_in: dec!(1000) }
    }
}

impl Detector for SandwichDetector {
    fn kind(&self) -> crate::types::StrategyKind {
        crate::types::StrategyKind::Sandwich
    }

    fn detect(
        &self,
        tx: &Transaction,
        _sim: &SimulationResult,
        swaps: &[SwapEvent],
    ) -> Option<OpportunityCandidate> {
        let target = swaps
            .iter()
            .find(|s| s.amount_in >= self.min_amount_in)?;

        // Estimated gross profit for a sandwich is proportional to the
        // victim's swap size; this is a conservative linear placeholder —
        // the real model is the pool's constant-product curve, which lives
        // behind the opaque decoder interface per spec §1.
        let expected_gross_profit = target.amount_in * dec!(0.003);

        let mut metadata = HashMap::new();
        metadata.insert("pool".to_string(), target.pool.clone());
        metadata.insert("token".to_string(), target.token_in.clone());
        metadata.insert("amount".to_string(), target.amount_in.to_string());
        metadata.insert("victim_tx".to_string(), tx.hash.clone());

        Some(OpportunityCandidate {
            expected_gross_profit,
            metadata,
        })
    }

    /// A sandwich needs two legs: a front-run buy ahead of the victim and
    /// a back-run sell after it, both against the same pool.
    fn construct(&self, tx: &Transaction, candidate: &OpportunityCandidate) -> Vec<Transaction> {
        let pool = candidate.metadata.get("pool").cloned();
        vec![
            super::skeletal_execution_tx(tx, pool.clone(), 150_000, "front"),
            super::skeletal_execution_tx(tx, pool, 150_000, "back"),
        ]
    }
}
