//! GasEstimator (C9) — current/predicted gas price, per-strategy gas-use
//! EMA.
//!
//! Folds in `gas_price::GasPriceFetcher`'s caching/freshness-window idiom
//! (a `RwLock<Option<GasPriceCache>>` refreshed on read, falling back to a
//! base price when stale) generalized to the spec's priority-multiplier and
//! per-strategy EMA requirements.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::GasEstimatorConfig;
use crate::error::InputError;
use crate::types::{StrategyKind, Transaction};
use crate::log_error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GasPriority {
    Low,
    Medium,
    High,
    Urgent,
}

impl GasPriority {
    fn multiplier(self) -> Decimal {
        match self {
            GasPriority::Low => dec!(0.9),
            GasPriority::Medium => dec!(1.1),
            GasPriority::High => dec!(1.3),
            GasPriority::Urgent => dec!(1.5),
        }
    }
}

struct GasPriceCache {
    price_gwei: Decimal,
    fetched_at_ns: u64,
}

pub struct GasEstimator {
    config: GasEstimatorConfig,
    cache: RwLock<Option<GasPriceCache>>,
    strategy_gas_ema: RwLock<HashMap<StrategyKind, Decimal>>,
}

impl GasEstimator {
    pub fn new(config: GasEstimatorConfig) -> Self {
        GasEstimator {
            config,
            cache: RwLock::new(None),
            strategy_gas_ema: RwLock::new(HashMap::new()),
        }
    }

    /// A static per-tx gas estimate. Real estimation would call
    /// `eth_estimateGas` against a Fork; here it floors at the transaction's
    /// declared gas limit observed so far via the strategy EMA when present.
    pub fn estimate_gas(&self, tx: &Transaction) -> Result<u64, InputError> {
        if tx.hash.is_empty() {
            return Err(InputError::NilTransaction { op: "estimate_gas" });
        }
        Ok(tx.gas_limit)
    }

    /// Sum of per-tx estimates plus a flat overhead percentage.
    pub fn estimate_batch_gas(&self, txs: &[Transaction]) -> Result<u64, InputError> {
        if txs.is_empty() {
            return Err(InputError::Empty { field: "txs" });
        }
        let sum: u64 = txs
            .iter()
            .map(|tx| self.estimate_gas(tx))
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .sum();
        let overhead = (sum as f64 * self.config.batch_overhead_pct).round() as u64;
        Ok(sum + overhead)
    }

    /// Current gas price in gwei. Falls back to the configured base when
    /// the cached sample is older than `price_freshness_window`.
    pub fn current_gas_price(&self, now_ns: u64) -> Decimal {
        let cache = self.cache.read();
        match cache.as_ref() {
            Some(entry) => {
                let age_ns = now_ns.saturating_sub(entry.fetched_at_ns);
                if Duration::from_nanos(age_ns) <= self.config.price_freshness_window {
                    entry.price_gwei
                } else {
                    log_error!("gas price cache stale ({age_ns}ns), falling back to base");
                    Decimal::try_from(self.config.base_gas_price_gwei).unwrap_or(Decimal::ZERO)
                }
            }
            None => Decimal::try_from(self.config.base_gas_price_gwei).unwrap_or(Decimal::ZERO),
        }
    }

    /// Records a freshly observed gas price sample.
    pub fn record_gas_price(&self, price_gwei: Decimal, now_ns: u64) {
        *self.cache.write() = Some(GasPriceCache { price_gwei, fetched_at_ns: now_ns });
    }

    pub fn predict_gas_price(&self, priority: GasPriority, now_ns: u64) -> Decimal {
        self.current_gas_price(now_ns) * priority.multiplier()
    }

    /// Updates the per-strategy gas-use EMA (`α = ema_alpha`) from an
    /// observed actual usage.
    pub fn record_actual_usage(&self, strategy: StrategyKind, actual_gas_used: Decimal) {
        let mut ema = self.strategy_gas_ema.write();
        let alpha = Decimal::try_from(self.config.ema_alpha).unwrap_or(dec!(0.1));
        ema.entry(strategy)
            .and_modify(|current| {
                *current = alpha * actual_gas_used + (Decimal::ONE - alpha) * *current;
            })
            .or_insert(actual_gas_used);
    }

    pub fn strategy_gas_baseline(&self, strategy: StrategyKind) -> Option<Decimal> {
        self.strategy_gas_ema.read().get(&strategy).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tx() -> Transaction {
        Transaction {
            hash: "0x1".into(),
            from: "0xa".into(),
            to: None,
            value: dec!(0),
            gas_price: dec!(20),
            gas_limit: 100_000,
            nonce: 0,
            data: vec![],
            chain_id: 1,
        }
    }

    #[test]
    fn estimate_gas_rejects_nil_transaction() {
        let estimator = GasEstimator::new(GasEstimatorConfig::default());
        let mut tx = sample_tx();
        tx.hash.clear();
        assert!(matches!(
            estimator.estimate_gas(&tx),
            Err(InputError::NilTransaction { .. })
        ));
    }

    #[test]
    fn batch_gas_includes_overhead() {
        let estimator = GasEstimator::new(GasEstimatorConfig::default());
        let txs = vec![sample_tx(), sample_tx()];
        let total = estimator.estimate_batch_gas(&txs).unwrap();
        assert!(total > 200_000);
    }

    #[test]
    fn predicted_price_applies_priority_multiplier() {
        let estimator = GasEstimator::new(GasEstimatorConfig::default());
        estimator.record_gas_price(dec!(30), 1_000_000_000);
        let predicted = estimator.predict_gas_price(GasPriority::Urgent, 1_000_000_000);
        assert_eq!(predicted, dec!(45.0));
    }

    #[test]
    fn stale_cache_falls_back_to_base() {
        let mut config = GasEstimatorConfig::default();
        config.price_freshness_window = Duration::from_secs(1);
        let estimator = GasEstimator::new(config);
        estimator.record_gas_price(dec!(100), 0);
        let price = estimator.current_gas_price(5_000_000_000); // 5s later
        assert_eq!(price, Decimal::try_from(30.0).unwrap());
    }

    #[test]
    fn ema_converges_toward_observations() {
        let estimator = GasEstimator::new(GasEstimatorConfig::default());
        estimator.record_actual_usage(StrategyKind::Backrun, dec!(100000));
        estimator.record_actual_usage(StrategyKind::Backrun, dec!(200000));
        let baseline = estimator.strategy_gas_baseline(StrategyKind::Backrun).unwrap();
        assert!(baseline > dec!(100000) && baseline < dec!(200000));
    }
}
