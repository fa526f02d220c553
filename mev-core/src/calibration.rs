//! CalibrationSystem (C11) — online recalibration of cost/probability
//! models from realized outcomes.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::config::CalibrationConfig;
use crate::types::{HistoricalResult, ProfitEstimate, StrategyKind};

#[derive(Debug, Clone, Copy, Default)]
pub struct CalibratedMultipliers {
    pub gas_multiplier: f64,
    pub slippage_multiplier: f64,
    pub success_rate: f64,
    pub profit_accuracy: f64,
}

impl CalibratedMultipliers {
    fn identity() -> Self {
        CalibratedMultipliers {
            gas_multiplier: 1.0,
            slippage_multiplier: 1.0,
            success_rate: 1.0,
            profit_accuracy: 1.0,
        }
    }
}

struct StrategyHistory {
    results: VecDeque<HistoricalResult>,
    last_calibrated_ns: Option<u64>,
    multipliers: CalibratedMultipliers,
}

pub struct CalibrationSystem {
    config: CalibrationConfig,
    per_strategy: RwLock<HashMap<StrategyKind, StrategyHistory>>,
}

impl CalibrationSystem {
    pub fn new(config: CalibrationConfig) -> Self {
        CalibrationSystem {
            config,
            per_strategy: RwLock::new(HashMap::new()),
        }
    }

    pub fn add_historical_result(&self, result: HistoricalResult) {
        let mut per_strategy = self.per_strategy.write();
        let history = per_strategy
            .entry(result.strategy)
            .or_insert_with(|| StrategyHistory {
                results: VecDeque::new(),
                last_calibrated_ns: None,
                multipliers: CalibratedMultipliers::identity(),
            });
        if history.results.len() == self.config.window {
            history.results.pop_front();
        }
        history.results.push_back(result);
    }

    /// Runs no more often than `recalibration_period`, requires at least
    /// `min_sample_size` results within the rolling window. Rejects
    /// outliers with `|z| > outlier_threshold`, then fits per-strategy
    /// multipliers.
    pub fn calibrate(&self, strategy: StrategyKind, now_ns: u64) -> Option<CalibratedMultipliers> {
        let mut per_strategy = self.per_strategy.write();
        let history = per_strategy.get_mut(&strategy)?;

        if let Some(last) = history.last_calibrated_ns {
            if Duration::from_nanos(now_ns.saturating_sub(last)) < self.config.recalibration_period {
                return Some(history.multipliers);
            }
        }
        if history.results.len() < self.config.min_sample_size {
            return Some(history.multipliers);
        }

        let filtered = reject_outliers(&history.results, self.config.outlier_threshold);
        if filtered.is_empty() {
            return Some(history.multipliers);
        }

        let n = filtered.len() as f64;
        let gas_ratios: Vec<f64> = filtered
            .iter()
            .filter_map(|r| ratio(r.gas, r.predicted))
            .collect();
        let slippage_ratios: Vec<f64> = filtered
            .iter()
            .filter_map(|r| ratio(r.slippage, r.predicted))
            .collect();
        let success_rate = filtered.iter().filter(|r| r.success).count() as f64 / n;
        let profit_accuracy = 1.0
            - filtered
                .iter()
                .map(|r| {
                    let predicted = r.predicted.to_f64().unwrap_or(0.0);
                    let actual = r.actual.to_f64().unwrap_or(0.0);
                    if predicted.abs() < 1e-9 {
                        0.0
                    } else {
                        ((predicted - actual) / predicted).abs()
                    }
                })
                .sum::<f64>()
                / n;

        let multipliers = CalibratedMultipliers {
            gas_multiplier: mean(&gas_ratios).unwrap_or(1.0),
            slippage_multiplier: mean(&slippage_ratios).unwrap_or(1.0),
            success_rate,
            profit_accuracy: profit_accuracy.clamp(0.0, 1.0),
        };

        history.multipliers = multipliers;
        history.last_calibrated_ns = Some(now_ns);
        Some(multipliers)
    }

    /// Scales a `ProfitEstimate`'s costs by the calibrated multipliers,
    /// overrides success probability with the observed success rate, and
    /// updates confidence to the fitted accuracy; net profit is recomputed.
    pub fn apply(&self, strategy: StrategyKind, estimate: &ProfitEstimate) -> ProfitEstimate {
        let multipliers = self
            .per_strategy
            .read()
            .get(&strategy)
            .map(|h| h.multipliers)
            .unwrap_or_else(CalibratedMultipliers::identity);

        let gas_mult = Decimal::try_from(multipliers.gas_multiplier).unwrap_or(Decimal::ONE);
        let slip_mult = Decimal::try_from(multipliers.slippage_multiplier).unwrap_or(Decimal::ONE);

        let gas_cost = estimate.gas_cost * gas_mult;
        let slippage_cost = estimate.slippage_cost * slip_mult;
        let net = estimate.gross - gas_cost - slippage_cost;
        let margin = if estimate.gross > Decimal::ZERO {
            net / estimate.gross
        } else {
            Decimal::ZERO
        };

        ProfitEstimate {
            gross: estimate.gross,
            gas_cost,
            slippage_cost,
            net,
            margin,
            success_probability: multipliers.success_rate,
            risk_score: estimate.risk_score,
            confidence: multipliers.profit_accuracy,
        }
    }
}

fn ratio(actual: Decimal, predicted: Decimal) -> Option<f64> {
    if predicted.is_zero() {
        return None;
    }
    (actual / predicted).to_f64()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

fn reject_outliers(results: &VecDeque<HistoricalResult>, z_threshold: f64) -> Vec<&HistoricalResult> {
    let values: Vec<f64> = results
        .iter()
        .filter_map(|r| r.actual.to_f64())
        .collect();
    if values.is_empty() {
        return Vec::new();
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    let stddev = variance.sqrt();

    if stddev < 1e-9 {
        return results.iter().collect();
    }

    results
        .iter()
        .filter(|r| {
            let actual = r.actual.to_f64().unwrap_or(mean);
            ((actual - mean) / stddev).abs() <= z_threshold
        })
        .collect()
}
