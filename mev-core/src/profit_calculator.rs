//! ProfitCalculator (C8) — gas + slippage + Monte-Carlo risk, threshold
//! gating.
//!
//! Monte-Carlo perturbation uses a per-calculator deterministic
//! `rand::rngs::StdRng` seeded at construction (spec §5: "no cross-thread
//! RNG sharing"). Gaussian multipliers are sampled via Box-Muller — the
//! corpus carries no `rand_distr` dependency, so this stays on the plain
//! `rand` crate already in the workspace rather than introducing a new one.

use std::collections::HashMap;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::calibration::CalibrationSystem;
use crate::config::ProfitCalculatorConfig;
use crate::error::InputError;
use crate::gas_estimator::{GasEstimator, GasPriority};
use crate::slippage_calculator::SlippageCalculator;
use crate::types::{MEVOpportunity, ProfitEstimate, ProfitThreshold, StrategyKind};

pub struct ProfitCalculator {
    config: ProfitCalculatorConfig,
    gas_estimator: std::sync::Arc<GasEstimator>,
    slippage_calculator: std::sync::Arc<SlippageCalculator>,
    calibration: std::sync::Arc<CalibrationSystem>,
    thresholds: parking_lot::RwLock<HashMap<StrategyKind, ProfitThreshold>>,
    rng: Mutex<StdRng>,
}

impl ProfitCalculator {
    pub fn new(
        config: ProfitCalculatorConfig,
        gas_estimator: std::sync::Arc<GasEstimator>,
        slippage_calculator: std::sync::Arc<SlippageCalculator>,
        calibration: std::sync::Arc<CalibrationSystem>,
        seed: u64,
    ) -> Self {
        ProfitCalculator {
            config,
            gas_estimator,
            slippage_calculator,
            calibration,
            thresholds: parking_lot::RwLock::new(HashMap::new()),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    pub fn set_threshold(&self, strategy: StrategyKind, threshold: ProfitThreshold) {
        self.thresholds.write().insert(strategy, threshold);
    }

    pub fn calculate(&self, opportunity: &MEVOpportunity, now_ns: u64) -> Result<ProfitEstimate, InputError> {
        if opportunity.id.is_empty() {
            return Err(InputError::Empty { field: "opportunity.id" });
        }

        let gross = opportunity.expected_gross_profit;

        let gas_price = self.gas_estimator.predict_gas_price(GasPriority::Medium, now_ns);
        let mut gas_cost = Decimal::ZERO;
        for tx in &opportunity.execution_txs {
            let gas_units = self.gas_estimator.estimate_gas(tx).unwrap_or(tx.gas_limit);
            gas_cost += gas_price * Decimal::from(gas_units);
        }

        let slippage_cost = match opportunity.pool_token_amount() {
            Some((pool, token, amount)) => {
                self.slippage_calculator.calculate(pool, token, amount, now_ns).expected
            }
            None => Decimal::ZERO,
        };

        let net = gross - gas_cost - slippage_cost;
        let margin = if gross > Decimal::ZERO { net / gross } else { Decimal::ZERO };

        let (success_probability, risk_score, confidence) =
            self.monte_carlo(gross, gas_cost, slippage_cost);

        let raw_estimate = ProfitEstimate {
            gross,
            gas_cost,
            slippage_cost,
            net,
            margin,
            success_probability,
            risk_score,
            confidence,
        };

        let estimate = if self.config.use_calibration {
            self.calibration.apply(opportunity.strategy, &raw_estimate)
        } else {
            raw_estimate
        };

        Ok(estimate)
    }

    /// Perturbs gas, slippage, and price by independent Gaussian
    /// multipliers with strategy-wide variances, floored at sensible
    /// bounds. Counts iterations with `net > 0` (success probability) and
    /// `net < -0.1 * gross` (risk score). Confidence decreases with the
    /// sampled variance relative to gross.
    fn monte_carlo(&self, gross: Decimal, gas_cost: Decimal, slippage_cost: Decimal) -> (f64, f64, f64) {
        let gross_f = gross.to_f64().unwrap_or(0.0);
        let gas_f = gas_cost.to_f64().unwrap_or(0.0);
        let slippage_f = slippage_cost.to_f64().unwrap_or(0.0);

        let iterations = self.config.monte_carlo_iterations;
        let mut rng = self.rng.lock();

        let mut successes = 0usize;
        let mut risky = 0usize;
        let mut nets = Vec::with_capacity(iterations);

        for _ in 0..iterations {
            let gas_mult = (1.0 + sample_gaussian(&mut rng) * self.config.gas_variance).max(0.5);
            let slippage_mult = (1.0 + sample_gaussian(&mut rng) * self.config.slippage_variance).max(0.0);
            let price_mult = (1.0 + sample_gaussian(&mut rng) * self.config.price_variance).max(0.1);

            let perturbed_gross = gross_f * price_mult;
            let perturbed_gas = gas_f * gas_mult;
            let perturbed_slippage = slippage_f * slippage_mult;
            let net = perturbed_gross - perturbed_gas - perturbed_slippage;

            if net > 0.0 {
                successes += 1;
            }
            if net < -0.1 * gross_f {
                risky += 1;
            }
            nets.push(net);
        }

        let success_probability = successes as f64 / iterations as f64;
        let risk_score = risky as f64 / iterations as f64;

        let mean_net = nets.iter().sum::<f64>() / iterations as f64;
        let variance_net = nets.iter().map(|n| (n - mean_net).powi(2)).sum::<f64>() / iterations as f64;
        let confidence = if gross_f > 0.0 {
            (1.0 - variance_net / gross_f).max(0.0)
        } else {
            0.0
        };

        (success_probability, risk_score, confidence)
    }

    /// Returns true iff all four threshold criteria for the opportunity's
    /// strategy are satisfied.
    pub fn validate(&self, opportunity: &MEVOpportunity, estimate: &ProfitEstimate) -> bool {
        let thresholds = self.thresholds.read();
        let threshold = thresholds
            .get(&opportunity.strategy)
            .copied()
            .unwrap_or_default();

        estimate.net >= threshold.min_net_profit
            && estimate.margin >= threshold.min_margin
            && estimate.success_probability >= threshold.min_success_probability
            && estimate.risk_score <= threshold.max_risk_score
    }
}

/// Standard normal sample via Box-Muller.
fn sample_gaussian(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen_range(1e-12..1.0);
    let u2: f64 = rng.gen_range(0.0..1.0);
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CalibrationConfig, GasEstimatorConfig, SlippageCalculatorConfig};
    use crate::types::OpportunityStatus;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn make_calculator(seed: u64) -> ProfitCalculator {
        ProfitCalculator::new(
            ProfitCalculatorConfig {
                monte_carlo_iterations: 200,
                ..ProfitCalculatorConfig::default()
            },
            Arc::new(GasEstimator::new(GasEstimatorConfig::default())),
            Arc::new(SlippageCalculator::new(SlippageCalculatorConfig::default(), 100)),
            Arc::new(CalibrationSystem::new(CalibrationConfig::default())),
            seed,
        )
    }

    fn make_opportunity(gross: Decimal) -> MEVOpportunity {
        MEVOpportunity {
            id: "opp-1".into(),
            strategy: StrategyKind::Backrun,
            target_tx_hash: "0xabc".into(),
            expected_gross_profit: gross,
            estimated_gas_cost: Decimal::ZERO,
            net_profit: Decimal::ZERO,
            confidence: 0.0,
            status: OpportunityStatus::Detected,
            execution_txs: vec![],
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn net_equals_gross_minus_gas_minus_slippage() {
        let calc = make_calculator(1);
        let opportunity = make_opportunity(dec!(1000));
        let estimate = calc.calculate(&opportunity, 0).unwrap();
        assert_eq!(estimate.net, estimate.gross - estimate.gas_cost - estimate.slippage_cost);
    }

    #[test]
    fn zero_gross_yields_zero_margin_not_nan() {
        let calc = make_calculator(1);
        let opportunity = make_opportunity(Decimal::ZERO);
        let estimate = calc.calculate(&opportunity, 0).unwrap();
        assert_eq!(estimate.margin, Decimal::ZERO);
    }

    #[test]
    fn rejects_empty_opportunity_id() {
        let calc = make_calculator(1);
        let mut opportunity = make_opportunity(dec!(100));
        opportunity.id.clear();
        assert!(matches!(calc.calculate(&opportunity, 0), Err(InputError::Empty { .. })));
    }

    #[test]
    fn deterministic_seed_reproduces_estimate() {
        let calc_a = make_calculator(42);
        let calc_b = make_calculator(42);
        let opportunity = make_opportunity(dec!(500));
        let a = calc_a.calculate(&opportunity, 0).unwrap();
        let b = calc_b.calculate(&opportunity, 0).unwrap();
        assert_eq!(a.success_probability, b.success_probability);
        assert_eq!(a.risk_score, b.risk_score);
    }

    #[test]
    fn validate_requires_all_four_criteria() {
        let calc = make_calculator(1);
        calc.set_threshold(
            StrategyKind::Backrun,
            ProfitThreshold {
                min_net_profit: dec!(10000),
                min_margin: dec!(0.5),
                min_success_probability: 0.99,
                max_risk_score: 0.01,
            },
        );
        let opportunity = make_opportunity(dec!(100));
        let estimate = calc.calculate(&opportunity, 0).unwrap();
        assert!(!calc.validate(&opportunity, &estimate));
    }
}
