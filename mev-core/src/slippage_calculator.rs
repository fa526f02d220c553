//! SlippageCalculator (C10) — calibrated price-impact model per
//! pool-token.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use parking_lot::RwLock;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::config::SlippageCalculatorConfig;

#[derive(Debug, Clone, Copy)]
struct Sample {
    amount: Decimal,
    slippage: f64,
    timestamp_ns: u64,
}

#[derive(Debug, Clone, Copy)]
struct ImpactModel {
    alpha: f64,
    beta: f64,
    gamma: f64,
    liquidity: f64,
    calibrated_at_ns: u64,
}

struct PoolTokenHistory {
    samples: VecDeque<Sample>,
    model: Option<ImpactModel>,
}

#[derive(Debug, Clone, Copy)]
pub struct SlippageEstimate {
    pub expected: Decimal,
    pub max: Decimal,
    pub impact: f64,
    pub confidence: f64,
}

pub struct SlippageCalculator {
    config: SlippageCalculatorConfig,
    histories: RwLock<HashMap<(String, String), PoolTokenHistory>>,
    max_history: usize,
}

impl SlippageCalculator {
    pub fn new(config: SlippageCalculatorConfig, max_history: usize) -> Self {
        SlippageCalculator {
            config,
            histories: RwLock::new(HashMap::new()),
            max_history,
        }
    }

    /// If a model calibrated within `model_freshness_window` exists, use
    /// it; otherwise a default rule scales `base_rate` by
    /// `sqrt(size / reference_size)`.
    pub fn calculate(&self, pool: &str, token: &str, amount: Decimal, now_ns: u64) -> SlippageEstimate {
        let key = (pool.to_string(), token.to_string());
        let histories = self.histories.read();
        let history = histories.get(&key);

        let (impact, confidence) = match history.and_then(|h| h.model) {
            Some(model)
                if Duration::from_nanos(now_ns.saturating_sub(model.calibrated_at_ns))
                    <= self.config.model_freshness_window =>
            {
                let amount_f = amount.to_f64().unwrap_or(0.0);
                let raw = model.alpha
                    * (amount_f / model.liquidity.max(1e-9)).powf(model.beta)
                    * model.liquidity.powf(-model.gamma);
                (raw.min(self.config.impact_cap).max(0.0), 0.9)
            }
            _ => {
                let amount_f = amount.to_f64().unwrap_or(0.0);
                let reference = self.config.reference_size.to_f64().unwrap_or(1.0).max(1e-9);
                let raw = self.config.base_rate * (amount_f / reference).max(0.0).sqrt();
                (raw.min(self.config.impact_cap).max(0.0), 0.5)
            }
        };

        let expected = amount * Decimal::try_from(impact).unwrap_or(Decimal::ZERO);
        SlippageEstimate {
            expected,
            max: expected * dec!(1.5),
            impact,
            confidence,
        }
    }

    /// Appends a realized sample and recalibrates the impact model once at
    /// least `min_samples_for_model` samples exist.
    pub fn update(&self, pool: &str, token: &str, amount: Decimal, actual_slippage: f64, now_ns: u64) {
        let key = (pool.to_string(), token.to_string());
        let mut histories = self.histories.write();
        let entry = histories.entry(key).or_insert_with(|| PoolTokenHistory {
            samples: VecDeque::new(),
            model: None,
        });

        if entry.samples.len() == self.max_history {
            entry.samples.pop_front();
        }
        entry.samples.push_back(Sample { amount, slippage: actual_slippage, timestamp_ns: now_ns });

        if entry.samples.len() >= self.config.min_samples_for_model {
            entry.model = Some(fit_impact_model(&entry.samples, now_ns));
        }
    }
}

/// Least-squares-free heuristic fit: liquidity is approximated from the
/// largest observed amount relative to its slippage; alpha/beta/gamma are
/// derived from the sample mean and spread. This is intentionally simple —
/// a production model would regress log(slippage) against log(amount).
fn fit_impact_model(samples: &VecDeque<Sample>, now_ns: u64) -> ImpactModel {
    let n = samples.len() as f64;
    let mean_amount: f64 = samples.iter().map(|s| s.amount.to_f64().unwrap_or(0.0)).sum::<f64>() / n;
    let mean_slippage: f64 = samples.iter().map(|s| s.slippage).sum::<f64>() / n;
    let liquidity = (mean_amount / mean_slippage.max(1e-6)).max(1.0);

    ImpactModel {
        alpha: mean_slippage.max(1e-6),
        beta: 1.0,
        gamma: 0.0,
        liquidity,
        calibrated_at_ns: now_ns,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_rule_scales_with_sqrt_of_size() {
        let calc = SlippageCalculator::new(SlippageCalculatorConfig::default(), 100);
        let small = calc.calculate("pool", "token", dec!(1000), 0);
        let large = calc.calculate("pool", "token", dec!(4000), 0);
        assert!(large.impact > small.impact);
    }

    #[test]
    fn impact_is_capped() {
        let calc = SlippageCalculator::new(SlippageCalculatorConfig::default(), 100);
        let huge = calc.calculate("pool", "token", dec!(100_000_000), 0);
        assert!(huge.impact <= 0.5);
    }

    #[test]
    fn recalibrates_after_min_samples() {
        let mut config = SlippageCalculatorConfig::default();
        config.min_samples_for_model = 3;
        let calc = SlippageCalculator::new(config, 100);
        for i in 0..3 {
            calc.update("pool", "token", dec!(1000), 0.01, i as u64);
        }
        let estimate = calc.calculate("pool", "token", dec!(1000), 3);
        assert!(estimate.confidence > 0.5, "should use calibrated model now");
    }

    #[test]
    fn stale_model_falls_back_to_default_rule() {
        let mut config = SlippageCalculatorConfig::default();
        config.min_samples_for_model = 2;
        config.model_freshness_window = Duration::from_secs(1);
        let calc = SlippageCalculator::new(config, 100);
        calc.update("pool", "token", dec!(1000), 0.01, 0);
        calc.update("pool", "token", dec!(1000), 0.01, 1);
        let far_future_ns = 10_000_000_000; // 10s later
        let estimate = calc.calculate("pool", "token", dec!(1000), far_future_ns);
        assert_eq!(estimate.confidence, 0.5);
    }
}
