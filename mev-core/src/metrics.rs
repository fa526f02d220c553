//! MetricsCollector (C12) — rolling-window trade/latency/opportunity
//! stats.
//!
//! Maintains three bounded FIFO histories: trades, latencies-per-operation
//! (delegated to `LatencyMonitor`), and opportunities. A trade counts as
//! profitable iff `success ∧ net_profit > 0` — no partial classification.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::RwLock;
use prometheus::{Encoder, Gauge, Opts, Registry, TextEncoder};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::latency_monitor::{LatencyMonitor, OperationMetrics};
use crate::types::{MEVOpportunity, ProfitabilityMetrics, TradeResult};

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemHealth {
    pub warning_mode: bool,
    pub shutdown_pending: bool,
    pub is_healthy: bool,
}

pub struct MetricsCollector {
    trades: RwLock<VecDeque<TradeResult>>,
    opportunities: RwLock<VecDeque<MEVOpportunity>>,
    max_trades: usize,
    max_opportunities: usize,
    window_sizes: Vec<usize>,
    latency: LatencyMonitor,
}

impl MetricsCollector {
    pub fn new(max_trades: usize, max_latencies: usize, max_opportunities: usize, window_sizes: Vec<usize>) -> Self {
        MetricsCollector {
            trades: RwLock::new(VecDeque::with_capacity(max_trades)),
            opportunities: RwLock::new(VecDeque::with_capacity(max_opportunities)),
            max_trades,
            max_opportunities,
            window_sizes,
            latency: LatencyMonitor::new(max_latencies),
        }
    }

    pub fn record_trade(&self, trade: TradeResult) {
        let mut trades = self.trades.write();
        if trades.len() == self.max_trades {
            trades.pop_front();
        }
        trades.push_back(trade);
    }

    pub fn record_latency(&self, op: &str, timestamp_ns: u64, duration: Duration) {
        self.latency.record(op, timestamp_ns, duration);
    }

    pub fn record_opportunity(&self, opportunity: MEVOpportunity) {
        let mut opportunities = self.opportunities.write();
        if opportunities.len() == self.max_opportunities {
            opportunities.pop_front();
        }
        opportunities.push_back(opportunity);
    }

    /// Profitability over the last `window` trades; if fewer exist, uses
    /// all. Success rate over zero trades is 0, not a division error.
    pub fn get_profitability(&self, window: usize, now_ns: u64) -> ProfitabilityMetrics {
        let trades = self.trades.read();
        let total_len = trades.len();
        let effective_window = window.min(total_len);
        let slice: Vec<&TradeResult> = trades.iter().rev().take(effective_window).collect();

        if slice.is_empty() {
            return ProfitabilityMetrics {
                window,
                last_updated_ns: now_ns,
                ..Default::default()
            };
        }

        let profitable_count = slice.iter().filter(|t| t.is_profitable()).count();
        let loss_count = slice.len() - profitable_count;
        let success_rate = profitable_count as f64 / slice.len() as f64;
        let loss_rate = loss_count as f64 / slice.len() as f64;

        let total_profit: Decimal = slice
            .iter()
            .filter(|t| t.net_profit > Decimal::ZERO)
            .map(|t| t.net_profit)
            .sum();
        let total_loss: Decimal = slice
            .iter()
            .filter(|t| t.net_profit < Decimal::ZERO)
            .map(|t| -t.net_profit)
            .sum();
        let net: Decimal = slice.iter().map(|t| t.net_profit).sum();
        let max_profit = slice.iter().map(|t| t.net_profit).max().unwrap_or(Decimal::ZERO);
        let avg_profit = net / Decimal::from(slice.len());
        let margin_base: Decimal = slice.iter().map(|t| t.expected_profit).sum();
        let margin = if margin_base > Decimal::ZERO { net / margin_base } else { Decimal::ZERO };

        let mut sorted_profits: Vec<Decimal> = slice.iter().map(|t| t.net_profit).collect();
        sorted_profits.sort();
        let median_profit = median(&sorted_profits);

        ProfitabilityMetrics {
            window,
            total: slice.len(),
            profitable_count,
            loss_count,
            success_rate,
            loss_rate,
            total_profit,
            max_profit,
            avg_profit,
            median_profit,
            total_loss,
            net,
            margin,
            last_updated_ns: now_ns,
        }
    }

    pub fn get_success_rate(&self, window: usize, now_ns: u64) -> f64 {
        self.get_profitability(window, now_ns).success_rate
    }

    pub fn get_latency(&self, op: &str) -> OperationMetrics {
        let metrics = self.latency.get_metrics();
        metrics.get(op).copied().unwrap_or(OperationMetrics {
            avg: Duration::ZERO,
            p95: Duration::ZERO,
            p99: Duration::ZERO,
            sample_count: 0,
        })
    }

    /// Profitability for every configured window and latency metrics for
    /// each known operation.
    pub fn get_performance(&self, now_ns: u64) -> Vec<ProfitabilityMetrics> {
        self.window_sizes
            .iter()
            .map(|w| self.get_profitability(*w, now_ns))
            .collect()
    }

    pub fn trade_count(&self) -> usize {
        self.trades.read().len()
    }

    pub fn opportunity_count(&self) -> usize {
        self.opportunities.read().len()
    }

    /// `warning_mode = loss_rate(W=100) > 0.70 ∧ |history| ≥ 100`;
    /// `shutdown_pending = loss_rate(W=50) > 0.80 ∧ |history| ≥ 50`;
    /// `is_healthy = ¬warning_mode ∧ ¬shutdown_pending`.
    pub fn get_system_health(&self, now_ns: u64) -> SystemHealth {
        let history_len = self.trade_count();
        let warning_mode = history_len >= 100 && self.get_profitability(100, now_ns).loss_rate > 0.70;
        let shutdown_pending = history_len >= 50 && self.get_profitability(50, now_ns).loss_rate > 0.80;
        SystemHealth {
            warning_mode,
            shutdown_pending,
            is_healthy: !warning_mode && !shutdown_pending,
        }
    }

    /// Renders every configured window's profitability plus per-operation
    /// latency as Prometheus text exposition. Builds a fresh `Registry` per
    /// call — cheap relative to scrape intervals, and avoids global-registry
    /// lifetime issues for a library that may be embedded more than once per
    /// process.
    pub fn render_prometheus(&self, now_ns: u64) -> anyhow::Result<String> {
        let registry = Registry::new();

        for window_metrics in self.get_performance(now_ns) {
            let w = window_metrics.window;
            register_gauge(&registry, "mev_success_rate", "fraction of profitable trades in window", w, window_metrics.success_rate)?;
            register_gauge(&registry, "mev_loss_rate", "fraction of unprofitable trades in window", w, window_metrics.loss_rate)?;
            register_gauge(&registry, "mev_net_profit", "net profit over window", w, window_metrics.net.to_f64().unwrap_or(0.0))?;
            register_gauge(&registry, "mev_trade_count", "trades counted in window", w, window_metrics.total as f64)?;
        }

        for (op, metrics) in self.latency.get_metrics() {
            register_latency_gauge(&registry, "mev_latency_avg_ms", &op, metrics.avg.as_secs_f64() * 1000.0)?;
            register_latency_gauge(&registry, "mev_latency_p95_ms", &op, metrics.p95.as_secs_f64() * 1000.0)?;
            register_latency_gauge(&registry, "mev_latency_p99_ms", &op, metrics.p99.as_secs_f64() * 1000.0)?;
        }

        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

fn register_gauge(registry: &Registry, name: &str, help: &str, window: usize, value: f64) -> anyhow::Result<()> {
    let gauge = Gauge::with_opts(Opts::new(name, help).const_label("window", window.to_string()))?;
    gauge.set(value);
    registry.register(Box::new(gauge))?;
    Ok(())
}

fn register_latency_gauge(registry: &Registry, name: &str, operation: &str, value: f64) -> anyhow::Result<()> {
    let gauge = Gauge::with_opts(Opts::new(name, "operation latency").const_label("operation", operation.to_string()))?;
    gauge.set(value);
    registry.register(Box::new(gauge))?;
    Ok(())
}

fn median(sorted: &[Decimal]) -> Decimal {
    if sorted.is_empty() {
        return Decimal::ZERO;
    }
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / Decimal::from(2)
    } else {
        sorted[mid]
    }
}
