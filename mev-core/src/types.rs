//! Core data model shared by every pipeline component.
//!
//! Types that cross the outbound boundary (`MEVOpportunity`, `Alert`, metrics
//! payloads) derive `Serialize`/`Deserialize` so they can be handed to an
//! external API adaptor or logged as JSON. Money-valued fields use
//! `rust_decimal::Decimal` throughout, matching the teacher's precision-first
//! arithmetic philosophy — `f64` is reserved for Monte-Carlo sampling
//! internals in `profit_calculator`.

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A pending transaction as observed by the upstream mempool watcher.
/// Immutable once constructed; identity is `hash`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value: Decimal,
    pub gas_price: Decimal,
    pub gas_limit: u64,
    pub nonce: u64,
    pub data: Vec<u8>,
    pub chain_id: u64,
}

/// A decoded, per-address account delta produced by executing a transaction
/// against a `Fork`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountDelta {
    pub balance_diff: i128,
    pub nonce_diff: i64,
    pub code: Option<Vec<u8>>,
    pub storage_touched: Vec<([u8; 32], [u8; 32])>,
}

/// A single EVM log entry, pre-decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLog {
    pub address: String,
    pub topics: Vec<[u8; 32]>,
    pub data: Vec<u8>,
}

/// Result of executing one transaction against a `Fork` (C1).
///
/// Produced by `Fork::execute`, consumed read-only thereafter. On an
/// execution-domain failure `success` is `false` and `error` is populated —
/// Fork never raises for this case, only for I/O/RPC failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub success: bool,
    pub gas_used: u64,
    pub receipt_status: Option<u64>,
    pub logs: Vec<RawLog>,
    pub account_deltas: HashMap<String, AccountDelta>,
    pub wall_time: std::time::Duration,
    pub error: Option<String>,
}

/// Per-address chain state, captured before and after a replay.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountState {
    pub balance: Decimal,
    pub nonce: u64,
    pub code: Option<Vec<u8>>,
    pub storage: HashMap<[u8; 32], [u8; 32]>,
}

/// A point-in-time snapshot of the chain state a Fork observed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    pub block_number: u64,
    pub wall_timestamp_ns: u64,
    pub accounts: HashMap<String, AccountState>,
    pub spot_prices: HashMap<String, Decimal>,
}

/// Closed variant set of MEV strategy classes (per spec §9 design notes —
/// modeled as a closed enum, not an inheritance hierarchy).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StrategyKind {
    Sandwich,
    Backrun,
    Frontrun,
    TimeBandit,
    CrossLayer,
}

impl StrategyKind {
    pub const ALL: [StrategyKind; 5] = [
        StrategyKind::Sandwich,
        StrategyKind::Backrun,
        StrategyKind::Frontrun,
        StrategyKind::TimeBandit,
        StrategyKind::CrossLayer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Sandwich => "sandwich",
            StrategyKind::Backrun => "backrun",
            StrategyKind::Frontrun => "frontrun",
            StrategyKind::TimeBandit => "time-bandit",
            StrategyKind::CrossLayer => "cross-layer",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Lifecycle state of an `MEVOpportunity`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpportunityStatus {
    Detected,
    Validated,
    Profitable,
    Unprofitable,
    Executed,
    Failed,
}

/// A candidate MEV opportunity. Created by `StrategyEngine`, refined in
/// place by `ProfitCalculator`, terminally consumed by downstream execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MEVOpportunity {
    pub id: String,
    pub strategy: StrategyKind,
    pub target_tx_hash: String,
    pub expected_gross_profit: Decimal,
    pub estimated_gas_cost: Decimal,
    pub net_profit: Decimal,
    pub confidence: f64,
    pub status: OpportunityStatus,
    pub execution_txs: Vec<Transaction>,
    pub metadata: HashMap<String, String>,
}

impl MEVOpportunity {
    /// Opaque metadata lookup used by `ProfitCalculator::calculate` to
    /// extract `(pool, token, amount)` for slippage estimation.
    pub fn pool_token_amount(&self) -> Option<(&str, &str, Decimal)> {
        let pool = self.metadata.get("pool")?;
        let token = self.metadata.get("token")?;
        let amount: Decimal = self.metadata.get("amount")?.parse().ok()?;
        Some((pool.as_str(), token.as_str(), amount))
    }
}

/// Outcome of actually attempting execution of an opportunity. Appended to
/// the rolling trade history and consumed by `MetricsCollector` and
/// `CalibrationSystem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeResult {
    pub id: String,
    pub strategy: StrategyKind,
    pub opportunity_id: String,
    pub executed_at_ns: u64,
    pub success: bool,
    pub actual_profit: Decimal,
    pub expected_profit: Decimal,
    pub gas_cost: Decimal,
    pub net_profit: Decimal,
    pub execution_time: std::time::Duration,
    pub executed_tx_hash: Option<String>,
    pub error: Option<String>,
}

impl TradeResult {
    /// A trade is profitable iff `success ∧ net_profit > 0` — no partial
    /// classification (spec §4.12, resolving the Open Question in §9 in
    /// favor of the conjunctive reading).
    pub fn is_profitable(&self) -> bool {
        self.success && self.net_profit > Decimal::ZERO
    }
}

/// Output of `ProfitCalculator::calculate`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfitEstimate {
    pub gross: Decimal,
    pub gas_cost: Decimal,
    pub slippage_cost: Decimal,
    pub net: Decimal,
    pub margin: Decimal,
    pub success_probability: f64,
    pub risk_score: f64,
    pub confidence: f64,
}

/// Per-strategy profitability gate, mutable at runtime.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ProfitThreshold {
    pub min_net_profit: Decimal,
    pub min_margin: Decimal,
    pub min_success_probability: f64,
    pub max_risk_score: f64,
}

impl Default for ProfitThreshold {
    fn default() -> Self {
        ProfitThreshold {
            min_net_profit: Decimal::ZERO,
            min_margin: Decimal::ZERO,
            min_success_probability: 0.5,
            max_risk_score: 0.5,
        }
    }
}

/// Rolling-window profitability summary for window size `W`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProfitabilityMetrics {
    pub window: usize,
    pub total: usize,
    pub profitable_count: usize,
    pub loss_count: usize,
    pub success_rate: f64,
    pub loss_rate: f64,
    pub total_profit: Decimal,
    pub max_profit: Decimal,
    pub avg_profit: Decimal,
    pub median_profit: Decimal,
    pub total_loss: Decimal,
    pub net: Decimal,
    pub margin: Decimal,
    pub last_updated_ns: u64,
}

/// Category of alert, matching the four sources rule evaluation and
/// background tasks can raise from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertType {
    Profitability,
    Latency,
    System,
    Connection,
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AlertSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    pub message: String,
    pub details: HashMap<String, String>,
    pub created_at_ns: u64,
    pub acknowledged_at_ns: Option<u64>,
    pub resolved_at_ns: Option<u64>,
}

impl Alert {
    pub fn is_acknowledged(&self) -> bool {
        self.acknowledged_at_ns.is_some()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved_at_ns.is_some()
    }
}

/// Condition an `AlertRule` evaluates against a `ProfitabilityMetrics`
/// window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertCondition {
    LossRateAbove,
    SuccessRateBelow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRule {
    pub id: String,
    pub alert_type: AlertType,
    pub condition: AlertCondition,
    pub threshold: f64,
    pub window: usize,
    pub enabled: bool,
}

/// Two-stage circuit breaker state (C14).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownStatus {
    pub is_shutdown: bool,
    pub can_restart: bool,
    pub manual_override: bool,
    pub reason: Option<String>,
    pub shutdown_at_ns: Option<u64>,
}

impl Default for ShutdownStatus {
    fn default() -> Self {
        ShutdownStatus {
            is_shutdown: false,
            can_restart: true,
            manual_override: false,
            reason: None,
            shutdown_at_ns: None,
        }
    }
}

/// Result of `ShutdownManager::check_conditions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownDecision {
    pub should_shutdown: bool,
    pub reason: String,
    pub metrics: Option<ProfitabilityMetrics>,
}

/// Historical outcome recorded for `CalibrationSystem`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoricalResult {
    pub strategy: StrategyKind,
    pub predicted: Decimal,
    pub actual: Decimal,
    pub gas: Decimal,
    pub slippage: Decimal,
    pub success: bool,
    pub timestamp_ns: u64,
}
