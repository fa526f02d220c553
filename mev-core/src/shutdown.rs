//! ShutdownManager (C14) — two-stage circuit breaker with callbacks and
//! manual override.
//!
//! Breaks the Metrics↔Shutdown↔Alerts cycle by dependency injection: this
//! manager holds a read-only `Arc<MetricsCollector>` handle and an
//! `Arc<AlertManager>`; neither of those ever calls back into this type
//! (spec §9 design note).

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::alerts::AlertManager;
use crate::config::ShutdownManagerConfig;
use crate::error::ShutdownError;
use crate::metrics::MetricsCollector;
use crate::types::{Alert, AlertSeverity, AlertType, BreakerState, ProfitabilityMetrics, ShutdownDecision, ShutdownStatus};
use crate::{log_shutdown, log_error};

pub type ShutdownCallback = Arc<dyn Fn(&str) -> anyhow::Result<()> + Send + Sync>;

struct BreakerInner {
    state: BreakerState,
    failure_count: u32,
    last_failure_time_ns: Option<u64>,
}

pub struct ShutdownManager {
    config: ShutdownManagerConfig,
    metrics: Arc<MetricsCollector>,
    alerts: Arc<AlertManager>,
    status: RwLock<ShutdownStatus>,
    warning_triggered: std::sync::atomic::AtomicBool,
    breaker: RwLock<BreakerInner>,
    failure_threshold: AtomicU32,
    callbacks: RwLock<Vec<ShutdownCallback>>,
    override_expires_at_ns: RwLock<Option<u64>>,
}

impl ShutdownManager {
    pub fn new(config: ShutdownManagerConfig, metrics: Arc<MetricsCollector>, alerts: Arc<AlertManager>) -> Self {
        let failure_threshold = config.failure_threshold;
        ShutdownManager {
            config,
            metrics,
            alerts,
            status: RwLock::new(ShutdownStatus::default()),
            warning_triggered: std::sync::atomic::AtomicBool::new(false),
            breaker: RwLock::new(BreakerInner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure_time_ns: None,
            }),
            failure_threshold: AtomicU32::new(failure_threshold),
            callbacks: RwLock::new(Vec::new()),
            override_expires_at_ns: RwLock::new(None),
        }
    }

    pub fn add_shutdown_callback(&self, callback: ShutdownCallback) {
        self.callbacks.write().push(callback);
    }

    pub fn get_status(&self) -> ShutdownStatus {
        self.status.read().clone()
    }

    pub fn get_circuit_breaker_status(&self) -> BreakerState {
        self.breaker.read().state
    }

    /// 1. Already shutdown → no shutdown, reason fixed.
    /// 2. Manual override active → no shutdown, reason fixed.
    /// 3. Breaker open and within `recovery_timeout` → shutdown with
    ///    "Circuit breaker is open"; otherwise half-open and proceed.
    /// 4. Fetch performance metrics (infallible here; a real backend fetch
    ///    could fail and would increment the breaker — see `record_fetch_error`).
    /// 5. Warning check (W=100, ≥100 trades).
    /// 6. Shutdown check (W=50, ≥50 trades).
    /// 7. On success while half-open, close the breaker.
    pub fn check_conditions(&self, now_ns: u64) -> ShutdownDecision {
        self.expire_override_if_due(now_ns);

        if self.status.read().is_shutdown {
            return ShutdownDecision {
                should_shutdown: false,
                reason: "System already shutdown".to_string(),
                metrics: None,
            };
        }

        if self.status.read().manual_override {
            return ShutdownDecision {
                should_shutdown: false,
                reason: "Manual override active".to_string(),
                metrics: None,
            };
        }

        {
            let breaker = self.breaker.read();
            if breaker.state == BreakerState::Open {
                let elapsed = breaker
                    .last_failure_time_ns
                    .map(|t| Duration::from_nanos(now_ns.saturating_sub(t)))
                    .unwrap_or(Duration::ZERO);
                if elapsed < self.config.recovery_timeout {
                    return ShutdownDecision {
                        should_shutdown: true,
                        reason: "Circuit breaker is open".to_string(),
                        metrics: None,
                    };
                }
            }
        }
        if self.breaker.read().state == BreakerState::Open {
            self.breaker.write().state = BreakerState::HalfOpen;
        }

        let history_len = self.metrics.trade_count();

        let warning_metrics = self.metrics.get_profitability(self.config.warning_window, now_ns);
        if history_len >= self.config.warning_window && warning_metrics.loss_rate > self.config.warning_rate {
            if !self.warning_triggered.swap(true, Ordering::SeqCst) {
                self.emit_warning_alert(&warning_metrics, now_ns);
            }
        } else {
            self.warning_triggered.store(false, Ordering::SeqCst);
        }

        let shutdown_metrics = self.metrics.get_profitability(self.config.shutdown_window, now_ns);
        let mut should_shutdown = false;
        let mut reason = "healthy".to_string();
        if history_len >= self.config.shutdown_window && shutdown_metrics.loss_rate > self.config.shutdown_rate {
            should_shutdown = true;
            reason = format!(
                "loss rate {:.0}% exceeds shutdown threshold {:.0}%",
                shutdown_metrics.loss_rate * 100.0,
                self.config.shutdown_rate * 100.0
            );
        }

        if self.breaker.read().state == BreakerState::HalfOpen {
            let mut breaker = self.breaker.write();
            breaker.state = BreakerState::Closed;
            breaker.failure_count = 0;
        }

        ShutdownDecision {
            should_shutdown,
            reason,
            metrics: Some(shutdown_metrics),
        }
    }

    /// Records a failed metrics fetch. Opens the breaker at
    /// `failure_threshold`.
    pub fn record_fetch_error(&self, now_ns: u64) {
        let mut breaker = self.breaker.write();
        breaker.failure_count += 1;
        breaker.last_failure_time_ns = Some(now_ns);
        if breaker.failure_count >= self.failure_threshold.load(Ordering::Relaxed) {
            breaker.state = BreakerState::Open;
            log_error!("circuit breaker opened after {} consecutive failures", breaker.failure_count);
        }
    }

    fn emit_warning_alert(&self, metrics: &ProfitabilityMetrics, now_ns: u64) {
        let mut details = std::collections::HashMap::new();
        details.insert("loss_rate".to_string(), metrics.loss_rate.to_string());
        details.insert("window".to_string(), metrics.window.to_string());
        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            alert_type: AlertType::Profitability,
            severity: AlertSeverity::Warning,
            message: format!("loss rate {:.0}% exceeds warning threshold", metrics.loss_rate * 100.0),
            details,
            created_at_ns: now_ns,
            acknowledged_at_ns: None,
            resolved_at_ns: None,
        };
        if let Err(e) = self.alerts.send(alert) {
            log_error!("failed to dispatch warning alert: {e}");
        }
    }

    /// The sole path to a shutdown. Idempotent failure on re-entry. Records
    /// reason and timestamp, dispatches a critical alert, invokes
    /// registered callbacks in registration order; callback errors are
    /// logged, not re-raised.
    pub fn initiate(&self, reason: &str, now_ns: u64) -> Result<(), ShutdownError> {
        {
            let mut status = self.status.write();
            if status.is_shutdown {
                return Err(ShutdownError::AlreadyShutdown);
            }
            status.is_shutdown = true;
            status.reason = Some(reason.to_string());
            status.shutdown_at_ns = Some(now_ns);
        }

        log_shutdown!("shutdown initiated: {reason}");

        let mut details = std::collections::HashMap::new();
        details.insert("reason".to_string(), reason.to_string());
        let alert = Alert {
            id: uuid::Uuid::new_v4().to_string(),
            alert_type: AlertType::Shutdown,
            severity: AlertSeverity::Critical,
            message: format!("system shutdown: {reason}"),
            details,
            created_at_ns: now_ns,
            acknowledged_at_ns: None,
            resolved_at_ns: None,
        };
        if let Err(e) = self.alerts.send(alert) {
            log_error!("failed to dispatch shutdown alert: {e}");
        }

        let callbacks = self.callbacks.read().clone();
        for callback in callbacks.iter() {
            if let Err(e) = callback(reason) {
                log_error!("shutdown callback failed: {e}");
            }
        }

        Ok(())
    }

    /// Respects `allow_manual_override`; optionally auto-expires after
    /// `override_timeout`.
    pub fn set_manual_override(&self, enabled: bool, now_ns: u64) -> Result<(), ShutdownError> {
        if enabled && !self.config.allow_manual_override {
            return Err(ShutdownError::OverrideDisallowed);
        }
        self.status.write().manual_override = enabled;
        if enabled {
            if let Some(timeout) = self.config.override_timeout {
                *self.override_expires_at_ns.write() = Some(now_ns + timeout.as_nanos() as u64);
            }
        } else {
            *self.override_expires_at_ns.write() = None;
        }
        Ok(())
    }

    fn expire_override_if_due(&self, now_ns: u64) {
        let expires_at = *self.override_expires_at_ns.read();
        if let Some(expiry) = expires_at {
            if now_ns >= expiry {
                self.status.write().manual_override = false;
                *self.override_expires_at_ns.write() = None;
            }
        }
    }

    /// Only from shutdown state with `can_restart`; clears shutdown flags,
    /// warning latch, and breaker.
    pub fn restart(&self) -> Result<(), ShutdownError> {
        let mut status = self.status.write();
        if !status.is_shutdown {
            return Err(ShutdownError::NotShutdown);
        }
        if !status.can_restart {
            return Err(ShutdownError::RestartNotPermitted);
        }
        *status = ShutdownStatus::default();
        drop(status);

        self.warning_triggered.store(false, Ordering::SeqCst);
        let mut breaker = self.breaker.write();
        breaker.state = BreakerState::Closed;
        breaker.failure_count = 0;
        breaker.last_failure_time_ns = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::LogSink;
    use crate::config::AlertManagerConfig;
    use crate::types::StrategyKind;
    use rust_decimal_macros::dec;
    use std::sync::atomic::AtomicUsize;

    fn make_manager(config: ShutdownManagerConfig) -> (Arc<MetricsCollector>, Arc<AlertManager>, ShutdownManager) {
        let metrics = Arc::new(MetricsCollector::new(1000, 1000, 1000, vec![50, 100]));
        let alerts = AlertManager::new(AlertManagerConfig::default(), Arc::new(LogSink), metrics.clone());
        let manager = ShutdownManager::new(config, metrics.clone(), alerts.clone());
        (metrics, alerts, manager)
    }

    fn trade(net: rust_decimal::Decimal) -> crate::types::TradeResult {
        crate::types::TradeResult {
            id: uuid::Uuid::new_v4().to_string(),
            strategy: StrategyKind::Backrun,
            opportunity_id: "o".into(),
            executed_at_ns: 0,
            success: true,
            actual_profit: net,
            expected_profit: net,
            gas_cost: dec!(0),
            net_profit: net,
            execution_time: Duration::from_millis(1),
            executed_tx_hash: None,
            error: None,
        }
    }

    #[test]
    fn scenario_warning_no_shutdown() {
        let (metrics, _alerts, manager) = make_manager(ShutdownManagerConfig::default());
        for _ in 0..75 {
            metrics.record_trade(trade(dec!(-1200)));
        }
        for _ in 0..25 {
            metrics.record_trade(trade(dec!(1300)));
        }
        let decision = manager.check_conditions(0);
        assert!(!decision.should_shutdown);
    }

    #[test]
    fn scenario_shutdown_trigger() {
        let (metrics, _alerts, manager) = make_manager(ShutdownManagerConfig::default());
        for _ in 0..75 {
            metrics.record_trade(trade(dec!(-1200)));
        }
        for _ in 0..25 {
            metrics.record_trade(trade(dec!(1300)));
        }
        manager.check_conditions(0);
        for _ in 0..42 {
            metrics.record_trade(trade(dec!(-1200)));
        }
        for _ in 0..8 {
            metrics.record_trade(trade(dec!(1300)));
        }
        let decision = manager.check_conditions(1);
        assert!(decision.should_shutdown);
        assert!(decision.reason.contains("84"));

        manager.initiate(&decision.reason, 2).unwrap();
        let status = manager.get_status();
        assert!(status.is_shutdown);
        assert!(status.shutdown_at_ns.is_some());
    }

    #[test]
    fn scenario_manual_override() {
        let (metrics, _alerts, manager) = make_manager(ShutdownManagerConfig::default());
        for _ in 0..75 {
            metrics.record_trade(trade(dec!(-1200)));
        }
        for _ in 0..25 {
            metrics.record_trade(trade(dec!(1300)));
        }
        manager.set_manual_override(true, 0).unwrap();
        for _ in 0..50 {
            metrics.record_trade(trade(dec!(-1200)));
        }
        let decision = manager.check_conditions(1);
        assert!(!decision.should_shutdown);
        assert_eq!(decision.reason, "Manual override active");

        manager.set_manual_override(false, 2).unwrap();
        let decision = manager.check_conditions(3);
        assert!(decision.should_shutdown);
    }

    #[test]
    fn scenario_circuit_breaker() {
        let config = ShutdownManagerConfig {
            failure_threshold: 2,
            recovery_timeout: Duration::from_millis(100),
            ..ShutdownManagerConfig::default()
        };
        let (_metrics, _alerts, manager) = make_manager(config);

        manager.record_fetch_error(0);
        assert_eq!(manager.get_circuit_breaker_status(), BreakerState::Closed);
        manager.record_fetch_error(1);
        assert_eq!(manager.get_circuit_breaker_status(), BreakerState::Open);

        let decision = manager.check_conditions(2);
        assert!(decision.should_shutdown);
        assert_eq!(decision.reason, "Circuit breaker is open");

        // After recovery_timeout and a successful check, breaker closes.
        let decision = manager.check_conditions(200_000_000);
        assert!(!decision.should_shutdown);
        assert_eq!(manager.get_circuit_breaker_status(), BreakerState::Closed);
    }

    #[test]
    fn restart_only_from_shutdown_state() {
        let (_metrics, _alerts, manager) = make_manager(ShutdownManagerConfig::default());
        assert!(matches!(manager.restart(), Err(ShutdownError::NotShutdown)));
        manager.initiate("test", 0).unwrap();
        manager.restart().unwrap();
        assert!(!manager.get_status().is_shutdown);
    }

    #[test]
    fn shutdown_callbacks_invoked_exactly_once_in_order() {
        let (_metrics, _alerts, manager) = make_manager(ShutdownManagerConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let order = Arc::new(RwLock::new(Vec::new()));

        let calls_a = calls.clone();
        let order_a = order.clone();
        manager.add_shutdown_callback(Arc::new(move |_reason| {
            calls_a.fetch_add(1, Ordering::SeqCst);
            order_a.write().push(1);
            Ok(())
        }));
        let calls_b = calls.clone();
        let order_b = order.clone();
        manager.add_shutdown_callback(Arc::new(move |_reason| {
            calls_b.fetch_add(1, Ordering::SeqCst);
            order_b.write().push(2);
            Ok(())
        }));

        manager.initiate("test", 0).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(*order.read(), vec![1, 2]);
    }

    #[test]
    fn initiate_is_idempotent_failure_on_reentry() {
        let (_metrics, _alerts, manager) = make_manager(ShutdownManagerConfig::default());
        manager.initiate("first", 0).unwrap();
        assert!(matches!(manager.initiate("second", 1), Err(ShutdownError::AlreadyShutdown)));
    }
}
