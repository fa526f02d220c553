//! AlertManager (C13) — rule evaluation → dispatch, dedup, retention.
//!
//! Two cooperative background tasks: rule evaluation every `check_interval`
//! and alert-retention cleanup every `cleanup_interval`. `send` is
//! non-blocking; a full dispatch channel surfaces `AlertError::ChannelFull`
//! so callers can choose to drop or retry.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};

use crate::config::{AlertManagerConfig, AlertSinkConfig};
use crate::error::AlertError;
use crate::metrics::MetricsCollector;
use crate::types::{Alert, AlertCondition, AlertRule, AlertSeverity};
use crate::{log_alert, log_error};

/// Pluggable alert dispatch target.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn dispatch(&self, alert: &Alert) -> anyhow::Result<()>;
}

pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn dispatch(&self, alert: &Alert) -> anyhow::Result<()> {
        log_alert!("[{:?}/{:?}] {}", alert.alert_type, alert.severity, alert.message);
        Ok(())
    }
}

pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: String) -> Self {
        WebhookSink {
            client: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(5))
                .build()
                .expect("failed to build webhook client"),
            url,
        }
    }
}

#[async_trait]
impl AlertSink for WebhookSink {
    async fn dispatch(&self, alert: &Alert) -> anyhow::Result<()> {
        self.client.post(&self.url).json(alert).send().await?;
        Ok(())
    }
}

pub fn sink_from_config(config: &AlertSinkConfig) -> Arc<dyn AlertSink> {
    match config {
        AlertSinkConfig::Log => Arc::new(LogSink),
        AlertSinkConfig::Webhook { url } => Arc::new(WebhookSink::new(url.clone())),
    }
}

struct Store {
    alerts: VecDeque<Alert>,
    rules: Vec<AlertRule>,
}

pub struct AlertManager {
    config: AlertManagerConfig,
    store: RwLock<Store>,
    dispatch_tx: mpsc::Sender<Alert>,
    stop_tx: watch::Sender<bool>,
}

impl AlertManager {
    pub fn new(config: AlertManagerConfig, sink: Arc<dyn AlertSink>, metrics: Arc<MetricsCollector>) -> Arc<Self> {
        let (dispatch_tx, mut dispatch_rx) = mpsc::channel::<Alert>(256);
        let (stop_tx, _stop_rx) = watch::channel(false);

        let manager = Arc::new(AlertManager {
            config: config.clone(),
            store: RwLock::new(Store { alerts: VecDeque::new(), rules: Vec::new() }),
            dispatch_tx,
            stop_tx,
        });

        tokio::spawn(async move {
            while let Some(alert) = dispatch_rx.recv().await {
                if let Err(e) = sink.dispatch(&alert).await {
                    log_error!("alert sink dispatch failed: {e}");
                }
            }
        });

        manager.clone().spawn_rule_evaluation_loop(metrics);
        manager.clone().spawn_cleanup_loop();
        manager
    }

    pub fn register(&self, rule: AlertRule) {
        self.store.write().rules.push(rule);
    }

    /// Inserts the alert (evicting the oldest on overflow of `max_alerts`)
    /// and forwards it to the dispatch channel without blocking.
    pub fn send(&self, alert: Alert) -> Result<(), AlertError> {
        {
            let mut store = self.store.write();
            if store.alerts.len() >= self.config.max_alerts {
                store.alerts.pop_front();
            }
            store.alerts.push_back(alert.clone());
        }
        self.dispatch_tx
            .try_send(alert)
            .map_err(|_| AlertError::ChannelFull)
    }

    pub fn active(&self) -> Vec<Alert> {
        self.store
            .read()
            .alerts
            .iter()
            .filter(|a| !a.is_resolved())
            .cloned()
            .collect()
    }

    /// Idempotent: acknowledging an already-acknowledged alert is a no-op.
    pub fn ack(&self, id: &str, now_ns: u64) -> Result<(), AlertError> {
        let mut store = self.store.write();
        let alert = store
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AlertError::AlertNotFound(id.to_string()))?;
        if alert.acknowledged_at_ns.is_none() {
            alert.acknowledged_at_ns = Some(now_ns);
        }
        Ok(())
    }

    /// Idempotent: resolving an already-resolved alert is a no-op.
    pub fn resolve(&self, id: &str, now_ns: u64) -> Result<(), AlertError> {
        let mut store = self.store.write();
        let alert = store
            .alerts
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| AlertError::AlertNotFound(id.to_string()))?;
        if alert.resolved_at_ns.is_none() {
            alert.resolved_at_ns = Some(now_ns);
        }
        Ok(())
    }

    /// Deletes alerts older than `retention`.
    pub fn cleanup(&self, now_ns: u64) {
        let retention_ns = self.config.retention.as_nanos() as u64;
        self.store
            .write()
            .alerts
            .retain(|a| now_ns.saturating_sub(a.created_at_ns) <= retention_ns);
    }

    fn spawn_rule_evaluation_loop(self: Arc<Self>, metrics: Arc<MetricsCollector>) {
        let mut stop_rx = self.stop_tx.subscribe();
        let interval_dur = self.config.check_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_dur);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        let now_ns = crate::time::now_ns();
                        self.evaluate_rules(&metrics, now_ns);
                    }
                }
            }
        });
    }

    fn spawn_cleanup_loop(self: Arc<Self>) {
        let mut stop_rx = self.stop_tx.subscribe();
        let interval_dur = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_dur);
            loop {
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = ticker.tick() => {
                        self.cleanup(crate::time::now_ns());
                    }
                }
            }
        });
    }

    /// For `condition=LossRateAbove`, alert when `current > threshold`; for
    /// `SuccessRateBelow`, when `current < threshold`. Severity escalates
    /// with ratio `current/threshold`.
    pub fn evaluate_rules(&self, metrics: &MetricsCollector, now_ns: u64) {
        let rules: Vec<AlertRule> = self.store.read().rules.clone();
        for rule in rules {
            if !rule.enabled {
                continue;
            }
            let window_metrics = metrics.get_profitability(rule.window, now_ns);
            let (breached, current) = match rule.condition {
                AlertCondition::LossRateAbove => {
                    (window_metrics.loss_rate > rule.threshold, window_metrics.loss_rate)
                }
                AlertCondition::SuccessRateBelow => {
                    (window_metrics.success_rate < rule.threshold, window_metrics.success_rate)
                }
            };
            if !breached {
                continue;
            }
            let severity = escalate_severity(current, rule.threshold);
            let mut details = std::collections::HashMap::new();
            details.insert("current".to_string(), current.to_string());
            details.insert("threshold".to_string(), rule.threshold.to_string());
            details.insert("window".to_string(), rule.window.to_string());

            let alert = Alert {
                id: uuid::Uuid::new_v4().to_string(),
                alert_type: rule.alert_type,
                severity,
                message: format!(
                    "rule {} breached: current={current:.4} threshold={:.4}",
                    rule.id, rule.threshold
                ),
                details,
                created_at_ns: now_ns,
                acknowledged_at_ns: None,
                resolved_at_ns: None,
            };
            if let Err(e) = self.send(alert) {
                log_error!("failed to dispatch rule alert {}: {e}", rule.id);
            }
        }
    }

    pub fn stop(&self) {
        let _ = self.stop_tx.send(true);
    }
}

fn escalate_severity(current: f64, threshold: f64) -> AlertSeverity {
    if threshold <= 0.0 {
        return AlertSeverity::Info;
    }
    let ratio = current / threshold;
    if ratio >= 2.0 {
        AlertSeverity::Critical
    } else if ratio >= 1.5 {
        AlertSeverity::Error
    } else if ratio >= 1.2 {
        AlertSeverity::Warning
    } else {
        AlertSeverity::Info
    }
}
