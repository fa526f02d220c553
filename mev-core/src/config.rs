//! Configuration surface for the MEV detection core.
//!
//! Mirrors the shape of `flash_arbitrage::config::FlashArbitrageConfig`: one
//! sub-struct per component, all `Serialize`/`Deserialize` with `Default`
//! impls, loadable from a JSON file or environment variables, with a
//! `validate()` pass that rejects nonsensical combinations before startup.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

/// Fork pool: {min_size, max_size, base_url, base_port, health_interval, acquire_timeout}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForkPoolConfig {
    pub min_size: usize,
    pub max_size: usize,
    pub base_url: String,
    pub base_port: u16,
    #[serde(with = "duration_secs")]
    pub health_interval: Duration,
    #[serde(with = "duration_secs")]
    pub acquire_timeout: Duration,
}

impl Default for ForkPoolConfig {
    fn default() -> Self {
        ForkPoolConfig {
            min_size: 2,
            max_size: 8,
            base_url: "http://127.0.0.1".to_string(),
            base_port: 8545,
            health_interval: Duration::from_secs(10),
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

/// Worker pool: {size, queue_size, max_job_timeout, shutdown_timeout}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerPoolConfig {
    pub size: usize,
    pub queue_size: usize,
    #[serde(with = "duration_secs")]
    pub max_job_timeout: Duration,
    #[serde(with = "duration_secs")]
    pub shutdown_timeout: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        WorkerPoolConfig {
            size: 8,
            queue_size: 256,
            max_job_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Metrics: {max_trades, max_latencies, max_opportunities, window_sizes[]}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    pub max_trades: usize,
    pub max_latencies: usize,
    pub max_opportunities: usize,
    pub window_sizes: Vec<usize>,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            max_trades: 10_000,
            max_latencies: 10_000,
            max_opportunities: 10_000,
            window_sizes: vec![50, 100, 500],
        }
    }
}

/// Alert mgr: {max_alerts, retention, check_interval, cleanup_interval, sink}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertManagerConfig {
    pub max_alerts: usize,
    #[serde(with = "duration_secs")]
    pub retention: Duration,
    #[serde(with = "duration_secs")]
    pub check_interval: Duration,
    #[serde(with = "duration_secs")]
    pub cleanup_interval: Duration,
    pub sink: AlertSinkConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertSinkConfig {
    Log,
    Webhook { url: String },
}

impl Default for AlertManagerConfig {
    fn default() -> Self {
        AlertManagerConfig {
            max_alerts: 1_000,
            retention: Duration::from_secs(7 * 24 * 3600),
            check_interval: Duration::from_secs(5),
            cleanup_interval: Duration::from_secs(60),
            sink: AlertSinkConfig::Log,
        }
    }
}

/// Shutdown mgr: {warning_rate, shutdown_rate, warning_W, shutdown_W,
/// failure_threshold, recovery_timeout, allow_manual_override,
/// override_timeout, check_interval}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownManagerConfig {
    pub warning_rate: f64,
    pub shutdown_rate: f64,
    pub warning_window: usize,
    pub shutdown_window: usize,
    pub failure_threshold: u32,
    #[serde(with = "duration_secs")]
    pub recovery_timeout: Duration,
    pub allow_manual_override: bool,
    #[serde(with = "opt_duration_secs")]
    pub override_timeout: Option<Duration>,
    #[serde(with = "duration_secs")]
    pub check_interval: Duration,
}

impl Default for ShutdownManagerConfig {
    fn default() -> Self {
        ShutdownManagerConfig {
            warning_rate: 0.70,
            shutdown_rate: 0.80,
            warning_window: 100,
            shutdown_window: 50,
            failure_threshold: 3,
            recovery_timeout: Duration::from_secs(30),
            allow_manual_override: true,
            override_timeout: None,
            check_interval: Duration::from_secs(5),
        }
    }
}

/// Calibration: {min_sample, window, recalibration_period, outlier_threshold}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationConfig {
    pub min_sample_size: usize,
    pub window: usize,
    #[serde(with = "duration_secs")]
    pub recalibration_period: Duration,
    pub outlier_threshold: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        CalibrationConfig {
            min_sample_size: 30,
            window: 500,
            recalibration_period: Duration::from_secs(300),
            outlier_threshold: 3.0,
        }
    }
}

/// Profit thresholds and Monte-Carlo parameters for `ProfitCalculator` (C8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfitCalculatorConfig {
    pub monte_carlo_iterations: usize,
    pub gas_variance: f64,
    pub slippage_variance: f64,
    pub price_variance: f64,
    #[serde(default = "default_true")]
    pub use_calibration: bool,
}

impl Default for ProfitCalculatorConfig {
    fn default() -> Self {
        ProfitCalculatorConfig {
            monte_carlo_iterations: 1000,
            gas_variance: 0.15,
            slippage_variance: 0.25,
            price_variance: 0.10,
            use_calibration: true,
        }
    }
}

/// Gas estimator freshness window and priority multipliers (C9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GasEstimatorConfig {
    #[serde(with = "duration_secs")]
    pub price_freshness_window: Duration,
    pub base_gas_price_gwei: f64,
    pub ema_alpha: f64,
    pub batch_overhead_pct: f64,
}

impl Default for GasEstimatorConfig {
    fn default() -> Self {
        GasEstimatorConfig {
            price_freshness_window: Duration::from_secs(30),
            base_gas_price_gwei: 30.0,
            ema_alpha: 0.1,
            batch_overhead_pct: 0.05,
        }
    }
}

/// Slippage model recalibration thresholds (C10).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlippageCalculatorConfig {
    pub min_samples_for_model: usize,
    #[serde(with = "duration_secs")]
    pub model_freshness_window: Duration,
    pub base_rate: f64,
    pub reference_size: rust_decimal::Decimal,
    pub impact_cap: f64,
}

impl Default for SlippageCalculatorConfig {
    fn default() -> Self {
        SlippageCalculatorConfig {
            min_samples_for_model: 10,
            model_freshness_window: Duration::from_secs(24 * 3600),
            base_rate: 0.003,
            reference_size: rust_decimal::Decimal::new(1_000_000, 0),
            impact_cap: 0.5,
        }
    }
}

/// Top-level configuration tree for the whole core, following
/// `FlashArbitrageConfig`'s composition-of-sub-configs shape exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MevCoreConfig {
    pub fork_pool: ForkPoolConfig,
    pub worker_pool: WorkerPoolConfig,
    pub metrics: MetricsConfig,
    pub alert_manager: AlertManagerConfig,
    pub shutdown_manager: ShutdownManagerConfig,
    pub calibration: CalibrationConfig,
    pub profit_calculator: ProfitCalculatorConfig,
    pub gas_estimator: GasEstimatorConfig,
    pub slippage_calculator: SlippageCalculatorConfig,
    pub profit_thresholds: HashMap<String, crate::types::ProfitThreshold>,
}

impl Default for MevCoreConfig {
    fn default() -> Self {
        MevCoreConfig {
            fork_pool: ForkPoolConfig::default(),
            worker_pool: WorkerPoolConfig::default(),
            metrics: MetricsConfig::default(),
            alert_manager: AlertManagerConfig::default(),
            shutdown_manager: ShutdownManagerConfig::default(),
            calibration: CalibrationConfig::default(),
            profit_calculator: ProfitCalculatorConfig::default(),
            gas_estimator: GasEstimatorConfig::default(),
            slippage_calculator: SlippageCalculatorConfig::default(),
            profit_thresholds: HashMap::new(),
        }
    }
}

impl MevCoreConfig {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: MevCoreConfig = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Overlays environment variables onto a base config. Only a handful of
    /// hot knobs are exposed this way, mirroring `FlashArbitrageConfig::from_env`.
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config = MevCoreConfig::default();
        if let Ok(v) = std::env::var("MEV_FORK_POOL_MIN_SIZE") {
            config.fork_pool.min_size = v.parse()?;
        }
        if let Ok(v) = std::env::var("MEV_FORK_POOL_MAX_SIZE") {
            config.fork_pool.max_size = v.parse()?;
        }
        if let Ok(v) = std::env::var("MEV_WORKER_POOL_SIZE") {
            config.worker_pool.size = v.parse()?;
        }
        if let Ok(v) = std::env::var("MEV_SHUTDOWN_WARNING_RATE") {
            config.shutdown_manager.warning_rate = v.parse()?;
        }
        if let Ok(v) = std::env::var("MEV_SHUTDOWN_RATE") {
            config.shutdown_manager.shutdown_rate = v.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.fork_pool.min_size >= 1,
            "fork_pool.min_size must be >= 1"
        );
        anyhow::ensure!(
            self.fork_pool.max_size >= self.fork_pool.min_size,
            "fork_pool.max_size must be >= min_size"
        );
        anyhow::ensure!(self.worker_pool.size >= 1, "worker_pool.size must be >= 1");
        anyhow::ensure!(
            self.worker_pool.queue_size >= 1,
            "worker_pool.queue_size must be >= 1"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.shutdown_manager.warning_rate),
            "shutdown_manager.warning_rate must be in [0,1]"
        );
        anyhow::ensure!(
            (0.0..=1.0).contains(&self.shutdown_manager.shutdown_rate),
            "shutdown_manager.shutdown_rate must be in [0,1]"
        );
        anyhow::ensure!(
            self.shutdown_manager.shutdown_rate >= self.shutdown_manager.warning_rate,
            "shutdown_rate should not be below warning_rate"
        );
        anyhow::ensure!(
            self.calibration.outlier_threshold > 0.0,
            "calibration.outlier_threshold must be positive"
        );
        anyhow::ensure!(
            self.profit_calculator.monte_carlo_iterations >= 1,
            "profit_calculator.monte_carlo_iterations must be >= 1"
        );
        Ok(())
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Ok(Duration::from_secs_f64(secs))
    }
}

mod opt_duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_some(&d.map(|x| x.as_secs_f64()))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Duration>, D::Error> {
        let secs = Option::<f64>::deserialize(d)?;
        Ok(secs.map(Duration::from_secs_f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = MevCoreConfig::default();
        config.validate().expect("default config must be valid");
    }

    #[test]
    fn rejects_inverted_pool_bounds() {
        let mut config = MevCoreConfig::default();
        config.fork_pool.max_size = 1;
        config.fork_pool.min_size = 4;
        assert!(config.validate().is_err());
    }

    #[test]
    fn serialization_round_trip() {
        let config = MevCoreConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: MevCoreConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.fork_pool.min_size, config.fork_pool.min_size);
        assert_eq!(
            restored.worker_pool.queue_size,
            config.worker_pool.queue_size
        );
    }

    #[test]
    fn from_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = MevCoreConfig::default();
        config.save_to_file(&path).unwrap();
        let loaded = MevCoreConfig::from_file(&path).unwrap();
        assert_eq!(loaded.metrics.window_sizes, config.metrics.window_sizes);
    }
}
