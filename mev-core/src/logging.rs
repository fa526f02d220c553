//! Standardized emoji logging for the MEV core.
//!
//! Provides consistent emoji usage across fork management, strategy
//! detection, profitability, and alerting so operators can visually scan
//! log streams for the class of event without reading every line.

/// Standard emoji set for MEV core logging.
pub struct LogEmoji;

impl LogEmoji {
    // Status indicators
    pub const SUCCESS: &'static str = "✅";
    pub const ERROR: &'static str = "❌";
    pub const WARNING: &'static str = "⚠️";
    pub const INFO: &'static str = "ℹ️";

    // Module-specific
    pub const SEARCH: &'static str = "🔍"; // detection/analysis
    pub const CHART: &'static str = "📊"; // metrics
    pub const EXECUTE: &'static str = "⚡"; // opportunity/execution plan
    pub const MONEY: &'static str = "💰"; // profit
    pub const FORK: &'static str = "🍴"; // fork lifecycle
    pub const GAS: &'static str = "⛽"; // gas price/cost
    pub const CLOCK: &'static str = "⏱️"; // timing/latency
    pub const SHUTDOWN: &'static str = "🛑"; // circuit breaker / shutdown
    pub const ALERT: &'static str = "🚨"; // alerts
}

#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::SUCCESS, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        tracing::error!("{} {}", $crate::logging::LogEmoji::ERROR, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_search {
    ($($arg:tt)*) => {
        tracing::debug!("{} {}", $crate::logging::LogEmoji::SEARCH, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_metrics {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::CHART, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_execution {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::EXECUTE, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_profit {
    ($($arg:tt)*) => {
        tracing::info!("{} {}", $crate::logging::LogEmoji::MONEY, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_fork {
    ($($arg:tt)*) => {
        tracing::debug!("{} {}", $crate::logging::LogEmoji::FORK, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_shutdown {
    ($($arg:tt)*) => {
        tracing::warn!("{} {}", $crate::logging::LogEmoji::SHUTDOWN, format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_alert {
    ($($arg:tt)*) => {
        tracing::warn!("{} {}", $crate::logging::LogEmoji::ALERT, format!($($arg)*))
    };
}
