//! Error taxonomy for the MEV detection core.
//!
//! Component-local error enums use `thiserror`; callers at integration seams
//! (main wiring, background task supervisors) use `anyhow::Result`. Background
//! tasks never propagate these upward — they log and continue — so every
//! variant here is reachable only from a synchronous public operation.

use thiserror::Error;

/// Errors surfaced by `Fork` and `ForkManager` (C1/C2).
#[derive(Debug, Error)]
pub enum ForkError {
    #[error("fork {0} is unhealthy")]
    Unhealthy(String),

    #[error("fork reset failed: {0}")]
    ResetFailed(String),

    #[error("fork RPC call failed: {0}")]
    Rpc(String),

    #[error("fork {0} already closed")]
    Closed(String),
}

/// Errors surfaced by `ForkManager` pool operations.
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("acquire timed out after {0:?}")]
    AcquireTimeout(std::time::Duration),

    #[error("acquire cancelled")]
    Cancelled,

    #[error(transparent)]
    Fork(#[from] ForkError),

    #[error("pool exhausted: {busy} busy, {failed} failed, {max_size} max")]
    Exhausted {
        busy: usize,
        failed: usize,
        max_size: usize,
    },
}

/// Errors surfaced by `WorkerPool` (C5).
#[derive(Debug, Error)]
pub enum WorkerPoolError {
    #[error("job queue is full")]
    QueueFull,

    #[error("shutdown timed out after {0:?}, queue did not drain")]
    ShutdownTimeout(std::time::Duration),

    #[error("job {0} execution timed out")]
    JobTimeout(String),

    #[error("job {0} was cancelled")]
    JobCancelled(String),
}

/// Errors surfaced by `AlertManager` (C13).
#[derive(Debug, Error)]
pub enum AlertError {
    #[error("alert dispatch channel is full")]
    ChannelFull,

    #[error("alert rule {0} not found")]
    RuleNotFound(String),

    #[error("alert {0} not found")]
    AlertNotFound(String),

    #[error("sink dispatch failed: {0}")]
    SinkFailed(#[from] anyhow::Error),
}

/// Errors surfaced by `ShutdownManager` (C14).
#[derive(Debug, Error)]
pub enum ShutdownError {
    #[error("system already shutdown")]
    AlreadyShutdown,

    #[error("manual override is active")]
    ManualOverrideActive,

    #[error("restart is not permitted: can_restart=false")]
    RestartNotPermitted,

    #[error("restart attempted while not shutdown")]
    NotShutdown,

    #[error("manual override is disallowed by configuration")]
    OverrideDisallowed,

    #[error("metrics fetch failed: {0}")]
    MetricsFetch(String),
}

/// Rejected input to a public operation — never a panic.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("{field} is invalid: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("nil transaction passed to {op}")]
    NilTransaction { op: &'static str },
}

/// Errors surfaced by the event decoder (C3) for malformed-but-recognized logs.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("unrecognized protocol signature: {0}")]
    UnknownSignature(String),

    #[error("zero-input event rejected: {0}")]
    ZeroInput(String),

    #[error("malformed log payload: {0}")]
    Malformed(String),
}
