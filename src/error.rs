// Error taxonomy for the engine boundary.
//
// Pure computations (numerics, strategies, risk gate) return these as
// ordinary `Result` values; I/O layers (broker, store) surface the same
// variants up to the top-level handler, which is the only place they get
// translated into a transport-specific response. Nothing here is ever
// swallowed silently — see each call site's `log::warn!`/`log::error!`.

use crate::domain::signal::Strategy;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed option symbol or out-of-range numeric input.
    /// Rejected at the boundary, never retried.
    #[error("invalid input: {0}")]
    InputError(String),

    /// A §3 precondition was not met (IV history too short, outside the
    /// entry window, fewer than six momentum conditions). Not a failure —
    /// callers treat this as "no signal".
    #[error("precondition not met: {0}")]
    PreconditionNotMet(String),

    /// A circuit breaker tripped. No side effects occurred.
    #[error("risk denied: {0}")]
    RiskDenied(String),

    /// Network error or 5xx from the broker. Retried with backoff by the
    /// caller; this variant is only ever returned once the retry budget
    /// is exhausted.
    #[error("broker transient error: {0}")]
    BrokerTransient(String),

    /// The broker rejected an order on policy grounds. Surfaced
    /// immediately, never retried; for multi-leg orders this triggers an
    /// unwind of whatever legs had already filled.
    #[error("broker rejected order: {0}")]
    BrokerRejected(String),

    /// Newton-Raphson failed to converge and the bisection fallback found
    /// the quote inconsistent with intrinsic value (ask < intrinsic).
    #[error("implied volatility did not converge for {symbol}")]
    IVNotConverged { symbol: String },

    /// Fewer than 20 daily IV samples in the trailing 90-day window.
    #[error("insufficient IV history for {symbol}: {samples} samples")]
    IVHistoryInsufficient { symbol: String, samples: usize },

    /// The store adapter failed after its own internal retries. Any
    /// speculative in-memory state for the current operation is
    /// discarded; a monitor cycle hitting this is skipped entirely.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A §3 invariant was violated (e.g. a spread position with anything
    /// but 4 legs). Fatal: log, abort the operation, require operator
    /// attention. Never self-heals.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl EngineError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        EngineError::Invariant(msg.into())
    }
}

/// IV history / convergence failures are treated as `PreconditionNotMet`
/// once they reach a signal generator.
pub fn as_precondition(strategy: Strategy, err: &EngineError) -> Option<String> {
    match err {
        EngineError::IVNotConverged { symbol } => {
            Some(format!("{strategy:?}: IV did not converge for {symbol}"))
        }
        EngineError::IVHistoryInsufficient { symbol, samples } => Some(format!(
            "{strategy:?}: only {samples} IV samples for {symbol}, need >= 20"
        )),
        _ => None,
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
