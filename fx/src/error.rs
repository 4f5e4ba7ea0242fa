//! Rate pipeline error types.

use std::fmt;
use std::time::Duration;

use fxshim_common::{CommonError, CurrencyPair};
use rust_decimal::Decimal;
use thiserror::Error;

/// Errors surfaced to callers of the pipeline.
///
/// Source failures never appear here: the chain recovers from them and the
/// resolver degrades instead of failing.
#[derive(Debug, Error)]
pub enum FxError {
    /// Amount could not be interpreted as a decimal number.
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Amount to convert is below zero.
    #[error("Amount must not be negative, got {0}")]
    NegativeAmount(Decimal),

    /// Startup configuration is malformed.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value-type invariant was violated.
    #[error(transparent)]
    Rate(#[from] CommonError),
}

impl FxError {
    /// Get error code for tool responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            FxError::InvalidAmount(_) => "INVALID_AMOUNT",
            FxError::NegativeAmount(_) => "NEGATIVE_AMOUNT",
            FxError::Configuration(_) => "CONFIGURATION_ERROR",
            FxError::Rate(e) => e.error_code(),
        }
    }

    /// Whether the caller's input caused this error.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            FxError::InvalidAmount(_)
                | FxError::NegativeAmount(_)
                | FxError::Rate(CommonError::AmountOutOfRange { .. })
        )
    }
}

/// Result type for pipeline operations.
pub type FxResult<T> = Result<T, FxError>;

/// Why a single rate source did not produce a rate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceFailure {
    /// The call exceeded its time budget.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Connection, TLS or body transfer failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// The provider answered with a non-success HTTP status.
    #[error("unexpected HTTP status {0}")]
    Status(u16),

    /// The body could not be parsed or carried no usable rate.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The provider asked us to back off.
    #[error("rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },
}

impl SourceFailure {
    /// Short label used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceFailure::Timeout(_) => "timeout",
            SourceFailure::Transport(_) => "transport",
            SourceFailure::Status(_) => "status",
            SourceFailure::Malformed(_) => "malformed",
            SourceFailure::RateLimited { .. } => "rate_limited",
        }
    }
}

/// One failed attempt within a chain traversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAttempt {
    pub source: String,
    pub failure: SourceFailure,
}

impl fmt::Display for SourceAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.source, self.failure)
    }
}

/// Every enabled source failed (or none was enabled).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("All rate sources failed for {pair} ({} attempted)", .attempts.len())]
pub struct ChainFailure {
    pub pair: CurrencyPair,
    /// Individual failures, in the order the sources were tried.
    pub attempts: Vec<SourceAttempt>,
}

impl ChainFailure {
    /// Joined failure reasons for diagnostics.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no enabled rate sources".to_string();
        }

        self.attempts
            .iter()
            .map(|a| a.to_string())
            .collect::<Vec<_>>()
            .join("; ")
    }
}
