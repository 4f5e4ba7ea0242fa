//! Error types for shared value types.

use crate::{Currency, CurrencyPair};
use rust_decimal::Decimal;
use thiserror::Error;

/// Violations of the value-type invariants.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// A rate must be strictly positive.
    #[error("Non-positive rate {value} for {pair}")]
    NonPositiveRate { pair: CurrencyPair, value: Decimal },

    /// Amount currency does not match the rate's base currency.
    #[error("Currency mismatch: expected {expected}, got {actual}")]
    CurrencyMismatch { expected: Currency, actual: Currency },

    /// The converted amount does not fit in a `Decimal`.
    #[error("Amount {amount} at rate {rate} is out of range")]
    AmountOutOfRange { amount: Decimal, rate: Decimal },
}

impl CommonError {
    /// Get error code for tool responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            CommonError::NonPositiveRate { .. } => "INVALID_RATE",
            CommonError::CurrencyMismatch { .. } => "CURRENCY_MISMATCH",
            CommonError::AmountOutOfRange { .. } => "AMOUNT_OUT_OF_RANGE",
        }
    }
}
