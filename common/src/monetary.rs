//! Monetary types for the rate pipeline.

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::CommonError;

/// A monetary amount with currency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Money {
    /// The amount value (high precision decimal).
    pub value: Decimal,
    /// ISO 4217 currency code.
    pub currency: Currency,
}

impl Money {
    /// Create a new Money instance.
    pub fn new(value: Decimal, currency: Currency) -> Self {
        Self { value, currency }
    }

    /// Create from a string value.
    pub fn from_str(value: &str, currency: Currency) -> Result<Self, rust_decimal::Error> {
        Ok(Self {
            value: value.parse()?,
            currency,
        })
    }

    /// Check if the amount is zero.
    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Round to the currency's minor units, ties to even.
    pub fn round(&self) -> Self {
        Self {
            value: self.value.round_dp_with_strategy(
                self.currency.decimal_places(),
                RoundingStrategy::MidpointNearestEven,
            ),
            currency: self.currency.clone(),
        }
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.currency)
    }
}

/// ISO 4217 currency code.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Currency(String);

impl Currency {
    /// Create a new currency from code.
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into().to_uppercase())
    }

    /// Get the currency code.
    pub fn code(&self) -> &str {
        &self.0
    }

    /// Get the standard decimal places for this currency.
    pub fn decimal_places(&self) -> u32 {
        match self.0.as_str() {
            "JPY" | "KRW" | "VND" => 0,
            "BHD" | "KWD" | "OMR" => 3,
            _ => 2,
        }
    }

    pub fn usd() -> Self {
        Self::new("USD")
    }

    pub fn eur() -> Self {
        Self::new("EUR")
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A currency pair: how many `quote` units buy one `base` unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CurrencyPair {
    /// Base currency (the one being converted from).
    pub base: Currency,
    /// Quote currency (the one being converted to).
    pub quote: Currency,
}

impl CurrencyPair {
    /// Create a new currency pair.
    pub fn new(base: Currency, quote: Currency) -> Self {
        Self { base, quote }
    }

    /// The USD/EUR pair served by the conversion tool.
    pub fn usd_eur() -> Self {
        Self::new(Currency::usd(), Currency::eur())
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// An exchange rate observed from one source at one instant.
///
/// The value is always strictly positive; construction fails otherwise.
/// Fields are private so a rate cannot be altered after it is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rate {
    pair: CurrencyPair,
    value: Decimal,
    source: String,
    obtained_at: DateTime<Utc>,
}

impl Rate {
    /// Create a rate obtained now.
    pub fn new(
        pair: CurrencyPair,
        value: Decimal,
        source: impl Into<String>,
    ) -> Result<Self, CommonError> {
        Self::observed_at(pair, value, source, Utc::now())
    }

    /// Create a rate obtained at a specific instant.
    pub fn observed_at(
        pair: CurrencyPair,
        value: Decimal,
        source: impl Into<String>,
        obtained_at: DateTime<Utc>,
    ) -> Result<Self, CommonError> {
        if value <= Decimal::ZERO {
            return Err(CommonError::NonPositiveRate { pair, value });
        }

        Ok(Self {
            pair,
            value,
            source: source.into(),
            obtained_at,
        })
    }

    pub fn pair(&self) -> &CurrencyPair {
        &self.pair
    }

    /// Units of quote currency per one unit of base currency.
    pub fn value(&self) -> Decimal {
        self.value
    }

    /// Name of the source that produced this rate.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn obtained_at(&self) -> DateTime<Utc> {
        self.obtained_at
    }

    /// Convert an amount in the base currency, rounded to the quote's minor units.
    pub fn convert(&self, amount: &Money) -> Result<Money, CommonError> {
        if amount.currency != self.pair.base {
            return Err(CommonError::CurrencyMismatch {
                expected: self.pair.base.clone(),
                actual: amount.currency.clone(),
            });
        }

        let value = amount
            .value
            .checked_mul(self.value)
            .ok_or_else(|| CommonError::AmountOutOfRange {
                amount: amount.value,
                rate: self.value,
            })?;

        Ok(Money::new(value, self.pair.quote.clone()).round())
    }
}

impl fmt::Display for Rate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} ({})", self.pair, self.value, self.source)
    }
}
