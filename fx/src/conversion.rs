//! Currency conversion types and operations.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fxshim_common::{CurrencyPair, Money, Rate};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{info, instrument};

use crate::error::{FxError, FxResult};
use crate::resolver::{Freshness, Resolver};

/// Amount of base currency to convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionRequest {
    pub amount: Decimal,
}

impl ConversionRequest {
    pub fn new(amount: Decimal) -> Self {
        Self { amount }
    }

    /// Parse an amount from text, accepting plain and scientific notation.
    pub fn parse(text: &str) -> FxResult<Self> {
        let text = text.trim();
        Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .map(Self::new)
            .map_err(|_| FxError::InvalidAmount(format!("{:?} is not a decimal number", text)))
    }
}

impl From<Decimal> for ConversionRequest {
    fn from(amount: Decimal) -> Self {
        Self::new(amount)
    }
}

/// Represents a completed currency conversion.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionResult {
    /// Input amount.
    pub input: Money,
    /// Output amount, rounded to the quote currency's minor units.
    pub output: Money,
    /// Rate used for conversion.
    pub rate: Rate,
    /// Tier the rate came from.
    pub freshness: Freshness,
    /// When the conversion was computed.
    pub computed_at: DateTime<Utc>,
}

/// Converts amounts with whatever rate the resolver provides.
pub struct ConversionService {
    resolver: Arc<Resolver>,
}

impl ConversionService {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self { resolver }
    }

    pub fn pair(&self) -> &CurrencyPair {
        self.resolver.pair()
    }

    /// Convert an amount of the base currency into the quote currency.
    ///
    /// Negative amounts are rejected before any rate is resolved.
    #[instrument(skip(self), fields(pair = %self.pair(), amount = %request.amount))]
    pub async fn convert(&self, request: ConversionRequest) -> FxResult<ConversionResult> {
        if request.amount < Decimal::ZERO {
            return Err(FxError::NegativeAmount(request.amount));
        }

        let resolved = self.resolver.get_rate().await;
        let input = Money::new(request.amount, self.pair().base.clone());
        let output = resolved.rate.convert(&input)?;

        info!(
            output = %output,
            rate = %resolved.rate.value(),
            freshness = %resolved.freshness,
            "Conversion completed"
        );

        Ok(ConversionResult {
            input,
            output,
            rate: resolved.rate,
            freshness: resolved.freshness,
            computed_at: Utc::now(),
        })
    }
}
