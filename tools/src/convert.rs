//! USD to EUR conversion tool.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fxshim_fx::provider::decimal_from_json;
use fxshim_fx::{ConversionRequest, ConversionResult, ConversionService, Freshness, FxError};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};

use crate::registry::{json_schema_number, json_schema_object, Tool, ToolError, ToolSchema};

pub const CONVERT_USD_TO_EUR: &str = "convert_usd_to_eur";

/// Response body of a successful conversion.
///
/// Amounts are written as exact JSON numbers, never through `f64`.
#[derive(Debug, Clone, Serialize)]
pub struct ConversionPayload {
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub usd_amount: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub eur_amount: Decimal,
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub exchange_rate: Decimal,
    pub timestamp: DateTime<Utc>,
    pub source: Freshness,
}

impl From<&ConversionResult> for ConversionPayload {
    fn from(result: &ConversionResult) -> Self {
        Self {
            usd_amount: result.input.value,
            eur_amount: result.output.value,
            exchange_rate: result.rate.value(),
            timestamp: result.computed_at,
            source: result.freshness,
        }
    }
}

/// Read `amount` as a number or numeric string.
fn parse_amount(arguments: &Value) -> Result<ConversionRequest, FxError> {
    match arguments.get("amount") {
        None | Some(Value::Null) => Err(FxError::InvalidAmount("`amount` is required".to_string())),
        Some(Value::String(text)) => ConversionRequest::parse(text),
        Some(value) => decimal_from_json(value)
            .map(ConversionRequest::new)
            .ok_or_else(|| FxError::InvalidAmount(format!("{} is not a number", value))),
    }
}

/// Converts a USD amount to EUR with the resolved rate.
pub struct ConvertUsdToEurTool {
    service: Arc<ConversionService>,
}

impl ConvertUsdToEurTool {
    pub fn new(service: Arc<ConversionService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Tool for ConvertUsdToEurTool {
    fn schema(&self) -> ToolSchema {
        ToolSchema {
            name: CONVERT_USD_TO_EUR.to_string(),
            description: "Convert a USD amount to EUR using the current exchange rate. \
                          The `source` field reports whether the rate is live or a fallback."
                .to_string(),
            input_schema: json_schema_object(
                json!({ "amount": json_schema_number("Amount in USD, zero or greater") }),
                vec!["amount"],
            ),
        }
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let request = parse_amount(&arguments)?;
        let result = self.service.convert(request).await?;

        serde_json::to_value(ConversionPayload::from(&result))
            .map_err(|e| ToolError::Internal(e.to_string()))
    }
}
