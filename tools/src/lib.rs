//! fxshim tools
//!
//! Named tool handlers exposed over a line-delimited JSON interface:
//! `convert_usd_to_eur`, `count_words` and `to_uppercase`, plus the
//! `example-text` resource and the `summarize_prompt` prompt.

pub mod registry;
pub mod convert;
pub mod text;
pub mod server;

use std::sync::Arc;

use fxshim_fx::ConversionService;

pub use registry::{Prompt, PromptSchema, Resource, Tool, ToolError, ToolRegistry, ToolSchema};
pub use convert::ConvertUsdToEurTool;
pub use text::{example_text_resource, CountWordsTool, SummarizePrompt, ToUppercaseTool};
pub use server::{handle_line, serve, serve_with_limit, ToolCall, LIST_TOOLS};

/// Registry with every built-in tool, resource and prompt.
pub fn default_registry(service: Arc<ConversionService>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(ConvertUsdToEurTool::new(service)));
    registry.register(Arc::new(CountWordsTool));
    registry.register(Arc::new(ToUppercaseTool));
    registry.register_resource(example_text_resource());
    registry.register_prompt(Arc::new(SummarizePrompt));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use fxshim_common::CurrencyPair;
    use fxshim_fx::{MockRateSource, RateCache, Resolver, SourceChain};
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[tokio::test]
    async fn test_default_registry_end_to_end() {
        let resolver = Resolver::new(
            CurrencyPair::usd_eur(),
            Arc::new(SourceChain::new(vec![Arc::new(MockRateSource::returning(
                "primary",
                dec!(0.8532),
            ))])),
            Arc::new(RateCache::new()),
            dec!(0.85),
        )
        .unwrap();
        let registry = default_registry(Arc::new(ConversionService::new(Arc::new(resolver))));

        assert_eq!(
            registry.names(),
            vec!["convert_usd_to_eur", "count_words", "to_uppercase"]
        );
        assert!(registry.read_resource("example-text").is_ok());
        assert_eq!(registry.list_prompts()[0].name, "summarize_prompt");

        let response = handle_line(
            &registry,
            r#"{"id": "a", "tool": "convert_usd_to_eur", "arguments": {"amount": -5}}"#,
        )
        .await;
        assert_eq!(response["id"], "a");
        assert_eq!(response["result"]["error_code"], "NEGATIVE_AMOUNT");

        let response = registry
            .dispatch("convert_usd_to_eur", json!({ "amount": "100" }))
            .await;
        assert_eq!(response["eur_amount"].to_string(), "85.32");
    }
}
