//! Plain text tools, the example text resource and the summary prompt.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::registry::{
    json_schema_object, json_schema_string, string_arg, string_arg_or, Prompt, PromptArgument,
    PromptSchema, Resource, Tool, ToolError, ToolSchema,
};

pub const EXAMPLE_TEXT: &str = "The quick brown fox jumps over the lazy dog. \
                                This sentence contains every letter of the alphabet.";

fn text_schema(name: &str, description: &str) -> ToolSchema {
    ToolSchema {
        name: name.to_string(),
        description: description.to_string(),
        input_schema: json_schema_object(
            json!({ "text": json_schema_string("Input text") }),
            vec!["text"],
        ),
    }
}

/// Counts whitespace-separated words.
pub struct CountWordsTool;

#[async_trait]
impl Tool for CountWordsTool {
    fn schema(&self) -> ToolSchema {
        text_schema("count_words", "Returns the number of words in the given text.")
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let text = string_arg(&arguments, "text")?;
        Ok(json!(text.split_whitespace().count()))
    }
}

pub struct ToUppercaseTool;

#[async_trait]
impl Tool for ToUppercaseTool {
    fn schema(&self) -> ToolSchema {
        text_schema("to_uppercase", "Converts the input text to uppercase.")
    }

    async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
        let text = string_arg(&arguments, "text")?;
        Ok(json!(text.to_uppercase()))
    }
}

/// Sample paragraph for callers to read.
pub fn example_text_resource() -> Resource {
    Resource {
        name: "example-text".to_string(),
        description: "A sample paragraph of text that agents can read.".to_string(),
        text: EXAMPLE_TEXT.to_string(),
    }
}

/// Asks for a summary of `text` in `language` (English by default).
pub struct SummarizePrompt;

impl SummarizePrompt {
    pub const DEFAULT_LANGUAGE: &'static str = "English";
}

impl Prompt for SummarizePrompt {
    fn schema(&self) -> PromptSchema {
        PromptSchema {
            name: "summarize_prompt".to_string(),
            description: "Generate a summary in the desired language by filling in \
                          `language` and `text`."
                .to_string(),
            arguments: vec![
                PromptArgument {
                    name: "language".to_string(),
                    description: "Language of the summary".to_string(),
                    required: false,
                },
                PromptArgument {
                    name: "text".to_string(),
                    description: "Text to summarize".to_string(),
                    required: false,
                },
            ],
        }
    }

    fn render(&self, arguments: &Value) -> Result<String, ToolError> {
        let language = string_arg_or(arguments, "language", Self::DEFAULT_LANGUAGE)?;
        let text = string_arg_or(arguments, "text", "")?;
        Ok(format!("Summarize the following text in {}:\n\n{}", language, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_count_words() {
        let result = CountWordsTool
            .call(json!({ "text": "The quick  brown\tfox\n" }))
            .await
            .unwrap();
        assert_eq!(result, json!(4));

        assert_eq!(CountWordsTool.call(json!({ "text": "" })).await.unwrap(), json!(0));
    }

    #[tokio::test]
    async fn test_to_uppercase() {
        let result = ToUppercaseTool.call(json!({ "text": "straße" })).await.unwrap();
        assert_eq!(result, json!("STRASSE"));
    }

    #[tokio::test]
    async fn test_count_words_on_example_text() {
        let resource = example_text_resource();
        let result = CountWordsTool
            .call(json!({ "text": resource.text }))
            .await
            .unwrap();

        assert_eq!(resource.name, "example-text");
        assert_eq!(result, json!(17));
    }

    #[test]
    fn test_summarize_prompt() {
        let rendered = SummarizePrompt
            .render(&json!({ "language": "French", "text": "Bonjour" }))
            .unwrap();
        assert_eq!(rendered, "Summarize the following text in French:\n\nBonjour");
    }

    #[test]
    fn test_summarize_prompt_defaults_to_english() {
        let rendered = SummarizePrompt.render(&json!({ "text": "Hi" })).unwrap();
        assert_eq!(rendered, "Summarize the following text in English:\n\nHi");

        let err = SummarizePrompt.render(&json!({ "language": 3 })).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_missing_text() {
        let err = ToUppercaseTool.call(json!({})).await.unwrap_err();
        assert_eq!(err.error_code(), "INVALID_ARGUMENT");
    }
}
