//! Named tools, resources and prompts resolved at startup.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use fxshim_fx::FxError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// Tool description advertised to callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

/// Static text readable by name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Resource {
    pub name: String,
    pub description: String,
    #[serde(skip)]
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptArgument {
    pub name: String,
    pub description: String,
    pub required: bool,
}

/// Prompt description advertised to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptSchema {
    pub name: String,
    pub description: String,
    pub arguments: Vec<PromptArgument>,
}

/// A named text template filled from JSON arguments.
pub trait Prompt: Send + Sync {
    fn schema(&self) -> PromptSchema;

    fn render(&self, arguments: &Value) -> Result<String, ToolError>;
}

/// Errors reported back to the caller as `{error, error_code}`.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Unknown resource: {0}")]
    UnknownResource(String),

    #[error("Unknown prompt: {0}")]
    UnknownPrompt(String),

    #[error("Invalid argument `{field}`: {message}")]
    InvalidArgument { field: String, message: String },

    #[error(transparent)]
    Fx(#[from] FxError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ToolError {
    pub fn invalid_argument(field: impl Into<String>, message: impl Into<String>) -> Self {
        ToolError::InvalidArgument {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Get error code for tool responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ToolError::UnknownTool(_) => "UNKNOWN_TOOL",
            ToolError::UnknownResource(_) => "UNKNOWN_RESOURCE",
            ToolError::UnknownPrompt(_) => "UNKNOWN_PROMPT",
            ToolError::InvalidArgument { .. } => "INVALID_ARGUMENT",
            ToolError::Fx(e) => e.error_code(),
            ToolError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "error": self.to_string(),
            "error_code": self.error_code(),
        })
    }
}

/// A named operation callable with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Get the tool schema.
    fn schema(&self) -> ToolSchema;

    /// Execute the tool with given arguments.
    async fn call(&self, arguments: Value) -> Result<Value, ToolError>;
}

/// Tools, resources and prompts keyed by name.
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    resources: BTreeMap<String, Resource>,
    prompts: BTreeMap<String, Arc<dyn Prompt>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            resources: BTreeMap::new(),
            prompts: BTreeMap::new(),
        }
    }

    /// Register a tool under its schema name, replacing any previous one.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.schema().name;
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replaced previously registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn list_schemas(&self) -> Vec<ToolSchema> {
        self.tools.values().map(|t| t.schema()).collect()
    }

    pub fn register_resource(&mut self, resource: Resource) {
        self.resources.insert(resource.name.clone(), resource);
    }

    pub fn register_prompt(&mut self, prompt: Arc<dyn Prompt>) {
        self.prompts.insert(prompt.schema().name, prompt);
    }

    pub fn list_resources(&self) -> Vec<&Resource> {
        self.resources.values().collect()
    }

    pub fn list_prompts(&self) -> Vec<PromptSchema> {
        self.prompts.values().map(|p| p.schema()).collect()
    }

    pub fn read_resource(&self, name: &str) -> Result<&Resource, ToolError> {
        self.resources
            .get(name)
            .ok_or_else(|| ToolError::UnknownResource(name.to_string()))
    }

    /// Fill a prompt template by name.
    pub fn render_prompt(&self, name: &str, arguments: &Value) -> Result<String, ToolError> {
        self.prompts
            .get(name)
            .ok_or_else(|| ToolError::UnknownPrompt(name.to_string()))?
            .render(arguments)
    }

    /// Call a tool by name; failures come back as `{error, error_code}`.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> Value {
        let result = match self.get(name) {
            Some(tool) => tool.call(arguments).await,
            None => Err(ToolError::UnknownTool(name.to_string())),
        };

        match result {
            Ok(value) => value,
            Err(e) => {
                debug!(tool = name, error = %e, code = e.error_code(), "Tool call rejected");
                e.to_json()
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub fn json_schema_object(properties: Value, required: Vec<&str>) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required
    })
}

pub fn json_schema_string(description: &str) -> Value {
    json!({
        "type": "string",
        "description": description
    })
}

pub fn json_schema_number(description: &str) -> Value {
    json!({
        "type": "number",
        "description": description
    })
}

/// Fetch a required string argument.
pub fn string_arg<'a>(arguments: &'a Value, field: &str) -> Result<&'a str, ToolError> {
    arguments
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| ToolError::invalid_argument(field, "expected a string"))
}

/// Fetch an optional string argument, using `default` when absent.
pub fn string_arg_or<'a>(
    arguments: &'a Value,
    field: &str,
    default: &'a str,
) -> Result<&'a str, ToolError> {
    match arguments.get(field) {
        None | Some(Value::Null) => Ok(default),
        Some(_) => string_arg(arguments, field),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl Tool for Echo {
        fn schema(&self) -> ToolSchema {
            ToolSchema {
                name: "echo".to_string(),
                description: "Returns its `text` argument".to_string(),
                input_schema: json_schema_object(
                    json!({ "text": json_schema_string("Text to echo") }),
                    vec!["text"],
                ),
            }
        }

        async fn call(&self, arguments: Value) -> Result<Value, ToolError> {
            Ok(json!(string_arg(&arguments, "text")?))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Echo));
        registry
    }

    #[tokio::test]
    async fn test_dispatch_by_name() {
        let registry = registry();

        assert!(registry.contains("echo"));
        assert_eq!(registry.names(), vec!["echo"]);
        assert_eq!(
            registry.dispatch("echo", json!({ "text": "hi" })).await,
            json!("hi")
        );
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let response = registry().dispatch("missing", json!({})).await;

        assert_eq!(response["error_code"], "UNKNOWN_TOOL");
        assert_eq!(response["error"], "Unknown tool: missing");
    }

    #[tokio::test]
    async fn test_invalid_argument() {
        let response = registry().dispatch("echo", json!({ "text": 5 })).await;

        assert_eq!(response["error_code"], "INVALID_ARGUMENT");
    }

    #[test]
    fn test_unknown_resource_and_prompt() {
        let registry = registry();

        let err = registry.read_resource("nothing").unwrap_err();
        assert_eq!(err.error_code(), "UNKNOWN_RESOURCE");

        let err = registry.render_prompt("nothing", &json!({})).unwrap_err();
        assert_eq!(err.to_json()["error"], "Unknown prompt: nothing");
    }

    #[test]
    fn test_string_arg_or_default() {
        assert_eq!(string_arg_or(&json!({}), "lang", "English").unwrap(), "English");
        assert_eq!(string_arg_or(&json!({ "lang": "French" }), "lang", "English").unwrap(), "French");
        assert!(string_arg_or(&json!({ "lang": 1 }), "lang", "English").is_err());
    }

    #[test]
    fn test_schema_serialization() {
        let schema = serde_json::to_value(Echo.schema()).unwrap();

        assert_eq!(schema["name"], "echo");
        assert_eq!(schema["inputSchema"]["required"], json!(["text"]));
    }
}
