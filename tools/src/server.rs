//! Line-delimited JSON front end for the tool registry.
//!
//! Each input line is a call `{"tool": ..., "arguments": {...}, "id": ...}`.
//! Each call produces exactly one output line. Calls run concurrently, up to
//! a fixed limit, so responses may be written out of order; callers match
//! them by `id`.
//!
//! Besides registered tools, a few reserved names are answered directly:
//! `list_tools`, `list_resources`, `list_prompts`, `get_resource`,
//! `get_prompt` and `health`.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info};

use crate::registry::{string_arg, ToolError, ToolRegistry};

/// Reserved call name returning the registered tool schemas.
pub const LIST_TOOLS: &str = "list_tools";
pub const LIST_RESOURCES: &str = "list_resources";
pub const LIST_PROMPTS: &str = "list_prompts";
pub const GET_RESOURCE: &str = "get_resource";
pub const GET_PROMPT: &str = "get_prompt";
pub const HEALTH: &str = "health";

/// Calls allowed to run at once; further lines wait for a free slot.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

const SERVICE_NAME: &str = "fxshim";

#[derive(Debug, Clone, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub arguments: Value,
    #[serde(default)]
    pub id: Option<Value>,
}

/// Handle a single request line.
pub async fn handle_line(registry: &ToolRegistry, line: &str) -> Value {
    let call: ToolCall = match serde_json::from_str(line) {
        Ok(call) => call,
        Err(e) => {
            return json!({
                "error": format!("Invalid request: {}", e),
                "error_code": "INVALID_REQUEST",
            })
        }
    };

    debug!(tool = %call.tool, "Handling tool call");

    let result = match reserved_call(registry, &call.tool, &call.arguments) {
        Some(Ok(value)) => value,
        Some(Err(e)) => e.to_json(),
        None => registry.dispatch(&call.tool, call.arguments).await,
    };

    match call.id {
        Some(id) => json!({ "id": id, "result": result }),
        None => result,
    }
}

/// Answer a reserved call, or `None` when `name` is an ordinary tool.
fn reserved_call(
    registry: &ToolRegistry,
    name: &str,
    arguments: &Value,
) -> Option<Result<Value, ToolError>> {
    let result = match name {
        LIST_TOOLS => Ok(json!({ "tools": registry.list_schemas() })),
        LIST_RESOURCES => Ok(json!({ "resources": registry.list_resources() })),
        LIST_PROMPTS => Ok(json!({ "prompts": registry.list_prompts() })),
        GET_RESOURCE => string_arg(arguments, "name")
            .and_then(|name| registry.read_resource(name))
            .map(|resource| json!({ "name": resource.name, "text": resource.text })),
        GET_PROMPT => string_arg(arguments, "name").and_then(|name| {
            let prompt_arguments = arguments.get("arguments").cloned().unwrap_or_else(|| json!({}));
            registry.render_prompt(name, &prompt_arguments).map(|prompt| {
                json!({ "prompt": prompt, "name": name, "arguments": prompt_arguments })
            })
        }),
        HEALTH => Ok(json!({
            "status": "healthy",
            "service": SERVICE_NAME,
            "version": env!("CARGO_PKG_VERSION"),
        })),
        _ => return None,
    };
    Some(result)
}

/// Serve calls from `reader` until EOF, writing responses to `writer`.
pub async fn serve<R, W>(registry: Arc<ToolRegistry>, reader: R, writer: W) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    serve_with_limit(registry, reader, writer, DEFAULT_MAX_IN_FLIGHT).await
}

/// Like [`serve`], running at most `max_in_flight` calls at once.
pub async fn serve_with_limit<R, W>(
    registry: Arc<ToolRegistry>,
    reader: R,
    writer: W,
    max_in_flight: usize,
) -> anyhow::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let permits = Arc::new(Semaphore::new(max_in_flight.max(1)));
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let writer_task = tokio::spawn(async move {
        let mut writer = writer;
        while let Some(line) = rx.recv().await {
            writer.write_all(line.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = reader.lines();
    let mut handled = 0u64;

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        handled += 1;

        let permit = permits.clone().acquire_owned().await?;
        let registry = registry.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            let response = handle_line(&registry, &line).await;
            match serde_json::to_string(&response) {
                Ok(encoded) => {
                    if tx.send(encoded).await.is_err() {
                        error!("Response writer closed");
                    }
                }
                Err(e) => error!(error = %e, "Failed to encode response"),
            }
        });
    }

    // Writer exits once every in-flight call has dropped its sender.
    drop(tx);
    writer_task.await??;

    info!(calls = handled, "Input closed");
    Ok(())
}
