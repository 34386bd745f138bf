//! MCP stdio transport: the same `Content-Length` framing as the LSP
//! connection, just over this process's own stdin/stdout instead of a
//! child's pipes.

use std::sync::Arc;

use lspbridge_rpc::Dispatcher;
use lspbridge_tools::ToolContext;
use lspbridge_worker::HandlerPool;
use serde_json::json;
use tokio::io::Stdout;
use tracing::info;

use crate::registry;

/// Runs the MCP server over stdio until the input stream closes.
///
/// Returns once the dispatcher's reader task observes EOF (the MCP client
/// disconnected) or `close()` is called from elsewhere (graceful shutdown).
pub async fn serve(ctx: ToolContext, pool: Arc<HandlerPool>) -> lspbridge_rpc::Result<()> {
    let (dispatcher, handlers) =
        Dispatcher::<Stdout>::spawn(tokio::io::stdin(), tokio::io::stdout(), pool);

    let ctx_list = ctx.clone();
    handlers.on_request("tools/list", move |_params| {
        let tools: Vec<_> = registry::specs()
            .into_iter()
            .map(|s| {
                json!({
                    "name": s.name,
                    "description": s.description,
                    "inputSchema": s.input_schema,
                })
            })
            .collect();
        async move { Ok(json!({ "tools": tools })) }
    });

    let ctx_call = ctx_list.clone();
    handlers.on_request("tools/call", move |params| {
        let ctx = ctx_call.clone();
        async move {
            let name = params
                .get("name")
                .and_then(|v| v.as_str())
                .ok_or_else(|| lspbridge_rpc::Error::Protocol("missing tool name".into()))?
                .to_string();
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            match registry::dispatch(&ctx, &name, arguments).await {
                Ok(result) => Ok(json!({
                    "content": [{ "type": "text", "text": result.to_string() }],
                    "isError": false,
                })),
                Err(e) => Ok(json!({
                    "content": [{ "type": "text", "text": e.to_string() }],
                    "isError": true,
                })),
            }
        }
    });

    handlers.on_request("initialize", |_params| async move {
        Ok(json!({
            "protocolVersion": "2024-11-05",
            "serverInfo": { "name": "lspbridge", "version": env!("CARGO_PKG_VERSION") },
            "capabilities": { "tools": {} },
        }))
    });

    info!("mcp stdio server ready");
    dispatcher.wait_closed().await;
    Ok(())
}
