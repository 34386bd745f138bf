//! MCP HTTP transport: a single `POST /` endpoint that accepts one
//! JSON-RPC request object and returns one JSON-RPC response object.
//! Streaming (NDJSON) responses are not implemented — every tool this
//! bridge exposes returns a single bounded result, not a progressive one.

use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use lspbridge_tools::ToolContext;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::registry;

#[derive(Clone)]
struct AppState {
    ctx: ToolContext,
}

pub async fn serve(ctx: ToolContext, port: u16, shutdown: CancellationToken) -> std::io::Result<()> {
    let state = Arc::new(AppState { ctx });
    let app = Router::new()
        .route("/", post(handle_request))
        .with_state(state);

    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(%port, "mcp http server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

async fn handle_request(
    State(state): State<Arc<AppState>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    let id = body.get("id").cloned().unwrap_or(Value::Null);
    let method = body.get("method").and_then(|v| v.as_str()).unwrap_or("");
    let params = body.get("params").cloned().unwrap_or(json!({}));

    let result = match method {
        "tools/list" => {
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
            Ok(json!({ "tools": tools }))
        }
        "tools/call" => {
            let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
            let arguments = params.get("arguments").cloned().unwrap_or(json!({}));
            match registry::dispatch(&state.ctx, name, arguments).await {
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
        other => Err(format!("unknown method: {other}")),
    };

    let body = match result {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(message) => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": message },
        }),
    };
    Json(body)
}
