use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::ToolError;
use crate::mcp::{mcp_error, mcp_wrap};
use crate::tools::*;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::io::{self, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

// Minimal JSON-RPC 2.0 types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum Id {
    Str(String),
    Num(i64),
    Null,
}

#[derive(Debug, Serialize, Deserialize)]
struct Request {
    #[serde(default)]
    jsonrpc: String,
    method: String,
    #[serde(default)]
    params: Value,
    id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Response {
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<RpcError>,
    id: Option<Id>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

fn rpc_error(id: Option<Id>, code: i64, message: &str, data: Option<Value>) -> Response {
    let error = RpcError { code, message: message.into(), data };
    Response { jsonrpc: "2.0".into(), result: None, error: Some(error), id }
}

fn rpc_ok(id: Option<Id>, result: Value) -> Response {
    Response { jsonrpc: "2.0".into(), result: Some(result), error: None, id }
}

/// Serve JSON-RPC over stdin/stdout until EOF.
pub async fn run_stdio_server(cfg: &Config) -> anyhow::Result<()> {
    info!("Starting review-mcp stdio server; protocol={}", PROTOCOL_VERSION);
    for reason in &cfg.missing {
        info!("{}", reason);
    }
    let dispatcher = Dispatcher::from_config(cfg)?;
    let mut lines = BufReader::new(io::stdin()).lines();
    let mut out = io::stdout();
    while let Some(line) = lines.next_line().await? {
        if let Some(resp) = handle_line(&dispatcher, &line).await {
            write_response(&mut out, &resp).await?;
        }
    }
    debug!("stdin closed; shutting down");
    Ok(())
}

async fn handle_line(dispatcher: &Dispatcher, line: &str) -> Option<Response> {
    if line.trim().is_empty() {
        return None;
    }
    let req: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return Some(rpc_error(None, -32700, &format!("Parse error: {}", e), None)),
    };
    debug!("Received method={}", req.method);
    // Notifications never get a response, not even an error.
    let is_notification = req.id.is_none();
    let resp = dispatch(dispatcher, req).await;
    if is_notification {
        None
    } else {
        Some(resp)
    }
}

async fn write_response<W: AsyncWrite + Unpin>(out: &mut W, resp: &Response) -> anyhow::Result<()> {
    let mut payload = serde_json::to_vec(resp)?;
    payload.push(b'\n');
    out.write_all(&payload).await?;
    out.flush().await?;
    Ok(())
}

async fn dispatch(dispatcher: &Dispatcher, req: Request) -> Response {
    match req.method.as_str() {
        "initialize" => handle_initialize(req.id),
        "tools/list" => handle_tools_list(req.id),
        "tools/call" => handle_tools_call(dispatcher, req.id, req.params).await,
        "ping" => rpc_ok(req.id, serde_json::json!({})),
        other if other.starts_with("notifications/") => rpc_ok(req.id, Value::Null),
        other => rpc_error(req.id, -32601, &format!("Method not found: {}", other), None),
    }
}

fn handle_initialize(id: Option<Id>) -> Response {
    rpc_ok(
        id,
        serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": { "tools": {} },
            "serverInfo": {
                "name": "review-mcp",
                "version": env!("CARGO_PKG_VERSION"),
            }
        }),
    )
}

fn handle_tools_list(id: Option<Id>) -> Response {
    let tools = tool_descriptors();
    rpc_ok(id, serde_json::json!({ "tools": tools }))
}

#[derive(Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

async fn handle_tools_call(dispatcher: &Dispatcher, id: Option<Id>, params: Value) -> Response {
    let parsed: Result<ToolCallParams, _> = serde_json::from_value(params);
    let call = match parsed {
        Ok(c) => c,
        Err(e) => return rpc_error(id, -32602, &format!("Invalid params: {}", e), None),
    };
    match dispatcher.dispatch(&call.name, call.arguments).await {
        Ok(result) => rpc_ok(id, mcp_wrap(result, None, false)),
        Err(err) => tool_error_response(id, &err),
    }
}

fn tool_error_response(id: Option<Id>, err: &ToolError) -> Response {
    match err {
        ToolError::UnknownTool(name) => {
            rpc_error(id, -32601, &format!("Tool not found: {}", name), None)
        }
        ToolError::InvalidArgument(_) => {
            let data = serde_json::to_value(err.to_shape()).ok();
            rpc_error(id, -32602, &err.to_string(), data)
        }
        _ => rpc_ok(id, mcp_error(err)),
    }
}
