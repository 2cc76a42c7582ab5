use crate::error::ToolError;
use serde_json::Value;

// Drop pagination hints that carry no information: when has_more is
// false/missing, has_more and next_page go, and an empty meta goes too.
fn prune_meta(structured: &mut Value) {
    let Some(obj) = structured.as_object_mut() else {
        return;
    };
    let Some(meta_obj) = obj.get_mut("meta").and_then(Value::as_object_mut) else {
        return;
    };

    let has_more = meta_obj
        .get("has_more")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    if !has_more {
        meta_obj.remove("has_more");
        meta_obj.remove("next_page");
    }
    if meta_obj.is_empty() {
        obj.remove("meta");
    }
}

// Build an MCP-compliant result envelope for tools/call outputs.
// - content: always a single text block so clients can render something.
// - structuredContent: the result entity, or {error: ErrorShape}.
// - isError: included only when true to keep payloads small.
pub fn mcp_wrap(mut structured: Value, text_opt: Option<String>, is_error: bool) -> Value {
    prune_meta(&mut structured);
    let text = match text_opt {
        Some(s) => s,
        None => serde_json::to_string(&structured).unwrap_or_else(|_| "{}".to_string()),
    };
    let mut obj = serde_json::json!({
        "content": [{ "type": "text", "text": text }],
        "structuredContent": structured,
    });
    if is_error {
        if let Some(map) = obj.as_object_mut() {
            map.insert("isError".to_string(), Value::Bool(true));
        }
    }
    obj
}

/// Envelope for a failed tool call; the text block is the error message.
pub fn mcp_error(err: &ToolError) -> Value {
    let shape = err.to_shape();
    let text = shape.message.clone();
    mcp_wrap(serde_json::json!({ "error": shape }), Some(text), true)
}
