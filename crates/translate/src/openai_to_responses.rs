//! Chat Completions request → Responses request.

use modelgate_types::{PartialJson, Result};
use serde_json::{Value, json};

/// Translates an `OpenAI` chat completion request into a Responses API
/// request.
///
/// `messages` becomes `input`, `max_tokens` becomes `max_output_tokens`,
/// and nested function tools are flattened. All other fields, including
/// unknown extras, pass through unchanged.
///
/// # Errors
///
/// Returns a translation error only on serialization failure; missing
/// fields are tolerated (the upstream rejects incomplete requests itself).
pub fn request(mut body: PartialJson) -> Result<PartialJson> {
    if let Some(messages) = body.get::<Value>("messages") {
        body.remove("messages");
        body.set("input", &messages)?;
    }
    if let Some(max_tokens) = body.get::<Value>("max_tokens") {
        body.remove("max_tokens");
        body.set("max_output_tokens", &max_tokens)?;
    }
    if let Some(Value::Array(tools)) = body.get::<Value>("tools") {
        let flat: Vec<Value> = tools.iter().map(flatten_tool).collect();
        body.set("tools", &flat)?;
    }
    Ok(body)
}

/// Unwraps `{type: function, function: {name, …}}` into a flat tool spec.
fn flatten_tool(tool: &Value) -> Value {
    let is_function = tool.get("type").and_then(Value::as_str) == Some("function");
    let Some(func) = tool.get("function") else {
        return tool.clone();
    };
    if !is_function {
        return tool.clone();
    }
    let mut flat = json!({ "type": "function" });
    for key in ["name", "description", "parameters", "strict"] {
        if let Some(v) = func.get(key) {
            flat[key] = v.clone();
        }
    }
    flat
}
