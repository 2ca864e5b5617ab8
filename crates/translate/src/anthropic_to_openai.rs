//! Anthropic Messages → Chat Completions, request, response, and
//! streaming chunk.

use modelgate_types::{PartialJson, Result};
use serde_json::{Value, json};

/// Maps an Anthropic `stop_reason` to a Chat `finish_reason`.
fn map_stop_reason(stop: Option<&str>) -> &'static str {
    match stop {
        Some("max_tokens") => "length",
        Some("tool_use") => "tool_calls",
        _ => "stop",
    }
}

/// Maps Anthropic usage to Chat usage.
fn map_usage(usage: &Value) -> Value {
    let input = usage
        .get("input_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let output = usage
        .get("output_tokens")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    json!({
        "prompt_tokens": input,
        "completion_tokens": output,
        "total_tokens": input + output,
    })
}

/// Translates an Anthropic Messages request into an `OpenAI` chat
/// completion request.
///
/// The top-level `system` field is injected as a leading system message;
/// content blocks are folded into string content, tool-call arrays, and
/// `role: tool` result messages; flat tools become nested function tools.
///
/// # Errors
///
/// Returns a translation error on serialization failure.
pub fn request(body: &PartialJson) -> Result<PartialJson> {
    let mut out = body.clone();
    let mut messages: Vec<Value> = Vec::new();

    if let Some(system) = body.get::<Value>("system") {
        let text = match &system {
            Value::String(s) => s.clone(),
            Value::Array(parts) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(Value::as_str))
                .collect::<Vec<_>>()
                .join("\n"),
            _ => String::new(),
        };
        if !text.is_empty() {
            messages.push(json!({"role": "system", "content": text}));
        }
        out.remove("system");
    }

    for m in body.get::<Vec<Value>>("messages").unwrap_or_default() {
        let role = m.get("role").and_then(Value::as_str).unwrap_or("user");
        match m.get("content") {
            Some(Value::Array(blocks)) => unfold_blocks(role, blocks, &mut messages),
            Some(content) => messages.push(json!({"role": role, "content": content.clone()})),
            None => messages.push(json!({"role": role, "content": ""})),
        }
    }
    out.set("messages", &messages)?;

    if let Some(tools) = body.get::<Vec<Value>>("tools") {
        let nested: Vec<Value> = tools
            .iter()
            .map(|t| {
                let mut func = json!({
                    "name": t.get("name").cloned().unwrap_or(Value::Null),
                    "parameters": t
                        .get("input_schema")
                        .cloned()
                        .unwrap_or_else(|| json!({"type": "object"})),
                });
                if let Some(desc) = t.get("description") {
                    func["description"] = desc.clone();
                }
                json!({"type": "function", "function": func})
            })
            .collect();
        out.set("tools", &nested)?;
    }

    Ok(out)
}

/// Unfolds one Anthropic content-block array into Chat messages.
fn unfold_blocks(role: &str, blocks: &[Value], messages: &mut Vec<Value>) {
    let mut text = String::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    for block in blocks {
        match block.get("type").and_then(Value::as_str) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(Value::as_str) {
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let input = block.get("input").cloned().unwrap_or_else(|| json!({}));
                tool_calls.push(json!({
                    "id": block.get("id").and_then(Value::as_str).unwrap_or(""),
                    "type": "function",
                    "function": {
                        "name": block.get("name").and_then(Value::as_str).unwrap_or(""),
                        "arguments": input.to_string(),
                    }
                }));
            }
            Some("tool_result") => {
                let content = block
                    .get("content")
                    .cloned()
                    .unwrap_or_else(|| Value::String(String::new()));
                messages.push(json!({
                    "role": "tool",
                    "tool_call_id": block
                        .get("tool_use_id")
                        .and_then(Value::as_str)
                        .unwrap_or(""),
                    "content": content,
                }));
            }
            _ => {}
        }
    }

    if !text.is_empty() || !tool_calls.is_empty() {
        let mut msg = json!({"role": role, "content": text});
        if !tool_calls.is_empty() {
            msg["tool_calls"] = Value::Array(tool_calls);
            if msg["content"] == json!("") {
                msg["content"] = Value::Null;
            }
        }
        messages.push(msg);
    }
}

/// Translates an Anthropic Messages response into an `OpenAI` chat
/// completion response.
///
/// # Errors
///
/// Returns a translation error on serialization failure.
pub fn response(body: &PartialJson) -> Result<PartialJson> {
    let blocks = body.get::<Vec<Value>>("content").unwrap_or_default();

    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();

    let tool_calls: Vec<Value> = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("tool_use"))
        .map(|b| {
            let input = b.get("input").cloned().unwrap_or_else(|| json!({}));
            json!({
                "id": b.get("id").and_then(Value::as_str).unwrap_or(""),
                "type": "function",
                "function": {
                    "name": b.get("name").and_then(Value::as_str).unwrap_or(""),
                    "arguments": input.to_string(),
                }
            })
        })
        .collect();

    let mut message = json!({"role": "assistant", "content": text});
    let finish_reason = if tool_calls.is_empty() {
        map_stop_reason(body.get::<String>("stop_reason").as_deref())
    } else {
        message["tool_calls"] = Value::Array(tool_calls);
        "tool_calls"
    };

    let usage = body.get::<Value>("usage").unwrap_or_else(|| json!({}));
    let out = json!({
        "id": body.get::<String>("id").unwrap_or_default(),
        "object": "chat.completion",
        "model": body.get::<String>("model").unwrap_or_default(),
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason,
        }],
        "usage": map_usage(&usage),
    });
    PartialJson::from_value(&out)
}

/// Translates one Anthropic streaming event into a Chat Completions
/// chunk. `ping`, `content_block_stop`, `message_stop`, and unknown
/// events produce no chunk.
///
/// # Errors
///
/// Returns a translation error on serialization failure.
pub fn response_chunk(chunk: &PartialJson) -> Result<Option<PartialJson>> {
    let event_type = chunk.get::<String>("type").unwrap_or_default();
    let block_index = chunk.get::<u64>("index").unwrap_or(0);

    let out = match event_type.as_str() {
        "message_start" => {
            let message = chunk.get::<Value>("message").unwrap_or(Value::Null);
            let mut v = chat_chunk(json!({"role": "assistant", "content": ""}), None);
            if let Some(id) = message.get("id") {
                v["id"] = id.clone();
            }
            if let Some(model) = message.get("model") {
                v["model"] = model.clone();
            }
            v
        }
        "content_block_start" => {
            let block = chunk.get::<Value>("content_block").unwrap_or(Value::Null);
            if block.get("type").and_then(Value::as_str) != Some("tool_use") {
                return Ok(None);
            }
            chat_chunk(
                json!({"tool_calls": [{
                    "index": block_index,
                    "id": block.get("id").and_then(Value::as_str).unwrap_or(""),
                    "type": "function",
                    "function": {
                        "name": block.get("name").and_then(Value::as_str).unwrap_or(""),
                        "arguments": "",
                    }
                }]}),
                None,
            )
        }
        "content_block_delta" => {
            let delta = chunk.get::<Value>("delta").unwrap_or(Value::Null);
            match delta.get("type").and_then(Value::as_str) {
                Some("text_delta") => chat_chunk(
                    json!({"content": delta.get("text").and_then(Value::as_str).unwrap_or("")}),
                    None,
                ),
                Some("input_json_delta") => chat_chunk(
                    json!({"tool_calls": [{
                        "index": block_index,
                        "function": {
                            "arguments": delta
                                .get("partial_json")
                                .and_then(Value::as_str)
                                .unwrap_or(""),
                        }
                    }]}),
                    None,
                ),
                _ => return Ok(None),
            }
        }
        "message_delta" => {
            let delta = chunk.get::<Value>("delta").unwrap_or(Value::Null);
            let finish =
                map_stop_reason(delta.get("stop_reason").and_then(Value::as_str));
            let mut v = chat_chunk(json!({}), Some(finish));
            if let Some(usage) = chunk.get::<Value>("usage") {
                v["usage"] = map_usage(&usage);
            }
            v
        }
        // ping, content_block_stop, message_stop
        _ => return Ok(None),
    };

    Ok(Some(PartialJson::from_value(&out)?))
}

/// Assembles one Chat Completions chunk skeleton around a delta.
fn chat_chunk(delta: Value, finish_reason: Option<&str>) -> Value {
    json!({
        "object": "chat.completion.chunk",
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason.map_or(Value::Null, |r| json!(r)),
        }]
    })
}
