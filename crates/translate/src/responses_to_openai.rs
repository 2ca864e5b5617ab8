//! Responses API → Chat Completions: request, non-streaming response,
//! and streaming chunk.

use modelgate_types::{PartialJson, Result};
use serde_json::{Value, json};

/// Translates a Responses API request into an `OpenAI` chat completion
/// request (the inverse of the chat → responses request mapping).
///
/// `input` becomes `messages`, `max_output_tokens` becomes `max_tokens`,
/// and flat function tools are re-nested. Unknown extras pass through.
///
/// # Errors
///
/// Returns a translation error only on serialization failure.
pub fn request(mut body: PartialJson) -> Result<PartialJson> {
    if let Some(input) = body.get::<Value>("input") {
        body.remove("input");
        body.set("messages", &input)?;
    }
    if let Some(max) = body.get::<Value>("max_output_tokens") {
        body.remove("max_output_tokens");
        body.set("max_tokens", &max)?;
    }
    if let Some(Value::Array(tools)) = body.get::<Value>("tools") {
        let nested: Vec<Value> = tools.iter().map(nest_tool).collect();
        body.set("tools", &nested)?;
    }
    Ok(body)
}

/// Wraps a flat `{type: function, name, …}` tool spec back into the
/// nested chat form.
fn nest_tool(tool: &Value) -> Value {
    let is_flat_function = tool.get("type").and_then(Value::as_str) == Some("function")
        && tool.get("function").is_none()
        && tool.get("name").is_some();
    if !is_flat_function {
        return tool.clone();
    }
    let mut func = json!({});
    for key in ["name", "description", "parameters", "strict"] {
        if let Some(v) = tool.get(key) {
            func[key] = v.clone();
        }
    }
    json!({"type": "function", "function": func})
}

/// Maps a Responses `status` to a Chat Completions `finish_reason`.
fn map_status(status: Option<&str>) -> &'static str {
    match status {
        Some("incomplete") => "length",
        _ => "stop",
    }
}

/// Concatenates the text parts of a Responses message item.
fn collect_text(content: Option<&Value>) -> String {
    let Some(parts) = content.and_then(Value::as_array) else {
        return String::new();
    };
    parts
        .iter()
        .filter_map(|p| p.get("text").and_then(Value::as_str))
        .collect()
}

/// Builds a Chat tool-call entry from a Responses `function_call` item.
fn tool_call_entry(item: &Value) -> Value {
    let id = item
        .get("call_id")
        .or_else(|| item.get("id"))
        .and_then(Value::as_str)
        .unwrap_or("");
    json!({
        "id": id,
        "type": "function",
        "function": {
            "name": item.get("name").and_then(Value::as_str).unwrap_or(""),
            "arguments": item.get("arguments").and_then(Value::as_str).unwrap_or(""),
        }
    })
}

/// Maps Responses usage to Chat usage.
fn map_usage(usage: &Value) -> Value {
    let input = usage.get("input_tokens").cloned().unwrap_or(json!(0));
    let output = usage.get("output_tokens").cloned().unwrap_or(json!(0));
    let total = usage.get("total_tokens").cloned().unwrap_or(json!(0));
    json!({
        "prompt_tokens": input,
        "completion_tokens": output,
        "total_tokens": total,
    })
}

/// Translates a non-streaming Responses API body into a Chat Completions
/// response.
///
/// `created_at` is renamed to `created`; `output` items become `choices`
/// (text parts concatenated, function calls mapped to tool calls); usage
/// token fields are renamed. Extra top-level fields pass through.
///
/// # Errors
///
/// Returns a translation error on serialization failure.
pub fn response(mut body: PartialJson) -> Result<PartialJson> {
    if let Some(created_at) = body.get::<Value>("created_at") {
        body.remove("created_at");
        body.set("created", &created_at)?;
    }

    let status = body.get::<String>("status");
    body.remove("status");

    let mut choices: Vec<Value> = Vec::new();
    if let Some(Value::Array(output)) = body.get::<Value>("output") {
        for item in &output {
            match item.get("type").and_then(Value::as_str) {
                Some("message") => {
                    let role = item
                        .get("role")
                        .and_then(Value::as_str)
                        .unwrap_or("assistant");
                    choices.push(json!({
                        "index": choices.len(),
                        "message": {"role": role, "content": collect_text(item.get("content"))},
                        "finish_reason": map_status(status.as_deref()),
                    }));
                }
                Some("function_call") => {
                    choices.push(json!({
                        "index": choices.len(),
                        "message": {
                            "role": "assistant",
                            "content": Value::Null,
                            "tool_calls": [tool_call_entry(item)],
                        },
                        "finish_reason": "tool_calls",
                    }));
                }
                _ => {}
            }
        }
    }
    body.remove("output");
    body.set("choices", &choices)?;
    body.set("object", &"chat.completion")?;

    if let Some(usage) = body.get::<Value>("usage") {
        body.set("usage", &map_usage(&usage))?;
    }
    Ok(body)
}

/// Translates one named Responses streaming event into a Chat Completions
/// chunk. Events outside the mapping produce no chunk.
///
/// # Errors
///
/// Returns a translation error on serialization failure.
pub fn response_chunk(chunk: &PartialJson) -> Result<Option<PartialJson>> {
    let event_type = chunk.get::<String>("type").unwrap_or_default();
    let output_index = chunk.get::<u64>("output_index").unwrap_or(0);

    let out = match event_type.as_str() {
        "response.created" | "response.in_progress" => {
            chat_chunk(chunk, json!({"role": "assistant"}), None)
        }
        "response.output_item.added" => {
            let item = chunk.get::<Value>("item").unwrap_or(Value::Null);
            match item.get("type").and_then(Value::as_str) {
                Some("message") => chat_chunk(chunk, json!({"role": "assistant"}), None),
                Some("function_call") => {
                    let mut entry = tool_call_entry(&item);
                    entry["index"] = json!(output_index);
                    chat_chunk(chunk, json!({"tool_calls": [entry]}), None)
                }
                _ => return Ok(None),
            }
        }
        "response.output_text.delta" => {
            let delta = chunk.get::<String>("delta").unwrap_or_default();
            chat_chunk(chunk, json!({"content": delta}), None)
        }
        "response.function_call_arguments.delta" => {
            let delta = chunk.get::<String>("delta").unwrap_or_default();
            chat_chunk(
                chunk,
                json!({"tool_calls": [{"index": output_index, "function": {"arguments": delta}}]}),
                None,
            )
        }
        "response.output_text.done" => chat_chunk(chunk, json!({}), Some("stop")),
        "response.output_item.done" => {
            let item = chunk.get::<Value>("item").unwrap_or(Value::Null);
            let is_completed_call = item.get("type").and_then(Value::as_str)
                == Some("function_call")
                && item.get("status").and_then(Value::as_str) == Some("completed");
            if !is_completed_call {
                return Ok(None);
            }
            chat_chunk(chunk, json!({}), Some("tool_calls"))
        }
        "response.completed" | "response.done" => {
            let mut v = chat_chunk(chunk, json!({}), Some("stop"));
            if let Some(resp) = chunk.get::<Value>("response") {
                if let Some(id) = resp.get("id") {
                    v["id"] = id.clone();
                }
                if let Some(model) = resp.get("model") {
                    v["model"] = model.clone();
                }
                if let Some(usage) = resp.get("usage") {
                    v["usage"] = map_usage(usage);
                }
            }
            v
        }
        _ => return Ok(None),
    };

    Ok(Some(PartialJson::from_value(&out)?))
}

/// Assembles one Chat Completions chunk skeleton around a delta.
fn chat_chunk(source: &PartialJson, delta: Value, finish_reason: Option<&str>) -> Value {
    let mut v = json!({
        "object": "chat.completion.chunk",
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason.map_or(Value::Null, |r| json!(r)),
        }]
    });
    // Carry identifiers when the source event has them at top level.
    if let Some(resp) = source.get::<Value>("response") {
        if let Some(id) = resp.get("id") {
            v["id"] = id.clone();
        }
        if let Some(model) = resp.get("model") {
            v["model"] = model.clone();
        }
    }
    v
}
