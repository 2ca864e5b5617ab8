//! Chat Completions → Anthropic Messages: request, non-streaming
//! response, and streaming chunk.

use modelgate_types::{GatewayError, PartialJson, Result};
use serde_json::{Value, json};

/// Default `max_tokens` when the chat request carries none (the Anthropic
/// API requires the field).
const DEFAULT_MAX_TOKENS: u64 = 4096;

/// Maps a Chat `finish_reason` to an Anthropic `stop_reason`.
fn map_finish_reason(finish: Option<&str>) -> &'static str {
    match finish {
        Some("length") => "max_tokens",
        Some("tool_calls") => "tool_use",
        _ => "end_turn",
    }
}

/// Translates an `OpenAI` chat completion request into an Anthropic
/// Messages request.
///
/// System messages are extracted and merged into the top-level `system`
/// field; assistant tool calls and tool results become content blocks;
/// nested function tools become flat `input_schema` tools.
///
/// # Errors
///
/// Returns [`GatewayError::Translation`] if `messages` is missing.
pub fn request(body: &PartialJson) -> Result<PartialJson> {
    let messages = body
        .get::<Vec<Value>>("messages")
        .ok_or_else(|| GatewayError::Translation("missing 'messages'".into()))?;

    let system_parts: Vec<&str> = messages
        .iter()
        .filter(|m| m.get("role").and_then(Value::as_str) == Some("system"))
        .filter_map(|m| m.get("content").and_then(Value::as_str))
        .collect();

    let non_system: Vec<&Value> = messages
        .iter()
        .filter(|m| m.get("role").and_then(Value::as_str) != Some("system"))
        .collect();

    let mut out = body.clone();
    out.set("messages", &build_messages(&non_system))?;
    if !system_parts.is_empty() {
        out.set("system", &system_parts.join("\n"))?;
    }
    if out.get::<u64>("max_tokens").is_none() {
        out.set("max_tokens", &DEFAULT_MAX_TOKENS)?;
    }

    if let Some(tools) = body.get::<Vec<Value>>("tools") {
        let flat: Vec<Value> = tools
            .iter()
            .filter_map(|t| {
                let func = t.get("function")?;
                let mut tool = json!({
                    "name": func.get("name")?.clone(),
                    "input_schema": func
                        .get("parameters")
                        .cloned()
                        .unwrap_or_else(|| json!({"type": "object"})),
                });
                if let Some(desc) = func.get("description") {
                    tool["description"] = desc.clone();
                }
                Some(tool)
            })
            .collect();
        if flat.is_empty() {
            out.remove("tools");
        } else {
            out.set("tools", &flat)?;
        }
    }

    if let Some(tc) = body.get::<Value>("tool_choice") {
        if let Some(s) = tc.as_str() {
            match s {
                "auto" => out.set("tool_choice", &json!({"type": "auto"}))?,
                "required" => out.set("tool_choice", &json!({"type": "any"}))?,
                _ => {
                    out.remove("tool_choice");
                }
            }
        } else if let Some(name) = tc
            .get("function")
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
        {
            out.set("tool_choice", &json!({"type": "tool", "name": name}))?;
        }
    }

    Ok(out)
}

/// Builds Anthropic `messages` from non-system Chat messages.
///
/// Tool result messages (`role == "tool"`) are buffered and flushed as a
/// single `user` message with `tool_result` content blocks before the next
/// non-tool message.
fn build_messages(non_system: &[&Value]) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    let mut tool_buffer: Vec<Value> = Vec::new();

    for m in non_system {
        let role = m.get("role").and_then(Value::as_str).unwrap_or("user");

        if role == "tool" {
            let tool_call_id = m.get("tool_call_id").and_then(Value::as_str).unwrap_or("");
            let content = m
                .get("content")
                .cloned()
                .unwrap_or_else(|| Value::String(String::new()));
            tool_buffer.push(json!({
                "type": "tool_result",
                "tool_use_id": tool_call_id,
                "content": content,
            }));
            continue;
        }

        if !tool_buffer.is_empty() {
            out.push(json!({
                "role": "user",
                "content": std::mem::take(&mut tool_buffer),
            }));
        }

        if role == "assistant"
            && let Some(tool_calls) = m.get("tool_calls").and_then(Value::as_array)
        {
            let mut blocks: Vec<Value> = Vec::new();
            if let Some(text) = m.get("content").and_then(Value::as_str)
                && !text.is_empty()
            {
                blocks.push(json!({"type": "text", "text": text}));
            }
            for tc in tool_calls {
                let func = tc.get("function").unwrap_or(&Value::Null);
                let args = func
                    .get("arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("{}");
                let input: Value = serde_json::from_str(args).unwrap_or_else(|_| json!({}));
                blocks.push(json!({
                    "type": "tool_use",
                    "id": tc.get("id").and_then(Value::as_str).unwrap_or(""),
                    "name": func.get("name").and_then(Value::as_str).unwrap_or(""),
                    "input": input,
                }));
            }
            out.push(json!({"role": "assistant", "content": blocks}));
            continue;
        }

        let content = m
            .get("content")
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));
        out.push(json!({"role": role, "content": content}));
    }

    if !tool_buffer.is_empty() {
        out.push(json!({"role": "user", "content": tool_buffer}));
    }

    out
}

/// Translates a Chat Completions response into an Anthropic Messages
/// response (for Anthropic-dialect clients fronting chat-dialect
/// providers).
///
/// # Errors
///
/// Returns [`GatewayError::Translation`] if `choices` is missing or empty.
pub fn response(body: &PartialJson) -> Result<PartialJson> {
    let choices = body.get::<Vec<Value>>("choices").unwrap_or_default();
    let first = choices
        .first()
        .ok_or_else(|| GatewayError::Translation("missing 'choices'".into()))?;
    let message = first.get("message").cloned().unwrap_or_else(|| json!({}));

    let mut content: Vec<Value> = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        content.push(json!({"type": "text", "text": text}));
    }
    if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
        for tc in tool_calls {
            let func = tc.get("function").unwrap_or(&Value::Null);
            let args = func
                .get("arguments")
                .and_then(Value::as_str)
                .unwrap_or("{}");
            let input: Value = serde_json::from_str(args).unwrap_or_else(|_| json!({}));
            content.push(json!({
                "type": "tool_use",
                "id": tc.get("id").and_then(Value::as_str).unwrap_or(""),
                "name": func.get("name").and_then(Value::as_str).unwrap_or(""),
                "input": input,
            }));
        }
    }

    let usage = body.get::<Value>("usage").unwrap_or_else(|| json!({}));
    let out = json!({
        "id": body.get::<String>("id").unwrap_or_default(),
        "type": "message",
        "role": "assistant",
        "model": body.get::<String>("model").unwrap_or_default(),
        "content": content,
        "stop_reason": map_finish_reason(
            first.get("finish_reason").and_then(Value::as_str)
        ),
        "usage": {
            "input_tokens": usage.get("prompt_tokens").cloned().unwrap_or(json!(0)),
            "output_tokens": usage.get("completion_tokens").cloned().unwrap_or(json!(0)),
        }
    });
    PartialJson::from_value(&out)
}

/// Translates one Chat Completions streaming chunk into an Anthropic
/// streaming event (the inverse of the anthropic → chat chunk mapping).
///
/// A finish chunk becomes `message_delta`; tool-call deltas become
/// `content_block_start` / `input_json_delta`; text deltas become
/// `text_delta`; the leading role chunk becomes `message_start`. Chunks
/// carrying none of those produce no event.
///
/// # Errors
///
/// Returns a translation error on serialization failure.
pub fn response_chunk(chunk: &PartialJson) -> Result<Option<PartialJson>> {
    let choices = chunk.get::<Vec<Value>>("choices").unwrap_or_default();
    let Some(choice) = choices.first() else {
        return Ok(None);
    };
    let delta = choice.get("delta").cloned().unwrap_or_else(|| json!({}));

    if let Some(finish) = choice.get("finish_reason").and_then(Value::as_str) {
        let mut event = json!({
            "type": "message_delta",
            "delta": {"stop_reason": map_finish_reason(Some(finish))},
        });
        if let Some(usage) = chunk.get::<Value>("usage") {
            event["usage"] = json!({
                "input_tokens": usage.get("prompt_tokens").cloned().unwrap_or(json!(0)),
                "output_tokens": usage.get("completion_tokens").cloned().unwrap_or(json!(0)),
            });
        }
        return Ok(Some(PartialJson::from_value(&event)?));
    }

    if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array)
        && let Some(call) = calls.first()
    {
        let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
        let func = call.get("function").cloned().unwrap_or_else(|| json!({}));
        // A named entry opens the block; a bare-arguments entry extends it.
        let event = if let Some(name) = func.get("name").and_then(Value::as_str) {
            json!({
                "type": "content_block_start",
                "index": index,
                "content_block": {
                    "type": "tool_use",
                    "id": call.get("id").and_then(Value::as_str).unwrap_or(""),
                    "name": name,
                    "input": {},
                }
            })
        } else {
            json!({
                "type": "content_block_delta",
                "index": index,
                "delta": {
                    "type": "input_json_delta",
                    "partial_json": func
                        .get("arguments")
                        .and_then(Value::as_str)
                        .unwrap_or(""),
                }
            })
        };
        return Ok(Some(PartialJson::from_value(&event)?));
    }

    if let Some(text) = delta.get("content").and_then(Value::as_str)
        && !text.is_empty()
    {
        let event = json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": text},
        });
        return Ok(Some(PartialJson::from_value(&event)?));
    }

    if delta.get("role").and_then(Value::as_str).is_some() {
        let event = json!({
            "type": "message_start",
            "message": {
                "id": chunk.get::<String>("id").unwrap_or_default(),
                "type": "message",
                "role": "assistant",
                "model": chunk.get::<String>("model").unwrap_or_default(),
                "content": [],
            }
        });
        return Ok(Some(PartialJson::from_value(&event)?));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(v: Value) -> PartialJson {
        PartialJson::from_value(&v).unwrap()
    }

    #[test]
    fn test_system_extracted() {
        let out = request(&body(json!({
            "model": "claude-3",
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Hi"}
            ]
        })))
        .unwrap();
        assert_eq!(
            out.get::<String>("system").as_deref(),
            Some("You are helpful.")
        );
        let messages = out.get::<Vec<Value>>("messages").unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], "user");
    }

    #[test]
    fn test_default_max_tokens_applied() {
        let out = request(&body(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .unwrap();
        assert_eq!(out.get::<u64>("max_tokens"), Some(DEFAULT_MAX_TOKENS));
    }

    #[test]
    fn test_explicit_max_tokens_kept() {
        let out = request(&body(json!({
            "model": "m",
            "max_tokens": 100,
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .unwrap();
        assert_eq!(out.get::<u64>("max_tokens"), Some(100));
    }

    #[test]
    fn test_tools_unnested() {
        let out = request(&body(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "tools": [{
                "type": "function",
                "function": {
                    "name": "get_weather",
                    "description": "Get the weather",
                    "parameters": {"type": "object", "properties": {"city": {"type": "string"}}}
                }
            }]
        })))
        .unwrap();
        let tools = out.get::<Vec<Value>>("tools").unwrap();
        assert_eq!(tools[0]["name"], "get_weather");
        assert_eq!(tools[0]["input_schema"]["properties"]["city"]["type"], "string");
        assert!(tools[0].get("function").is_none());
    }

    #[test]
    fn test_tool_flow_becomes_blocks() {
        let out = request(&body(json!({
            "model": "m",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": null, "tool_calls": [{
                    "id": "call_1", "type": "function",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"Oslo\"}"}
                }]},
                {"role": "tool", "tool_call_id": "call_1", "content": "Sunny"}
            ]
        })))
        .unwrap();
        let messages = out.get::<Vec<Value>>("messages").unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][0]["type"], "tool_use");
        assert_eq!(messages[1]["content"][0]["input"]["city"], "Oslo");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(messages[2]["content"][0]["type"], "tool_result");
        assert_eq!(messages[2]["content"][0]["tool_use_id"], "call_1");
    }

    #[test]
    fn test_extras_preserved() {
        let out = request(&body(json!({
            "model": "m",
            "messages": [{"role": "user", "content": "hi"}],
            "metadata": {"user_id": "u1"},
            "temperature": 0.3
        })))
        .unwrap();
        assert_eq!(out.get::<f64>("temperature"), Some(0.3));
        assert_eq!(
            out.get::<Value>("metadata").unwrap()["user_id"],
            "u1"
        );
    }

    #[test]
    fn test_missing_messages_rejected() {
        assert!(request(&body(json!({"model": "m"}))).is_err());
    }

    #[test]
    fn test_response_text() {
        let out = response(&body(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 3, "completion_tokens": 5, "total_tokens": 8}
        })))
        .unwrap();
        let v = out.to_value().unwrap();
        assert_eq!(v["type"], "message");
        assert_eq!(v["content"][0]["text"], "hello");
        assert_eq!(v["stop_reason"], "end_turn");
        assert_eq!(v["usage"]["input_tokens"], 3);
        assert_eq!(v["usage"]["output_tokens"], 5);
    }

    #[test]
    fn test_response_tool_calls() {
        let out = response(&body(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null, "tool_calls": [{
                    "id": "call_2", "type": "function",
                    "function": {"name": "f", "arguments": "{\"a\":1}"}
                }]},
                "finish_reason": "tool_calls"
            }]
        })))
        .unwrap();
        let v = out.to_value().unwrap();
        assert_eq!(v["content"][0]["type"], "tool_use");
        assert_eq!(v["content"][0]["input"]["a"], 1);
        assert_eq!(v["stop_reason"], "tool_use");
    }

    #[test]
    fn test_response_length_maps_to_max_tokens() {
        let out = response(&body(json!({
            "choices": [{"message": {"content": "x"}, "finish_reason": "length"}]
        })))
        .unwrap();
        assert_eq!(
            out.to_value().unwrap()["stop_reason"],
            "max_tokens"
        );
    }

    fn chunk_of(v: Value) -> Option<Value> {
        response_chunk(&body(v))
            .unwrap()
            .map(|c| c.to_value().unwrap())
    }

    #[test]
    fn test_chunk_role_becomes_message_start() {
        let v = chunk_of(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"role": "assistant"}, "finish_reason": null}]
        }))
        .unwrap();
        assert_eq!(v["type"], "message_start");
        assert_eq!(v["message"]["id"], "chatcmpl-1");
        assert_eq!(v["message"]["model"], "gpt-4");
        assert_eq!(v["message"]["role"], "assistant");
    }

    #[test]
    fn test_chunk_content_becomes_text_delta() {
        let v = chunk_of(json!({
            "choices": [{"index": 0, "delta": {"content": "hel"}, "finish_reason": null}]
        }))
        .unwrap();
        assert_eq!(v["type"], "content_block_delta");
        assert_eq!(v["delta"]["type"], "text_delta");
        assert_eq!(v["delta"]["text"], "hel");
    }

    #[test]
    fn test_chunk_named_tool_call_opens_block() {
        let v = chunk_of(json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [{
                "index": 1, "id": "call_1", "type": "function",
                "function": {"name": "get_weather", "arguments": ""}
            }]}, "finish_reason": null}]
        }))
        .unwrap();
        assert_eq!(v["type"], "content_block_start");
        assert_eq!(v["index"], 1);
        assert_eq!(v["content_block"]["type"], "tool_use");
        assert_eq!(v["content_block"]["id"], "call_1");
        assert_eq!(v["content_block"]["name"], "get_weather");
    }

    #[test]
    fn test_chunk_bare_arguments_become_input_json_delta() {
        let v = chunk_of(json!({
            "choices": [{"index": 0, "delta": {"tool_calls": [{
                "index": 1, "function": {"arguments": "{\"ci"}
            }]}, "finish_reason": null}]
        }))
        .unwrap();
        assert_eq!(v["type"], "content_block_delta");
        assert_eq!(v["index"], 1);
        assert_eq!(v["delta"]["type"], "input_json_delta");
        assert_eq!(v["delta"]["partial_json"], "{\"ci");
    }

    #[test]
    fn test_chunk_finish_becomes_message_delta_with_usage() {
        let v = chunk_of(json!({
            "choices": [{"index": 0, "delta": {}, "finish_reason": "tool_calls"}],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        }))
        .unwrap();
        assert_eq!(v["type"], "message_delta");
        assert_eq!(v["delta"]["stop_reason"], "tool_use");
        assert_eq!(v["usage"]["input_tokens"], 1);
        assert_eq!(v["usage"]["output_tokens"], 2);
    }

    #[test]
    fn test_chunk_finish_stop_maps_to_end_turn() {
        let v = chunk_of(json!({
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]
        }))
        .unwrap();
        assert_eq!(v["delta"]["stop_reason"], "end_turn");
    }

    #[test]
    fn test_chunk_empty_delta_skipped() {
        assert!(
            chunk_of(json!({
                "choices": [{"index": 0, "delta": {}, "finish_reason": null}]
            }))
            .is_none()
        );
        assert!(chunk_of(json!({"object": "chat.completion.chunk"})).is_none());
    }
}
