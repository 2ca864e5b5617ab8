//! `stools` plugin — shrinks historical tool interactions.

use crate::Plugin;
use async_trait::async_trait;
use modelgate_provider::Provider;
use modelgate_types::{PartialJson, RequestCx, Result};
use serde_json::Value;

/// Maximum kept length of truncated content and arguments.
const MAX_LEN: usize = 100;

/// Truncates the content and tool-call arguments of tool-related
/// messages, sparing the trailing tool interaction while it is still
/// active. An interaction is active iff the last message is itself
/// tool-related; once a non-tool message follows, everything shrinks.
pub struct SToolsPlugin;

/// A message participates in a tool interaction.
fn is_tool_related(message: &Value) -> bool {
    let role = message.get("role").and_then(Value::as_str).unwrap_or("");
    role == "tool"
        || (role == "assistant"
            && message
                .get("tool_calls")
                .and_then(Value::as_array)
                .is_some_and(|calls| !calls.is_empty()))
}

fn truncate(text: &str) -> String {
    if text.chars().count() <= MAX_LEN {
        return text.to_string();
    }
    let mut out: String = text.chars().take(MAX_LEN).collect();
    out.push_str("...");
    out
}

fn shrink_message(message: &mut Value) {
    if let Some(content) = message.get("content").and_then(Value::as_str) {
        let shortened = truncate(content);
        message["content"] = Value::String(shortened);
    }
    if let Some(calls) = message.get_mut("tool_calls").and_then(Value::as_array_mut) {
        for call in calls {
            if let Some(args) = call
                .pointer("/function/arguments")
                .and_then(Value::as_str)
            {
                let shortened = truncate(args);
                call["function"]["arguments"] = Value::String(shortened);
            }
        }
    }
}

#[async_trait]
impl Plugin for SToolsPlugin {
    fn name(&self) -> &'static str {
        "stools"
    }

    async fn before(
        &self,
        _params: &str,
        _provider: &Provider,
        _cx: &RequestCx,
        mut req: PartialJson,
    ) -> Result<PartialJson> {
        let Some(mut messages) = req.get::<Vec<Value>>("messages") else {
            return Ok(req);
        };
        if messages.is_empty() {
            return Ok(req);
        }

        // The active interaction is the trailing run of tool-related
        // messages, and only exists while the last message is one.
        let mut protected_from = messages.len();
        if is_tool_related(&messages[messages.len() - 1]) {
            while protected_from > 0 && is_tool_related(&messages[protected_from - 1]) {
                protected_from -= 1;
            }
        }

        for message in &mut messages[..protected_from] {
            if is_tool_related(message) {
                shrink_message(message);
            }
        }

        req.set("messages", &messages)?;
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_auth::EnvAuthService;
    use modelgate_config::ProviderConfig;
    use modelgate_types::Style;
    use serde_json::json;
    use std::sync::Arc;

    fn test_provider() -> Provider {
        Provider::from_config(
            "p",
            &ProviderConfig {
                base_url: "https://upstream.example".to_string(),
                style: Style::OpenAiChatCompletions,
                aliases: std::collections::HashMap::new(),
            },
            Arc::new(EnvAuthService::new()),
            reqwest::Client::new(),
        )
        .unwrap()
    }

    fn long(marker: &str) -> String {
        format!("{marker}{}", "x".repeat(200))
    }

    async fn run(messages: Value) -> Vec<Value> {
        let mut req = PartialJson::default();
        req.set("model", &"m").unwrap();
        req.set("messages", &messages).unwrap();
        let out = SToolsPlugin
            .before("", &test_provider(), &RequestCx::default(), req)
            .await
            .unwrap();
        out.get::<Vec<Value>>("messages").unwrap()
    }

    #[tokio::test]
    async fn test_settled_interactions_truncated() {
        let messages = run(json!([
            {"role": "user", "content": "weather?"},
            {"role": "assistant", "tool_calls": [{
                "id": "c1", "type": "function",
                "function": {"name": "get", "arguments": long("args")}
            }]},
            {"role": "tool", "tool_call_id": "c1", "content": long("result")},
            {"role": "assistant", "content": "It is sunny."},
            {"role": "user", "content": "thanks"}
        ]))
        .await;

        let args = messages[1]["tool_calls"][0]["function"]["arguments"]
            .as_str()
            .unwrap();
        assert!(args.ends_with("..."));
        assert_eq!(args.chars().count(), MAX_LEN + 3);
        let result = messages[2]["content"].as_str().unwrap();
        assert!(result.ends_with("..."));
        // Non-tool messages untouched.
        assert_eq!(messages[3]["content"], "It is sunny.");
    }

    #[tokio::test]
    async fn test_active_tail_interaction_spared() {
        let messages = run(json!([
            {"role": "user", "content": "a"},
            {"role": "assistant", "tool_calls": [{
                "id": "c0", "type": "function",
                "function": {"name": "f", "arguments": long("old")}
            }]},
            {"role": "tool", "tool_call_id": "c0", "content": long("oldresult")},
            {"role": "assistant", "content": "done"},
            {"role": "user", "content": "b"},
            {"role": "assistant", "tool_calls": [{
                "id": "c1", "type": "function",
                "function": {"name": "f", "arguments": long("fresh")}
            }]},
            {"role": "tool", "tool_call_id": "c1", "content": long("freshresult")}
        ]))
        .await;

        // Old interaction truncated.
        assert!(
            messages[1]["tool_calls"][0]["function"]["arguments"]
                .as_str()
                .unwrap()
                .ends_with("...")
        );
        assert!(messages[2]["content"].as_str().unwrap().ends_with("..."));
        // Active tail untouched.
        assert_eq!(
            messages[5]["tool_calls"][0]["function"]["arguments"],
            long("fresh")
        );
        assert_eq!(messages[6]["content"], long("freshresult"));
    }

    #[tokio::test]
    async fn test_everything_truncated_when_tail_is_not_tool() {
        let messages = run(json!([
            {"role": "assistant", "tool_calls": [{
                "id": "c1", "type": "function",
                "function": {"name": "f", "arguments": long("a")}
            }]},
            {"role": "tool", "tool_call_id": "c1", "content": long("r")},
            {"role": "assistant", "content": "summary"}
        ]))
        .await;
        assert!(
            messages[0]["tool_calls"][0]["function"]["arguments"]
                .as_str()
                .unwrap()
                .ends_with("...")
        );
        assert!(messages[1]["content"].as_str().unwrap().ends_with("..."));
    }

    #[tokio::test]
    async fn test_short_values_left_alone() {
        let messages = run(json!([
            {"role": "assistant", "tool_calls": [{
                "id": "c1", "type": "function",
                "function": {"name": "f", "arguments": "{}"}
            }]},
            {"role": "tool", "tool_call_id": "c1", "content": "ok"},
            {"role": "user", "content": "next"}
        ]))
        .await;
        assert_eq!(messages[0]["tool_calls"][0]["function"]["arguments"], "{}");
        assert_eq!(messages[1]["content"], "ok");
    }
}
