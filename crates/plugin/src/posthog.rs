//! `posthog` plugin — per-request telemetry events.

use crate::Plugin;
use async_trait::async_trait;
use http::StatusCode;
use modelgate_provider::Provider;
use modelgate_types::{GatewayError, PartialJson, RequestCx, Result, context};
use serde_json::{Value, json};
use std::time::{SystemTime, UNIX_EPOCH};

/// Context slot holding the request start time (unix millis).
const START_MS: &str = "posthog.start_ms";
/// Context slot holding the streaming accumulator.
const ACC: &str = "posthog.acc";

/// Telemetry event name.
const EVENT: &str = "inference";

/// Emits one capture event per request: latency, model, provider, usage,
/// and (opt-in) content. Streaming deltas are accumulated across chunks
/// and flushed on stream end; provider errors produce an error-flagged
/// event. Disabled without an API key; shipping is fire-and-forget.
pub struct PosthogPlugin {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    include_content: bool,
}

impl PosthogPlugin {
    /// Creates the plugin from `POSTHOG_API_KEY`, `POSTHOG_BASE_URL`, and
    /// `POSTHOG_INCLUDE_CONTENT`.
    #[must_use]
    pub fn from_env() -> Self {
        Self::new(
            std::env::var("POSTHOG_API_KEY").ok().filter(|k| !k.is_empty()),
            std::env::var("POSTHOG_BASE_URL")
                .unwrap_or_else(|_| "https://us.i.posthog.com".to_string()),
            std::env::var("POSTHOG_INCLUDE_CONTENT").is_ok_and(|v| v == "true"),
        )
    }

    /// Creates the plugin with explicit settings.
    #[must_use]
    pub fn new(api_key: Option<String>, base_url: String, include_content: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            include_content,
        }
    }

    fn capture(&self, cx: &RequestCx, mut properties: Value) {
        let Some(api_key) = self.api_key.clone() else {
            return;
        };
        properties["trace_id"] = json!(cx.trace_id().to_string());
        if let Some(key_id) = cx.get_str(context::KEY_ID) {
            properties["key_id"] = json!(key_id);
        }
        let distinct_id = cx
            .get_str(context::USER_ID)
            .unwrap_or_else(|| format!("anon-{}", cx.trace_id()));
        let body = json!({
            "api_key": api_key,
            "event": EVENT,
            "distinct_id": distinct_id,
            "properties": properties,
        });
        let url = format!("{}/capture/", self.base_url.trim_end_matches('/'));
        let client = self.client.clone();
        tokio::spawn(async move {
            if let Err(e) = client.post(url).json(&body).send().await {
                tracing::debug!(error = %e, "posthog capture failed");
            }
        });
    }

    fn base_properties(&self, provider: &Provider, cx: &RequestCx, req: &PartialJson) -> Value {
        let latency_ms = cx
            .get(START_MS)
            .and_then(|v| v.as_u64())
            .map(|start| now_ms().saturating_sub(start));
        let mut props = json!({
            "model": req.get::<String>("model").unwrap_or_default(),
            "provider": provider.name(),
            "stream": req.get::<bool>("stream").unwrap_or(false),
        });
        if let Some(ms) = latency_ms {
            props["latency_ms"] = json!(ms);
        }
        if self.include_content
            && let Some(messages) = req.get::<Value>("messages")
        {
            props["input"] = messages;
        }
        props
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Folds one chat chunk delta into the accumulator object.
fn accumulate(acc: &mut Value, chunk: &PartialJson) {
    let Some(choices) = chunk.get::<Vec<Value>>("choices") else {
        return;
    };
    let Some(choice) = choices.first() else {
        return;
    };
    if let Some(delta) = choice.get("delta") {
        if let Some(role) = delta.get("role").and_then(Value::as_str) {
            acc["role"] = json!(role);
        }
        if let Some(content) = delta.get("content").and_then(Value::as_str) {
            let mut text = acc["content"].as_str().unwrap_or("").to_string();
            text.push_str(content);
            acc["content"] = json!(text);
        }
        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                if let Some(args) = call.pointer("/function/arguments").and_then(Value::as_str) {
                    let mut text = acc["arguments"].as_str().unwrap_or("").to_string();
                    text.push_str(args);
                    acc["arguments"] = json!(text);
                }
            }
        }
    }
    if let Some(finish) = choice.get("finish_reason").and_then(Value::as_str) {
        acc["finish_reason"] = json!(finish);
    }
    if let Some(usage) = chunk.get::<Value>("usage") {
        acc["usage"] = usage;
    }
}

#[async_trait]
impl Plugin for PosthogPlugin {
    fn name(&self) -> &'static str {
        "posthog"
    }

    async fn before(
        &self,
        _params: &str,
        _provider: &Provider,
        cx: &RequestCx,
        req: PartialJson,
    ) -> Result<PartialJson> {
        cx.set(START_MS, json!(now_ms()));
        cx.set(
            ACC,
            json!({"role": "", "content": "", "arguments": "", "finish_reason": ""}),
        );
        Ok(req)
    }

    async fn after(
        &self,
        _params: &str,
        provider: &Provider,
        cx: &RequestCx,
        req: &PartialJson,
        _status: StatusCode,
        resp: PartialJson,
    ) -> Result<PartialJson> {
        let mut props = self.base_properties(provider, cx, req);
        if let Some(usage) = resp.get::<Value>("usage") {
            props["usage"] = usage;
        }
        if let Some(choices) = resp.get::<Vec<Value>>("choices")
            && let Some(first) = choices.first()
        {
            if let Some(finish) = first.get("finish_reason") {
                props["finish_reason"] = finish.clone();
            }
            if self.include_content
                && let Some(content) = first.pointer("/message/content")
            {
                props["output"] = content.clone();
            }
        }
        self.capture(cx, props);
        Ok(resp)
    }

    async fn after_chunk(
        &self,
        _params: &str,
        _provider: &Provider,
        cx: &RequestCx,
        _req: &PartialJson,
        chunk: PartialJson,
    ) -> Result<Option<PartialJson>> {
        let mut acc = cx.get(ACC).unwrap_or_else(|| json!({}));
        accumulate(&mut acc, &chunk);
        cx.set(ACC, acc);
        Ok(Some(chunk))
    }

    async fn stream_end(
        &self,
        _params: &str,
        provider: &Provider,
        cx: &RequestCx,
        req: &PartialJson,
        _last: Option<&PartialJson>,
    ) {
        let mut props = self.base_properties(provider, cx, req);
        let acc = cx.get(ACC).unwrap_or_else(|| json!({}));
        if let Some(finish) = acc.get("finish_reason").filter(|f| *f != &json!("")) {
            props["finish_reason"] = finish.clone();
        }
        if let Some(usage) = acc.get("usage") {
            props["usage"] = usage.clone();
        }
        if self.include_content && let Some(content) = acc.get("content") {
            props["output"] = content.clone();
        }
        self.capture(cx, props);
    }

    async fn on_error(
        &self,
        _params: &str,
        provider: &Provider,
        cx: &RequestCx,
        req: &PartialJson,
        error: &GatewayError,
    ) {
        let mut props = self.base_properties(provider, cx, req);
        props["error"] = json!(true);
        props["error_message"] = json!(error.to_string());
        self.capture(cx, props);
    }
}
