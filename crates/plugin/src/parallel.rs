//! `parallel` plugin — concurrent fan-out across a pipe-separated model
//! list with merged responses.

use crate::{HandlerInvoker, Plugin};
use async_trait::async_trait;
use axum::Json;
use axum::response::{IntoResponse as _, Response};
use bytes::Bytes;
use modelgate_types::{GatewayError, PartialJson, RequestCx, Result};
use serde_json::{Value, json};
use std::sync::Arc;

/// Fans a `a|b|c` model list out as one concurrent pipeline re-entry per
/// model and merges the captured responses.
///
/// Streaming requests fall through to the normal flow with a warning.
pub struct ParallelPlugin;

#[async_trait]
impl Plugin for ParallelPlugin {
    fn name(&self) -> &'static str {
        "parallel"
    }

    async fn recursive(
        &self,
        _params: &str,
        invoker: &Arc<dyn HandlerInvoker>,
        _cx: &RequestCx,
        req: &PartialJson,
    ) -> Result<Option<Response>> {
        let model = req.get::<String>("model").unwrap_or_default();
        let base = model.split('+').next().unwrap_or_default();
        if !base.contains('|') {
            return Ok(None);
        }
        if req.get::<bool>("stream").unwrap_or(false) {
            tracing::warn!(model = base, "parallel fan-out does not stream, falling through");
            return Ok(None);
        }
        let suffix = &model[base.len()..];

        let models: Vec<String> = base
            .split('|')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(ToString::to_string)
            .collect();

        // One task per model; the join below preserves slot order.
        let mut tasks = Vec::with_capacity(models.len());
        for token in &models {
            let inner = req
                .clone_with("model", &format!("{token}{suffix}"))?
                .clone_with("stream", &false)?;
            let invoker = invoker.clone();
            tasks.push(tokio::spawn(
                async move { invoker.invoke_capture(inner).await },
            ));
        }

        let mut bodies: Vec<Bytes> = Vec::with_capacity(models.len());
        let mut last_error: Option<GatewayError> = None;
        for (token, task) in models.iter().zip(tasks) {
            match task.await {
                Ok(Ok((status, body))) if status.is_success() => bodies.push(body),
                Ok(Ok((status, body))) => {
                    tracing::warn!(model = %token, status = %status, "parallel branch failed");
                    last_error = Some(GatewayError::Upstream {
                        status: status.as_u16(),
                        body: String::from_utf8_lossy(&body).to_string(),
                    });
                }
                Ok(Err(e)) => {
                    tracing::warn!(model = %token, error = %e, "parallel branch failed");
                    last_error = Some(e);
                }
                Err(e) => {
                    last_error = Some(GatewayError::Plugin(format!("parallel task panicked: {e}")));
                }
            }
        }

        if bodies.is_empty() {
            return Err(last_error
                .unwrap_or_else(|| GatewayError::Plugin("no parallel candidates".to_string())));
        }

        let merged = merge_responses(&bodies, base)?;
        Ok(Some(Json(merged).into_response()))
    }
}

/// Merges successful fan-out responses: choices are concatenated and
/// re-indexed, identifiers come from the first response, `model` becomes
/// the pipe-joined list, and usage token counters are summed.
fn merge_responses(bodies: &[Bytes], joined_model: &str) -> Result<Value> {
    let parsed: Vec<Value> = bodies
        .iter()
        .map(|b| serde_json::from_slice(b).map_err(GatewayError::from))
        .collect::<Result<_>>()?;

    let first = &parsed[0];
    let mut merged = json!({
        "id": first.get("id").cloned().unwrap_or(Value::Null),
        "object": first.get("object").cloned().unwrap_or_else(|| json!("chat.completion")),
        "created": first.get("created").cloned().unwrap_or(Value::Null),
        "model": joined_model,
    });

    let mut choices: Vec<Value> = Vec::new();
    let mut usage = serde_json::Map::new();
    for body in &parsed {
        if let Some(list) = body.get("choices").and_then(Value::as_array) {
            for choice in list {
                let mut c = choice.clone();
                c["index"] = json!(choices.len());
                choices.push(c);
            }
        }
        if let Some(u) = body.get("usage").and_then(Value::as_object) {
            for (key, value) in u {
                if let Some(n) = value.as_u64() {
                    let slot = usage.entry(key.clone()).or_insert(json!(0));
                    *slot = json!(slot.as_u64().unwrap_or(0) + n);
                }
            }
        }
    }
    merged["choices"] = Value::Array(choices);
    if !usage.is_empty() {
        merged["usage"] = Value::Object(usage);
    }
    Ok(merged)
}
