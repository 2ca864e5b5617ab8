//! Anthropic Messages driver.
//!
//! Auth: `x-api-key` plus the `anthropic-version` header. Endpoints:
//! `/messages`, `/models`.

use crate::http_util::{get_json, post_json, read_complete, spawn_chunk_stream};
use crate::{InferenceCommand, ListModelsCommand, Provider};
use async_trait::async_trait;
use http::StatusCode;
use modelgate_types::{ModelEntry, PartialJson, RequestCx, Result, StreamChunk};
use serde_json::Value;
use tokio::sync::mpsc;

/// Driver for `anthropic-messages` providers.
pub struct AnthropicDriver;

/// Parses an Anthropic model listing. Creation timestamps come back as
/// RFC 3339 strings and are not carried over.
fn parse_model_list(body: &Value) -> Vec<ModelEntry> {
    let Some(data) = body.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };
    data.iter()
        .filter_map(|m| {
            let id = m.get("id").and_then(Value::as_str)?.to_string();
            Some(ModelEntry {
                display_name: m
                    .get("display_name")
                    .and_then(Value::as_str)
                    .unwrap_or(&id)
                    .to_string(),
                owned_by: "anthropic".to_string(),
                created: 0,
                id,
            })
        })
        .collect()
}

#[async_trait]
impl ListModelsCommand for AnthropicDriver {
    async fn list_models(&self, provider: &Provider, cx: &RequestCx) -> Result<Vec<ModelEntry>> {
        let body = get_json(provider, "/models", cx, "list_models").await?;
        Ok(parse_model_list(&body))
    }
}

#[async_trait]
impl InferenceCommand for AnthropicDriver {
    async fn inference(
        &self,
        provider: &Provider,
        body: &PartialJson,
        cx: &RequestCx,
    ) -> Result<(StatusCode, PartialJson)> {
        let resp = post_json(provider, "/messages", body, cx, "inference").await?;
        read_complete(resp).await
    }

    async fn inference_stream(
        &self,
        provider: &Provider,
        body: &PartialJson,
        cx: &RequestCx,
    ) -> Result<mpsc::Receiver<StreamChunk>> {
        let resp = post_json(provider, "/messages", body, cx, "inference").await?;
        Ok(spawn_chunk_stream(resp))
    }
}
