//! OpenAI Responses driver.
//!
//! Auth: `Authorization: Bearer`. Endpoints: `/responses`, `/models`.
//! Same wire plumbing as the chat-completions driver; only the inference
//! endpoint differs.

use crate::http_util::{get_json, post_json, read_complete, spawn_chunk_stream};
use crate::openai::parse_model_list;
use crate::{InferenceCommand, ListModelsCommand, Provider};
use async_trait::async_trait;
use http::StatusCode;
use modelgate_types::{ModelEntry, PartialJson, RequestCx, Result, StreamChunk};
use tokio::sync::mpsc;

/// Driver for `openai-responses` providers.
pub struct ResponsesDriver;

#[async_trait]
impl ListModelsCommand for ResponsesDriver {
    async fn list_models(&self, provider: &Provider, cx: &RequestCx) -> Result<Vec<ModelEntry>> {
        let body = get_json(provider, "/models", cx, "list_models").await?;
        Ok(parse_model_list(&body))
    }
}

#[async_trait]
impl InferenceCommand for ResponsesDriver {
    async fn inference(
        &self,
        provider: &Provider,
        body: &PartialJson,
        cx: &RequestCx,
    ) -> Result<(StatusCode, PartialJson)> {
        let resp = post_json(provider, "/responses", body, cx, "inference").await?;
        read_complete(resp).await
    }

    async fn inference_stream(
        &self,
        provider: &Provider,
        body: &PartialJson,
        cx: &RequestCx,
    ) -> Result<mpsc::Receiver<StreamChunk>> {
        let resp = post_json(provider, "/responses", body, cx, "inference").await?;
        Ok(spawn_chunk_stream(resp))
    }
}
