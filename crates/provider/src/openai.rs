//! OpenAI Chat Completions driver.
//!
//! Auth: `Authorization: Bearer`. Endpoints: `/chat/completions`,
//! `/models`.

use crate::http_util::{get_json, post_json, read_complete, spawn_chunk_stream};
use crate::{InferenceCommand, ListModelsCommand, Provider};
use async_trait::async_trait;
use http::StatusCode;
use modelgate_types::{ModelEntry, PartialJson, RequestCx, Result, StreamChunk};
use serde_json::Value;
use tokio::sync::mpsc;

/// Driver for `openai-chat-completions` providers.
pub struct ChatCompletionsDriver;

/// Parses an OpenAI-format model listing (`{"data": [...]}`).
pub(crate) fn parse_model_list(body: &Value) -> Vec<ModelEntry> {
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
                owned_by: m
                    .get("owned_by")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                created: m.get("created").and_then(Value::as_u64).unwrap_or(0),
                id,
            })
        })
        .collect()
}

#[async_trait]
impl ListModelsCommand for ChatCompletionsDriver {
    async fn list_models(&self, provider: &Provider, cx: &RequestCx) -> Result<Vec<ModelEntry>> {
        let body = get_json(provider, "/models", cx, "list_models").await?;
        Ok(parse_model_list(&body))
    }
}

#[async_trait]
impl InferenceCommand for ChatCompletionsDriver {
    async fn inference(
        &self,
        provider: &Provider,
        body: &PartialJson,
        cx: &RequestCx,
    ) -> Result<(StatusCode, PartialJson)> {
        let resp = post_json(provider, "/chat/completions", body, cx, "inference").await?;
        read_complete(resp).await
    }

    async fn inference_stream(
        &self,
        provider: &Provider,
        body: &PartialJson,
        cx: &RequestCx,
    ) -> Result<mpsc::Receiver<StreamChunk>> {
        let resp = post_json(provider, "/chat/completions", body, cx, "inference").await?;
        Ok(spawn_chunk_stream(resp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_auth::EnvAuthService;
    use modelgate_config::ProviderConfig;
    use modelgate_types::{GatewayError, Style};
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn mock_provider(server: &MockServer) -> Provider {
        Provider::from_config(
            "openai",
            &ProviderConfig {
                base_url: server.uri(),
                style: Style::OpenAiChatCompletions,
                aliases: std::collections::HashMap::new(),
            },
            Arc::new(EnvAuthService::new()),
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_model_list() {
        let body = serde_json::json!({
            "object": "list",
            "data": [
                {"id": "gpt-4", "owned_by": "openai", "created": 1700000000},
                {"id": "gpt-4o-mini", "owned_by": "openai"}
            ]
        });
        let entries = parse_model_list(&body);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, "gpt-4");
        assert_eq!(entries[0].display_name, "gpt-4");
        assert_eq!(entries[0].owned_by, "openai");
        assert_eq!(entries[0].created, 1_700_000_000);
        assert_eq!(entries[1].created, 0);
    }

    #[test]
    fn test_parse_model_list_tolerates_missing_data() {
        assert!(parse_model_list(&serde_json::json!({"object": "list"})).is_empty());
    }

    #[tokio::test]
    async fn test_inference_complete() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": "c1",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"},
                             "finish_reason": "stop"}]
            })))
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let body = PartialJson::parse(br#"{"model":"gpt-4","messages":[]}"#).unwrap();
        let cx = RequestCx::default();
        let (status, resp) = ChatCompletionsDriver
            .inference(&provider, &body, &cx)
            .await
            .unwrap();
        assert_eq!(status, StatusCode::OK);
        assert_eq!(resp.get::<String>("id").as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_inference_non_2xx_is_upstream_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let body = PartialJson::parse(br#"{"model":"gpt-4"}"#).unwrap();
        let err = ChatCompletionsDriver
            .inference(&provider, &body, &RequestCx::default())
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Upstream { status: 500, .. }));
        assert_eq!(err.to_string(), "500 - boom");
    }

    #[tokio::test]
    async fn test_inference_stream_forwards_sse_chunks() {
        let server = MockServer::start().await;
        let sse = "data: {\"id\":\"c1\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"}}]}\n\n\
                   data: [DONE]\n\n";
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"),
            )
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let body = PartialJson::parse(br#"{"model":"gpt-4","stream":true}"#).unwrap();
        let mut rx = ChatCompletionsDriver
            .inference_stream(&provider, &body, &RequestCx::default())
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        match first {
            StreamChunk::Data(c) => assert_eq!(c.get::<String>("id").as_deref(), Some("c1")),
            StreamChunk::Error(e) => panic!("unexpected error chunk: {e}"),
        }
        // [DONE] closes the channel without being forwarded.
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_inference_stream_non_2xx_emits_error_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let body = PartialJson::parse(br#"{"model":"gpt-4","stream":true}"#).unwrap();
        let mut rx = ChatCompletionsDriver
            .inference_stream(&provider, &body, &RequestCx::default())
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            StreamChunk::Error(e) => assert_eq!(e.to_string(), "429 - slow down"),
            StreamChunk::Data(_) => panic!("expected error chunk"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_inference_stream_non_sse_body_is_single_chunk() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "c2"})),
            )
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let body = PartialJson::parse(br#"{"model":"gpt-4","stream":true}"#).unwrap();
        let mut rx = ChatCompletionsDriver
            .inference_stream(&provider, &body, &RequestCx::default())
            .await
            .unwrap();

        match rx.recv().await.unwrap() {
            StreamChunk::Data(c) => assert_eq!(c.get::<String>("id").as_deref(), Some("c2")),
            StreamChunk::Error(e) => panic!("unexpected error chunk: {e}"),
        }
        assert!(rx.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_list_models() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "object": "list",
                "data": [{"id": "gpt-4", "owned_by": "openai"}]
            })))
            .mount(&server)
            .await;

        let provider = mock_provider(&server).await;
        let models = ChatCompletionsDriver
            .list_models(&provider, &RequestCx::default())
            .await
            .unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].id, "gpt-4");
    }
}
