//! The per-request pipeline: recursive handlers, candidate iteration,
//! dialect conversion, and the streaming loop.

use crate::error::ApiError;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse as _, Response};
use bytes::Bytes;
use futures_util::StreamExt as _;
use modelgate_plugin::{HandlerInvoker, PluginChain, PluginRegistry};
use modelgate_provider::{InferenceCommand, Provider, Router};
use modelgate_sse::SseWriter;
use modelgate_translate::{convert_request, convert_response, convert_response_chunk};
use modelgate_types::{
    GatewayError, PartialJson, RequestCx, Result, StreamChunk, Style,
};
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Everything one request (and its recursive re-entries) runs against.
pub struct Pipeline {
    router: Arc<Router>,
    registry: Arc<PluginRegistry>,
    head_plugins: Vec<String>,
    tail_plugins: Vec<String>,
    /// Client dialect of this request.
    style: Style,
    /// Plugin path segments below the route prefix, if any.
    path_plugins: Option<String>,
    cx: Arc<RequestCx>,
}

impl Pipeline {
    /// Builds the pipeline for one inbound request.
    #[must_use]
    pub fn new(
        router: Arc<Router>,
        registry: Arc<PluginRegistry>,
        head_plugins: Vec<String>,
        tail_plugins: Vec<String>,
        style: Style,
        path_plugins: Option<String>,
        cx: Arc<RequestCx>,
    ) -> Arc<Self> {
        Arc::new(Self {
            router,
            registry,
            head_plugins,
            tail_plugins,
            style,
            path_plugins,
            cx,
        })
    }

    /// Runs the request end-to-end and renders the response.
    ///
    /// Recursive plugins run first and may own the response; otherwise
    /// every router candidate is attempted in order, and the first
    /// remembered error surfaces if none succeeds.
    pub async fn dispatch(self: &Arc<Self>, body: PartialJson) -> Response {
        let model = body.get::<String>("model").unwrap_or_default();
        let chain = self.registry.assemble(
            &self.head_plugins,
            self.path_plugins.as_deref(),
            &model,
            &self.tail_plugins,
        );

        let invoker: Arc<dyn HandlerInvoker> = Arc::new(Invoker {
            pipeline: self.clone(),
        });
        match chain.run_recursive(&invoker, &self.cx, &body).await {
            Ok(Some(response)) => return response,
            Ok(None) => {}
            Err(e) => return ApiError(e).into_response(),
        }

        let (candidates, normalized) = self.router.resolve(&model);
        let mut first_error: Option<GatewayError> = None;

        for candidate in candidates {
            let Some(provider) = self.router.provider(&candidate) else {
                continue;
            };
            let Some(command) = provider.inference_command() else {
                continue;
            };

            let mut attempt = body.clone();
            if let Err(e) = attempt.set("model", &normalized) {
                return ApiError(e).into_response();
            }

            let attempt = match chain.run_before(&provider, &self.cx, attempt).await {
                Ok(req) => req,
                Err(e) => {
                    tracing::warn!(
                        provider = provider.name(),
                        error = %e,
                        "before hook failed, trying next candidate"
                    );
                    first_error.get_or_insert(e);
                    continue;
                }
            };

            let stream = attempt.get::<bool>("stream").unwrap_or(false);
            tracing::info!(
                trace_id = %self.cx.trace_id(),
                provider = provider.name(),
                model = %normalized,
                stream,
                "dispatching to provider"
            );

            if stream {
                return self
                    .stream_attempt(&chain, &provider, attempt, &normalized)
                    .await;
            }
            match self
                .complete_attempt(&chain, &provider, command, &attempt)
                .await
            {
                Ok(response) => {
                    return with_attempt_headers(response, &provider, &normalized, &chain);
                }
                Err(Attempt::TryNext(e)) => {
                    first_error.get_or_insert(e);
                }
                Err(Attempt::Abort(e)) => return ApiError(e).into_response(),
            }
        }

        let error = first_error.unwrap_or_else(|| {
            GatewayError::RouterNotFound(format!(
                "no provider can serve model {model:?} on router {}",
                self.router.name()
            ))
        });
        ApiError(error).into_response()
    }

    /// One non-streaming provider attempt.
    async fn complete_attempt(
        &self,
        chain: &PluginChain,
        provider: &Arc<Provider>,
        command: &dyn InferenceCommand,
        attempt: &PartialJson,
    ) -> std::result::Result<Response, Attempt> {
        let converted = convert_request(attempt.clone(), self.style, provider.style())
            .map_err(Attempt::Abort)?;

        let (status, resp) = match command.inference(provider, &converted, &self.cx).await {
            Ok(ok) => ok,
            Err(e) => {
                chain.run_error(provider, &self.cx, attempt, &e).await;
                return Err(Attempt::TryNext(e));
            }
        };

        let resp =
            convert_response(resp, provider.style(), self.style).map_err(Attempt::Abort)?;
        let resp = chain
            .run_after(provider, &self.cx, attempt, status, resp)
            .await
            .map_err(Attempt::Abort)?;
        let bytes = resp.marshal().map_err(Attempt::Abort)?;

        Ok((
            StatusCode::OK,
            [(http::header::CONTENT_TYPE, "application/json")],
            bytes,
        )
            .into_response())
    }

    /// One streaming provider attempt. Commits a 200 event-stream
    /// response immediately; everything after the heartbeat, including
    /// start failures, is surfaced as SSE frames.
    async fn stream_attempt(
        self: &Arc<Self>,
        chain: &PluginChain,
        provider: &Arc<Provider>,
        attempt: PartialJson,
        normalized: &str,
    ) -> Response {
        let (writer, frames) = SseWriter::channel();

        let mut response = Response::new(Body::from_stream(frames.map(Ok::<_, Infallible>)));
        SseWriter::apply_headers(response.headers_mut());
        let response = with_attempt_headers(response, provider, normalized, chain);

        let pipeline = self.clone();
        let chain = chain.clone();
        let provider = provider.clone();
        tokio::spawn(async move {
            pipeline
                .drive_stream(&chain, &provider, attempt, writer)
                .await;
        });

        response
    }

    /// Consumer side of the streaming producer/consumer pair.
    async fn drive_stream(
        &self,
        chain: &PluginChain,
        provider: &Arc<Provider>,
        attempt: PartialJson,
        writer: SseWriter,
    ) {
        if writer.heartbeat("ok").await.is_err() {
            return;
        }

        let Some(command) = provider.inference_command() else {
            return;
        };
        let converted = match convert_request(attempt.clone(), self.style, provider.style()) {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "request conversion failed");
                let _ = writer.write_error(&e.to_string()).await;
                let _ = writer.write_done().await;
                return;
            }
        };

        let mut chunks: mpsc::Receiver<StreamChunk> =
            match command.inference_stream(provider, &converted, &self.cx).await {
                Ok(rx) => rx,
                Err(e) => {
                    chain.run_error(provider, &self.cx, &attempt, &e).await;
                    let _ = writer.write_error(&e.to_string()).await;
                    let _ = writer.write_done().await;
                    return;
                }
            };

        let mut last: Option<PartialJson> = None;
        loop {
            match chunks.recv().await {
                Some(StreamChunk::Error(e)) => {
                    // Mid-stream failure: no stream_end for this request.
                    let _ = writer.write_error(&e.to_string()).await;
                    chain.run_error(provider, &self.cx, &attempt, &e).await;
                    return;
                }
                Some(StreamChunk::Data(chunk)) => {
                    let converted =
                        match convert_response_chunk(chunk, provider.style(), self.style) {
                            Ok(Some(c)) => c,
                            Ok(None) => continue,
                            Err(e) => {
                                tracing::warn!(
                                    provider = provider.name(),
                                    error = %e,
                                    "chunk conversion failed"
                                );
                                let _ = writer.write_error(&e.to_string()).await;
                                let _ = writer.write_done().await;
                                return;
                            }
                        };
                    let Some(chunk) = chain
                        .run_after_chunk(provider, &self.cx, &attempt, converted)
                        .await
                    else {
                        continue;
                    };
                    let Ok(bytes) = chunk.marshal() else {
                        continue;
                    };
                    if writer.write_raw(&bytes).await.is_err() {
                        // Client gone: drop the chunk receiver so the
                        // upstream read aborts, then close out the hooks
                        // with the last chunk the client actually got.
                        drop(chunks);
                        chain
                            .run_stream_end(provider, &self.cx, &attempt, last.as_ref())
                            .await;
                        return;
                    }
                    last = Some(chunk);
                }
                None => {
                    chain
                        .run_stream_end(provider, &self.cx, &attempt, last.as_ref())
                        .await;
                    let _ = writer.write_done().await;
                    return;
                }
            }
        }
    }
}

/// How a failed non-streaming attempt affects iteration.
enum Attempt {
    /// Provider-side failure; remember it and try the next candidate.
    TryNext(GatewayError),
    /// Request-level failure (conversion, after-hook); stop iterating.
    Abort(GatewayError),
}

/// Stamps the per-attempt response headers.
fn with_attempt_headers(
    mut response: Response,
    provider: &Provider,
    model: &str,
    chain: &PluginChain,
) -> Response {
    let label = chain.label();
    let headers = response.headers_mut();
    for (name, value) in [
        ("x-real-provider-id", provider.name()),
        ("x-real-model-id", model),
        ("x-plugins-executed", label.as_str()),
    ] {
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(HeaderName::from_static(name), value);
        }
    }
    response
}

/// Re-enters [`Pipeline::dispatch`] on behalf of recursive plugins.
struct Invoker {
    pipeline: Arc<Pipeline>,
}

#[async_trait]
impl HandlerInvoker for Invoker {
    async fn invoke(&self, body: PartialJson) -> Response {
        self.pipeline.dispatch(body).await
    }

    async fn invoke_capture(&self, body: PartialJson) -> Result<(StatusCode, Bytes)> {
        let response = self.pipeline.dispatch(body).await;
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .map_err(|e| GatewayError::Stream(format!("capturing recursive response: {e}")))?;
        Ok((status, bytes))
    }
}
