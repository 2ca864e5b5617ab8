//! Shared outbound HTTP plumbing for provider drivers.
//!
//! Eliminates duplicated header-building, send → status-check, and
//! stream-or-complete logic across the per-style drivers.

use crate::Provider;
use futures_util::StreamExt as _;
use http::StatusCode;
use http::header::{
    ACCEPT_ENCODING, AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, HOST, HeaderMap,
    HeaderValue,
};
use modelgate_sse::{SseEvent, spawn_reader};
use modelgate_types::{ByteStream, GatewayError, PartialJson, RequestCx, Result, StreamChunk};
use tokio::sync::mpsc;

/// Anthropic API version header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Clones the inbound headers for the outbound request.
///
/// `Accept-Encoding` goes so upstream bodies arrive unencoded;
/// hop-by-hop and caller-credential headers go because the outbound
/// request carries its own.
fn outbound_headers(cx: &RequestCx) -> HeaderMap {
    let mut headers = cx.headers().clone();
    headers.remove(ACCEPT_ENCODING);
    headers.remove(AUTHORIZATION);
    headers.remove(CONNECTION);
    headers.remove(CONTENT_LENGTH);
    headers.remove(HOST);
    headers.remove("x-api-key");
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Attaches the style-specific credential header, if a credential exists.
async fn attach_auth(
    headers: &mut HeaderMap,
    provider: &Provider,
    cx: &RequestCx,
    scope: &str,
) -> Result<()> {
    let credential = provider
        .auth()
        .collect_target(scope, provider.name(), cx)
        .await?;

    if provider.style() == modelgate_types::Style::AnthropicMessages {
        headers.insert(
            "anthropic-version",
            HeaderValue::from_static(ANTHROPIC_VERSION),
        );
        if !credential.is_empty() {
            let value = HeaderValue::from_str(&credential)
                .map_err(|_| GatewayError::Auth("credential is not header-safe".to_string()))?;
            headers.insert("x-api-key", value);
        }
    } else if !credential.is_empty() {
        let value = HeaderValue::from_str(&format!("Bearer {credential}"))
            .map_err(|_| GatewayError::Auth("credential is not header-safe".to_string()))?;
        headers.insert(AUTHORIZATION, value);
    }
    Ok(())
}

/// POSTs a JSON body to the provider's endpoint path.
///
/// # Errors
///
/// Returns [`GatewayError::Http`] on transport failure. Status handling is
/// left to the caller.
pub(crate) async fn post_json(
    provider: &Provider,
    path: &str,
    body: &PartialJson,
    cx: &RequestCx,
    scope: &str,
) -> Result<reqwest::Response> {
    let mut headers = outbound_headers(cx);
    attach_auth(&mut headers, provider, cx, scope).await?;
    let resp = provider
        .http()
        .post(provider.endpoint(path))
        .headers(headers)
        .json(body)
        .send()
        .await?;
    Ok(resp)
}

/// GETs the provider's endpoint path.
///
/// # Errors
///
/// Returns [`GatewayError::Http`] on transport failure,
/// [`GatewayError::Upstream`] on a non-success status.
pub(crate) async fn get_json(
    provider: &Provider,
    path: &str,
    cx: &RequestCx,
    scope: &str,
) -> Result<serde_json::Value> {
    let mut headers = outbound_headers(cx);
    attach_auth(&mut headers, provider, cx, scope).await?;
    let resp = provider
        .http()
        .get(provider.endpoint(path))
        .headers(headers)
        .send()
        .await?;
    let status = resp.status();
    if !status.is_success() {
        return Err(upstream_error(status, resp).await);
    }
    Ok(resp.json().await?)
}

/// Reads a non-streaming inference response.
///
/// # Errors
///
/// Returns [`GatewayError::Upstream`] on a non-success status, or a
/// transport/parse error.
pub(crate) async fn read_complete(resp: reqwest::Response) -> Result<(StatusCode, PartialJson)> {
    let status = resp.status();
    if !status.is_success() {
        return Err(upstream_error(status, resp).await);
    }
    let bytes = resp.bytes().await?;
    let body = PartialJson::parse(&bytes)
        .map_err(|e| GatewayError::Translation(format!("upstream body: {e}")))?;
    Ok((status, body))
}

async fn upstream_error(status: StatusCode, resp: reqwest::Response) -> GatewayError {
    let body = resp.text().await.unwrap_or_default();
    GatewayError::Upstream {
        status: status.as_u16(),
        body,
    }
}

/// Turns a dispatched inference response into a chunk channel.
///
/// Non-2xx: one error chunk `"<status> - <body>"`, then close. Event
/// streams are fed through the SSE reader; anything else is read whole
/// and emitted as a single chunk. The channel has capacity 1; dropping
/// the receiver stops the forwarding task and aborts the upstream read.
pub(crate) fn spawn_chunk_stream(resp: reqwest::Response) -> mpsc::Receiver<StreamChunk> {
    let (tx, rx) = mpsc::channel(1);

    let status = resp.status();
    if !status.is_success() {
        tokio::spawn(async move {
            let err = upstream_error(status, resp).await;
            let _ = tx.send(StreamChunk::Error(err)).await;
        });
        return rx;
    }

    let is_event_stream = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().starts_with("text/event-stream"));

    if is_event_stream {
        let bytes: ByteStream = Box::pin(resp.bytes_stream().map(|r| r.map_err(GatewayError::from)));
        let mut events = spawn_reader(bytes);
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let chunk = match event {
                    Ok(SseEvent::Done) => break,
                    Ok(SseEvent::Data(v)) => match PartialJson::from_value(&v) {
                        Ok(body) => StreamChunk::Data(body),
                        Err(e) => {
                            let _ = tx.send(StreamChunk::Error(e)).await;
                            break;
                        }
                    },
                    Err(e) => {
                        let _ = tx.send(StreamChunk::Error(e)).await;
                        break;
                    }
                };
                if tx.send(chunk).await.is_err() {
                    break; // consumer cancelled
                }
            }
        });
    } else {
        tokio::spawn(async move {
            let chunk = match resp.bytes().await {
                Ok(bytes) => match PartialJson::parse(&bytes) {
                    Ok(body) => StreamChunk::Data(body),
                    Err(e) => StreamChunk::Error(e),
                },
                Err(e) => StreamChunk::Error(e.into()),
            };
            let _ = tx.send(chunk).await;
        });
    }

    rx
}
