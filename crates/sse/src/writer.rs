//! SSE writer — channel-backed downstream event-stream body.

use bytes::Bytes;
use http::HeaderMap;
use http::header::{
    CACHE_CONTROL, CONNECTION, CONTENT_ENCODING, CONTENT_TYPE, HeaderName, HeaderValue,
};
use modelgate_types::{GatewayError, Result};
use serde_json::json;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Writes one SSE response body through a capacity-1 channel.
///
/// Every write completes only once the previous frame has been taken by
/// the transport, so a slow client transitively paces the upstream read.
/// A failed send means the client is gone; it surfaces as
/// [`GatewayError::Stream`] and terminates the stream.
pub struct SseWriter {
    tx: mpsc::Sender<Bytes>,
}

impl SseWriter {
    /// Creates a writer and the frame stream to hand to the response body.
    #[must_use]
    pub fn channel() -> (Self, ReceiverStream<Bytes>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx }, ReceiverStream::new(rx))
    }

    /// Sets the event-stream response headers, removing `Content-Encoding`.
    pub fn apply_headers(headers: &mut HeaderMap) {
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        headers.insert(
            CACHE_CONTROL,
            HeaderValue::from_static("no-cache, no-transform"),
        );
        headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
        headers.insert(
            HeaderName::from_static("x-accel-buffering"),
            HeaderValue::from_static("no"),
        );
        headers.remove(CONTENT_ENCODING);
    }

    /// Writes a comment heartbeat: `":<msg>\n\n"`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Stream`] if the client is gone.
    pub async fn heartbeat(&self, msg: &str) -> Result<()> {
        self.send(Bytes::from(format!(":{msg}\n\n"))).await
    }

    /// Writes one data frame: `"data: <payload>\n\n"`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Stream`] if the client is gone.
    pub async fn write_raw(&self, payload: &[u8]) -> Result<()> {
        let mut frame = Vec::with_capacity(payload.len() + 8);
        frame.extend_from_slice(b"data: ");
        frame.extend_from_slice(payload);
        frame.extend_from_slice(b"\n\n");
        self.send(Bytes::from(frame)).await
    }

    /// Writes an error frame: `data: {"error":"<msg>"}`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Stream`] if the client is gone.
    pub async fn write_error(&self, msg: &str) -> Result<()> {
        let payload = json!({ "error": msg }).to_string();
        self.write_raw(payload.as_bytes()).await
    }

    /// Writes the terminal frame: `data: [DONE]`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Stream`] if the client is gone.
    pub async fn write_done(&self) -> Result<()> {
        self.send(Bytes::from_static(b"data: [DONE]\n\n")).await
    }

    async fn send(&self, frame: Bytes) -> Result<()> {
        self.tx
            .send(frame)
            .await
            .map_err(|_| GatewayError::Stream("client disconnected".to_string()))
    }
}
