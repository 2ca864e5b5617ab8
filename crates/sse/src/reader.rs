//! SSE reader — upstream byte stream to parsed event channel.

use futures_util::StreamExt as _;
use modelgate_types::{ByteStream, GatewayError, Result};
use serde_json::Value;
use tokio::sync::mpsc;

/// Initial capacity of the line buffer.
const INITIAL_BUF: usize = 64 * 1024;

/// Largest event the reader accepts.
const MAX_EVENT: usize = 1024 * 1024;

/// One parsed event from an upstream event stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A non-terminal event payload, already JSON-parsed.
    Data(Value),
    /// The `[DONE]` sentinel.
    Done,
}

/// Spawns a producer task that parses `stream` as Server-Sent Events.
///
/// The returned channel has capacity 1: the producer blocks while the
/// consumer is busy, which transitively paces the upstream read. The
/// channel closes when upstream EOFs, errors, or the consumer goes away.
///
/// Framing rules:
/// - a trailing `\r` is trimmed from every line
/// - `:` comment lines (heartbeats) are ignored
/// - `data:` lines accumulate, joined with `\n`, one leading space stripped
/// - `event:` / `id:` / `retry:` lines are accepted but ignored
/// - a blank line emits the accumulated payload; a trailing event without
///   a blank line is still flushed at EOF
/// - payload `[DONE]` emits [`SseEvent::Done`]; an empty payload is skipped
/// - any other payload is JSON-parsed; a parse error emits one error item
///   and closes the channel
pub fn spawn_reader(mut stream: ByteStream) -> mpsc::Receiver<Result<SseEvent>> {
    let (tx, rx) = mpsc::channel(1);
    tokio::spawn(async move {
        let mut buf: Vec<u8> = Vec::with_capacity(INITIAL_BUF);
        let mut acc = String::new();

        loop {
            while let Some(nl) = buf.iter().position(|&b| b == b'\n') {
                let raw: Vec<u8> = buf.drain(..=nl).collect();
                let line = String::from_utf8_lossy(&raw);
                let line = line.trim_end_matches(['\n', '\r']);

                if line.is_empty() {
                    if !flush(&tx, &mut acc).await {
                        return;
                    }
                } else if !accept_line(line, &mut acc) {
                    continue;
                }

                if acc.len() > MAX_EVENT {
                    let _ = tx
                        .send(Err(GatewayError::Stream(
                            "SSE event exceeds 1 MiB".to_string(),
                        )))
                        .await;
                    return;
                }
            }

            if buf.len() > MAX_EVENT {
                let _ = tx
                    .send(Err(GatewayError::Stream(
                        "SSE line exceeds 1 MiB".to_string(),
                    )))
                    .await;
                return;
            }

            match stream.next().await {
                Some(Ok(bytes)) => buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    let _ = tx.send(Err(e)).await;
                    return;
                }
                None => {
                    // Flush a trailing event that was not blank-line terminated.
                    let _ = flush(&tx, &mut acc).await;
                    return;
                }
            }
        }
    });
    rx
}

/// Folds one non-blank line into the event accumulator.
fn accept_line(line: &str, acc: &mut String) -> bool {
    if line.starts_with(':') {
        return false; // comment / heartbeat
    }
    if let Some(rest) = line.strip_prefix("data:") {
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        if !acc.is_empty() {
            acc.push('\n');
        }
        acc.push_str(rest);
        return true;
    }
    // event: / id: / retry: and anything else — accepted, ignored.
    false
}

/// Emits the accumulated payload, if any. Returns `false` when the reader
/// task should stop (consumer gone or payload unparseable).
async fn flush(tx: &mpsc::Sender<Result<SseEvent>>, acc: &mut String) -> bool {
    let payload = std::mem::take(acc);
    if payload.is_empty() {
        return true;
    }
    if payload == "[DONE]" {
        return tx.send(Ok(SseEvent::Done)).await.is_ok();
    }
    match serde_json::from_str::<Value>(&payload) {
        Ok(v) => tx.send(Ok(SseEvent::Data(v))).await.is_ok(),
        Err(e) => {
            let _ = tx
                .send(Err(GatewayError::Stream(format!(
                    "invalid SSE payload: {e}"
                ))))
                .await;
            false
        }
    }
}
