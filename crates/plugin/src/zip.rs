//! `zip` plugin — compacts long conversations through a summarization
//! round-trip.

use crate::Plugin;
use async_trait::async_trait;
use modelgate_provider::Provider;
use modelgate_translate::{convert_request, convert_response};
use modelgate_types::{PartialJson, RequestCx, Result, Style};
use serde_json::{Value, json};
use sha2::{Digest as _, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

/// Marker prepended to the synthesized summary message.
const SUMMARY_PREFIX: &str = "[Previous conversation summary]";

/// Per-message token overhead in the estimate.
const PER_MESSAGE_OVERHEAD: usize = 4;

/// Options parsed from the instance parameter string.
///
/// Comma-separated tokens: a number overrides the threshold,
/// `keepfirst` preserves the first user message in the head, `cache`
/// reuses summaries by middle-content hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ZipOptions {
    threshold: usize,
    keep_first_user: bool,
    cache: bool,
}

/// Compacts conversations whose estimated token count exceeds the
/// threshold: leading system messages (and optionally the first user
/// message) stay, the trailing user turn stays, and the middle is
/// replaced with a provider-produced summary plus an assistant
/// acknowledgement.
pub struct ZipPlugin {
    default_threshold: usize,
    cache: RwLock<HashMap<String, String>>,
}

impl ZipPlugin {
    /// Creates the plugin with the configured default threshold.
    #[must_use]
    pub fn new(default_threshold: usize) -> Self {
        Self {
            default_threshold,
            cache: RwLock::new(HashMap::new()),
        }
    }

    fn options(&self, params: &str) -> ZipOptions {
        let mut opts = ZipOptions {
            threshold: self.default_threshold,
            keep_first_user: false,
            cache: false,
        };
        for token in params.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            if let Ok(n) = token.parse::<usize>() {
                opts.threshold = n;
            } else if token == "keepfirst" {
                opts.keep_first_user = true;
            } else if token == "cache" {
                opts.cache = true;
            }
        }
        opts
    }

    /// Produces a summary of `middle`, from the cache or via one
    /// non-streaming provider round-trip in the provider's own dialect.
    async fn summarize(
        &self,
        provider: &Provider,
        cx: &RequestCx,
        model: &str,
        middle: &[Value],
        opts: ZipOptions,
    ) -> Result<String> {
        let transcript = serde_json::to_string(middle)?;
        let key = format!("{:x}", Sha256::digest(transcript.as_bytes()));

        if opts.cache
            && let Some(hit) = self.cache.read().expect("zip cache lock").get(&key)
        {
            return Ok(hit.clone());
        }

        let Some(cmd) = provider.inference_command() else {
            return Err(modelgate_types::GatewayError::Plugin(
                "zip: provider has no inference command".to_string(),
            ));
        };

        let request = PartialJson::from_value(&json!({
            "model": model,
            "stream": false,
            "messages": [{
                "role": "user",
                "content": format!(
                    "Summarize the following conversation concisely, keeping every fact, \
                     decision, and open question:\n\n{transcript}"
                ),
            }],
        }))?;
        let request = convert_request(request, Style::OpenAiChatCompletions, provider.style())?;
        let (_, response) = cmd.inference(provider, &request, cx).await?;
        let response =
            convert_response(response, provider.style(), Style::OpenAiChatCompletions)?;

        let summary = response
            .get::<Vec<Value>>("choices")
            .and_then(|choices| {
                choices
                    .first()?
                    .pointer("/message/content")?
                    .as_str()
                    .map(ToString::to_string)
            })
            .unwrap_or_default();

        if opts.cache && !summary.is_empty() {
            self.cache
                .write()
                .expect("zip cache lock")
                .insert(key, summary.clone());
        }
        Ok(summary)
    }
}

/// ≈ chars/4 plus a fixed overhead per message.
fn estimate_tokens(messages: &[Value]) -> usize {
    messages
        .iter()
        .map(|m| {
            let chars = m
                .get("content")
                .and_then(Value::as_str)
                .map_or(0, str::len);
            chars / 4 + PER_MESSAGE_OVERHEAD
        })
        .sum()
}

fn role(message: &Value) -> &str {
    message.get("role").and_then(Value::as_str).unwrap_or("")
}

#[async_trait]
impl Plugin for ZipPlugin {
    fn name(&self) -> &'static str {
        "zip"
    }

    async fn before(
        &self,
        params: &str,
        provider: &Provider,
        cx: &RequestCx,
        mut req: PartialJson,
    ) -> Result<PartialJson> {
        let opts = self.options(params);
        let Some(messages) = req.get::<Vec<Value>>("messages") else {
            return Ok(req);
        };
        if estimate_tokens(&messages) <= opts.threshold {
            return Ok(req);
        }

        // Preserve head: leading system messages, optionally the first
        // user message right after them.
        let mut head_end = 0;
        while head_end < messages.len() && role(&messages[head_end]) == "system" {
            head_end += 1;
        }
        if opts.keep_first_user
            && head_end < messages.len()
            && role(&messages[head_end]) == "user"
        {
            head_end += 1;
        }

        // Preserve tail: the trailing user message, or user+assistant pair.
        let mut tail_start = messages.len().saturating_sub(1);
        if messages.len() >= 2
            && role(&messages[messages.len() - 1]) == "assistant"
            && role(&messages[messages.len() - 2]) == "user"
        {
            tail_start = messages.len() - 2;
        }

        if tail_start <= head_end {
            return Ok(req);
        }
        let middle = &messages[head_end..tail_start];

        let model = req.get::<String>("model").unwrap_or_default();
        let summary = match self.summarize(provider, cx, &model, middle, opts).await {
            Ok(s) if !s.is_empty() => s,
            Ok(_) => {
                tracing::warn!(provider = provider.name(), "zip summary came back empty");
                return Ok(req);
            }
            Err(e) => {
                tracing::warn!(provider = provider.name(), error = %e, "zip summarization failed");
                return Ok(req);
            }
        };

        let mut compacted: Vec<Value> = messages[..head_end].to_vec();
        compacted.push(json!({
            "role": "user",
            "content": format!("{SUMMARY_PREFIX}\n{summary}"),
        }));
        compacted.push(json!({
            "role": "assistant",
            "content": "Understood. I have the context from the summary.",
        }));
        compacted.extend_from_slice(&messages[tail_start..]);

        tracing::info!(
            provider = provider.name(),
            original = messages.len(),
            compacted = compacted.len(),
            "conversation compacted"
        );
        req.set("messages", &compacted)?;
        Ok(req)
    }
}
