//! Plugin registry and per-request chain assembly.

use crate::{HandlerInvoker, Plugin};
use axum::response::Response;
use http::StatusCode;
use modelgate_provider::Provider;
use modelgate_types::{GatewayError, PartialJson, RequestCx, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// A plugin bound to its per-instance parameter string.
#[derive(Clone)]
pub struct PluginInstance {
    /// The registered plugin.
    pub plugin: Arc<dyn Plugin>,
    /// Free-form parameters from the `name:params` segment.
    pub params: String,
}

impl PluginInstance {
    /// Renders `name` or `name:params`.
    #[must_use]
    pub fn label(&self) -> String {
        if self.params.is_empty() {
            self.plugin.name().to_string()
        } else {
            format!("{}:{}", self.plugin.name(), self.params)
        }
    }
}

/// Process-wide plugin registry; populated at startup, read-only after.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: HashMap<String, Arc<dyn Plugin>>,
}

impl PluginRegistry {
    /// Registers a plugin under its own name.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        self.plugins.insert(plugin.name().to_string(), plugin);
    }

    /// Looks up a plugin by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Plugin>> {
        self.plugins.get(name).cloned()
    }

    /// Assembles the chain for one request: head plugins, then URL path
    /// segments, then model-suffix segments, then tail plugins. Unknown
    /// names are silently ignored; order is the order of appending.
    #[must_use]
    pub fn assemble(
        &self,
        head: &[String],
        path_segments: Option<&str>,
        model: &str,
        tail: &[String],
    ) -> PluginChain {
        let mut items = Vec::new();

        for entry in head {
            self.append(&mut items, entry);
        }
        if let Some(path) = path_segments {
            for segment in path.split('/').filter(|s| !s.is_empty()) {
                self.append(&mut items, segment);
            }
        }
        for segment in model.split('+').skip(1).filter(|s| !s.is_empty()) {
            self.append(&mut items, segment);
        }
        for entry in tail {
            self.append(&mut items, entry);
        }

        PluginChain { items }
    }

    fn append(&self, items: &mut Vec<PluginInstance>, segment: &str) {
        let (name, params) = parse_segment(segment);
        if let Some(plugin) = self.get(name) {
            items.push(PluginInstance {
                plugin,
                params: params.to_string(),
            });
        }
    }
}

/// Splits a `name[:params]` segment.
fn parse_segment(segment: &str) -> (&str, &str) {
    segment.split_once(':').unwrap_or((segment, ""))
}

/// The ordered per-request middleware sequence.
#[derive(Clone, Default)]
pub struct PluginChain {
    items: Vec<PluginInstance>,
}

impl PluginChain {
    /// The chain entries, in execution order.
    #[must_use]
    pub fn items(&self) -> &[PluginInstance] {
        &self.items
    }

    /// Comma-joined `name[:params]` labels for `X-Plugins-Executed`.
    #[must_use]
    pub fn label(&self) -> String {
        self.items
            .iter()
            .map(PluginInstance::label)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Runs every `before` hook in chain order.
    ///
    /// # Errors
    ///
    /// Returns the first hook error; the caller treats it like a provider
    /// error and moves to the next candidate.
    pub async fn run_before(
        &self,
        provider: &Provider,
        cx: &RequestCx,
        mut req: PartialJson,
    ) -> Result<PartialJson> {
        for item in &self.items {
            req = item.plugin.before(&item.params, provider, cx, req).await?;
        }
        Ok(req)
    }

    /// Runs every `after` hook in chain order.
    ///
    /// # Errors
    ///
    /// Returns the first hook error; the caller surfaces it as a 500.
    pub async fn run_after(
        &self,
        provider: &Provider,
        cx: &RequestCx,
        req: &PartialJson,
        status: StatusCode,
        mut resp: PartialJson,
    ) -> Result<PartialJson> {
        for item in &self.items {
            resp = item
                .plugin
                .after(&item.params, provider, cx, req, status, resp)
                .await?;
        }
        Ok(resp)
    }

    /// Runs every `after_chunk` hook in chain order. A hook error is
    /// logged and drops the chunk; the stream continues.
    pub async fn run_after_chunk(
        &self,
        provider: &Provider,
        cx: &RequestCx,
        req: &PartialJson,
        chunk: PartialJson,
    ) -> Option<PartialJson> {
        let mut chunk = Some(chunk);
        for item in &self.items {
            let Some(current) = chunk.take() else {
                break;
            };
            match item
                .plugin
                .after_chunk(&item.params, provider, cx, req, current)
                .await
            {
                Ok(next) => chunk = next,
                Err(e) => {
                    tracing::warn!(
                        plugin = item.plugin.name(),
                        error = %e,
                        "after_chunk hook failed, dropping chunk"
                    );
                    return None;
                }
            }
        }
        chunk
    }

    /// Runs every `stream_end` hook in chain order.
    pub async fn run_stream_end(
        &self,
        provider: &Provider,
        cx: &RequestCx,
        req: &PartialJson,
        last: Option<&PartialJson>,
    ) {
        for item in &self.items {
            item.plugin
                .stream_end(&item.params, provider, cx, req, last)
                .await;
        }
    }

    /// Runs every `on_error` hook in chain order. Hook panics aside,
    /// nothing a hook does can abort candidate iteration.
    pub async fn run_error(
        &self,
        provider: &Provider,
        cx: &RequestCx,
        req: &PartialJson,
        error: &GatewayError,
    ) {
        for item in &self.items {
            item.plugin
                .on_error(&item.params, provider, cx, req, error)
                .await;
        }
    }

    /// Runs `recursive` hooks in chain order until one handles the
    /// request.
    ///
    /// # Errors
    ///
    /// Returns the first recursive-hook error.
    pub async fn run_recursive(
        &self,
        invoker: &Arc<dyn HandlerInvoker>,
        cx: &RequestCx,
        req: &PartialJson,
    ) -> Result<Option<Response>> {
        for item in &self.items {
            if let Some(response) = item
                .plugin
                .recursive(&item.params, invoker, cx, req)
                .await?
            {
                return Ok(Some(response));
            }
        }
        Ok(None)
    }
}
