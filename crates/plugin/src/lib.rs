//! Plugin middleware — hook traits, the per-request chain, and the
//! built-in plugins.
//!
//! A plugin is a named object that opts into any subset of six hooks.
//! Chains are assembled per request from the configured head list, URL
//! path segments, model-suffix segments, and the configured tail list, in
//! that order.

pub mod chain;
pub mod fallback;
pub mod fuzz;
pub mod parallel;
pub mod posthog;
pub mod stools;
pub mod valias;
pub mod zip;

pub use chain::{PluginChain, PluginInstance, PluginRegistry};
pub use fallback::ModelsPlugin;
pub use fuzz::FuzzPlugin;
pub use parallel::ParallelPlugin;
pub use posthog::PosthogPlugin;
pub use stools::SToolsPlugin;
pub use valias::ValiasPlugin;
pub use zip::ZipPlugin;

use async_trait::async_trait;
use axum::response::Response;
use bytes::Bytes;
use http::StatusCode;
use modelgate_provider::Provider;
use modelgate_types::{GatewayError, PartialJson, RequestCx, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Re-enters the request pipeline from inside a recursive plugin.
///
/// The invoker is bound to the current request's context, inbound style,
/// and path plugins; only the body changes between the outer and the
/// inner call.
#[async_trait]
pub trait HandlerInvoker: Send + Sync {
    /// Runs the pipeline for `body`, streaming straight through to the
    /// client. Errors are already rendered into the response.
    async fn invoke(&self, body: PartialJson) -> Response;

    /// Runs the pipeline for `body`, capturing the full response body.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Stream`] if the captured body cannot be
    /// collected.
    async fn invoke_capture(&self, body: PartialJson) -> Result<(StatusCode, Bytes)>;
}

/// One middleware unit. Every hook has a no-op default; a plugin
/// implements only the subset it needs.
///
/// A recursive plugin that rewrites `model` and re-enters must leave the
/// rewritten model outside its own trigger condition, or the recursion
/// will not terminate.
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Registry name, also used in `X-Plugins-Executed`.
    fn name(&self) -> &'static str;

    /// Runs before the request is sent, once per provider attempt.
    async fn before(
        &self,
        _params: &str,
        _provider: &Provider,
        _cx: &RequestCx,
        req: PartialJson,
    ) -> Result<PartialJson> {
        Ok(req)
    }

    /// Runs after a non-streaming response.
    async fn after(
        &self,
        _params: &str,
        _provider: &Provider,
        _cx: &RequestCx,
        _req: &PartialJson,
        _status: StatusCode,
        resp: PartialJson,
    ) -> Result<PartialJson> {
        Ok(resp)
    }

    /// Runs per streaming chunk. Returning `None` drops the chunk.
    async fn after_chunk(
        &self,
        _params: &str,
        _provider: &Provider,
        _cx: &RequestCx,
        _req: &PartialJson,
        chunk: PartialJson,
    ) -> Result<Option<PartialJson>> {
        Ok(Some(chunk))
    }

    /// Runs once after a stream closes cleanly, strictly after every
    /// `after_chunk`.
    async fn stream_end(
        &self,
        _params: &str,
        _provider: &Provider,
        _cx: &RequestCx,
        _req: &PartialJson,
        _last: Option<&PartialJson>,
    ) {
    }

    /// Runs on any provider-side error, pre-response or mid-stream.
    async fn on_error(
        &self,
        _params: &str,
        _provider: &Provider,
        _cx: &RequestCx,
        _req: &PartialJson,
        _error: &GatewayError,
    ) {
    }

    /// Runs before provider iteration. Returning `Some(response)` means
    /// the plugin owns the response and the pipeline returns it as-is.
    async fn recursive(
        &self,
        _params: &str,
        _invoker: &Arc<dyn HandlerInvoker>,
        _cx: &RequestCx,
        _req: &PartialJson,
    ) -> Result<Option<Response>> {
        Ok(None)
    }
}

/// Builds a registry with every built-in plugin.
///
/// `virtual_aliases` maps virtual provider names to their alias tables;
/// `zip_threshold` is the token estimate above which conversations are
/// compacted.
#[must_use]
pub fn builtin_registry(
    virtual_aliases: HashMap<String, HashMap<String, String>>,
    zip_threshold: usize,
) -> PluginRegistry {
    let mut registry = PluginRegistry::default();
    registry.register(Arc::new(ModelsPlugin));
    registry.register(Arc::new(ParallelPlugin));
    registry.register(Arc::new(ValiasPlugin::new(virtual_aliases)));
    registry.register(Arc::new(FuzzPlugin::new()));
    registry.register(Arc::new(SToolsPlugin));
    registry.register(Arc::new(ZipPlugin::new(zip_threshold)));
    registry.register(Arc::new(PosthogPlugin::from_env()));
    registry
}
