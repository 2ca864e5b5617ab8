//! `valias` plugin — virtual-provider alias rewriting.

use crate::{HandlerInvoker, Plugin};
use async_trait::async_trait;
use axum::response::Response;
use modelgate_types::{PartialJson, RequestCx, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Rewrites `virtualProvider/alias[+plugins]` models to their mapped
/// target spec and re-enters the pipeline once.
///
/// Built at provisioning time from every virtual provider's alias table.
pub struct ValiasPlugin {
    /// virtual provider name (lowercased) → alias → target model spec.
    aliases: HashMap<String, HashMap<String, String>>,
}

impl ValiasPlugin {
    /// Creates the plugin from virtual-provider alias tables.
    #[must_use]
    pub fn new(aliases: HashMap<String, HashMap<String, String>>) -> Self {
        let aliases = aliases
            .into_iter()
            .map(|(provider, table)| (provider.to_lowercase(), table))
            .collect();
        Self { aliases }
    }

    /// Resolves `provider/alias` to the mapped target, if any.
    fn target(&self, base: &str) -> Option<&str> {
        let (prefix, alias) = base.split_once('/')?;
        self.aliases
            .get(&prefix.to_lowercase())?
            .get(alias)
            .map(String::as_str)
    }
}

#[async_trait]
impl Plugin for ValiasPlugin {
    fn name(&self) -> &'static str {
        "valias"
    }

    async fn recursive(
        &self,
        _params: &str,
        invoker: &Arc<dyn HandlerInvoker>,
        _cx: &RequestCx,
        req: &PartialJson,
    ) -> Result<Option<Response>> {
        let model = req.get::<String>("model").unwrap_or_default();
        let base = model.split('+').next().unwrap_or_default();
        let Some(target) = self.target(base) else {
            return Ok(None);
        };
        let suffix = &model[base.len()..];

        // The target names a concrete provider, so the inner call does
        // not resolve through the alias table again.
        let rewritten = format!("{target}{suffix}");
        tracing::debug!(alias = base, model = %rewritten, "virtual alias resolved");
        let inner = req.clone_with("model", &rewritten)?;
        Ok(Some(invoker.invoke(inner).await))
    }
}
