//! `fuzz` plugin — partial model name resolution against the provider's
//! listing.

use crate::Plugin;
use async_trait::async_trait;
use modelgate_provider::Provider;
use modelgate_types::{PartialJson, RequestCx, Result};
use std::collections::HashMap;
use std::sync::RwLock;

/// Resolves a partial model name to the first listed model containing it
/// as a substring. First hits are cached per `(provider, original)`;
/// resolution is a pure optimization and every failure leaves the request
/// untouched.
pub struct FuzzPlugin {
    cache: RwLock<HashMap<(String, String), String>>,
}

impl FuzzPlugin {
    /// Creates the plugin with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for FuzzPlugin {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Plugin for FuzzPlugin {
    fn name(&self) -> &'static str {
        "fuzz"
    }

    async fn before(
        &self,
        _params: &str,
        provider: &Provider,
        cx: &RequestCx,
        mut req: PartialJson,
    ) -> Result<PartialJson> {
        let Some(model) = req.get::<String>("model") else {
            return Ok(req);
        };

        let cache_key = (provider.name().to_string(), model.clone());
        let cached = self
            .cache
            .read()
            .expect("fuzz cache lock")
            .get(&cache_key)
            .cloned();
        if let Some(hit) = cached {
            req.set("model", &hit)?;
            return Ok(req);
        }

        let Some(cmd) = provider.list_models_command() else {
            return Ok(req);
        };
        let models = match cmd.list_models(provider, cx).await {
            Ok(models) => models,
            Err(e) => {
                tracing::debug!(provider = provider.name(), error = %e, "fuzz listing failed");
                return Ok(req);
            }
        };

        if models.iter().any(|m| m.id == model) {
            return Ok(req);
        }
        if let Some(hit) = models.iter().find(|m| m.id.contains(&model)) {
            tracing::info!(
                provider = provider.name(),
                requested = %model,
                resolved = %hit.id,
                "fuzzy model match"
            );
            self.cache
                .write()
                .expect("fuzz cache lock")
                .insert(cache_key, hit.id.clone());
            req.set("model", &hit.id)?;
        }
        Ok(req)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_auth::EnvAuthService;
    use modelgate_config::ProviderConfig;
    use modelgate_types::Style;
    use std::sync::Arc;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn provider_with_models(server: &MockServer) -> Provider {
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"id": "gpt-4-turbo-2024-04-09", "owned_by": "openai"},
                    {"id": "gpt-4o-mini", "owned_by": "openai"}
                ]
            })))
            .expect(1) // second resolution must come from the cache
            .mount(server)
            .await;
        Provider::from_config(
            "openai",
            &ProviderConfig {
                base_url: server.uri(),
                style: Style::OpenAiChatCompletions,
                aliases: HashMap::new(),
            },
            Arc::new(EnvAuthService::new()),
            reqwest::Client::new(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_partial_name_resolved_and_cached() {
        let server = MockServer::start().await;
        let provider = provider_with_models(&server).await;
        let plugin = FuzzPlugin::new();
        let cx = RequestCx::default();

        for _ in 0..2 {
            let req = PartialJson::parse(br#"{"model":"gpt-4-turbo"}"#).unwrap();
            let out = plugin.before("", &provider, &cx, req).await.unwrap();
            assert_eq!(
                out.get::<String>("model").as_deref(),
                Some("gpt-4-turbo-2024-04-09")
            );
        }
    }

    #[tokio::test]
    async fn test_exact_match_untouched() {
        let server = MockServer::start().await;
        let provider = provider_with_models(&server).await;
        let plugin = FuzzPlugin::new();
        let req = PartialJson::parse(br#"{"model":"gpt-4o-mini"}"#).unwrap();
        let out = plugin
            .before("", &provider, &RequestCx::default(), req)
            .await
            .unwrap();
        assert_eq!(out.get::<String>("model").as_deref(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_listing_failure_leaves_request_alone() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/models"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let provider = Provider::from_config(
            "openai",
            &ProviderConfig {
                base_url: server.uri(),
                style: Style::OpenAiChatCompletions,
                aliases: HashMap::new(),
            },
            Arc::new(EnvAuthService::new()),
            reqwest::Client::new(),
        )
        .unwrap();
        let plugin = FuzzPlugin::new();
        let req = PartialJson::parse(br#"{"model":"gpt-4-turbo"}"#).unwrap();
        let out = plugin
            .before("", &provider, &RequestCx::default(), req)
            .await
            .unwrap();
        assert_eq!(out.get::<String>("model").as_deref(), Some("gpt-4-turbo"));
    }
}
