//! Upstream providers — per-style outbound HTTP drivers and the
//! model-to-candidates router.
//!
//! A [`Provider`] binds a name, a base URL, and a wire [`Style`] to a
//! command set: `list_models` and (except for virtual providers)
//! `inference`. Drivers are stateless; everything they need travels in
//! via the provider and the request context.

pub mod anthropic;
pub mod http_util;
pub mod openai;
pub mod responses;
pub mod router;
pub mod virtual_provider;

pub use anthropic::AnthropicDriver;
pub use openai::ChatCompletionsDriver;
pub use responses::ResponsesDriver;
pub use router::Router;
pub use virtual_provider::VirtualDriver;

use async_trait::async_trait;
use http::StatusCode;
use modelgate_config::ProviderConfig;
use modelgate_types::{
    AuthService, GatewayError, ModelEntry, PartialJson, RequestCx, Result, StreamChunk, Style,
};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

/// The `list_models` action of a provider's command set.
#[async_trait]
pub trait ListModelsCommand: Send + Sync {
    /// Lists the models the provider serves, with bare (unprefixed) ids.
    async fn list_models(&self, provider: &Provider, cx: &RequestCx) -> Result<Vec<ModelEntry>>;
}

/// The `inference` action of a provider's command set.
#[async_trait]
pub trait InferenceCommand: Send + Sync {
    /// Sends a non-streaming inference request.
    ///
    /// A non-2xx upstream status is an error
    /// ([`GatewayError::Upstream`]), not a response.
    async fn inference(
        &self,
        provider: &Provider,
        body: &PartialJson,
        cx: &RequestCx,
    ) -> Result<(StatusCode, PartialJson)>;

    /// Sends a streaming inference request and returns the chunk channel.
    ///
    /// The channel closes on upstream EOF, after the `[DONE]` sentinel, or
    /// after one [`StreamChunk::Error`]. Dropping the receiver aborts the
    /// upstream read.
    async fn inference_stream(
        &self,
        provider: &Provider,
        body: &PartialJson,
        cx: &RequestCx,
    ) -> Result<mpsc::Receiver<StreamChunk>>;
}

/// Command set of an HTTP driver that implements both actions.
fn commands<D>(
    driver: Arc<D>,
) -> (
    Option<Arc<dyn ListModelsCommand>>,
    Option<Arc<dyn InferenceCommand>>,
)
where
    D: ListModelsCommand + InferenceCommand + 'static,
{
    (Some(driver.clone()), Some(driver))
}

/// One configured upstream endpoint. Immutable after router provisioning.
pub struct Provider {
    name: String,
    base_url: Url,
    style: Style,
    aliases: HashMap<String, String>,
    auth: Arc<dyn AuthService>,
    http: reqwest::Client,
    list_models_cmd: Option<Arc<dyn ListModelsCommand>>,
    inference_cmd: Option<Arc<dyn InferenceCommand>>,
}

impl Provider {
    /// Builds a provider from configuration, selecting the driver by style.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if a non-virtual provider has a
    /// missing or unparseable base URL.
    pub fn from_config(
        name: &str,
        config: &ProviderConfig,
        auth: Arc<dyn AuthService>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let base_url = if config.style == Style::Virtual {
            // Never dialed; virtual providers have no outbound HTTP.
            Url::parse("http://virtual.invalid").expect("static url")
        } else {
            Url::parse(&config.base_url).map_err(|e| {
                GatewayError::Config(format!(
                    "provider {name}: invalid base_url {:?}: {e}",
                    config.base_url
                ))
            })?
        };

        let (list_cmd, infer_cmd) = match config.style {
            Style::OpenAiChatCompletions => commands(Arc::new(ChatCompletionsDriver)),
            Style::OpenAiResponses => commands(Arc::new(ResponsesDriver)),
            Style::AnthropicMessages => commands(Arc::new(AnthropicDriver)),
            Style::Virtual => {
                let list: Arc<dyn ListModelsCommand> = Arc::new(VirtualDriver);
                (Some(list), None)
            }
        };

        Ok(Self {
            name: name.to_string(),
            base_url,
            style: config.style,
            aliases: config.aliases.clone(),
            auth,
            http,
            list_models_cmd: list_cmd,
            inference_cmd: infer_cmd,
        })
    }

    /// Provider name as configured.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wire dialect this provider speaks.
    #[must_use]
    pub fn style(&self) -> Style {
        self.style
    }

    /// Parsed upstream base URL.
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Alias map (virtual providers only; empty otherwise).
    #[must_use]
    pub fn aliases(&self) -> &HashMap<String, String> {
        &self.aliases
    }

    /// The credential service provisioned with this provider's router.
    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.auth
    }

    /// Shared outbound HTTP client.
    #[must_use]
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// The `list_models` command, if provisioned.
    #[must_use]
    pub fn list_models_command(&self) -> Option<&dyn ListModelsCommand> {
        self.list_models_cmd.as_deref()
    }

    /// The `inference` command; `None` for virtual providers.
    #[must_use]
    pub fn inference_command(&self) -> Option<&dyn InferenceCommand> {
        self.inference_cmd.as_deref()
    }

    /// Joins an endpoint path onto the base URL.
    #[must_use]
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("name", &self.name)
            .field("style", &self.style)
            .field("base_url", &self.base_url.as_str())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_auth::EnvAuthService;

    fn config(style: Style, base_url: &str) -> ProviderConfig {
        ProviderConfig {
            base_url: base_url.to_string(),
            style,
            aliases: HashMap::new(),
        }
    }

    fn build(style: Style, base_url: &str) -> Result<Provider> {
        Provider::from_config(
            "p",
            &config(style, base_url),
            Arc::new(EnvAuthService::new()),
            reqwest::Client::new(),
        )
    }

    #[test]
    fn test_http_provider_has_both_commands() {
        let p = build(Style::OpenAiChatCompletions, "https://api.openai.com/v1").unwrap();
        assert!(p.list_models_command().is_some());
        assert!(p.inference_command().is_some());
    }

    #[test]
    fn test_virtual_provider_lacks_inference() {
        let p = Provider::from_config(
            "myv",
            &ProviderConfig {
                base_url: String::new(),
                style: Style::Virtual,
                aliases: HashMap::from([("fast".to_string(), "openai/gpt-4".to_string())]),
            },
            Arc::new(EnvAuthService::new()),
            reqwest::Client::new(),
        )
        .unwrap();
        assert!(p.inference_command().is_none());
        assert!(p.list_models_command().is_some());
        assert_eq!(p.aliases()["fast"], "openai/gpt-4");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        let err = build(Style::OpenAiChatCompletions, "not a url").unwrap_err();
        assert!(matches!(err, GatewayError::Config(_)));
    }

    #[test]
    fn test_endpoint_join_trims_trailing_slash() {
        let p = build(Style::OpenAiChatCompletions, "https://api.openai.com/v1/").unwrap();
        assert_eq!(
            p.endpoint("/chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
    }
}
