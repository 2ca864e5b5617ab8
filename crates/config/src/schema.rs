use modelgate_types::Style;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

fn default_port() -> u16 {
    8019
}
fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_router() -> String {
    "main".to_string()
}
fn default_models_path() -> String {
    "/v1/models".to_string()
}
fn default_head_plugins() -> Vec<String> {
    vec![
        "models".to_string(),
        "parallel".to_string(),
        "valias".to_string(),
    ]
}
fn default_tail_plugins() -> Vec<String> {
    vec!["posthog".to_string()]
}
fn default_zip_threshold() -> usize {
    2000
}

/// Configuration for a single upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Upstream base URL (e.g. `https://api.openai.com/v1`). Unused for
    /// virtual providers.
    #[serde(default)]
    pub base_url: String,
    /// The wire dialect the provider speaks.
    pub style: Style,
    /// Alias map for virtual providers: alias name → target model spec.
    #[serde(default)]
    pub aliases: HashMap<String, String>,
}

/// One router: a set of providers plus resolution rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Provider configuration by name.
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
    /// Candidate iteration order. Providers missing from this list are
    /// appended in lexical order so every configured provider is reachable.
    #[serde(default)]
    pub provider_order: Vec<String>,
    /// Preferred candidate lists per model name.
    #[serde(default)]
    pub model_defaults: HashMap<String, Vec<String>>,
}

impl RouterConfig {
    /// The effective provider order: the configured order, with unlisted
    /// providers appended lexically.
    #[must_use]
    pub fn effective_order(&self) -> Vec<String> {
        let mut order: Vec<String> = self
            .provider_order
            .iter()
            .filter(|name| self.providers.contains_key(*name))
            .cloned()
            .collect();
        let mut rest: Vec<String> = self
            .providers
            .keys()
            .filter(|name| !order.contains(name))
            .cloned()
            .collect();
        rest.sort();
        order.extend(rest);
        order
    }
}

/// Binds one inference path to a router and an inbound dialect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Route path (plugin segments are accepted beneath it).
    pub path: String,
    /// Router that serves the path.
    #[serde(default = "default_router")]
    pub router: String,
    /// Dialect the client speaks on this path.
    pub style: Style,
}

fn default_endpoints() -> Vec<EndpointConfig> {
    vec![
        EndpointConfig {
            path: "/v1/chat/completions".to_string(),
            router: default_router(),
            style: Style::OpenAiChatCompletions,
        },
        EndpointConfig {
            path: "/v1/responses".to_string(),
            router: default_router(),
            style: Style::OpenAiResponses,
        },
        EndpointConfig {
            path: "/v1/messages".to_string(),
            router: default_router(),
            style: Style::AnthropicMessages,
        },
    ]
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Listen port (defaults to 8019).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Listen address (defaults to `127.0.0.1`).
    #[serde(default = "default_host")]
    pub host: String,
    /// Router configurations by name.
    #[serde(default)]
    pub routers: HashMap<String, RouterConfig>,
    /// Inference endpoint bindings.
    #[serde(default = "default_endpoints")]
    pub endpoints: Vec<EndpointConfig>,
    /// Path of the aggregated model listing.
    #[serde(default = "default_models_path")]
    pub models_path: String,
    /// Router serving the model listing.
    #[serde(default = "default_router")]
    pub models_router: String,
    /// Plugins prepended to every chain.
    #[serde(default = "default_head_plugins")]
    pub head_plugins: Vec<String>,
    /// Plugins appended to every chain.
    #[serde(default = "default_tail_plugins")]
    pub tail_plugins: Vec<String>,
    /// Token estimate above which the zip plugin compacts conversations.
    #[serde(default = "default_zip_threshold")]
    pub zip_threshold: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            routers: HashMap::new(),
            endpoints: default_endpoints(),
            models_path: default_models_path(),
            models_router: default_router(),
            head_plugins: default_head_plugins(),
            tail_plugins: default_tail_plugins(),
            zip_threshold: default_zip_threshold(),
        }
    }
}

impl Config {
    /// Parses configuration from a YAML string, merged with defaults and
    /// `MODELGATE_` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the YAML is invalid or extraction
    /// fails.
    #[allow(clippy::result_large_err)]
    pub fn from_yaml(yaml: &str) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::string(yaml))
            .merge(Env::prefixed("MODELGATE_"))
            .extract()
    }

    /// Loads configuration from a file path, merged with defaults and
    /// `MODELGATE_` environment overrides.
    ///
    /// # Errors
    ///
    /// Returns a [`figment::Error`] if the file cannot be read or parsed.
    #[allow(clippy::result_large_err)]
    pub fn from_file(path: &std::path::Path) -> Result<Self, figment::Error> {
        use figment::{
            Figment,
            providers::{Env, Format as _, Serialized, Yaml},
        };
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed("MODELGATE_"))
            .extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
port: 9000
host: "0.0.0.0"
routers:
  main:
    providers:
      openai:
        base_url: "https://api.openai.com/v1"
        style: openai-chat-completions
      anthropic:
        base_url: "https://api.anthropic.com/v1"
        style: anthropic-messages
      myv:
        style: virtual
        aliases:
          fast: "openai/gpt-4+fuzz"
    provider_order: [openai, anthropic]
    model_defaults:
      gpt-4: [openai]
"#;

    #[test]
    fn test_default_config() {
        let c = Config::default();
        assert_eq!(c.port, 8019);
        assert_eq!(c.host, "127.0.0.1");
        assert!(c.routers.is_empty());
        assert_eq!(c.endpoints.len(), 3);
        assert_eq!(c.head_plugins, ["models", "parallel", "valias"]);
        assert_eq!(c.tail_plugins, ["posthog"]);
    }

    #[test]
    fn test_from_yaml_providers() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        let main = &c.routers["main"];
        assert_eq!(main.providers.len(), 3);
        assert_eq!(
            main.providers["openai"].style,
            Style::OpenAiChatCompletions
        );
        assert_eq!(
            main.providers["myv"].aliases["fast"],
            "openai/gpt-4+fuzz"
        );
    }

    #[test]
    fn test_from_yaml_unknown_style_rejected() {
        let yaml = r#"
routers:
  main:
    providers:
      x:
        style: grpc-chat
"#;
        assert!(Config::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_effective_order_appends_unlisted() {
        let c = Config::from_yaml(SAMPLE_YAML).unwrap();
        let order = c.routers["main"].effective_order();
        assert_eq!(order, ["openai", "anthropic", "myv"]);
    }

    #[test]
    fn test_effective_order_skips_unknown_names() {
        let mut rc = RouterConfig::default();
        rc.providers.insert(
            "a".into(),
            ProviderConfig {
                base_url: String::new(),
                style: Style::OpenAiChatCompletions,
                aliases: HashMap::new(),
            },
        );
        rc.provider_order = vec!["ghost".into(), "a".into()];
        assert_eq!(rc.effective_order(), ["a"]);
    }

    #[test]
    fn test_from_yaml_defaults_applied() {
        let c = Config::from_yaml("port: 1234").unwrap();
        assert_eq!(c.port, 1234);
        assert_eq!(c.host, "127.0.0.1");
        assert_eq!(c.models_path, "/v1/models");
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(&path, SAMPLE_YAML).unwrap();
        let c = Config::from_file(&path).unwrap();
        assert_eq!(c.port, 9000);
        assert_eq!(c.routers["main"].providers.len(), 3);
    }

    #[test]
    fn test_from_file_missing_is_defaults() {
        let c = Config::from_file(std::path::Path::new("/nonexistent/gateway.yaml")).unwrap();
        assert_eq!(c.port, 8019);
    }
}
