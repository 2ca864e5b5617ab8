//! HTTP proxy layer — axum router, route handlers, and the request
//! pipeline.
//!
//! Exposes the configured inference endpoints (OpenAI Chat Completions,
//! OpenAI Responses, Anthropic Messages) with optional plugin path
//! segments beneath each, plus the aggregated model listing.

mod completions;
mod error;
mod models;
mod pipeline;

pub use error::ApiError;
pub use pipeline::Pipeline;

use axum::Router as AxumRouter;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::routing::{get, post};
use http::HeaderMap;
use modelgate_auth::EnvAuthService;
use modelgate_config::Config;
use modelgate_plugin::{PluginRegistry, builtin_registry};
use modelgate_provider::Router;
use modelgate_types::{AuthService, Result, Style};
use std::collections::HashMap;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Shared application state passed to all route handlers.
pub struct AppState {
    /// Full gateway configuration.
    pub config: Arc<Config>,
    /// Provisioned routers by name.
    pub routers: HashMap<String, Arc<Router>>,
    /// Process-wide plugin registry.
    pub registry: Arc<PluginRegistry>,
}

impl AppState {
    /// Provisions routers and plugins from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`modelgate_types::GatewayError::Config`] if any provider
    /// fails to build.
    pub fn from_config(config: Config) -> Result<Arc<Self>> {
        let http = reqwest::Client::new();
        let auth: Arc<dyn AuthService> = Arc::new(EnvAuthService::new());

        let mut routers = HashMap::new();
        let mut virtual_aliases: HashMap<String, HashMap<String, String>> = HashMap::new();
        for (name, router_config) in &config.routers {
            let router = Router::from_config(name, router_config, auth.clone(), http.clone())?;
            routers.insert(name.clone(), Arc::new(router));
            for (provider_name, pc) in &router_config.providers {
                if pc.style == Style::Virtual {
                    virtual_aliases.insert(provider_name.clone(), pc.aliases.clone());
                }
            }
        }

        let registry = Arc::new(builtin_registry(virtual_aliases, config.zip_threshold));
        Ok(Arc::new(Self {
            config: Arc::new(config),
            routers,
            registry,
        }))
    }
}

/// Builds the full axum router from the configured endpoints.
///
/// Every inference endpoint is registered twice: the bare path, and a
/// `/{*plugins}` variant whose extra segments become path plugins.
pub fn make_router(state: Arc<AppState>) -> AxumRouter {
    let mut app = AxumRouter::new();

    for endpoint in &state.config.endpoints {
        let style = endpoint.style;

        let router_name = endpoint.router.clone();
        app = app.route(
            &endpoint.path,
            post(
                move |State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes| {
                    let router_name = router_name.clone();
                    async move {
                        completions::handle(state, router_name, style, None, headers, body).await
                    }
                },
            ),
        );

        let router_name = endpoint.router.clone();
        app = app.route(
            &format!("{}/{{*plugins}}", endpoint.path),
            post(
                move |State(state): State<Arc<AppState>>,
                      Path(plugins): Path<String>,
                      headers: HeaderMap,
                      body: Bytes| {
                    let router_name = router_name.clone();
                    async move {
                        completions::handle(
                            state,
                            router_name,
                            style,
                            Some(plugins),
                            headers,
                            body,
                        )
                        .await
                    }
                },
            ),
        );
    }

    app = app.route(&state.config.models_path.clone(), get(models_handler));

    app.with_state(state).layer(TraceLayer::new_for_http())
}

async fn models_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    models::list_models(state, headers).await
}
