//! Model-to-provider resolution.

use crate::Provider;
use modelgate_config::RouterConfig;
use modelgate_types::{AuthService, Result};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

/// Maps a model string to an ordered list of provider candidates.
///
/// Providers are added only at configuration time; every read takes the
/// shared side of the lock.
pub struct Router {
    name: String,
    providers: RwLock<HashMap<String, Arc<Provider>>>,
    order: RwLock<Vec<String>>,
    model_defaults: HashMap<String, Vec<String>>,
    auth: Arc<dyn AuthService>,
}

impl Router {
    /// Creates an empty router.
    #[must_use]
    pub fn new(name: &str, auth: Arc<dyn AuthService>) -> Self {
        Self {
            name: name.to_string(),
            providers: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
            model_defaults: HashMap::new(),
            auth,
        }
    }

    /// Provisions a router and its providers from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`modelgate_types::GatewayError::Config`] if any provider
    /// fails to build.
    pub fn from_config(
        name: &str,
        config: &RouterConfig,
        auth: Arc<dyn AuthService>,
        http: reqwest::Client,
    ) -> Result<Self> {
        let mut router = Self::new(name, auth);
        router.model_defaults = config.model_defaults.clone();
        for provider_name in config.effective_order() {
            let pc = &config.providers[&provider_name];
            let provider =
                Provider::from_config(&provider_name, pc, router.auth.clone(), http.clone())?;
            router.add_provider(provider);
        }
        Ok(router)
    }

    /// Router name as configured.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The credential service bound to this router.
    #[must_use]
    pub fn auth(&self) -> &Arc<dyn AuthService> {
        &self.auth
    }

    /// Registers a provider. Configuration-time only.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    pub fn add_provider(&self, provider: Provider) {
        let name = provider.name().to_string();
        let mut providers = self.providers.write().expect("router lock");
        let mut order = self.order.write().expect("router lock");
        if providers.insert(name.clone(), Arc::new(provider)).is_none() {
            order.push(name);
        }
    }

    /// Looks up a provider by its exact configured name.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn provider(&self, name: &str) -> Option<Arc<Provider>> {
        self.providers.read().expect("router lock").get(name).cloned()
    }

    /// Configured provider order.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn provider_order(&self) -> Vec<String> {
        self.order.read().expect("router lock").clone()
    }

    /// Providers in configured order.
    #[must_use]
    pub fn providers_in_order(&self) -> Vec<Arc<Provider>> {
        self.provider_order()
            .iter()
            .filter_map(|name| self.provider(name))
            .collect()
    }

    /// Resolves a model string to `(candidates, normalized_model)`.
    ///
    /// The plugin suffix (first `+` and beyond) is stripped first. A
    /// `provider/model` prefix pins the named provider when it exists
    /// (case-insensitively); an unknown prefix falls through with the full
    /// name preserved for the default lookup. A `model_defaults` entry
    /// puts its first existing candidate ahead of the remaining providers
    /// in configured order. The candidate list never contains duplicates.
    ///
    /// # Panics
    ///
    /// Panics if the registry lock is poisoned.
    #[must_use]
    pub fn resolve(&self, model: &str) -> (Vec<String>, String) {
        let base = model.split('+').next().unwrap_or(model);

        if let Some((prefix, rest)) = base.split_once('/') {
            let providers = self.providers.read().expect("router lock");
            if let Some(name) = providers
                .keys()
                .find(|name| name.eq_ignore_ascii_case(prefix))
            {
                return (vec![name.clone()], rest.to_string());
            }
            // Unknown prefix: the full name stays intact for the default
            // lookup below.
        }

        let normalized = base.to_string();
        let order = self.provider_order();

        if let Some(preferred) = self.model_defaults.get(&normalized) {
            let providers = self.providers.read().expect("router lock");
            let mut candidates: Vec<String> = Vec::with_capacity(order.len());
            for candidate in preferred {
                if providers.contains_key(candidate) {
                    candidates.push(candidate.clone());
                    break;
                }
                tracing::warn!(
                    router = %self.name,
                    model = %normalized,
                    candidate = %candidate,
                    "model default names an unknown provider, skipping"
                );
            }
            for name in order {
                if !candidates.contains(&name) {
                    candidates.push(name);
                }
            }
            return (candidates, normalized);
        }

        (order, normalized)
    }
}
