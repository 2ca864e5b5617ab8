//! Virtual provider driver.
//!
//! Has no outbound HTTP and no inference command: listing returns the
//! configured alias names, and the alias rewrite itself is a recursive
//! plugin that re-enters the pipeline.

use crate::{ListModelsCommand, Provider};
use async_trait::async_trait;
use modelgate_types::{ModelEntry, RequestCx, Result};

/// Driver for `virtual` providers.
pub struct VirtualDriver;

#[async_trait]
impl ListModelsCommand for VirtualDriver {
    async fn list_models(&self, provider: &Provider, _cx: &RequestCx) -> Result<Vec<ModelEntry>> {
        let mut entries: Vec<ModelEntry> = provider
            .aliases()
            .keys()
            .map(|alias| ModelEntry {
                id: alias.clone(),
                display_name: alias.clone(),
                owned_by: provider.name().to_string(),
                created: 0,
            })
            .collect();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modelgate_auth::EnvAuthService;
    use modelgate_config::ProviderConfig;
    use modelgate_types::Style;
    use std::collections::HashMap;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_lists_aliases_sorted() {
        let provider = Provider::from_config(
            "myv",
            &ProviderConfig {
                base_url: String::new(),
                style: Style::Virtual,
                aliases: HashMap::from([
                    ("smart".to_string(), "anthropic/claude-sonnet-4-5".to_string()),
                    ("fast".to_string(), "openai/gpt-4o-mini".to_string()),
                ]),
            },
            Arc::new(EnvAuthService::new()),
            reqwest::Client::new(),
        )
        .unwrap();

        let models = VirtualDriver
            .list_models(&provider, &RequestCx::default())
            .await
            .unwrap();
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].id, "fast");
        assert_eq!(models[1].id, "smart");
        assert_eq!(models[0].owned_by, "myv");
    }
}
