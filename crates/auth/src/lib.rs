//! Environment-variable credential service.
//!
//! Incoming credentials only seed identity context slots; outbound
//! credentials come from per-provider environment variables. No OAuth, no
//! storage — the gateway passes keys through, it does not own them.

use async_trait::async_trait;
use modelgate_types::{AuthService, GatewayError, RequestCx, Result, context};
use serde_json::json;
use sha2::{Digest as _, Sha256};

/// Resolves upstream credentials from `<PROVIDER>_API_KEY` /
/// `<PROVIDER>_KEY` and derives caller identity from the inbound bearer
/// token.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvAuthService;

impl EnvAuthService {
    /// Creates the service.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

/// Short hex fingerprint of a credential, safe to log and emit.
fn fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest[..6].iter().map(|b| format!("{b:02x}")).collect()
}

/// Environment variable names probed for a provider, in order.
fn credential_vars(provider: &str) -> [String; 2] {
    let name = provider.to_uppercase().replace('-', "_");
    [format!("{name}_API_KEY"), format!("{name}_KEY")]
}

/// Probes `lookup` for the provider's credential; empty means "none".
fn resolve_credential(provider: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    for var in credential_vars(provider) {
        if let Some(value) = lookup(&var)
            && !value.is_empty()
        {
            return value;
        }
    }
    String::new()
}

#[async_trait]
impl AuthService for EnvAuthService {
    async fn collect_incoming(&self, cx: &RequestCx) -> Result<()> {
        let Some(auth) = cx.headers().get(http::header::AUTHORIZATION) else {
            return Ok(());
        };
        let value = auth
            .to_str()
            .map_err(|_| GatewayError::Auth("malformed authorization header".to_string()))?;
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        if !token.is_empty() {
            let fp = fingerprint(token);
            cx.set(context::USER_ID, json!(format!("key-{fp}")));
            cx.set(context::KEY_ID, json!(fp));
        }
        Ok(())
    }

    async fn collect_target(&self, scope: &str, provider: &str, _cx: &RequestCx) -> Result<String> {
        let credential = resolve_credential(provider, |var| std::env::var(var).ok());
        if credential.is_empty() {
            tracing::debug!(provider, scope, "no upstream credential configured");
        }
        Ok(credential)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderMap;
    use http::header::AUTHORIZATION;

    #[test]
    fn test_credential_vars_normalized() {
        assert_eq!(
            credential_vars("my-provider"),
            ["MY_PROVIDER_API_KEY".to_string(), "MY_PROVIDER_KEY".to_string()]
        );
    }

    #[test]
    fn test_resolve_prefers_api_key_suffix() {
        let cred = resolve_credential("openai", |var| match var {
            "OPENAI_API_KEY" => Some("sk-a".to_string()),
            "OPENAI_KEY" => Some("sk-b".to_string()),
            _ => None,
        });
        assert_eq!(cred, "sk-a");
    }

    #[test]
    fn test_resolve_falls_back_to_key_suffix() {
        let cred = resolve_credential("openai", |var| {
            (var == "OPENAI_KEY").then(|| "sk-b".to_string())
        });
        assert_eq!(cred, "sk-b");
    }

    #[test]
    fn test_resolve_skips_empty_values() {
        let cred = resolve_credential("openai", |var| match var {
            "OPENAI_API_KEY" => Some(String::new()),
            "OPENAI_KEY" => Some("sk-b".to_string()),
            _ => None,
        });
        assert_eq!(cred, "sk-b");
    }

    #[test]
    fn test_resolve_missing_is_empty() {
        assert_eq!(resolve_credential("nowhere", |_| None), "");
    }

    #[tokio::test]
    async fn test_collect_incoming_seeds_identity() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer sk-test-123".parse().unwrap());
        let cx = RequestCx::new(headers);
        EnvAuthService::new().collect_incoming(&cx).await.unwrap();
        let key_id = cx.get_str(context::KEY_ID).unwrap();
        assert_eq!(key_id.len(), 12);
        assert_eq!(
            cx.get_str(context::USER_ID).unwrap(),
            format!("key-{key_id}")
        );
    }

    #[tokio::test]
    async fn test_collect_incoming_without_header_is_noop() {
        let cx = RequestCx::default();
        EnvAuthService::new().collect_incoming(&cx).await.unwrap();
        assert!(cx.get(context::USER_ID).is_none());
        assert!(cx.get(context::KEY_ID).is_none());
    }

    #[tokio::test]
    async fn test_collect_incoming_rejects_non_ascii_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            http::HeaderValue::from_bytes(b"Bearer \xff\xfe").unwrap(),
        );
        let cx = RequestCx::new(headers);
        assert!(EnvAuthService::new().collect_incoming(&cx).await.is_err());
    }

    #[test]
    fn test_fingerprint_stable_and_short() {
        assert_eq!(fingerprint("abc"), fingerprint("abc"));
        assert_ne!(fingerprint("abc"), fingerprint("abd"));
        assert_eq!(fingerprint("abc").len(), 12);
    }
}
