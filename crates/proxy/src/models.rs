//! Models listing handler — aggregates every provider's listing.

use crate::AppState;
use crate::error::ApiError;
use axum::Json;
use axum::response::{IntoResponse as _, Response};
use http::HeaderMap;
use modelgate_types::{GatewayError, RequestCx};
use serde_json::json;
use std::sync::Arc;

/// Handles `GET` on the configured models path.
///
/// Lists models of every provider in configured order, each id prefixed
/// with the lowercased provider name. Providers that fail to list are
/// skipped with a warning.
pub async fn list_models(state: Arc<AppState>, headers: HeaderMap) -> Response {
    let Some(router) = state.routers.get(&state.config.models_router) else {
        return ApiError(GatewayError::RouterNotFound(
            state.config.models_router.clone(),
        ))
        .into_response();
    };
    let cx = RequestCx::new(headers);

    let mut data = Vec::new();
    for provider in router.providers_in_order() {
        let Some(cmd) = provider.list_models_command() else {
            continue;
        };
        match cmd.list_models(&provider, &cx).await {
            Ok(entries) => {
                let prefix = provider.name().to_lowercase();
                for entry in entries {
                    data.push(json!({
                        "object": "model",
                        "id": format!("{prefix}/{}", entry.id),
                        "name": entry.display_name,
                        "owned_by": entry.owned_by,
                        "created": entry.created,
                    }));
                }
            }
            Err(e) => {
                tracing::warn!(
                    provider = provider.name(),
                    error = %e,
                    "provider failed to list models, skipping"
                );
            }
        }
    }

    Json(json!({"object": "list", "data": data})).into_response()
}
