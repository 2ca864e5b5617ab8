//! Inference handler — entry point for all three client dialects.

use crate::error::ApiError;
use crate::pipeline::Pipeline;
use crate::AppState;
use axum::response::{IntoResponse as _, Response};
use bytes::Bytes;
use http::HeaderMap;
use modelgate_types::{GatewayError, PartialJson, RequestCx, Style};
use std::sync::Arc;

/// Handles one inference request: parse, collect incoming auth, resolve
/// the router, and hand off to the pipeline.
pub async fn handle(
    state: Arc<AppState>,
    router_name: String,
    style: Style,
    path_plugins: Option<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let cx = Arc::new(RequestCx::new(headers));

    let body = match PartialJson::parse(&body) {
        Ok(body) => body,
        Err(e) => return ApiError(e).into_response(),
    };

    let Some(router) = state.routers.get(&router_name) else {
        return ApiError(GatewayError::RouterNotFound(router_name)).into_response();
    };

    if let Err(e) = router.auth().collect_incoming(&cx).await {
        let e = match e {
            auth @ GatewayError::Auth(_) => auth,
            other => GatewayError::Auth(other.to_string()),
        };
        return ApiError(e).into_response();
    }

    tracing::info!(
        trace_id = %cx.trace_id(),
        router = router.name(),
        style = %style,
        model = %body.get::<String>("model").unwrap_or_default(),
        "inference request"
    );

    let pipeline = Pipeline::new(
        router.clone(),
        state.registry.clone(),
        state.config.head_plugins.clone(),
        state.config.tail_plugins.clone(),
        style,
        path_plugins,
        cx,
    );
    pipeline.dispatch(body).await
}
