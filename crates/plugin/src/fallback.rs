//! `models` plugin — sequential fallback across a comma-separated model
//! list.

use crate::{HandlerInvoker, Plugin};
use async_trait::async_trait;
use axum::response::{IntoResponse as _, Response};
use http::StatusCode;
use modelgate_types::{PartialJson, RequestCx, Result};
use std::sync::Arc;

/// Tries each model of a `a,b,c` list by re-entering the pipeline; the
/// first success wins, otherwise the last failure is surfaced.
///
/// Runs as a head plugin so it wraps everything else.
pub struct ModelsPlugin;

#[async_trait]
impl Plugin for ModelsPlugin {
    fn name(&self) -> &'static str {
        "models"
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
        if !base.contains(',') {
            return Ok(None);
        }
        let suffix = &model[base.len()..];

        let mut last: Option<Response> = None;
        for token in base.split(',').map(str::trim).filter(|t| !t.is_empty()) {
            // The inner model is a single token, so this plugin does not
            // trigger again on the recursive call.
            let inner = req.clone_with("model", &format!("{token}{suffix}"))?;
            let response = invoker.invoke(inner).await;
            if response.status().is_success() {
                return Ok(Some(response));
            }
            tracing::warn!(
                model = token,
                status = %response.status(),
                "fallback candidate failed, trying next"
            );
            last = Some(response);
        }

        Ok(Some(last.unwrap_or_else(|| {
            (StatusCode::INTERNAL_SERVER_ERROR, "no fallback candidates").into_response()
        })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::Mutex;

    /// Succeeds only for the configured model, recording every call.
    struct ScriptedInvoker {
        succeed_on: &'static str,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl HandlerInvoker for ScriptedInvoker {
        async fn invoke(&self, body: PartialJson) -> Response {
            let model = body.get::<String>("model").unwrap_or_default();
            self.calls.lock().unwrap().push(model.clone());
            if model.starts_with(self.succeed_on) {
                (StatusCode::OK, format!("ok:{model}")).into_response()
            } else {
                (StatusCode::INTERNAL_SERVER_ERROR, "failed").into_response()
            }
        }

        async fn invoke_capture(&self, body: PartialJson) -> Result<(StatusCode, Bytes)> {
            let model = body.get::<String>("model").unwrap_or_default();
            self.calls.lock().unwrap().push(model);
            Ok((StatusCode::OK, Bytes::new()))
        }
    }

    fn invoker(succeed_on: &'static str) -> Arc<dyn HandlerInvoker> {
        Arc::new(ScriptedInvoker {
            succeed_on,
            calls: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_single_model_not_handled() {
        let inv = invoker("alpha");
        let req = PartialJson::parse(br#"{"model":"alpha"}"#).unwrap();
        let out = ModelsPlugin
            .recursive("", &inv, &RequestCx::default(), &req)
            .await
            .unwrap();
        assert!(out.is_none());
    }

    #[tokio::test]
    async fn test_first_success_wins() {
        let inv = invoker("alpha");
        let req = PartialJson::parse(br#"{"model":"alpha,beta"}"#).unwrap();
        let out = ModelsPlugin
            .recursive("", &inv, &RequestCx::default(), &req)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_falls_through_to_second() {
        let scripted = Arc::new(ScriptedInvoker {
            succeed_on: "beta",
            calls: Mutex::new(Vec::new()),
        });
        let inv: Arc<dyn HandlerInvoker> = scripted.clone();
        let req = PartialJson::parse(br#"{"model":"alpha,beta"}"#).unwrap();
        let out = ModelsPlugin
            .recursive("", &inv, &RequestCx::default(), &req)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.status(), StatusCode::OK);
        assert_eq!(*scripted.calls.lock().unwrap(), vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_all_fail_surfaces_last() {
        let inv = invoker("none");
        let req = PartialJson::parse(br#"{"model":"alpha,beta"}"#).unwrap();
        let out = ModelsPlugin
            .recursive("", &inv, &RequestCx::default(), &req)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(out.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_plugin_suffix_carried_to_tokens() {
        let scripted = Arc::new(ScriptedInvoker {
            succeed_on: "beta",
            calls: Mutex::new(Vec::new()),
        });
        let inv: Arc<dyn HandlerInvoker> = scripted.clone();
        let req = PartialJson::parse(br#"{"model":"alpha,beta+stools"}"#).unwrap();
        ModelsPlugin
            .recursive("", &inv, &RequestCx::default(), &req)
            .await
            .unwrap();
        assert_eq!(
            *scripted.calls.lock().unwrap(),
            vec!["alpha+stools", "beta+stools"]
        );
    }
}
