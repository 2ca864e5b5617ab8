//! Async traits shared across modelgate crates.

use crate::context::RequestCx;
use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;

/// A pinned, sendable stream of raw upstream bytes.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Collects credentials on both sides of the proxy boundary.
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Called once per inbound request. May seed the [`crate::context::USER_ID`]
    /// and [`crate::context::KEY_ID`] context slots.
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Auth`] if the incoming credential is
    /// malformed; the pipeline aborts with 401.
    async fn collect_incoming(&self, cx: &RequestCx) -> Result<()>;

    /// Called per outbound attempt. Returns the credential to attach for
    /// `provider` under the given operation `scope`; an empty string means
    /// "omit the auth header".
    ///
    /// # Errors
    ///
    /// Returns [`crate::GatewayError::Auth`] if credential resolution
    /// itself fails (not if the credential is merely absent).
    async fn collect_target(&self, scope: &str, provider: &str, cx: &RequestCx) -> Result<String>;
}
