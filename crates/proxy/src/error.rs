//! API error type that maps [`GatewayError`] variants to HTTP status
//! codes.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use modelgate_types::GatewayError;

/// Wrapper around [`GatewayError`] that implements [`IntoResponse`].
///
/// - `BadRequest` -> 400
/// - `Auth` -> 401
/// - everything else -> 500
///
/// The body is the error message as plain text.
pub struct ApiError(pub GatewayError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self.0 {
            GatewayError::BadRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::Auth(_) => StatusCode::UNAUTHORIZED,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (code, self.0.to_string()).into_response()
    }
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        Self(e)
    }
}
