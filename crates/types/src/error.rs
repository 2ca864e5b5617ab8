//! Unified error type for the modelgate workspace.

use crate::style::Style;
use thiserror::Error;

/// Enumerates all error kinds that can occur across modelgate crates.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The request body could not be read or parsed.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Incoming credential collection failed.
    #[error("authentication error: {0}")]
    Auth(String),

    /// The named router is not configured.
    #[error("router not found: {0}")]
    RouterNotFound(String),

    /// The upstream provider returned a non-success status.
    ///
    /// Displays as `<status> - <body>`, which is the exact text surfaced
    /// in SSE error chunks.
    #[error("{status} - {body}")]
    Upstream { status: u16, body: String },

    /// Mid-stream failure after the response has been committed.
    #[error("stream error: {0}")]
    Stream(String),

    /// The requested dialect pair has no converter.
    #[error("unsupported conversion: {from} -> {to}")]
    UnsupportedConversion { from: Style, to: Style },

    /// Request or response format translation failure.
    #[error("translation error: {0}")]
    Translation(String),

    /// A plugin hook returned an error.
    #[error("plugin error: {0}")]
    Plugin(String),

    /// HTTP transport error.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization or deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration loading or validation error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upstream_display_matches_wire_format() {
        let err = GatewayError::Upstream {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(err.to_string(), "429 - rate limited");
    }

    #[test]
    fn test_unsupported_conversion_names_both_styles() {
        let err = GatewayError::UnsupportedConversion {
            from: Style::OpenAiResponses,
            to: Style::AnthropicMessages,
        };
        let s = err.to_string();
        assert!(s.contains("openai-responses"));
        assert!(s.contains("anthropic-messages"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid {{{").unwrap_err();
        let err: GatewayError = json_err.into();
        assert!(matches!(err, GatewayError::Serialization(_)));
    }

    #[test]
    fn test_bad_request_display() {
        let err = GatewayError::BadRequest("empty body".into());
        assert_eq!(err.to_string(), "bad request: empty body");
    }
}
