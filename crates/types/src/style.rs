//! Wire dialect identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The on-the-wire JSON/SSE shape a provider (or client) speaks.
///
/// This is a closed enumeration: parsing rejects unknown values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Style {
    /// OpenAI Chat Completions (`/chat/completions`).
    #[serde(rename = "openai-chat-completions")]
    OpenAiChatCompletions,
    /// OpenAI Responses (`/responses`).
    #[serde(rename = "openai-responses")]
    OpenAiResponses,
    /// Anthropic Messages (`/messages`).
    #[serde(rename = "anthropic-messages")]
    AnthropicMessages,
    /// Alias layer with no outbound HTTP of its own.
    #[serde(rename = "virtual")]
    Virtual,
}

impl fmt::Display for Style {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenAiChatCompletions => write!(f, "openai-chat-completions"),
            Self::OpenAiResponses => write!(f, "openai-responses"),
            Self::AnthropicMessages => write!(f, "anthropic-messages"),
            Self::Virtual => write!(f, "virtual"),
        }
    }
}

impl std::str::FromStr for Style {
    type Err = crate::GatewayError;

    /// Parse a style name into a [`Style`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] for any unknown value.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "openai-chat-completions" => Ok(Self::OpenAiChatCompletions),
            "openai-responses" => Ok(Self::OpenAiResponses),
            "anthropic-messages" => Ok(Self::AnthropicMessages),
            "virtual" => Ok(Self::Virtual),
            other => Err(crate::GatewayError::Config(format!(
                "unknown provider style: {other}"
            ))),
        }
    }
}
