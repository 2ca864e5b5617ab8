//! Dialect conversion between LLM wire formats.
//!
//! All converters are pure functions with no I/O. Same-style conversion is
//! the identity; any pair without an enumerated mapping fails with
//! [`GatewayError::UnsupportedConversion`].

pub mod anthropic_to_openai;
pub mod openai_to_anthropic;
pub mod openai_to_responses;
pub mod responses_to_openai;

use modelgate_types::{GatewayError, PartialJson, Result, Style};

/// Converts a request body from the client dialect to the provider dialect.
///
/// # Errors
///
/// Returns [`GatewayError::UnsupportedConversion`] for a pair with no
/// mapping, or [`GatewayError::Translation`] on malformed fields.
pub fn convert_request(body: PartialJson, from: Style, to: Style) -> Result<PartialJson> {
    if from == to {
        return Ok(body);
    }
    match (from, to) {
        (Style::OpenAiChatCompletions, Style::OpenAiResponses) => {
            openai_to_responses::request(body)
        }
        (Style::OpenAiResponses, Style::OpenAiChatCompletions) => {
            responses_to_openai::request(body)
        }
        (Style::OpenAiChatCompletions, Style::AnthropicMessages) => {
            openai_to_anthropic::request(&body)
        }
        (Style::AnthropicMessages, Style::OpenAiChatCompletions) => {
            anthropic_to_openai::request(&body)
        }
        (from, to) => Err(GatewayError::UnsupportedConversion { from, to }),
    }
}

/// Converts a non-streaming response body from the provider dialect back
/// to the client dialect.
///
/// # Errors
///
/// Returns [`GatewayError::UnsupportedConversion`] for a pair with no
/// mapping, or [`GatewayError::Translation`] on malformed fields.
pub fn convert_response(body: PartialJson, from: Style, to: Style) -> Result<PartialJson> {
    if from == to {
        return Ok(body);
    }
    match (from, to) {
        (Style::OpenAiResponses, Style::OpenAiChatCompletions) => {
            responses_to_openai::response(body)
        }
        (Style::AnthropicMessages, Style::OpenAiChatCompletions) => {
            anthropic_to_openai::response(&body)
        }
        (Style::OpenAiChatCompletions, Style::AnthropicMessages) => {
            openai_to_anthropic::response(&body)
        }
        (from, to) => Err(GatewayError::UnsupportedConversion { from, to }),
    }
}

/// Converts one streaming chunk from the provider dialect back to the
/// client dialect. `Ok(None)` means the source event produces no chunk.
///
/// # Errors
///
/// Returns [`GatewayError::UnsupportedConversion`] for a pair with no
/// mapping.
pub fn convert_response_chunk(
    chunk: PartialJson,
    from: Style,
    to: Style,
) -> Result<Option<PartialJson>> {
    if from == to {
        return Ok(Some(chunk));
    }
    match (from, to) {
        (Style::OpenAiResponses, Style::OpenAiChatCompletions) => {
            responses_to_openai::response_chunk(&chunk)
        }
        (Style::AnthropicMessages, Style::OpenAiChatCompletions) => {
            anthropic_to_openai::response_chunk(&chunk)
        }
        (Style::OpenAiChatCompletions, Style::AnthropicMessages) => {
            openai_to_anthropic::response_chunk(&chunk)
        }
        (from, to) => Err(GatewayError::UnsupportedConversion { from, to }),
    }
}
