//! Streaming chunk and model listing types.

use crate::body::PartialJson;
use crate::error::GatewayError;

/// One unit flowing over a streaming response channel.
///
/// Exactly one of data/error per chunk; channel closure signals the end of
/// the stream.
#[derive(Debug)]
pub enum StreamChunk {
    /// A parsed upstream event payload.
    Data(PartialJson),
    /// A provider-side failure; the stream terminates after this chunk.
    Error(GatewayError),
}

/// One entry of a provider's model listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelEntry {
    /// Bare model identifier as the provider reports it.
    pub id: String,
    /// Human-readable name; falls back to `id` when the provider has none.
    pub display_name: String,
    /// Owning organization, if reported.
    pub owned_by: String,
    /// Creation timestamp (unix seconds), 0 when unknown.
    pub created: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_variants() {
        let data = StreamChunk::Data(PartialJson::parse(br#"{"id":"c1"}"#).unwrap());
        assert!(matches!(data, StreamChunk::Data(_)));
        let err = StreamChunk::Error(GatewayError::Stream("boom".into()));
        assert!(matches!(err, StreamChunk::Error(_)));
    }
}
