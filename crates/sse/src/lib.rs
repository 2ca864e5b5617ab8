//! Server-Sent Events transport.
//!
//! [`reader`] turns an upstream byte stream into a channel of parsed
//! events; [`writer`] produces the downstream event-stream body. Both use
//! capacity-1 channels so upstream reads are paced by downstream writes.

pub mod reader;
pub mod writer;

pub use reader::{SseEvent, spawn_reader};
pub use writer::SseWriter;
