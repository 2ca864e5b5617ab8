//! Shared vocabulary for the modelgate workspace.
//!
//! Every cross-crate type is defined here so that higher layers depend only
//! on `modelgate-types`, not on each other.

pub mod body;
pub mod chunk;
pub mod context;
pub mod error;
pub mod style;
pub mod traits;

pub use body::PartialJson;
pub use chunk::{ModelEntry, StreamChunk};
pub use context::RequestCx;
pub use error::{GatewayError, Result};
pub use style::Style;
pub use traits::{AuthService, ByteStream};
