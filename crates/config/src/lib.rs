//! Configuration loading for the modelgate gateway.
//!
//! Uses figment for YAML-based configuration merged over serialized
//! defaults and `MODELGATE_`-prefixed environment variables.

pub mod schema;

pub use schema::{Config, EndpointConfig, ProviderConfig, RouterConfig};
