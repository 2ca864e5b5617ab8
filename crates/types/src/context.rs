//! Per-request context values.

use http::HeaderMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

/// Context key under which auth stores the caller identity.
pub const USER_ID: &str = "user_id";
/// Context key under which auth stores the credential fingerprint.
pub const KEY_ID: &str = "key_id";

/// Values that travel with one request through the whole pipeline.
///
/// Plugins use `<plugin>.<key>` namespaced slots; a plugin never reads a
/// key another plugin defined.
#[derive(Debug)]
pub struct RequestCx {
    trace_id: Uuid,
    headers: HeaderMap,
    values: Mutex<HashMap<String, Value>>,
}

impl RequestCx {
    /// Creates a context for one inbound request, minting a fresh trace id.
    #[must_use]
    pub fn new(headers: HeaderMap) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            headers,
            values: Mutex::new(HashMap::new()),
        }
    }

    /// The per-request trace id.
    #[must_use]
    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    /// Headers of the inbound request.
    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Reads a context slot.
    ///
    /// # Panics
    ///
    /// Panics if the internal value mutex is poisoned.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.lock().expect("context lock").get(key).cloned()
    }

    /// Reads a context slot as a string.
    #[must_use]
    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key)
            .and_then(|v| v.as_str().map(ToString::to_string))
    }

    /// Writes a context slot.
    ///
    /// # Panics
    ///
    /// Panics if the internal value mutex is poisoned.
    pub fn set(&self, key: &str, value: Value) {
        self.values
            .lock()
            .expect("context lock")
            .insert(key.to_string(), value);
    }
}

impl Default for RequestCx {
    fn default() -> Self {
        Self::new(HeaderMap::new())
    }
}
