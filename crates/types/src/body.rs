//! Partial-JSON carrier — a typed view over an open JSON object.
//!
//! Requests and responses travel through the pipeline as a map from
//! top-level key to raw JSON bytes. Plugins mutate only the fields they
//! care about (`model`, `messages`, `stream`) while every
//! provider-specific extension field a client sent is preserved
//! byte-for-byte, including fields this gateway doesn't know.

use crate::error::{GatewayError, Result};
use serde::de::DeserializeOwned;
use serde::ser::SerializeMap as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use serde_json::value::RawValue;
use std::collections::HashMap;
use std::sync::Arc;

/// A JSON object held as `key -> raw bytes`.
///
/// Raw slots are shared on [`clone`](Clone::clone) and treated as
/// immutable; [`set`](PartialJson::set) replaces the whole slot. Key order
/// is not preserved — marshalling guarantees key-set and value equality,
/// not byte order.
#[derive(Debug, Clone, Default)]
pub struct PartialJson {
    fields: HashMap<String, Arc<RawValue>>,
}

impl PartialJson {
    /// Parses a JSON object from bytes with a single deserialization pass.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::BadRequest`] if the input is not a JSON
    /// object.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let raw: HashMap<String, Box<RawValue>> = serde_json::from_slice(bytes)
            .map_err(|e| GatewayError::BadRequest(format!("invalid JSON body: {e}")))?;
        Ok(Self {
            fields: raw.into_iter().map(|(k, v)| (k, Arc::from(v))).collect(),
        })
    }

    /// Decodes the slot at `key` into `T`.
    ///
    /// Returns `None` on a missing key or a type mismatch; use
    /// [`try_get`](Self::try_get) to distinguish the two.
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.fields
            .get(key)
            .and_then(|raw| serde_json::from_str(raw.get()).ok())
    }

    /// Decodes the slot at `key` into `T`, surfacing decode failures.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if the slot exists but does
    /// not decode as `T`.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.fields.get(key) {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(raw.get())?)),
        }
    }

    /// Encodes `value` once and stores it under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if `value` fails to encode.
    pub fn set<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::value::to_raw_value(value)?;
        self.fields.insert(key.to_string(), Arc::from(raw));
        Ok(())
    }

    /// Removes the slot at `key`, returning whether it existed.
    pub fn remove(&mut self, key: &str) -> bool {
        self.fields.remove(key).is_some()
    }

    /// Returns whether a slot exists for `key`.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Returns a shallow clone with `key` replaced by `value`.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] if `value` fails to encode.
    pub fn clone_with<T: Serialize>(&self, key: &str, value: &T) -> Result<Self> {
        let mut out = self.clone();
        out.set(key, value)?;
        Ok(out)
    }

    /// Re-serializes the object.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] on encoder failure (raw
    /// slots are already valid JSON, so this does not happen in practice).
    pub fn marshal(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Builds a fully-parsed [`Value`] view (used by converters that
    /// restructure whole bodies).
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Serialization`] on encoder failure.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Builds a carrier from a fully-parsed [`Value`].
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Translation`] if `value` is not an object.
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(GatewayError::Translation(
                "expected a JSON object".to_string(),
            ));
        };
        let mut fields = HashMap::with_capacity(map.len());
        for (k, v) in map {
            fields.insert(k.clone(), Arc::from(serde_json::value::to_raw_value(v)?));
        }
        Ok(Self { fields })
    }

    /// Number of top-level keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the object has no keys.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl Serialize for PartialJson {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (k, v) in &self.fields {
            map.serialize_entry(k, &**v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for PartialJson {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = HashMap::<String, Box<RawValue>>::deserialize(deserializer)?;
        Ok(Self {
            fields: raw.into_iter().map(|(k, v)| (k, Arc::from(v))).collect(),
        })
    }
}
