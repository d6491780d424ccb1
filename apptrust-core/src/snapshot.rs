//! Attribute-set snapshots captured into versions

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::CoreError;

/// A self-contained copy of an entity's structured attributes.
///
/// Keys are kept in a `BTreeMap` so iteration (and therefore rendering) is
/// always in lexicographic key order, independent of insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(BTreeMap<String, Value>);

impl Snapshot {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Capture every serialized field of `fields` as a snapshot entry.
    ///
    /// The result owns its values outright; later mutation of the source
    /// struct is never observed through it.
    pub fn from_fields<T: Serialize>(fields: &T) -> Result<Self, CoreError> {
        match serde_json::to_value(fields)? {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(CoreError::InvalidSnapshot(format!(
                "expected an object of attributes, got {}",
                other
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.0.insert(key.into(), value)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Render as `key: value` lines, sorted by key.
    ///
    /// Strings are written raw; every other value uses compact JSON.
    pub fn render_lines(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|(key, value)| match value {
                Value::String(s) => format!("{}: {}", key, s),
                other => format!("{}: {}", key, other),
            })
            .collect()
    }

    /// Convert into a JSON object suitable for an outbound payload.
    pub fn into_payload(self) -> Value {
        Value::Object(self.0.into_iter().collect::<Map<String, Value>>())
    }
}

impl FromIterator<(String, Value)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}
