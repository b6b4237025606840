//! Filter and pagination parameters.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Order-insensitive mapping of query parameters.
///
/// Backed by a `BTreeMap`, so two mappings with the same pairs compare equal
/// and serialize identically no matter the insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryParams(BTreeMap<String, Value>);

impl QueryParams {
  pub fn new() -> Self {
    Self::default()
  }

  /// Builder-style insert.
  pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
    self.insert(key, value);
    self
  }

  pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
    self.0.insert(key.into(), value.into());
  }

  pub fn get(&self, key: &str) -> Option<&Value> {
    self.0.get(key)
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }

  pub fn len(&self) -> usize {
    self.0.len()
  }

  /// Canonical JSON text, used for hashing cache keys.
  pub fn canonical(&self) -> String {
    serde_json::to_string(&self.0).unwrap_or_default()
  }

  /// Flatten into `(key, value)` pairs for the query string.
  ///
  /// Scalars render as plain text, arrays as repeated keys, nulls are dropped.
  pub fn to_pairs(&self) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for (key, value) in &self.0 {
      match value {
        Value::Null => {}
        Value::Array(items) => {
          for item in items.iter().filter(|v| !v.is_null()) {
            pairs.push((key.clone(), render_scalar(item)));
          }
        }
        other => pairs.push((key.clone(), render_scalar(other))),
      }
    }
    pairs
  }
}

fn render_scalar(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    other => other.to_string(),
  }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for QueryParams {
  fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
    Self(
      iter
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect(),
    )
  }
}
