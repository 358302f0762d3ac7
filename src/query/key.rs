//! Query keys: the identity under which results are cached.

use std::fmt;

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Composite identity of a cached query: a kind plus its serialized variables.
///
/// Variables are serialized through `serde_json::Value`, whose object maps are
/// ordered by key, so two variable sets with the same fields always produce the
/// same key regardless of field order.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QueryKey {
  kind: String,
  variables: String,
}

impl QueryKey {
  /// Build a key from a kind and any serializable variables.
  pub fn new<V: Serialize + ?Sized>(kind: impl Into<String>, variables: &V) -> Result<Self> {
    let kind = kind.into();
    let value = serde_json::to_value(variables)
      .map_err(|e| eyre!("Failed to serialize variables for {}: {}", kind, e))?;
    Ok(Self::from_value(kind, &value))
  }

  /// Build a key for a query that takes no variables.
  pub fn kind(kind: impl Into<String>) -> Self {
    Self::from_value(kind.into(), &Value::Null)
  }

  fn from_value(kind: String, value: &Value) -> Self {
    Self {
      kind,
      variables: value.to_string(),
    }
  }

  /// Rebuild a key from its stored parts (used when restoring persisted queries).
  pub(crate) fn from_parts(kind: String, variables: String) -> Self {
    Self { kind, variables }
  }

  pub fn kind_name(&self) -> &str {
    &self.kind
  }

  /// Canonical JSON of the variables.
  pub fn variables(&self) -> &str {
    &self.variables
  }

  /// SHA-256 of the key, hex encoded. Stable across processes.
  pub fn digest(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.kind.as_bytes());
    hasher.update(b":");
    hasher.update(self.variables.as_bytes());
    hex::encode(hasher.finalize())
  }
}

impl fmt::Display for QueryKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.variables == "null" {
      write!(f, "{}", self.kind)
    } else {
      write!(f, "{}{}", self.kind, self.variables)
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  #[derive(Serialize)]
  struct NodeVars<'a> {
    name: &'a str,
    page: u32,
  }

  #[derive(Serialize)]
  struct NodeVarsReordered<'a> {
    page: u32,
    name: &'a str,
  }

  #[test]
  fn test_field_order_does_not_matter() {
    let a = QueryKey::new("node.topics", &NodeVars { name: "rust", page: 1 }).unwrap();
    let b = QueryKey::new("node.topics", &NodeVarsReordered { page: 1, name: "rust" }).unwrap();
    assert_eq!(a, b);
    assert_eq!(a.digest(), b.digest());
  }

  #[test]
  fn test_map_variables_are_canonical() {
    let mut first = HashMap::new();
    first.insert("q", "tokio");
    first.insert("sort", "created");
    let mut second = HashMap::new();
    second.insert("sort", "created");
    second.insert("q", "tokio");

    let a = QueryKey::new("search.topics", &first).unwrap();
    let b = QueryKey::new("search.topics", &second).unwrap();
    assert_eq!(a, b);
  }

  #[test]
  fn test_different_kinds_differ() {
    let a = QueryKey::new("node.topics", &1).unwrap();
    let b = QueryKey::new("topic.detail", &1).unwrap();
    assert_ne!(a, b);
    assert_ne!(a.digest(), b.digest());
  }

  #[test]
  fn test_display() {
    assert_eq!(QueryKey::kind("node.all").to_string(), "node.all");
    let key = QueryKey::new("topic.detail", &serde_json::json!({ "id": 7 })).unwrap();
    assert_eq!(key.to_string(), r#"topic.detail{"id":7}"#);
  }
}
