//! Exporting and importing successful cache entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::client::QueryClient;
use super::key::QueryKey;

/// A successful entry in a form that can be stored and restored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DehydratedQuery {
  pub key: QueryKey,
  pub data: Value,
  pub data_updated_at: DateTime<Utc>,
}

impl QueryClient {
  /// Successful entries, ordered by key.
  pub fn dehydrate(&self) -> Vec<DehydratedQuery> {
    self
      .cache()
      .keys()
      .into_iter()
      .filter_map(|key| {
        let state = self.cache().find(&key)?;
        if !state.is_success() {
          return None;
        }
        Some(DehydratedQuery {
          data: state.data?,
          data_updated_at: state.data_updated_at?,
          key,
        })
      })
      .collect()
  }

  /// Load entries into the cache. Entries already holding newer data are kept.
  ///
  /// Returns how many entries were written.
  pub fn hydrate(&self, queries: Vec<DehydratedQuery>) -> usize {
    let mut written = 0;
    for query in queries {
      let is_newer = self.cache().upsert(&query.key, |q| {
        let newer = q
          .state
          .data_updated_at
          .map_or(true, |current| current < query.data_updated_at);
        if newer {
          q.replace_data(query.data);
          q.state.data_updated_at = Some(query.data_updated_at);
        }
        newer
      });
      if is_newer {
        written += 1;
      }
    }
    written
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::QueryClientConfig;
  use chrono::Duration;
  use serde_json::json;

  #[test]
  fn test_dehydrate_skips_entries_without_data() {
    let client = QueryClient::new(QueryClientConfig::default());
    let with_data = QueryKey::kind("node.all");
    client
      .set_query_data::<Value, _>(&with_data, |_| Some(json!(["rust"])))
      .unwrap();
    let _observer = client.observe(&QueryKey::kind("pending"));

    let dehydrated = client.dehydrate();
    assert_eq!(dehydrated.len(), 1);
    assert_eq!(dehydrated[0].key, with_data);
    assert_eq!(dehydrated[0].data, json!(["rust"]));
  }

  #[test]
  fn test_hydrate_into_fresh_client() {
    let source = QueryClient::new(QueryClientConfig::default());
    let key = QueryKey::new("topic.detail", &9).unwrap();
    source
      .set_query_data::<Value, _>(&key, |_| Some(json!({ "title": "hello" })))
      .unwrap();

    let target = QueryClient::new(QueryClientConfig::default());
    assert_eq!(target.hydrate(source.dehydrate()), 1);
    let state = target.get_query_state(&key).unwrap();
    assert!(state.is_success());
    assert_eq!(state.data(), Some(&json!({ "title": "hello" })));
  }

  #[test]
  fn test_hydrate_leaves_running_fetch_alone() {
    let client = QueryClient::new(QueryClientConfig::default());
    let key = QueryKey::kind("node.all");
    client.cache().upsert(&key, |q| q.state.fetch_started(false));

    let persisted = DehydratedQuery {
      key: key.clone(),
      data: json!(["rust"]),
      data_updated_at: Utc::now(),
    };
    assert_eq!(client.hydrate(vec![persisted]), 1);

    let state = client.get_query_state(&key).unwrap();
    assert!(state.is_fetching());
    assert_eq!(state.data(), Some(&json!(["rust"])));
    // Still in flight, so the sweep must keep it.
    let later = std::time::Instant::now() + client.config().queries.gc_time * 2;
    assert_eq!(client.collect_garbage_at(later), 0);
  }

  #[test]
  fn test_hydrate_keeps_newer_data() {
    let client = QueryClient::new(QueryClientConfig::default());
    let key = QueryKey::kind("node.all");
    client
      .set_query_data::<Value, _>(&key, |_| Some(json!("current")))
      .unwrap();

    let stale = DehydratedQuery {
      key: key.clone(),
      data: json!("persisted"),
      data_updated_at: Utc::now() - Duration::hours(1),
    };
    assert_eq!(client.hydrate(vec![stale]), 0);
    assert_eq!(
      client.get_query_data::<Value>(&key).unwrap(),
      Some(json!("current"))
    );
  }
}
