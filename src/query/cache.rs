//! The in-memory query store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use serde_json::Value;
use tracing::debug;

use super::key::QueryKey;
use super::options::QueryOptions;
use super::state::{FetchStatus, QueryState};

/// A type-erased fetcher that produces the entry's whole value.
pub(crate) type FetchFn = Arc<dyn Fn() -> BoxFuture<'static, color_eyre::Result<Value>> + Send + Sync>;

/// One cache entry.
pub(crate) struct Query {
  pub state: QueryState,
  pub observers: usize,
  /// Set while nobody observes the entry; drives garbage collection
  pub inactive_since: Option<Instant>,
  /// How to fetch the entry again, registered by the last full fetch
  pub refetch: Option<(FetchFn, QueryOptions)>,
}

impl Query {
  fn new() -> Self {
    Self {
      state: QueryState::default(),
      observers: 0,
      inactive_since: Some(Instant::now()),
      refetch: None,
    }
  }

  /// Restart the idle clock of an unobserved entry.
  pub(crate) fn schedule_gc(&mut self) {
    if self.observers == 0 {
      self.inactive_since = Some(Instant::now());
    }
  }

  /// Store new data without touching the fetch in progress, if any.
  pub(crate) fn replace_data(&mut self, data: Value) {
    let fetch_status = self.state.fetch_status;
    let is_fetching_next_page = self.state.is_fetching_next_page;
    self.state.fetch_succeeded(data);
    self.state.fetch_status = fetch_status;
    self.state.is_fetching_next_page = is_fetching_next_page;
    self.schedule_gc();
  }
}

/// Query results keyed by `QueryKey`.
///
/// All access goes through short critical sections; the lock is never held
/// across an await point.
#[derive(Default)]
pub struct QueryCache {
  queries: Mutex<HashMap<QueryKey, Query>>,
}

impl QueryCache {
  pub fn new() -> Self {
    Self::default()
  }

  fn lock(&self) -> MutexGuard<'_, HashMap<QueryKey, Query>> {
    self.queries.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Snapshot of the entry's state.
  pub fn find(&self, key: &QueryKey) -> Option<QueryState> {
    self.lock().get(key).map(|q| q.state.clone())
  }

  pub fn contains(&self, key: &QueryKey) -> bool {
    self.lock().contains_key(key)
  }

  pub fn len(&self) -> usize {
    self.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.lock().is_empty()
  }

  /// Keys currently in the cache, in key order.
  pub fn keys(&self) -> Vec<QueryKey> {
    let mut keys: Vec<_> = self.lock().keys().cloned().collect();
    keys.sort();
    keys
  }

  /// Run `f` on an existing entry.
  pub(crate) fn update<R>(&self, key: &QueryKey, f: impl FnOnce(&mut Query) -> R) -> Option<R> {
    self.lock().get_mut(key).map(f)
  }

  /// Run `f` on the entry, creating it first if needed.
  pub(crate) fn upsert<R>(&self, key: &QueryKey, f: impl FnOnce(&mut Query) -> R) -> R {
    let mut queries = self.lock();
    let query = queries.entry(key.clone()).or_insert_with(|| {
      debug!(query = %key, "creating cache entry");
      Query::new()
    });
    f(query)
  }

  /// Replace the data of an existing entry without fetching.
  ///
  /// Returns `false` if there is no entry for `key`.
  pub fn set_data(&self, key: &QueryKey, data: Value) -> bool {
    self.update(key, |query| query.replace_data(data)).is_some()
  }

  pub fn remove(&self, key: &QueryKey) -> bool {
    self.lock().remove(key).is_some()
  }

  /// Remove all entries of a kind. Returns how many were removed.
  pub fn remove_kind(&self, kind: &str) -> usize {
    let mut queries = self.lock();
    let before = queries.len();
    queries.retain(|key, _| key.kind_name() != kind);
    before - queries.len()
  }

  pub fn clear(&self) {
    self.lock().clear();
  }

  pub(crate) fn keys_of_kind(&self, kind: &str) -> Vec<QueryKey> {
    self
      .lock()
      .keys()
      .filter(|key| key.kind_name() == kind)
      .cloned()
      .collect()
  }

  /// Keys with at least one observer.
  pub(crate) fn active_keys(&self) -> Vec<QueryKey> {
    self
      .lock()
      .iter()
      .filter(|(_, q)| q.observers > 0)
      .map(|(key, _)| key.clone())
      .collect()
  }

  pub(crate) fn observe(&self, key: &QueryKey) {
    self.upsert(key, |query| {
      query.observers += 1;
      query.inactive_since = None;
    });
  }

  pub(crate) fn unobserve(&self, key: &QueryKey) {
    self.update(key, |query| {
      query.observers = query.observers.saturating_sub(1);
      if query.observers == 0 {
        query.inactive_since = Some(Instant::now());
      }
    });
  }

  #[cfg(test)]
  pub(crate) fn observer_count(&self, key: &QueryKey) -> usize {
    self.lock().get(key).map_or(0, |q| q.observers)
  }

  /// Evict entries that nobody has observed for at least `gc_time`.
  ///
  /// Entries with a fetch in progress are kept. Returns how many were evicted.
  pub fn collect_garbage(&self, now: Instant, gc_time: Duration) -> usize {
    let mut queries = self.lock();
    let before = queries.len();
    queries.retain(|key, query| {
      let expired = query.observers == 0
        && query.state.fetch_status == FetchStatus::Idle
        && query
          .inactive_since
          .is_some_and(|since| now.saturating_duration_since(since) >= gc_time);
      if expired {
        debug!(query = %key, "evicting idle cache entry");
      }
      !expired
    });
    before - queries.len()
  }
}
