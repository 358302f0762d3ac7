//! The query client: fetching, de-duplication and cache maintenance.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::{Duration, Instant};

use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, BoxFuture, Shared};
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::cache::{FetchFn, QueryCache};
use super::infinite::{is_infinite_shape, InfiniteData, InfiniteQueryOptions};
use super::key::QueryKey;
use super::managers::{FocusManager, OnlineManager};
use super::options::{QueryClientConfig, QueryOptions, ResolvedOptions};
use super::retry::{run_with_retry, RetryEvent};
use super::state::{FetchStatus, QueryState};

type SharedFetch = Shared<BoxFuture<'static, Result<Value, String>>>;

struct ClientInner {
  cache: QueryCache,
  config: QueryClientConfig,
  online: OnlineManager,
  focus: FocusManager,
  /// At most one fetch per key; later callers join the existing one
  in_flight: Mutex<HashMap<QueryKey, SharedFetch>>,
}

impl ClientInner {
  fn in_flight(&self) -> MutexGuard<'_, HashMap<QueryKey, SharedFetch>> {
    self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Shared handle to the process-wide query cache.
///
/// Construct one at startup and clone it into every consumer; clones share the
/// same store, managers and in-flight fetches.
#[derive(Clone)]
pub struct QueryClient {
  inner: Arc<ClientInner>,
}

impl QueryClient {
  pub fn new(config: QueryClientConfig) -> Self {
    Self {
      inner: Arc::new(ClientInner {
        cache: QueryCache::new(),
        config,
        online: OnlineManager::default(),
        focus: FocusManager::default(),
        in_flight: Mutex::new(HashMap::new()),
      }),
    }
  }

  pub fn cache(&self) -> &QueryCache {
    &self.inner.cache
  }

  pub fn config(&self) -> &QueryClientConfig {
    &self.inner.config
  }

  pub fn online_manager(&self) -> &OnlineManager {
    &self.inner.online
  }

  pub fn focus_manager(&self) -> &FocusManager {
    &self.inner.focus
  }

  fn resolve(&self, options: &QueryOptions) -> ResolvedOptions {
    options.resolve(&self.inner.config.queries)
  }

  /// Fetch a query unless its cached data is still fresh.
  ///
  /// Fetch failures end up in the returned state; `Err` is only returned when
  /// the cached data can't be decoded as `T`.
  pub async fn fetch_query<T, F, Fut>(
    &self,
    key: &QueryKey,
    options: &QueryOptions,
    fetcher: F,
  ) -> Result<QueryState<T>>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let fetch = erase(fetcher);
    self
      .inner
      .cache
      .upsert(key, |q| q.refetch = Some((fetch.clone(), options.clone())));

    if let Some(state) = self.fresh_state(key, options) {
      return state.decode();
    }
    self.execute(key, options, fetch, false).await.decode()
  }

  /// Return cached data of any age, fetching only when there is none.
  pub async fn ensure_query_data<T, F, Fut>(
    &self,
    key: &QueryKey,
    options: &QueryOptions,
    fetcher: F,
  ) -> Result<QueryState<T>>
  where
    T: Serialize + DeserializeOwned + Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    match self.inner.cache.find(key) {
      Some(state) if state.data.is_some() => state.decode(),
      _ => self.fetch_query(key, options, fetcher).await,
    }
  }

  /// Fetch a paginated query.
  ///
  /// Without cached data this fetches the initial page. With cached pages it
  /// refetches the same number of pages, recomputing each param from the
  /// freshly fetched page before it.
  pub async fn fetch_infinite_query<P, M, F, Fut>(
    &self,
    options: &InfiniteQueryOptions<P, M>,
    fetch_page: F,
  ) -> Result<QueryState<InfiniteData<P, M>>>
  where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P>> + Send + 'static,
  {
    if !options.enabled {
      return self.current_state(&options.key);
    }

    let fetch = refetch_pages(Arc::downgrade(&self.inner), options.clone(), Arc::new(fetch_page));
    self
      .inner
      .cache
      .upsert(&options.key, |q| q.refetch = Some((fetch.clone(), options.query.clone())));

    if let Some(state) = self.fresh_state(&options.key, &options.query) {
      return state.decode();
    }
    self
      .execute(&options.key, &options.query, fetch, false)
      .await
      .decode()
  }

  /// Fetch the page after the last cached one and append it.
  ///
  /// Does nothing when the next-page function reports no further pages. Falls
  /// back to an initial fetch when there are no cached pages yet.
  pub async fn fetch_next_page<P, M, F, Fut>(
    &self,
    options: &InfiniteQueryOptions<P, M>,
    fetch_page: F,
  ) -> Result<QueryState<InfiniteData<P, M>>>
  where
    P: Serialize + DeserializeOwned + Send + Sync + 'static,
    M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P>> + Send + 'static,
  {
    if !options.enabled {
      return self.current_state(&options.key);
    }

    // Pages kept after a failed fetch are appended to like any others.
    let base = self
      .inner
      .cache
      .find(&options.key)
      .and_then(|state| state.data)
      .filter(is_infinite_shape);
    let Some(base) = base else {
      return self.fetch_infinite_query(options, fetch_page).await;
    };

    let current: InfiniteData<P, M> = serde_json::from_value(base.clone())
      .map_err(|e| eyre!("Cached pages for {} have an unexpected shape: {}", options.key, e))?;
    let Some(param) = options.next_page_param(&current) else {
      debug!(query = %options.key, "no next page");
      return self.current_state(&options.key);
    };

    let fetch_page = Arc::new(fetch_page);
    let fetch: FetchFn = Arc::new(move || {
      let base = base.clone();
      let param = param.clone();
      let fetch_page = fetch_page.clone();
      async move {
        let page = fetch_page(param.clone()).await?;
        append_page(base, &page, &param)
      }
      .boxed()
    });

    self
      .execute(&options.key, &options.query, fetch, true)
      .await
      .decode()
  }

  /// Whether a paginated query has a page after its last cached one.
  pub fn has_next_page<P, M>(&self, options: &InfiniteQueryOptions<P, M>) -> bool
  where
    P: DeserializeOwned,
    M: DeserializeOwned,
  {
    self
      .get_query_data::<InfiniteData<P, M>>(&options.key)
      .ok()
      .flatten()
      .is_some_and(|data| options.next_page_param(&data).is_some())
  }

  /// Run the fetcher registered for `key` again, ignoring freshness.
  ///
  /// Returns `None` if nothing was ever fetched for the key.
  pub async fn refetch(&self, key: &QueryKey) -> Option<QueryState> {
    let (fetch, options) = self.inner.cache.update(key, |q| q.refetch.clone()).flatten()?;
    Some(self.execute(key, &options, fetch, false).await)
  }

  pub fn get_query_state(&self, key: &QueryKey) -> Option<QueryState> {
    self.inner.cache.find(key)
  }

  pub fn get_query_data<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<Option<T>> {
    match self.inner.cache.find(key) {
      Some(state) => Ok(state.decode::<T>()?.data),
      None => Ok(None),
    }
  }

  /// Functionally update cached data.
  ///
  /// The updater receives the current data (if any); returning `None` leaves
  /// the cache untouched. Creates the entry when needed.
  pub fn set_query_data<T, U>(&self, key: &QueryKey, updater: U) -> Result<()>
  where
    T: Serialize + DeserializeOwned,
    U: FnOnce(Option<T>) -> Option<T>,
  {
    let current = self.get_query_data::<T>(key)?;
    if let Some(next) = updater(current) {
      let value = serde_json::to_value(&next)
        .map_err(|e| eyre!("Failed to serialize data for {}: {}", key, e))?;
      self.inner.cache.upsert(key, |_| ());
      self.inner.cache.set_data(key, value);
    }
    Ok(())
  }

  /// Mark every entry of `kind` stale and refetch the observed ones.
  pub async fn invalidate_queries(&self, kind: &str) {
    let keys = self.inner.cache.keys_of_kind(kind);
    let mut active = Vec::new();
    for key in keys {
      let observed = self
        .inner
        .cache
        .update(&key, |q| {
          q.state.is_invalidated = true;
          q.observers > 0
        })
        .unwrap_or(false);
      if observed {
        active.push(key);
      }
    }

    debug!(kind, active = active.len(), "invalidated queries");
    join_all(active.iter().map(|key| self.refetch(key))).await;
  }

  pub fn remove_queries(&self, kind: &str) -> usize {
    self.inner.cache.remove_kind(kind)
  }

  pub fn clear(&self) {
    self.inner.cache.clear();
  }

  /// Register an observer; the entry stays alive while the guard does.
  pub fn observe(&self, key: &QueryKey) -> QueryObserver {
    self.inner.cache.observe(key);
    QueryObserver {
      client: self.clone(),
      key: key.clone(),
    }
  }

  pub fn collect_garbage(&self) -> usize {
    self.collect_garbage_at(Instant::now())
  }

  pub fn collect_garbage_at(&self, now: Instant) -> usize {
    let evicted = self
      .inner
      .cache
      .collect_garbage(now, self.inner.config.queries.gc_time);
    if evicted > 0 {
      info!(evicted, "collected idle queries");
    }
    evicted
  }

  /// Start the background loop that reacts to focus and connectivity changes
  /// and periodically evicts idle entries.
  pub fn mount(&self) -> JoinHandle<()> {
    let client = self.clone();
    let mut focus = self.inner.focus.subscribe();
    let mut online = self.inner.online.subscribe();
    let sweep = self
      .inner
      .config
      .queries
      .gc_time
      .clamp(Duration::from_secs(1), Duration::from_secs(60));

    tokio::spawn(async move {
      let mut gc = tokio::time::interval(sweep);
      loop {
        tokio::select! {
          changed = focus.changed() => {
            if changed.is_err() {
              break;
            }
            let focused = *focus.borrow_and_update();
            if focused && client.inner.config.queries.refetch_on_window_focus {
              client.spawn_refetch_stale("focus");
            }
          }
          changed = online.changed() => {
            if changed.is_err() {
              break;
            }
            let is_online = *online.borrow_and_update();
            if is_online && client.inner.config.queries.refetch_on_reconnect {
              client.spawn_refetch_stale("reconnect");
            }
          }
          _ = gc.tick() => {
            client.collect_garbage();
          }
        }
      }
    })
  }

  fn spawn_refetch_stale(&self, reason: &'static str) {
    let client = self.clone();
    tokio::spawn(async move {
      let stale: Vec<_> = client
        .inner
        .cache
        .active_keys()
        .into_iter()
        .filter(|key| {
          let options = client
            .inner
            .cache
            .update(key, |q| q.refetch.as_ref().map(|(_, options)| options.clone()))
            .flatten()
            .unwrap_or_default();
          client.fresh_state(key, &options).is_none()
        })
        .collect();
      debug!(reason, count = stale.len(), "refetching active queries");
      join_all(stale.iter().map(|key| client.refetch(key))).await;
    });
  }

  fn current_state<T: DeserializeOwned>(&self, key: &QueryKey) -> Result<QueryState<T>> {
    self.inner.cache.find(key).unwrap_or_default().decode()
  }

  /// The entry's state if it holds data younger than the stale time.
  fn fresh_state(&self, key: &QueryKey, options: &QueryOptions) -> Option<QueryState> {
    let stale_time = self.resolve(options).stale_time;
    let state = self.inner.cache.find(key)?;
    if !state.is_success() || state.is_invalidated || state.is_fetching() {
      return None;
    }
    let updated_at = state.data_updated_at?;
    let fresh = (Utc::now() - updated_at)
      .to_std()
      .map_or(true, |age| age < stale_time);
    fresh.then_some(state)
  }

  /// Run `fetch` for `key`, joining an in-flight fetch if there is one.
  async fn execute(
    &self,
    key: &QueryKey,
    options: &QueryOptions,
    fetch: FetchFn,
    next_page: bool,
  ) -> QueryState {
    let shared = {
      let mut in_flight = self.inner.in_flight();
      if let Some(existing) = in_flight.get(key) {
        debug!(query = %key, "joining in-flight fetch");
        existing.clone()
      } else {
        self.inner.cache.upsert(key, |q| q.state.fetch_started(next_page));
        let task = tokio::spawn(run_fetch(
          self.inner.clone(),
          key.clone(),
          self.resolve(options),
          fetch,
        ));
        let shared = async move {
          task
            .await
            .unwrap_or_else(|e| Err(format!("fetch task failed: {}", e)))
        }
        .boxed()
        .shared();
        in_flight.insert(key.clone(), shared.clone());
        shared
      }
    };

    // The outcome is already recorded in the cache by the fetch task.
    let _ = shared.await;
    self.inner.cache.find(key).unwrap_or_default()
  }
}

/// Fetch task body. Records the outcome even if every caller has gone away.
async fn run_fetch(
  inner: Arc<ClientInner>,
  key: QueryKey,
  options: ResolvedOptions,
  fetch: FetchFn,
) -> Result<Value, String> {
  let label = key.to_string();
  debug!(query = %label, "fetching");

  let result = run_with_retry(
    &label,
    &options.retry,
    options.network_mode,
    &inner.online,
    |event| {
      inner.cache.update(&key, |q| match event {
        RetryEvent::Paused => q.state.fetch_status = FetchStatus::Paused,
        RetryEvent::Resumed => q.state.fetch_status = FetchStatus::Fetching,
        RetryEvent::Failed(count) => q.state.failure_count = count,
      });
    },
    || fetch(),
  )
  .await;

  inner.cache.upsert(&key, |q| {
    match &result {
      Ok(data) => q.state.fetch_succeeded(data.clone()),
      Err(error) => q.state.fetch_failed(error.clone()),
    }
    q.schedule_gc();
  });
  inner.in_flight().remove(&key);
  result
}

/// Guard returned by `QueryClient::observe`.
pub struct QueryObserver {
  client: QueryClient,
  key: QueryKey,
}

impl QueryObserver {
  pub fn key(&self) -> &QueryKey {
    &self.key
  }
}

impl Drop for QueryObserver {
  fn drop(&mut self) {
    self.client.inner.cache.unobserve(&self.key);
  }
}

fn erase<T, F, Fut>(fetcher: F) -> FetchFn
where
  T: Serialize + Send + 'static,
  F: Fn() -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<T>> + Send + 'static,
{
  Arc::new(move || {
    let fut = fetcher();
    async move {
      let data = fut.await?;
      serde_json::to_value(data).map_err(|e| eyre!("Failed to serialize query data: {}", e))
    }
    .boxed()
  })
}

/// Fetcher that rebuilds a paginated entry page by page.
fn refetch_pages<P, M, F, Fut>(
  inner: Weak<ClientInner>,
  options: InfiniteQueryOptions<P, M>,
  fetch_page: Arc<F>,
) -> FetchFn
where
  P: Serialize + DeserializeOwned + Send + Sync + 'static,
  M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
  F: Fn(M) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = Result<P>> + Send + 'static,
{
  let options = Arc::new(options);
  Arc::new(move || {
    let inner = inner.clone();
    let options = options.clone();
    let fetch_page = fetch_page.clone();
    async move {
      let (count, first_param) = inner
        .upgrade()
        .and_then(|inner| inner.cache.find(&options.key))
        .and_then(|state| state.data)
        .filter(is_infinite_shape)
        .and_then(|data| serde_json::from_value::<InfiniteData<P, M>>(data).ok())
        .and_then(|data| Some((data.len(), data.page_params().first()?.clone())))
        .unwrap_or_else(|| (1, options.initial_page_param.clone()));

      let first = fetch_page(first_param.clone()).await?;
      let mut data = InfiniteData::first(first, first_param);
      while data.len() < count {
        let Some(param) = options.next_page_param(&data) else {
          break;
        };
        let page = fetch_page(param.clone()).await?;
        data.push(page, param);
      }

      serde_json::to_value(&data).map_err(|e| eyre!("Failed to serialize pages: {}", e))
    }
    .boxed()
  })
}

/// Append one page and its param to serialized `InfiniteData`.
fn append_page<P: Serialize, M: Serialize>(mut base: Value, page: &P, param: &M) -> Result<Value> {
  if !is_infinite_shape(&base) {
    return Err(eyre!("Cached data is not paginated"));
  }
  let page = serde_json::to_value(page).map_err(|e| eyre!("Failed to serialize page: {}", e))?;
  let param =
    serde_json::to_value(param).map_err(|e| eyre!("Failed to serialize page param: {}", e))?;

  if let Some(pages) = base.get_mut("pages").and_then(Value::as_array_mut) {
    pages.push(page);
  }
  if let Some(params) = base.get_mut("pageParams").and_then(Value::as_array_mut) {
    params.push(param);
  }
  Ok(base)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::{NetworkMode, QueryDefaults, RetryPolicy};
  use std::sync::atomic::{AtomicU32, Ordering};

  fn client() -> QueryClient {
    QueryClient::new(QueryClientConfig {
      queries: QueryDefaults {
        retry: RetryPolicy::default().with_base_delay(Duration::from_millis(1)),
        ..QueryDefaults::default()
      },
      ..QueryClientConfig::default()
    })
  }

  fn counting(calls: &Arc<AtomicU32>, delay: Duration) -> impl Fn() -> BoxFuture<'static, Result<u32>> {
    let calls = calls.clone();
    move || {
      let calls = calls.clone();
      async move {
        tokio::time::sleep(delay).await;
        Ok(calls.fetch_add(1, Ordering::SeqCst) + 1)
      }
      .boxed()
    }
  }

  #[tokio::test(start_paused = true)]
  async fn test_concurrent_fetches_share_one_request() {
    let client = client();
    let key = QueryKey::kind("node.all");
    let calls = Arc::new(AtomicU32::new(0));
    let options = QueryOptions::default();

    let (a, b) = tokio::join!(
      client.fetch_query(&key, &options, counting(&calls, Duration::from_millis(20))),
      client.fetch_query(&key, &options, counting(&calls, Duration::from_millis(20))),
    );

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(a.unwrap().data(), Some(&1));
    assert_eq!(b.unwrap().data(), Some(&1));
  }

  #[tokio::test]
  async fn test_error_after_retries_is_state_not_err() {
    let client = client();
    let key = QueryKey::kind("node.all");
    let calls = Arc::new(AtomicU32::new(0));
    let counter = calls.clone();

    let state = client
      .fetch_query::<u32, _, _>(&key, &QueryOptions::default(), move || {
        counter.fetch_add(1, Ordering::SeqCst);
        async { Err(eyre!("502 bad gateway")) }
      })
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(state.is_error());
    assert_eq!(state.error(), Some("502 bad gateway"));
    assert_eq!(state.fetch_status, FetchStatus::Idle);
  }

  #[tokio::test]
  async fn test_offline_first_attempts_while_offline() {
    let client = client();
    client.online_manager().set_online(false);
    let key = QueryKey::kind("node.all");
    let calls = Arc::new(AtomicU32::new(0));

    let state = client
      .fetch_query(&key, &QueryOptions::default(), counting(&calls, Duration::ZERO))
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(state.is_success());
  }

  #[tokio::test]
  async fn test_offline_first_fails_when_transport_fails() {
    let client = client();
    client.online_manager().set_online(false);
    let key = QueryKey::kind("node.all");
    let options = QueryOptions::default().with_retry(RetryPolicy::never());

    let state = client
      .fetch_query::<u32, _, _>(&key, &options, || async { Err(eyre!("dns error")) })
      .await
      .unwrap();

    assert!(state.is_error());
  }

  #[tokio::test(start_paused = true)]
  async fn test_online_mode_pauses_while_offline() {
    let client = client();
    client.online_manager().set_online(false);
    let key = QueryKey::kind("node.all");
    let calls = Arc::new(AtomicU32::new(0));

    let task = {
      let client = client.clone();
      let key = key.clone();
      let fetcher = counting(&calls, Duration::ZERO);
      tokio::spawn(async move {
        let options = QueryOptions::default().with_network_mode(NetworkMode::Online);
        client.fetch_query(&key, &options, fetcher).await
      })
    };

    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(client.get_query_state(&key).unwrap().is_paused());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    client.online_manager().set_online(true);
    let state = task.await.unwrap().unwrap();
    assert!(state.is_success());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_fresh_data_is_served_from_cache() {
    let client = client();
    let key = QueryKey::kind("node.all");
    let calls = Arc::new(AtomicU32::new(0));
    let options = QueryOptions::default().with_stale_time(Duration::from_secs(3600));

    client
      .fetch_query(&key, &options, counting(&calls, Duration::ZERO))
      .await
      .unwrap();
    let state = client
      .fetch_query(&key, &options, counting(&calls, Duration::ZERO))
      .await
      .unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(state.data(), Some(&1));

    // Stale time zero always refetches.
    client
      .fetch_query(&key, &QueryOptions::default(), counting(&calls, Duration::ZERO))
      .await
      .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_abandoned_fetch_still_writes_result() {
    let client = client();
    let key = QueryKey::kind("node.all");
    let calls = Arc::new(AtomicU32::new(0));

    let caller = {
      let client = client.clone();
      let key = key.clone();
      let fetcher = counting(&calls, Duration::from_millis(30));
      tokio::spawn(async move {
        client
          .fetch_query(&key, &QueryOptions::default(), fetcher)
          .await
      })
    };
    tokio::time::sleep(Duration::from_millis(5)).await;
    caller.abort();

    tokio::time::sleep(Duration::from_millis(60)).await;
    let state = client.get_query_state(&key).unwrap();
    assert!(state.is_success());
    assert_eq!(client.get_query_data::<u32>(&key).unwrap(), Some(1));
  }

  #[tokio::test]
  async fn test_refetch_restarts_idle_clock() {
    let gc_time = Duration::from_millis(100);
    let client = QueryClient::new(QueryClientConfig {
      queries: QueryDefaults {
        gc_time,
        ..QueryDefaults::default()
      },
      ..QueryClientConfig::default()
    });
    let key = QueryKey::kind("node.all");
    let calls = Arc::new(AtomicU32::new(0));

    client
      .fetch_query(&key, &QueryOptions::default(), counting(&calls, Duration::ZERO))
      .await
      .unwrap();
    tokio::time::sleep(Duration::from_millis(90)).await;
    client
      .fetch_query(&key, &QueryOptions::default(), counting(&calls, Duration::ZERO))
      .await
      .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // Created over 100ms ago, but only idle since the second fetch.
    assert_eq!(client.collect_garbage_at(Instant::now() + gc_time / 2), 0);
    assert!(client.cache().contains(&key));
    assert_eq!(client.collect_garbage_at(Instant::now() + gc_time), 1);
  }

  #[tokio::test]
  async fn test_invalidate_refetches_observed_queries() {
    let client = client();
    let observed = QueryKey::new("node.topics", &"rust").unwrap();
    let idle = QueryKey::new("node.topics", &"go").unwrap();
    let calls = Arc::new(AtomicU32::new(0));
    let _observer = client.observe(&observed);

    for key in [&observed, &idle] {
      client
        .fetch_query(key, &QueryOptions::default(), counting(&calls, Duration::ZERO))
        .await
        .unwrap();
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    client.invalidate_queries("node.topics").await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert!(client.get_query_state(&idle).unwrap().is_invalidated);
    assert!(!client.get_query_state(&observed).unwrap().is_invalidated);
  }

  #[tokio::test(start_paused = true)]
  async fn test_reconnect_refetches_active_queries() {
    let client = client();
    let key = QueryKey::kind("node.all");
    let calls = Arc::new(AtomicU32::new(0));
    let _observer = client.observe(&key);
    let background = client.mount();

    client
      .fetch_query(&key, &QueryOptions::default(), counting(&calls, Duration::ZERO))
      .await
      .unwrap();

    client.online_manager().set_online(false);
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.online_manager().set_online(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    background.abort();
  }

  #[tokio::test(start_paused = true)]
  async fn test_focus_does_not_refetch_by_default() {
    let client = client();
    let key = QueryKey::kind("node.all");
    let calls = Arc::new(AtomicU32::new(0));
    let _observer = client.observe(&key);
    let background = client.mount();

    client
      .fetch_query(&key, &QueryOptions::default(), counting(&calls, Duration::ZERO))
      .await
      .unwrap();

    client.focus_manager().set_focused(false);
    tokio::time::sleep(Duration::from_millis(10)).await;
    client.focus_manager().set_focused(true);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    background.abort();
  }

  #[tokio::test]
  async fn test_set_query_data_updater() {
    let client = client();
    let key = QueryKey::kind("counter");

    client.set_query_data::<u32, _>(&key, |_| None).unwrap();
    assert!(!client.cache().contains(&key));

    client.set_query_data::<u32, _>(&key, |_| Some(1)).unwrap();
    client
      .set_query_data::<u32, _>(&key, |current| current.map(|n| n + 1))
      .unwrap();
    assert_eq!(client.get_query_data::<u32>(&key).unwrap(), Some(2));
  }

  #[test]
  fn test_append_page() {
    let base = serde_json::json!({ "pages": ["A"], "pageParams": [0] });
    let appended = append_page(base, &"B", &1).unwrap();
    assert_eq!(
      appended,
      serde_json::json!({ "pages": ["A", "B"], "pageParams": [0, 1] })
    );
    assert!(append_page(serde_json::json!([1]), &"B", &1).is_err());
  }
}
