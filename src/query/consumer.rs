//! A consumer of one paginated query, with an explicit mount phase.

use std::future::Future;
use std::sync::Arc;

use color_eyre::Result;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{de::DeserializeOwned, Serialize};

use super::client::{QueryClient, QueryObserver};
use super::infinite::{InfiniteData, InfiniteQueryOptions};
use super::middleware::{Middleware, MountContext};
use super::state::QueryState;

type PageFetcher<P, M> = Arc<dyn Fn(M) -> BoxFuture<'static, Result<P>> + Send + Sync>;

/// Something that displays a paginated query: a list view, a search result
/// pane, a topic thread.
///
/// Middlewares run in `mount`, exactly once per mount. `render` only reads.
pub struct QueryConsumer<P, M> {
  client: QueryClient,
  options: InfiniteQueryOptions<P, M>,
  fetch_page: PageFetcher<P, M>,
  middlewares: Vec<Arc<dyn Middleware>>,
  observer: Option<QueryObserver>,
}

impl<P, M> QueryConsumer<P, M>
where
  P: Serialize + DeserializeOwned + Send + Sync + 'static,
  M: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
  pub fn new<F, Fut>(client: QueryClient, options: InfiniteQueryOptions<P, M>, fetch_page: F) -> Self
  where
    F: Fn(M) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<P>> + Send + 'static,
  {
    Self {
      client,
      options,
      fetch_page: Arc::new(move |param| fetch_page(param).boxed()),
      middlewares: Vec::new(),
      observer: None,
    }
  }

  pub fn with_middleware(mut self, middleware: impl Middleware + 'static) -> Self {
    self.middlewares.push(Arc::new(middleware));
    self
  }

  pub fn options(&self) -> &InfiniteQueryOptions<P, M> {
    &self.options
  }

  pub fn is_mounted(&self) -> bool {
    self.observer.is_some()
  }

  /// Attach to the query. Middlewares run here, before anything is read.
  ///
  /// Mounting an already mounted consumer does nothing.
  pub fn mount(&mut self) {
    if self.observer.is_some() {
      return;
    }
    let ctx = MountContext::for_infinite(&self.options);
    for middleware in &self.middlewares {
      middleware.on_mount(&self.client, &ctx);
    }
    self.observer = Some(self.client.observe(&self.options.key));
  }

  /// Detach from the query; the entry starts its idle clock if this was the
  /// last observer.
  pub fn unmount(&mut self) {
    self.observer = None;
  }

  /// Current state of the query.
  pub fn render(&self) -> Result<QueryState<InfiniteData<P, M>>> {
    match self.client.get_query_state(&self.options.key) {
      Some(state) => state.decode(),
      None => Ok(QueryState::default()),
    }
  }

  pub fn has_next_page(&self) -> bool {
    self.client.has_next_page(&self.options)
  }

  pub async fn fetch(&self) -> Result<QueryState<InfiniteData<P, M>>> {
    let fetch_page = self.fetch_page.clone();
    self
      .client
      .fetch_infinite_query(&self.options, move |param| fetch_page(param))
      .await
  }

  pub async fn fetch_next_page(&self) -> Result<QueryState<InfiniteData<P, M>>> {
    let fetch_page = self.fetch_page.clone();
    self
      .client
      .fetch_next_page(&self.options, move |param| fetch_page(param))
      .await
  }

  pub async fn refetch(&self) -> Result<QueryState<InfiniteData<P, M>>> {
    self.client.refetch(&self.options.key).await;
    self.render()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::{
    QueryClientConfig, QueryKey, QueryOptions, RemoveUnnecessaryPages, RetryPolicy,
  };
  use color_eyre::eyre::eyre;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  const LETTERS: [&str; 4] = ["A", "B", "C", "D"];

  fn letters_options() -> InfiniteQueryOptions<String, usize> {
    InfiniteQueryOptions::new(QueryKey::kind("letters"), 0)
      .with_next_page_param(|_, _, last: &usize| (last + 1 < LETTERS.len()).then_some(last + 1))
      .with_query_options(
        QueryOptions::default().with_retry(RetryPolicy::never().with_base_delay(Duration::ZERO)),
      )
  }

  fn consumer(client: &QueryClient, calls: Arc<AtomicU32>) -> QueryConsumer<String, usize> {
    QueryConsumer::new(client.clone(), letters_options(), move |param: usize| {
      calls.fetch_add(1, Ordering::SeqCst);
      async move { Ok(LETTERS[param].to_string()) }
    })
    .with_middleware(RemoveUnnecessaryPages)
  }

  #[tokio::test]
  async fn test_scroll_then_remount_keeps_first_page() {
    let client = QueryClient::new(QueryClientConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let mut list = consumer(&client, calls.clone());

    list.mount();
    list.fetch().await.unwrap();
    list.fetch_next_page().await.unwrap();
    let state = list.fetch_next_page().await.unwrap();
    let data = state.data().unwrap();
    assert_eq!(data.pages(), ["A", "B", "C"]);
    assert_eq!(data.page_params(), [0, 1, 2]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    list.unmount();
    let mut again = consumer(&client, calls.clone());
    again.mount();

    let state = again.render().unwrap();
    let data = state.data().unwrap();
    assert_eq!(data.pages(), ["A"]);
    assert_eq!(data.page_params(), [0]);
    assert_eq!(calls.load(Ordering::SeqCst), 3);

    // Scrolling appends again through the normal path.
    let state = again.fetch_next_page().await.unwrap();
    assert_eq!(state.data().unwrap().pages(), ["A", "B"]);
  }

  #[tokio::test]
  async fn test_middleware_runs_once_per_mount() {
    let client = QueryClient::new(QueryClientConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let mut list = consumer(&client, calls);

    list.mount();
    list.fetch().await.unwrap();
    list.fetch_next_page().await.unwrap();

    // Re-rendering or re-mounting while mounted must not prune.
    list.render().unwrap();
    list.mount();
    assert_eq!(list.render().unwrap().data().unwrap().len(), 2);

    list.unmount();
    list.mount();
    assert_eq!(list.render().unwrap().data().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn test_last_page_has_no_next() {
    let client = QueryClient::new(QueryClientConfig::default());
    let list = consumer(&client, Arc::new(AtomicU32::new(0)));

    list.fetch().await.unwrap();
    for _ in 0..5 {
      list.fetch_next_page().await.unwrap();
    }
    assert!(!list.has_next_page());
    assert_eq!(list.render().unwrap().data().unwrap().pages(), LETTERS);
  }

  #[tokio::test]
  async fn test_refetch_rebuilds_all_pages() {
    let client = QueryClient::new(QueryClientConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let list = consumer(&client, calls.clone());

    list.fetch().await.unwrap();
    list.fetch_next_page().await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let state = list.refetch().await.unwrap();
    assert_eq!(state.data().unwrap().pages(), ["A", "B"]);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn test_failed_next_page_keeps_pages() {
    let client = QueryClient::new(QueryClientConfig::default());
    let list = QueryConsumer::new(client.clone(), letters_options(), |param: usize| async move {
      if param == 0 {
        Ok("A".to_string())
      } else {
        Err(eyre!("timed out"))
      }
    });

    list.fetch().await.unwrap();
    let state = list.fetch_next_page().await.unwrap();
    assert!(state.is_error());
    assert_eq!(state.error(), Some("timed out"));
    assert_eq!(state.data().unwrap().pages(), ["A"]);
    assert!(!state.is_fetching_next_page);
  }

  #[tokio::test]
  async fn test_retrying_next_page_after_failure_appends_it() {
    let client = QueryClient::new(QueryClientConfig::default());
    let calls = Arc::new(AtomicU32::new(0));
    let flaky = Arc::new(AtomicU32::new(0));
    let list = {
      let calls = calls.clone();
      QueryConsumer::new(client.clone(), letters_options(), move |param: usize| {
        calls.fetch_add(1, Ordering::SeqCst);
        let fail = param == 1 && flaky.fetch_add(1, Ordering::SeqCst) == 0;
        async move {
          if fail {
            Err(eyre!("connection reset"))
          } else {
            Ok(LETTERS[param].to_string())
          }
        }
      })
    };

    list.fetch().await.unwrap();
    let state = list.fetch_next_page().await.unwrap();
    assert!(state.is_error());
    assert_eq!(state.data().unwrap().pages(), ["A"]);

    let state = list.fetch_next_page().await.unwrap();
    assert!(state.is_success());
    let data = state.data().unwrap();
    assert_eq!(data.pages(), ["A", "B"]);
    assert_eq!(data.page_params(), [0, 1]);
    // A, failed B, B; page A is not fetched again.
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn test_mount_keeps_entry_alive() {
    let client = QueryClient::new(QueryClientConfig::default());
    let mut list = consumer(&client, Arc::new(AtomicU32::new(0)));
    list.mount();
    list.fetch().await.unwrap();

    let later = std::time::Instant::now() + Duration::from_secs(60 * 60 * 25);
    assert_eq!(client.collect_garbage_at(later), 0);

    drop(list);
    assert_eq!(client.collect_garbage_at(later), 1);
  }
}
