//! Async query cache for data fetching, modelled on TanStack Query.
//!
//! A single `QueryClient` holds every result keyed by `QueryKey`. Fetches are
//! de-duplicated per key, retried according to a `RetryPolicy`, and gated by
//! a `NetworkMode` that consults the process-wide online state. Paginated
//! results are stored as `InfiniteData`.
//!
//! # Example
//!
//! ```ignore
//! let client = QueryClient::new(QueryClientConfig::default());
//! let options = InfiniteQueryOptions::new(QueryKey::new("node.topics", &"rust")?, 1)
//!   .with_next_page_param(|page: &TopicPage, _, _| page.next_page());
//!
//! let mut list = QueryConsumer::new(client.clone(), options, move |page| {
//!   let forum = forum.clone();
//!   async move { forum.node_topics("rust", page).await }
//! })
//! .with_middleware(RemoveUnnecessaryPages);
//!
//! // Before the first render
//! list.mount();
//! list.fetch().await?;
//!
//! // In render
//! let state = list.render()?;
//! if let Some(pages) = state.data() {
//!   render_topics(pages);
//! }
//! ```

mod cache;
mod client;
mod consumer;
mod hydration;
mod infinite;
mod key;
mod managers;
mod middleware;
mod mutation;
mod options;
mod retry;
mod signals;
mod state;

pub use cache::QueryCache;
pub use client::{QueryClient, QueryObserver};
pub use consumer::QueryConsumer;
pub use hydration::DehydratedQuery;
pub use infinite::{is_infinite_shape, InfiniteData, InfiniteQueryOptions, NextPageParamFn};
pub use key::QueryKey;
pub use managers::{FocusManager, OnlineManager};
pub use middleware::{Middleware, MountContext, RemoveUnnecessaryPages};
pub use options::{MutationDefaults, NetworkMode, QueryClientConfig, QueryDefaults, QueryOptions};
pub use retry::RetryPolicy;
pub use signals::{wire_signals, AppStatus, NetState, Platform, SignalWiring};
pub use state::{FetchStatus, QueryState, QueryStatus};
