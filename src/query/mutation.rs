//! Mutations, including optimistic updates with rollback.

use std::future::Future;

use color_eyre::{eyre::eyre, Result};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use super::client::QueryClient;
use super::key::QueryKey;
use super::retry::run_with_retry;

impl QueryClient {
  /// Run a write operation under the mutation network mode and retry policy.
  ///
  /// Unlike queries, mutation failures are returned to the caller.
  pub async fn mutate<R, F, Fut>(&self, label: &str, mutation: F) -> Result<R>
  where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<R>>,
  {
    let defaults = &self.config().mutations;
    run_with_retry(
      label,
      &defaults.retry,
      defaults.network_mode,
      self.online_manager(),
      |_| {},
      mutation,
    )
    .await
    .map_err(|e| eyre!(e))
  }

  /// Apply `update` to the cached data of `key` right away, then run the
  /// mutation. On failure the data is restored to what it was before.
  ///
  /// Without cached data the update is skipped and only the mutation runs.
  pub async fn mutate_optimistic<T, R, U, F, Fut>(
    &self,
    key: &QueryKey,
    update: U,
    mutation: F,
  ) -> Result<R>
  where
    T: Serialize + DeserializeOwned,
    U: FnOnce(&mut T),
    F: Fn() -> Fut,
    Fut: Future<Output = Result<R>>,
  {
    let snapshot = self.cache().find(key).and_then(|state| state.data);

    if let Some(previous) = &snapshot {
      let mut data: T = serde_json::from_value(previous.clone())
        .map_err(|e| eyre!("Cached data for {} has an unexpected shape: {}", key, e))?;
      update(&mut data);
      let optimistic = serde_json::to_value(&data)
        .map_err(|e| eyre!("Failed to serialize data for {}: {}", key, e))?;
      self.cache().set_data(key, optimistic);
    }

    match self.mutate(&key.to_string(), mutation).await {
      Ok(result) => Ok(result),
      Err(err) => {
        if let Some(previous) = snapshot {
          debug!(query = %key, "rolling back optimistic update");
          self.cache().set_data(key, previous);
        }
        Err(err)
      }
    }
  }
}
