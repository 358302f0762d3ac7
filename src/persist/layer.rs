//! Moves query results between a `QueryClient` and a persister.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::Result;
use tracing::info;

use super::storage::Persister;
use crate::query::QueryClient;

/// Restores persisted results into the client at startup and saves them back
/// when asked.
pub struct PersistLayer<S: Persister> {
  storage: Arc<S>,
  /// Persisted results older than this are not restored
  max_age: Duration,
}

impl<S: Persister> PersistLayer<S> {
  /// Create a new layer; `max_age` defaults to a day.
  pub fn new(storage: S) -> Self {
    Self {
      storage: Arc::new(storage),
      max_age: Duration::from_secs(60 * 60 * 24),
    }
  }

  pub fn with_max_age(mut self, max_age: Duration) -> Self {
    self.max_age = max_age;
    self
  }

  pub fn storage(&self) -> &S {
    &self.storage
  }

  /// Load persisted results into `client`. Returns how many were applied.
  pub fn restore(&self, client: &QueryClient) -> Result<usize> {
    let queries = self.storage.restore(self.max_age)?;
    let found = queries.len();
    let applied = client.hydrate(queries);
    info!(found, applied, "restored persisted queries");
    Ok(applied)
  }

  /// Save every successful result in `client`. Returns how many were saved.
  pub fn persist(&self, client: &QueryClient) -> Result<usize> {
    let queries = client.dehydrate();
    self.storage.save(&queries)?;
    info!(saved = queries.len(), "persisted queries");
    Ok(queries.len())
  }
}

impl<S: Persister> Clone for PersistLayer<S> {
  fn clone(&self) -> Self {
    Self {
      storage: Arc::clone(&self.storage),
      max_age: self.max_age,
    }
  }
}
