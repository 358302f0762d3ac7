//! Per-key query state as seen by consumers.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Whether the query has data, an error, or neither yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryStatus {
  /// No data has been fetched yet
  #[default]
  Pending,
  /// The last fetch succeeded
  Success,
  /// The last fetch failed after exhausting retries
  Error,
}

/// What the fetch machinery is doing for the query right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchStatus {
  #[default]
  Idle,
  Fetching,
  /// Waiting for connectivity before (re)trying
  Paused,
}

/// The state of a query.
///
/// `status` and `fetch_status` are independent: a query can hold successful
/// data while a background refetch is running.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryState<T = Value> {
  pub status: QueryStatus,
  pub fetch_status: FetchStatus,
  pub data: Option<T>,
  pub error: Option<String>,
  /// Failed attempts of the current (or last) fetch
  pub failure_count: u32,
  pub data_updated_at: Option<DateTime<Utc>>,
  pub error_updated_at: Option<DateTime<Utc>>,
  pub is_fetching_next_page: bool,
  pub is_invalidated: bool,
}

impl<T> Default for QueryState<T> {
  fn default() -> Self {
    Self {
      status: QueryStatus::Pending,
      fetch_status: FetchStatus::Idle,
      data: None,
      error: None,
      failure_count: 0,
      data_updated_at: None,
      error_updated_at: None,
      is_fetching_next_page: false,
      is_invalidated: false,
    }
  }
}

impl<T> QueryState<T> {
  pub fn is_pending(&self) -> bool {
    self.status == QueryStatus::Pending
  }

  pub fn is_success(&self) -> bool {
    self.status == QueryStatus::Success
  }

  pub fn is_error(&self) -> bool {
    self.status == QueryStatus::Error
  }

  pub fn is_fetching(&self) -> bool {
    self.fetch_status == FetchStatus::Fetching
  }

  pub fn is_paused(&self) -> bool {
    self.fetch_status == FetchStatus::Paused
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&str> {
    self.error.as_deref()
  }
}

impl QueryState<Value> {
  pub(crate) fn fetch_started(&mut self, next_page: bool) {
    self.fetch_status = FetchStatus::Fetching;
    self.is_fetching_next_page = next_page;
    self.failure_count = 0;
  }

  pub(crate) fn fetch_succeeded(&mut self, data: Value) {
    self.status = QueryStatus::Success;
    self.fetch_status = FetchStatus::Idle;
    self.data = Some(data);
    self.error = None;
    self.failure_count = 0;
    self.data_updated_at = Some(Utc::now());
    self.is_fetching_next_page = false;
    self.is_invalidated = false;
  }

  /// Data from an earlier success is kept; only the status flips.
  pub(crate) fn fetch_failed(&mut self, error: String) {
    self.status = QueryStatus::Error;
    self.fetch_status = FetchStatus::Idle;
    self.error = Some(error);
    self.error_updated_at = Some(Utc::now());
    self.is_fetching_next_page = false;
  }

  /// Deserialize the data into a concrete type.
  pub fn decode<T: DeserializeOwned>(&self) -> Result<QueryState<T>> {
    let data = match &self.data {
      Some(value) => Some(
        serde_json::from_value(value.clone())
          .map_err(|e| eyre!("Cached data has an unexpected shape: {}", e))?,
      ),
      None => None,
    };

    Ok(QueryState {
      status: self.status,
      fetch_status: self.fetch_status,
      data,
      error: self.error.clone(),
      failure_count: self.failure_count,
      data_updated_at: self.data_updated_at,
      error_updated_at: self.error_updated_at,
      is_fetching_next_page: self.is_fetching_next_page,
      is_invalidated: self.is_invalidated,
    })
  }
}
