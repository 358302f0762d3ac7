//! Cache-wide defaults and per-query overrides.

use std::time::Duration;

use serde::Deserialize;

use super::retry::RetryPolicy;

/// How a fetch reacts to the known connectivity state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NetworkMode {
  /// Pause before the first attempt while offline
  Online,
  /// Ignore connectivity entirely
  Always,
  /// Always make the first attempt; pause retries while offline
  #[default]
  OfflineFirst,
}

impl NetworkMode {
  /// Whether an attempt may start now.
  ///
  /// `first_attempt` distinguishes the initial try from retries: offline-first
  /// only gates retries.
  pub fn can_attempt(self, online: bool, first_attempt: bool) -> bool {
    match self {
      NetworkMode::Always => true,
      NetworkMode::Online => online,
      NetworkMode::OfflineFirst => first_attempt || online,
    }
  }
}

/// Defaults applied to every query.
#[derive(Debug, Clone)]
pub struct QueryDefaults {
  /// How long an unobserved entry is kept before eviction
  pub gc_time: Duration,
  /// Age after which cached data is considered stale
  pub stale_time: Duration,
  pub retry: RetryPolicy,
  pub refetch_on_window_focus: bool,
  pub refetch_on_reconnect: bool,
  pub network_mode: NetworkMode,
}

impl Default for QueryDefaults {
  fn default() -> Self {
    Self {
      gc_time: Duration::from_secs(60 * 60 * 24),
      stale_time: Duration::ZERO,
      retry: RetryPolicy::default(),
      refetch_on_window_focus: false,
      refetch_on_reconnect: true,
      network_mode: NetworkMode::OfflineFirst,
    }
  }
}

/// Defaults applied to every mutation.
#[derive(Debug, Clone)]
pub struct MutationDefaults {
  pub retry: RetryPolicy,
  pub network_mode: NetworkMode,
}

impl Default for MutationDefaults {
  fn default() -> Self {
    Self {
      retry: RetryPolicy::never(),
      network_mode: NetworkMode::OfflineFirst,
    }
  }
}

/// Everything needed to construct a `QueryClient`.
#[derive(Debug, Clone, Default)]
pub struct QueryClientConfig {
  pub queries: QueryDefaults,
  pub mutations: MutationDefaults,
}

/// Per-query overrides; `None` falls back to the client defaults.
#[derive(Debug, Clone, Default)]
pub struct QueryOptions {
  pub retry: Option<RetryPolicy>,
  pub network_mode: Option<NetworkMode>,
  pub stale_time: Option<Duration>,
}

impl QueryOptions {
  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = Some(retry);
    self
  }

  pub fn with_network_mode(mut self, mode: NetworkMode) -> Self {
    self.network_mode = Some(mode);
    self
  }

  pub fn with_stale_time(mut self, stale_time: Duration) -> Self {
    self.stale_time = Some(stale_time);
    self
  }

  pub(crate) fn resolve(&self, defaults: &QueryDefaults) -> ResolvedOptions {
    ResolvedOptions {
      retry: self.retry.clone().unwrap_or_else(|| defaults.retry.clone()),
      network_mode: self.network_mode.unwrap_or(defaults.network_mode),
      stale_time: self.stale_time.unwrap_or(defaults.stale_time),
    }
  }
}

#[derive(Debug, Clone)]
pub(crate) struct ResolvedOptions {
  pub retry: RetryPolicy,
  pub network_mode: NetworkMode,
  pub stale_time: Duration,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_defaults() {
    let defaults = QueryDefaults::default();
    assert_eq!(defaults.gc_time, Duration::from_secs(86_400));
    assert_eq!(defaults.retry.retries, 2);
    assert!(!defaults.refetch_on_window_focus);
    assert_eq!(defaults.network_mode, NetworkMode::OfflineFirst);
    assert_eq!(MutationDefaults::default().network_mode, NetworkMode::OfflineFirst);
  }

  #[test]
  fn test_offline_first_only_gates_retries() {
    assert!(NetworkMode::OfflineFirst.can_attempt(false, true));
    assert!(!NetworkMode::OfflineFirst.can_attempt(false, false));
    assert!(!NetworkMode::Online.can_attempt(false, true));
    assert!(NetworkMode::Always.can_attempt(false, false));
  }

  #[test]
  fn test_overrides_resolve_against_defaults() {
    let defaults = QueryDefaults::default();
    let resolved = QueryOptions::default()
      .with_network_mode(NetworkMode::Always)
      .resolve(&defaults);
    assert_eq!(resolved.network_mode, NetworkMode::Always);
    assert_eq!(resolved.retry.retries, 2);
    assert_eq!(resolved.stale_time, Duration::ZERO);
  }

  #[test]
  fn test_network_mode_from_yaml() {
    let mode: NetworkMode = serde_yaml::from_str("offlineFirst").unwrap();
    assert_eq!(mode, NetworkMode::OfflineFirst);
  }
}
