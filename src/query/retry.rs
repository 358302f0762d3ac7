//! Retry policy and the retrying fetch loop.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::managers::OnlineManager;
use super::options::NetworkMode;

/// How many times a failed fetch is retried and how long to wait in between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the initial attempt
  pub retries: u32,
  /// Delay before the first retry; doubles for each further retry
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      retries: 2,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(30),
    }
  }
}

impl RetryPolicy {
  pub fn never() -> Self {
    Self {
      retries: 0,
      ..Self::default()
    }
  }

  pub fn with_retries(mut self, retries: u32) -> Self {
    self.retries = retries;
    self
  }

  pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
    self.base_delay = base_delay;
    self
  }

  /// Delay before retry number `retry` (zero based).
  pub fn delay(&self, retry: u32) -> Duration {
    let factor = 2u32.saturating_pow(retry);
    self
      .base_delay
      .checked_mul(factor)
      .unwrap_or(self.max_delay)
      .min(self.max_delay)
  }
}

/// Progress notifications from the retry loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RetryEvent {
  Paused,
  Resumed,
  Failed(u32),
}

/// Run `attempt` until it succeeds or the policy gives up.
///
/// Before each attempt the network mode is consulted; if it forbids trying
/// while offline the loop waits for connectivity instead of failing.
pub(crate) async fn run_with_retry<T, F, Fut>(
  label: &str,
  policy: &RetryPolicy,
  mode: NetworkMode,
  online: &OnlineManager,
  mut on_event: impl FnMut(RetryEvent),
  attempt: F,
) -> Result<T, String>
where
  F: Fn() -> Fut,
  Fut: Future<Output = color_eyre::Result<T>>,
{
  let mut failures = 0u32;

  loop {
    if !mode.can_attempt(online.is_online(), failures == 0) {
      debug!(query = label, "offline, pausing fetch");
      on_event(RetryEvent::Paused);
      online.wait_online().await;
      on_event(RetryEvent::Resumed);
    }

    match attempt().await {
      Ok(value) => return Ok(value),
      Err(err) => {
        failures += 1;
        let message = format!("{:#}", err);
        if failures > policy.retries {
          warn!(query = label, failures, error = %message, "fetch failed");
          return Err(message);
        }

        on_event(RetryEvent::Failed(failures));
        let delay = policy.delay(failures - 1);
        debug!(query = label, failures, ?delay, error = %message, "retrying fetch");
        tokio::time::sleep(delay).await;
      }
    }
  }
}
