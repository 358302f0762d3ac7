//! Bridges platform connectivity and app-lifecycle signals into the client.

use std::str::FromStr;

use futures::{Stream, StreamExt};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::client::QueryClient;

/// A reachability report from the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetState {
  pub is_connected: Option<bool>,
  pub is_internet_reachable: Option<bool>,
}

impl NetState {
  /// Online only when connected *and* the internet is known to be reachable.
  /// A connection behind a captive portal counts as offline.
  pub fn is_online(&self) -> bool {
    self.is_connected == Some(true) && self.is_internet_reachable == Some(true)
  }
}

/// Application lifecycle status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppStatus {
  Active,
  Background,
  Inactive,
  Other(String),
}

impl AppStatus {
  pub fn is_focused(&self) -> bool {
    matches!(self, AppStatus::Active)
  }
}

impl FromStr for AppStatus {
  type Err = std::convert::Infallible;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Ok(match s {
      "active" => AppStatus::Active,
      "background" => AppStatus::Background,
      "inactive" => AppStatus::Inactive,
      other => AppStatus::Other(other.to_string()),
    })
  }
}

/// Host platform, which decides whether signal wiring applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
  Android,
  Ios,
  Desktop,
  /// Connectivity is managed by the browser; no wiring
  Web,
}

impl Platform {
  pub fn current() -> Self {
    if cfg!(target_arch = "wasm32") {
      Platform::Web
    } else if cfg!(target_os = "android") {
      Platform::Android
    } else if cfg!(target_os = "ios") {
      Platform::Ios
    } else {
      Platform::Desktop
    }
  }
}

/// Listener tasks started by `wire_signals`. They run for the life of the
/// process; dropping this does not stop them.
pub struct SignalWiring {
  pub focus: JoinHandle<()>,
  pub network: JoinHandle<()>,
}

/// Feed lifecycle and reachability streams into the client's focus and online
/// managers. Returns `None` on the web, where nothing is wired.
pub fn wire_signals<A, N>(
  client: &QueryClient,
  platform: Platform,
  app_status: A,
  net_state: N,
) -> Option<SignalWiring>
where
  A: Stream<Item = AppStatus> + Send + 'static,
  N: Stream<Item = NetState> + Send + 'static,
{
  if platform == Platform::Web {
    debug!("web platform, leaving connectivity to the host");
    return None;
  }
  info!(?platform, "wiring focus and connectivity signals");

  let focus = client.focus_manager().clone();
  let focus_task = tokio::spawn(async move {
    let mut app_status = Box::pin(app_status);
    while let Some(status) = app_status.next().await {
      focus.set_focused(status.is_focused());
    }
  });

  let online = client.online_manager().clone();
  let network_task = tokio::spawn(async move {
    let mut net_state = Box::pin(net_state);
    while let Some(state) = net_state.next().await {
      online.set_online(state.is_online());
    }
  });

  Some(SignalWiring {
    focus: focus_task,
    network: network_task,
  })
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::query::QueryClientConfig;
  use futures::stream;

  fn net(is_connected: Option<bool>, is_internet_reachable: Option<bool>) -> NetState {
    NetState {
      is_connected,
      is_internet_reachable,
    }
  }

  #[test]
  fn test_reachability_rules() {
    assert!(net(Some(true), Some(true)).is_online());
    assert!(!net(Some(true), Some(false)).is_online());
    assert!(!net(Some(true), None).is_online());
    assert!(!net(None, Some(true)).is_online());
    assert!(!net(Some(false), Some(true)).is_online());
  }

  #[test]
  fn test_net_state_from_json() {
    let state: NetState =
      serde_json::from_str(r#"{ "isConnected": true, "isInternetReachable": null }"#).unwrap();
    assert_eq!(state, net(Some(true), None));
  }

  #[test]
  fn test_only_active_is_focused() {
    assert!("active".parse::<AppStatus>().unwrap().is_focused());
    assert!(!"background".parse::<AppStatus>().unwrap().is_focused());
    assert!(!"unknown".parse::<AppStatus>().unwrap().is_focused());
  }

  #[tokio::test]
  async fn test_captive_portal_goes_offline() {
    let client = QueryClient::new(QueryClientConfig::default());
    let wiring = wire_signals(
      &client,
      Platform::Android,
      stream::iter(vec![AppStatus::Background]),
      stream::iter(vec![net(Some(true), Some(false))]),
    )
    .unwrap();

    wiring.focus.await.unwrap();
    wiring.network.await.unwrap();
    assert!(!client.online_manager().is_online());
    assert!(!client.focus_manager().is_focused());
  }

  #[tokio::test]
  async fn test_web_is_not_wired() {
    let client = QueryClient::new(QueryClientConfig::default());
    let wiring = wire_signals(
      &client,
      Platform::Web,
      stream::iter(vec![AppStatus::Background]),
      stream::iter(vec![net(Some(false), Some(false))]),
    );

    assert!(wiring.is_none());
    assert!(client.online_manager().is_online());
    assert!(client.focus_manager().is_focused());
  }
}
