//! Process-wide online and focus state.
//!
//! Both managers are cheap to clone and share one underlying watch channel, so
//! every clone observes the same value. Signal listeners write; the retry loop
//! and the client's background task read.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

/// Tracks whether the process believes it has working connectivity.
#[derive(Clone, Debug)]
pub struct OnlineManager {
  tx: Arc<watch::Sender<bool>>,
}

impl OnlineManager {
  pub fn new(online: bool) -> Self {
    let (tx, _) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Returns `true` if the value changed.
  pub fn set_online(&self, online: bool) -> bool {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        return false;
      }
      *current = online;
      true
    });
    if changed {
      info!(online, "connectivity changed");
    }
    changed
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }

  /// Resolve once the process is online.
  pub async fn wait_online(&self) {
    let mut rx = self.tx.subscribe();
    // The sender lives as long as `self`, so this can't fail.
    let _ = rx.wait_for(|online| *online).await;
  }
}

impl Default for OnlineManager {
  fn default() -> Self {
    Self::new(true)
  }
}

/// Tracks whether the application is in the foreground.
#[derive(Clone, Debug)]
pub struct FocusManager {
  tx: Arc<watch::Sender<bool>>,
}

impl FocusManager {
  pub fn new(focused: bool) -> Self {
    let (tx, _) = watch::channel(focused);
    Self { tx: Arc::new(tx) }
  }

  pub fn is_focused(&self) -> bool {
    *self.tx.borrow()
  }

  /// Returns `true` if the value changed.
  pub fn set_focused(&self, focused: bool) -> bool {
    let changed = self.tx.send_if_modified(|current| {
      if *current == focused {
        return false;
      }
      *current = focused;
      true
    });
    if changed {
      info!(focused, "focus changed");
    }
    changed
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }
}

impl Default for FocusManager {
  fn default() -> Self {
    Self::new(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[test]
  fn test_set_online_reports_changes() {
    let online = OnlineManager::default();
    assert!(online.is_online());
    assert!(!online.set_online(true));
    assert!(online.set_online(false));
    assert!(!online.is_online());
  }

  #[test]
  fn test_clones_share_state() {
    let focus = FocusManager::new(true);
    let other = focus.clone();
    other.set_focused(false);
    assert!(!focus.is_focused());
  }

  #[tokio::test(start_paused = true)]
  async fn test_wait_online_resolves_when_connected() {
    let online = OnlineManager::new(false);
    let waiter = {
      let online = online.clone();
      tokio::spawn(async move { online.wait_online().await })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!waiter.is_finished());

    online.set_online(true);
    tokio::time::timeout(Duration::from_secs(1), waiter)
      .await
      .expect("waiter should finish")
      .unwrap();
  }

  #[tokio::test]
  async fn test_subscribers_see_changes() {
    let focus = FocusManager::new(false);
    let mut rx = focus.subscribe();
    focus.set_focused(true);
    rx.changed().await.unwrap();
    assert!(*rx.borrow());
  }
}
