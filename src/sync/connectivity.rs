//! Connectivity signal and the optional probe that drives it.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use url::Url;

use crate::http::{Request, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connectivity {
  Online,
  Offline,
}

impl fmt::Display for Connectivity {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Connectivity::Online => write!(f, "online"),
      Connectivity::Offline => write!(f, "offline"),
    }
  }
}

/// Shared connectivity state.
/// Clone is cheap - all clones publish to the same channel.
#[derive(Clone)]
pub struct ConnectivitySignal {
  tx: Arc<watch::Sender<Connectivity>>,
}

impl ConnectivitySignal {
  pub fn new(initial: Connectivity) -> Self {
    let (tx, _rx) = watch::channel(initial);
    Self { tx: Arc::new(tx) }
  }

  /// Publish a state. Returns true if it differs from the previous one.
  pub fn set(&self, state: Connectivity) -> bool {
    let changed = self.tx.send_if_modified(|current| {
      if *current == state {
        return false;
      }
      *current = state;
      true
    });
    if changed {
      info!(%state, "Connectivity changed");
    }
    changed
  }

  pub fn current(&self) -> Connectivity {
    *self.tx.borrow()
  }

  pub fn subscribe(&self) -> watch::Receiver<Connectivity> {
    self.tx.subscribe()
  }
}

/// Check reachability of `url`: any HTTP response means online.
pub async fn probe(transport: &dyn Transport, url: &Url) -> Connectivity {
  match transport.send(&Request::get(url.clone())).await {
    Ok(response) => {
      debug!(status = response.status, "Probe answered");
      Connectivity::Online
    }
    Err(e) => {
      debug!(error = %e, "Probe failed");
      Connectivity::Offline
    }
  }
}

/// Probe `url` every `interval` and publish the result to `signal`.
pub fn spawn_probe(
  signal: ConnectivitySignal,
  transport: Arc<dyn Transport>,
  url: Url,
  interval: Duration,
) -> JoinHandle<()> {
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      let state = probe(transport.as_ref(), &url).await;
      signal.set(state);
    }
  })
}
