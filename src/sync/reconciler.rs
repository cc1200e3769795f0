//! Drains the pending-write queue against the remote service.

use std::sync::Arc;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::TweetApi;
use crate::error::SyncError;
use crate::queue::{DrainReport, PendingQueue};

use super::connectivity::Connectivity;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TriggerOutcome {
  Drained(DrainReport),
  /// Another drain held the flag; this trigger was dropped
  AlreadyDraining,
}

/// Sync reconciler.
///
/// At most one drain runs at a time. A trigger arriving mid-drain is dropped
/// rather than queued: the running drain already covers its snapshot and the
/// next trigger picks up anything enqueued since.
pub struct Reconciler {
  queue: PendingQueue,
  api: TweetApi,
  draining: Mutex<()>,
}

impl Reconciler {
  pub fn new(queue: PendingQueue, api: TweetApi) -> Self {
    Self {
      queue,
      api,
      draining: Mutex::new(()),
    }
  }

  pub fn is_draining(&self) -> bool {
    self.draining.try_lock().is_err()
  }

  /// Run a drain now unless one is already in progress.
  pub async fn trigger(&self) -> Result<TriggerOutcome, SyncError> {
    let Ok(_guard) = self.draining.try_lock() else {
      debug!("Drain already in progress, dropping trigger");
      return Ok(TriggerOutcome::AlreadyDraining);
    };

    let report = self.queue.drain(&self.api).await?;
    info!(
      submitted = report.submitted.len(),
      rejected = report.rejected.len(),
      failed = report.failed.len(),
      unremoved = report.unremoved.len(),
      deferred = report.deferred,
      "Drain finished"
    );
    Ok(TriggerOutcome::Drained(report))
  }

  /// Trigger a drain on every offline to online transition.
  ///
  /// The starting state is read before the task is spawned, so a transition
  /// published before the task first runs still counts.
  pub fn watch_connectivity(self: Arc<Self>, mut rx: watch::Receiver<Connectivity>) -> JoinHandle<()> {
    let mut last = *rx.borrow_and_update();
    tokio::spawn(async move {
      while rx.changed().await.is_ok() {
        let current = *rx.borrow_and_update();
        if last == Connectivity::Offline && current == Connectivity::Online {
          if let Err(e) = self.trigger().await {
            warn!(error = %e, "Reconnect drain failed");
          }
        }
        last = current;
      }
      debug!("Connectivity signal closed, stopping watcher");
    })
  }
}
