//! Durable queue of writes awaiting confirmation from the remote service.

use tracing::{debug, info, warn};

use crate::api::{TweetApi, TweetDraft};
use crate::error::SyncError;
use crate::model::PendingEntity;
use crate::store::{AttemptRecord, Store};

/// Outcome of one drain cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DrainReport {
  /// Accepted by the remote service and removed
  pub submitted: Vec<String>,
  /// Refused with a validation/auth error; kept
  pub rejected: Vec<String>,
  /// Transient failure; kept
  pub failed: Vec<String>,
  /// Accepted remotely but still in the store because the delete failed
  pub unremoved: Vec<String>,
  /// Not attempted because the network went away mid-drain
  pub deferred: usize,
}

impl DrainReport {
  /// Entities still pending after this cycle
  pub fn remaining(&self) -> usize {
    self.rejected.len() + self.failed.len() + self.unremoved.len() + self.deferred
  }
}

/// Pending-write queue.
/// Clone is cheap - only the store handle is held.
#[derive(Clone)]
pub struct PendingQueue {
  store: Store,
}

impl PendingQueue {
  pub fn new(store: Store) -> Self {
    Self { store }
  }

  /// Persist a draft under a freshly generated local id.
  pub fn enqueue(&self, draft: TweetDraft) -> Result<PendingEntity, SyncError> {
    self.enqueue_as(None, draft)
  }

  /// Persist a draft, keeping `id` when the caller already has one.
  pub fn enqueue_as(&self, id: Option<String>, draft: TweetDraft) -> Result<PendingEntity, SyncError> {
    let entity = PendingEntity::new(id, draft);
    self.store.put(&entity)?;
    debug!(id = %entity.id, "Enqueued pending write");
    Ok(entity)
  }

  /// Pending entities in insertion order
  pub fn pending(&self) -> Result<Vec<PendingEntity>, SyncError> {
    self.store.get_all()
  }

  /// Failed submission diagnostics for a pending entity
  pub fn attempt(&self, id: &str) -> Result<Option<AttemptRecord>, SyncError> {
    self.store.attempt::<PendingEntity>(id)
  }

  /// Drop a pending entity without submitting it
  pub fn discard(&self, id: &str) -> Result<(), SyncError> {
    self.store.delete::<PendingEntity>(id)?;
    info!(id, "Discarded pending write");
    Ok(())
  }

  /// Submit every pending entity once, in insertion order.
  ///
  /// Works on a snapshot: entities enqueued while the drain runs wait for the
  /// next cycle. A failed entity is left untouched and its attempt recorded. If
  /// the network becomes unreachable the rest of the snapshot is deferred. A
  /// store failure after a submission never stops the drain.
  pub(crate) async fn drain(&self, api: &TweetApi) -> Result<DrainReport, SyncError> {
    let pending = self.pending()?;
    let total = pending.len();
    let mut report = DrainReport::default();

    for (index, entity) in pending.into_iter().enumerate() {
      match api.create_tweet(&entity.payload).await {
        Ok(_) => match self.store.delete::<PendingEntity>(&entity.id) {
          Ok(()) => {
            debug!(id = %entity.id, "Pending write synced");
            report.submitted.push(entity.id);
          }
          Err(e) => {
            // Will be submitted again by a later drain
            warn!(id = %entity.id, error = %e, "Synced pending write could not be removed");
            report.unremoved.push(entity.id);
          }
        },
        Err(e) => {
          self.note_failure(&entity.id, &e);
          match e {
            SyncError::RemoteRejected { .. } => report.rejected.push(entity.id),
            SyncError::NetworkUnreachable(_) => {
              report.failed.push(entity.id);
              report.deferred = total - index - 1;
              break;
            }
            _ => report.failed.push(entity.id),
          }
        }
      }
    }

    Ok(report)
  }

  fn note_failure(&self, id: &str, error: &SyncError) {
    match self.store.record_attempt::<PendingEntity>(id, &error.to_string()) {
      Ok(record) => warn!(id, attempts = record.attempts, error = %error, "Pending write not synced"),
      Err(e) => warn!(id, error = %e, "Failed to record sync attempt"),
    }
  }
}
