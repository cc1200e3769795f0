use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::error::SyncError;
use crate::http::Response;

use super::storage::{DurableStore, NoopStore, SqliteStore};
use super::traits::{AttemptRecord, BlobBucket, Storable};

/// Cloneable, typed handle over a shared store backend.
///
/// Components hold one of these instead of reaching for a global store, so
/// tests can hand them an in-memory backend.
#[derive(Clone)]
pub struct Store {
  backend: Arc<dyn DurableStore>,
}

impl Store {
  pub fn new<B: DurableStore + 'static>(backend: B) -> Self {
    Self {
      backend: Arc::new(backend),
    }
  }

  /// SQLite store at `path`
  pub fn open(path: &Path) -> Result<Self, SyncError> {
    Ok(Self::new(SqliteStore::open(path)?))
  }

  pub fn in_memory() -> Result<Self, SyncError> {
    Ok(Self::new(SqliteStore::open_in_memory()?))
  }

  /// Store that keeps nothing (caching disabled)
  pub fn noop() -> Self {
    Self::new(NoopStore)
  }

  /// Access the raw backend.
  pub fn backend(&self) -> &dyn DurableStore {
    self.backend.as_ref()
  }

  /// Insert or overwrite an entity by key.
  pub fn put<T: Storable>(&self, entity: &T) -> Result<(), SyncError> {
    let data = serde_json::to_vec(entity)
      .map_err(|e| SyncError::StorageUnavailable(format!("Failed to serialize entity: {}", e)))?;
    self.backend.put(T::partition(), entity.key(), &data)
  }

  /// Insert or overwrite a batch atomically; the batch ends up last, in the given order.
  pub fn put_ordered<T: Storable>(&self, entities: &[T]) -> Result<(), SyncError> {
    let entries = entities
      .iter()
      .map(|entity| {
        serde_json::to_vec(entity)
          .map(|data| (entity.key().to_string(), data))
          .map_err(|e| SyncError::StorageUnavailable(format!("Failed to serialize entity: {}", e)))
      })
      .collect::<Result<Vec<_>, _>>()?;
    self.backend.put_ordered(T::partition(), &entries)
  }

  /// All decodable entities of type `T`, in insertion order.
  ///
  /// A row that no longer decodes is skipped so one bad entry cannot hide the rest.
  pub fn get_all<T: Storable>(&self) -> Result<Vec<T>, SyncError> {
    let records = self.backend.get_all(T::partition())?;
    Ok(
      records
        .into_iter()
        .filter_map(|record| match serde_json::from_slice::<T>(&record.data) {
          Ok(entity) => Some(entity),
          Err(e) => {
            warn!(partition = %T::partition(), id = %record.id, error = %e, "Skipping undecodable entity");
            None
          }
        })
        .collect(),
    )
  }

  pub fn delete<T: Storable>(&self, id: &str) -> Result<(), SyncError> {
    self.backend.delete(T::partition(), id)
  }

  pub fn prune<T: Storable>(&self, older_than: DateTime<Utc>) -> Result<usize, SyncError> {
    self.backend.prune(T::partition(), older_than)
  }

  pub fn put_blob(&self, bucket: BlobBucket, key: &str, response: &Response) -> Result<(), SyncError> {
    self.backend.put_blob(bucket, key, response)
  }

  pub fn get_blob(&self, bucket: BlobBucket, key: &str) -> Result<Option<Response>, SyncError> {
    self.backend.get_blob(bucket, key)
  }

  pub fn record_attempt<T: Storable>(&self, id: &str, error: &str) -> Result<AttemptRecord, SyncError> {
    self.backend.record_attempt(T::partition(), id, error)
  }

  pub fn attempt<T: Storable>(&self, id: &str) -> Result<Option<AttemptRecord>, SyncError> {
    self.backend.attempt(T::partition(), id)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::store::Partition;
  use serde::{Deserialize, Serialize};

  #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
  struct Note {
    id: String,
    text: String,
  }

  impl Storable for Note {
    fn key(&self) -> &str {
      &self.id
    }

    fn partition() -> Partition {
      Partition::CachedReads
    }
  }

  fn note(id: &str, text: &str) -> Note {
    Note {
      id: id.to_string(),
      text: text.to_string(),
    }
  }

  #[test]
  fn test_write_then_read_returns_latest_payload_once() {
    let store = Store::in_memory().unwrap();
    store.put(&note("1", "first")).unwrap();
    store.put(&note("2", "other")).unwrap();
    store.put(&note("1", "second")).unwrap();

    let notes: Vec<Note> = store.get_all().unwrap();
    let matching: Vec<_> = notes.iter().filter(|n| n.id == "1").collect();
    assert_eq!(matching.len(), 1);
    assert_eq!(matching[0].text, "second");
  }

  #[test]
  fn test_deleted_ids_are_excluded() {
    let store = Store::in_memory().unwrap();
    store.put(&note("1", "a")).unwrap();
    store.put(&note("2", "b")).unwrap();
    store.delete::<Note>("1").unwrap();

    let notes: Vec<Note> = store.get_all().unwrap();
    assert_eq!(notes, vec![note("2", "b")]);
  }

  #[test]
  fn test_undecodable_rows_are_skipped() {
    let store = Store::in_memory().unwrap();
    store.put(&note("1", "good")).unwrap();
    store
      .backend()
      .put(Partition::CachedReads, "2", b"{not json")
      .unwrap();

    let notes: Vec<Note> = store.get_all().unwrap();
    assert_eq!(notes, vec![note("1", "good")]);
  }

  #[test]
  fn test_noop_handle_reads_nothing_back() {
    let store = Store::noop();
    store.put(&note("1", "a")).unwrap();
    assert!(store.get_all::<Note>().unwrap().is_empty());
  }
}
