//! Store backend trait and SQLite implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::warn;

use crate::error::SyncError;
use crate::http::Response;

use super::traits::{AttemptRecord, BlobBucket, Partition, StoredRecord};

type Result<T> = std::result::Result<T, SyncError>;

/// Trait for durable store backends.
///
/// Every operation is atomic per entity. Backend failures surface as
/// `SyncError::StorageUnavailable`.
pub trait DurableStore: Send + Sync {
  /// Insert or overwrite an entity. An overwrite keeps the entity's original position.
  fn put(&self, partition: Partition, id: &str, data: &[u8]) -> Result<()>;

  /// Insert or overwrite a batch in one transaction, moving every entry to the
  /// end of the partition in batch order. Entries not in the batch keep their place.
  fn put_ordered(&self, partition: Partition, entries: &[(String, Vec<u8>)]) -> Result<()>;

  /// All entities in the partition, in insertion order.
  fn get_all(&self, partition: Partition) -> Result<Vec<StoredRecord>>;

  /// Remove an entity and its attempt record. No-op if absent.
  fn delete(&self, partition: Partition, id: &str) -> Result<()>;

  /// Remove entities stored before `older_than`, returning how many went.
  fn prune(&self, partition: Partition, older_than: DateTime<Utc>) -> Result<usize>;

  /// Store a response under a locator digest.
  fn put_blob(&self, bucket: BlobBucket, key: &str, response: &Response) -> Result<()>;

  /// Get a stored response by locator digest.
  fn get_blob(&self, bucket: BlobBucket, key: &str) -> Result<Option<Response>>;

  /// Count a failed submission for an entity, returning the updated record.
  fn record_attempt(&self, partition: Partition, id: &str, error: &str) -> Result<AttemptRecord>;

  /// Submission diagnostics for an entity, if any attempt failed.
  fn attempt(&self, partition: Partition, id: &str) -> Result<Option<AttemptRecord>>;
}

/// Store that doesn't keep anything.
/// Used when caching is disabled - the proxy degrades to network-only behaviour.
pub struct NoopStore;

impl DurableStore for NoopStore {
  fn put(&self, _partition: Partition, _id: &str, _data: &[u8]) -> Result<()> {
    Ok(()) // Discard
  }

  fn put_ordered(&self, _partition: Partition, _entries: &[(String, Vec<u8>)]) -> Result<()> {
    Ok(())
  }

  fn get_all(&self, _partition: Partition) -> Result<Vec<StoredRecord>> {
    Ok(Vec::new())
  }

  fn delete(&self, _partition: Partition, _id: &str) -> Result<()> {
    Ok(())
  }

  fn prune(&self, _partition: Partition, _older_than: DateTime<Utc>) -> Result<usize> {
    Ok(0)
  }

  fn put_blob(&self, _bucket: BlobBucket, _key: &str, _response: &Response) -> Result<()> {
    Ok(()) // Discard
  }

  fn get_blob(&self, _bucket: BlobBucket, _key: &str) -> Result<Option<Response>> {
    Ok(None) // Always miss
  }

  fn record_attempt(&self, _partition: Partition, _id: &str, error: &str) -> Result<AttemptRecord> {
    Ok(AttemptRecord {
      attempts: 1,
      last_attempt_at: Utc::now(),
      last_error: error.to_string(),
    })
  }

  fn attempt(&self, _partition: Partition, _id: &str) -> Result<Option<AttemptRecord>> {
    Ok(None)
  }
}

/// SQLite-based store implementation.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| unavailable("Failed to create store directory", e))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      SyncError::StorageUnavailable(format!(
        "Failed to open store at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// Open a private in-memory store.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| unavailable("Failed to open in-memory store", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  /// Run schema migrations.
  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| unavailable("Failed to run store migrations", e))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| SyncError::StorageUnavailable(format!("Lock poisoned: {}", e)))
  }
}

/// Schema for store tables.
const STORE_SCHEMA: &str = r#"
-- Entities of every partition; seq preserves insertion order
CREATE TABLE IF NOT EXISTS entities (
    seq INTEGER PRIMARY KEY AUTOINCREMENT,
    partition_name TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    UNIQUE (partition_name, entity_id)
);

-- Cached responses (static assets, attachments)
CREATE TABLE IF NOT EXISTS blobs (
    bucket TEXT NOT NULL,
    blob_key TEXT NOT NULL,
    status INTEGER NOT NULL,
    content_type TEXT,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL,
    PRIMARY KEY (bucket, blob_key)
);

-- Failed submission diagnostics, kept apart from the entity itself
CREATE TABLE IF NOT EXISTS sync_attempts (
    partition_name TEXT NOT NULL,
    entity_id TEXT NOT NULL,
    attempts INTEGER NOT NULL,
    last_attempt_at TEXT NOT NULL,
    last_error TEXT NOT NULL,
    PRIMARY KEY (partition_name, entity_id)
);
"#;

impl DurableStore for SqliteStore {
  fn put(&self, partition: Partition, id: &str, data: &[u8]) -> Result<()> {
    self
      .lock()?
      .execute(
        "INSERT INTO entities (partition_name, entity_id, data, stored_at)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT (partition_name, entity_id)
         DO UPDATE SET data = excluded.data, stored_at = excluded.stored_at",
        params![partition.as_str(), id, data, format_datetime(Utc::now())],
      )
      .map_err(|e| unavailable("Failed to store entity", e))?;
    Ok(())
  }

  fn put_ordered(&self, partition: Partition, entries: &[(String, Vec<u8>)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| unavailable("Failed to begin transaction", e))?;
    let stored_at = format_datetime(Utc::now());

    // Delete then insert so each entry takes a fresh seq
    for (id, data) in entries {
      tx.execute(
        "DELETE FROM entities WHERE partition_name = ? AND entity_id = ?",
        params![partition.as_str(), id],
      )
      .map_err(|e| unavailable("Failed to replace entity", e))?;
      tx.execute(
        "INSERT INTO entities (partition_name, entity_id, data, stored_at) VALUES (?1, ?2, ?3, ?4)",
        params![partition.as_str(), id, data, stored_at],
      )
      .map_err(|e| unavailable("Failed to store entity", e))?;
    }

    tx.commit()
      .map_err(|e| unavailable("Failed to commit transaction", e))
  }

  fn get_all(&self, partition: Partition) -> Result<Vec<StoredRecord>> {
    let conn = self.lock()?;
    let mut stmt = conn
      .prepare(
        "SELECT entity_id, data, stored_at FROM entities
         WHERE partition_name = ?
         ORDER BY seq",
      )
      .map_err(|e| unavailable("Failed to prepare entity query", e))?;

    let rows = stmt
      .query_map(params![partition.as_str()], |row| {
        Ok((
          row.get::<_, String>(0)?,
          row.get::<_, Vec<u8>>(1)?,
          row.get::<_, String>(2)?,
        ))
      })
      .map_err(|e| unavailable("Failed to query entities", e))?;

    let mut records = Vec::new();
    for row in rows {
      let (id, data, stored_at) = row.map_err(|e| unavailable("Failed to read entity row", e))?;
      let stored_at = match parse_datetime(&stored_at) {
        Ok(stored_at) => stored_at,
        Err(e) => {
          warn!(%partition, id = %id, error = %e, "Skipping entity with bad timestamp");
          continue;
        }
      };
      records.push(StoredRecord { id, data, stored_at });
    }
    Ok(records)
  }

  fn delete(&self, partition: Partition, id: &str) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| unavailable("Failed to begin transaction", e))?;

    tx.execute(
      "DELETE FROM entities WHERE partition_name = ? AND entity_id = ?",
      params![partition.as_str(), id],
    )
    .map_err(|e| unavailable("Failed to delete entity", e))?;

    tx.execute(
      "DELETE FROM sync_attempts WHERE partition_name = ? AND entity_id = ?",
      params![partition.as_str(), id],
    )
    .map_err(|e| unavailable("Failed to delete attempt record", e))?;

    tx.commit()
      .map_err(|e| unavailable("Failed to commit transaction", e))
  }

  fn prune(&self, partition: Partition, older_than: DateTime<Utc>) -> Result<usize> {
    self
      .lock()?
      .execute(
        "DELETE FROM entities WHERE partition_name = ? AND stored_at < ?",
        params![partition.as_str(), format_datetime(older_than)],
      )
      .map_err(|e| unavailable("Failed to prune entities", e))
  }

  fn put_blob(&self, bucket: BlobBucket, key: &str, response: &Response) -> Result<()> {
    self
      .lock()?
      .execute(
        "INSERT OR REPLACE INTO blobs (bucket, blob_key, status, content_type, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?)",
        params![
          bucket.as_str(),
          key,
          response.status,
          response.content_type,
          response.body,
          format_datetime(Utc::now())
        ],
      )
      .map_err(|e| unavailable("Failed to store blob", e))?;
    Ok(())
  }

  fn get_blob(&self, bucket: BlobBucket, key: &str) -> Result<Option<Response>> {
    self
      .lock()?
      .query_row(
        "SELECT status, content_type, body FROM blobs WHERE bucket = ? AND blob_key = ?",
        params![bucket.as_str(), key],
        |row| Ok(Response::new(row.get(0)?, row.get(1)?, row.get(2)?)),
      )
      .optional()
      .map_err(|e| unavailable("Failed to query blob", e))
  }

  fn record_attempt(&self, partition: Partition, id: &str, error: &str) -> Result<AttemptRecord> {
    let mut conn = self.lock()?;
    let tx = conn
      .transaction()
      .map_err(|e| unavailable("Failed to begin transaction", e))?;

    tx.execute(
      "INSERT INTO sync_attempts (partition_name, entity_id, attempts, last_attempt_at, last_error)
       VALUES (?1, ?2, 1, ?3, ?4)
       ON CONFLICT (partition_name, entity_id)
       DO UPDATE SET attempts = attempts + 1,
                     last_attempt_at = excluded.last_attempt_at,
                     last_error = excluded.last_error",
      params![partition.as_str(), id, format_datetime(Utc::now()), error],
    )
    .map_err(|e| unavailable("Failed to record attempt", e))?;

    let record = query_attempt(&tx, partition, id)?
      .ok_or_else(|| SyncError::StorageUnavailable("Attempt record vanished".to_string()))?;

    tx.commit()
      .map_err(|e| unavailable("Failed to commit transaction", e))?;
    Ok(record)
  }

  fn attempt(&self, partition: Partition, id: &str) -> Result<Option<AttemptRecord>> {
    let conn = self.lock()?;
    query_attempt(&conn, partition, id)
  }
}

fn query_attempt(conn: &Connection, partition: Partition, id: &str) -> Result<Option<AttemptRecord>> {
  let row: Option<(u32, String, String)> = conn
    .query_row(
      "SELECT attempts, last_attempt_at, last_error FROM sync_attempts
       WHERE partition_name = ? AND entity_id = ?",
      params![partition.as_str(), id],
      |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .optional()
    .map_err(|e| unavailable("Failed to query attempt record", e))?;

  match row {
    Some((attempts, last_attempt_at, last_error)) => Ok(Some(AttemptRecord {
      attempts,
      last_attempt_at: parse_datetime(&last_attempt_at)?,
      last_error,
    })),
    None => Ok(None),
  }
}

fn unavailable(context: &str, e: impl std::fmt::Display) -> SyncError {
  SyncError::StorageUnavailable(format!("{}: {}", context, e))
}

/// Fixed-width UTC timestamps so text comparison matches time order.
fn format_datetime(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| SyncError::StorageUnavailable(format!("Failed to parse datetime '{}': {}", s, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  fn store() -> SqliteStore {
    SqliteStore::open_in_memory().unwrap()
  }

  #[test]
  fn test_put_then_get_all() {
    let store = store();
    store.put(Partition::CachedReads, "1", b"one").unwrap();
    store.put(Partition::CachedReads, "2", b"two").unwrap();

    let records = store.get_all(Partition::CachedReads).unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert_eq!(records[1].data, b"two".to_vec());
  }

  #[test]
  fn test_overwrite_keeps_single_latest_entry_in_place() {
    let store = store();
    store.put(Partition::PendingWrites, "a", b"v1").unwrap();
    store.put(Partition::PendingWrites, "b", b"v1").unwrap();
    store.put(Partition::PendingWrites, "a", b"v2").unwrap();

    let records = store.get_all(Partition::PendingWrites).unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].id, "a");
    assert_eq!(records[0].data, b"v2".to_vec());
  }

  #[test]
  fn test_put_ordered_follows_latest_batch() {
    let store = store();
    let batch = |ids: &[&str]| -> Vec<(String, Vec<u8>)> {
      ids.iter().map(|id| (id.to_string(), id.as_bytes().to_vec())).collect()
    };
    store.put_ordered(Partition::CachedReads, &batch(&["2", "1"])).unwrap();
    store.put_ordered(Partition::CachedReads, &batch(&["3", "2", "1"])).unwrap();

    let records = store.get_all(Partition::CachedReads).unwrap();
    let ids: Vec<_> = records.iter().map(|r| r.id.as_str()).collect();
    assert_eq!(ids, vec!["3", "2", "1"]);
  }

  #[test]
  fn test_bad_timestamp_row_is_skipped() {
    let store = store();
    store.put(Partition::CachedReads, "1", b"ok").unwrap();
    store.put(Partition::CachedReads, "2", b"bad").unwrap();
    store
      .lock()
      .unwrap()
      .execute("UPDATE entities SET stored_at = 'yesterday' WHERE entity_id = '2'", [])
      .unwrap();

    let records = store.get_all(Partition::CachedReads).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "1");
  }

  #[test]
  fn test_partitions_are_independent() {
    let store = store();
    store.put(Partition::CachedReads, "1", b"read").unwrap();
    store.put(Partition::PendingWrites, "1", b"write").unwrap();

    store.delete(Partition::CachedReads, "1").unwrap();

    assert!(store.get_all(Partition::CachedReads).unwrap().is_empty());
    let pending = store.get_all(Partition::PendingWrites).unwrap();
    assert_eq!(pending[0].data, b"write".to_vec());
  }

  #[test]
  fn test_delete_missing_is_noop() {
    let store = store();
    store.delete(Partition::PendingWrites, "nope").unwrap();
  }

  #[test]
  fn test_prune_removes_old_entries_only() {
    let store = store();
    store.put(Partition::CachedReads, "1", b"x").unwrap();
    assert_eq!(
      store
        .prune(Partition::CachedReads, Utc::now() - Duration::days(1))
        .unwrap(),
      0
    );
    assert_eq!(
      store
        .prune(Partition::CachedReads, Utc::now() + Duration::seconds(1))
        .unwrap(),
      1
    );
  }

  #[test]
  fn test_blob_roundtrip_and_miss() {
    let store = store();
    let response = Response::new(200, Some("image/png".into()), vec![1, 2, 3]);
    store.put_blob(BlobBucket::Images, "k", &response).unwrap();

    assert_eq!(store.get_blob(BlobBucket::Images, "k").unwrap(), Some(response));
    assert_eq!(store.get_blob(BlobBucket::Static, "k").unwrap(), None);
  }

  #[test]
  fn test_attempts_accumulate_and_clear_on_delete() {
    let store = store();
    store.put(Partition::PendingWrites, "p", b"x").unwrap();

    store.record_attempt(Partition::PendingWrites, "p", "timeout").unwrap();
    let record = store
      .record_attempt(Partition::PendingWrites, "p", "status 503")
      .unwrap();
    assert_eq!(record.attempts, 2);
    assert_eq!(record.last_error, "status 503");

    store.delete(Partition::PendingWrites, "p").unwrap();
    assert_eq!(store.attempt(Partition::PendingWrites, "p").unwrap(), None);
  }

  #[test]
  fn test_entities_survive_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("store.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.put(Partition::PendingWrites, "local-1", b"draft").unwrap();
      store.put(Partition::CachedReads, "9", b"tweet").unwrap();
      store.delete(Partition::CachedReads, "9").unwrap();
    }

    let reopened = SqliteStore::open(&path).unwrap();
    let pending = reopened.get_all(Partition::PendingWrites).unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, "local-1");
    assert!(reopened.get_all(Partition::CachedReads).unwrap().is_empty());
  }

  #[test]
  fn test_corrupt_file_is_storage_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.db");
    std::fs::write(&path, b"this is not a sqlite database, just some bytes").unwrap();

    match SqliteStore::open(&path) {
      Err(SyncError::StorageUnavailable(_)) => {}
      Err(other) => panic!("unexpected error: {:?}", other),
      Ok(_) => panic!("corrupt store opened"),
    }
  }

  #[test]
  fn test_noop_store_discards() {
    let store = NoopStore;
    store.put(Partition::CachedReads, "1", b"x").unwrap();
    assert!(store.get_all(Partition::CachedReads).unwrap().is_empty());
    assert_eq!(store.get_blob(BlobBucket::Static, "k").unwrap(), None);
  }
}
