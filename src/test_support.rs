//! Scripted transport and store doubles for tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncError;
use crate::http::{Request, Response, Transport};
use crate::store::{AttemptRecord, BlobBucket, DurableStore, Partition, SqliteStore, StoredRecord};

type Handler = Box<dyn Fn(&Request) -> Result<Response, SyncError> + Send + Sync>;

/// Transport that answers through a closure and records every request it sees.
pub struct FakeTransport {
  handler: Handler,
  requests: Mutex<Vec<Request>>,
  delay: Option<Duration>,
  unreachable: AtomicBool,
}

impl FakeTransport {
  pub fn new<F>(handler: F) -> Self
  where
    F: Fn(&Request) -> Result<Response, SyncError> + Send + Sync + 'static,
  {
    Self {
      handler: Box::new(handler),
      requests: Mutex::new(Vec::new()),
      delay: None,
      unreachable: AtomicBool::new(false),
    }
  }

  /// Transport whose every call fails with `NetworkUnreachable`
  pub fn offline() -> Self {
    let transport = Self::new(|_| Ok(Response::new(200, None, vec![])));
    transport.set_reachable(false);
    transport
  }

  /// Sleep before answering, so concurrent callers interleave
  pub fn with_delay(mut self, delay: Duration) -> Self {
    self.delay = Some(delay);
    self
  }

  pub fn set_reachable(&self, reachable: bool) {
    self.unreachable.store(!reachable, Ordering::SeqCst);
  }

  /// Requests that reached the handler (unreachable calls are not recorded)
  pub fn requests(&self) -> Vec<Request> {
    self.requests.lock().map(|r| r.clone()).unwrap_or_default()
  }
}

#[async_trait]
impl Transport for FakeTransport {
  async fn send(&self, request: &Request) -> Result<Response, SyncError> {
    if let Some(delay) = self.delay {
      tokio::time::sleep(delay).await;
    }
    if self.unreachable.load(Ordering::SeqCst) {
      return Err(SyncError::NetworkUnreachable("fake transport offline".to_string()));
    }
    if let Ok(mut requests) = self.requests.lock() {
      requests.push(request.clone());
    }
    (self.handler)(request)
  }
}

/// Store backend whose operations fail with `StorageUnavailable`.
///
/// `broken` fails everything; `failing_deletes` works normally except for
/// `delete`.
pub struct FailingStore {
  inner: SqliteStore,
  fail_all: bool,
}

impl FailingStore {
  pub fn broken() -> Self {
    Self::with_mode(true)
  }

  pub fn failing_deletes() -> Self {
    Self::with_mode(false)
  }

  fn with_mode(fail_all: bool) -> Self {
    Self {
      inner: SqliteStore::open_in_memory().unwrap(),
      fail_all,
    }
  }

  fn check(&self) -> Result<(), SyncError> {
    if self.fail_all {
      return Err(SyncError::StorageUnavailable("disk gone".to_string()));
    }
    Ok(())
  }
}

impl DurableStore for FailingStore {
  fn put(&self, partition: Partition, id: &str, data: &[u8]) -> Result<(), SyncError> {
    self.check()?;
    self.inner.put(partition, id, data)
  }

  fn put_ordered(&self, partition: Partition, entries: &[(String, Vec<u8>)]) -> Result<(), SyncError> {
    self.check()?;
    self.inner.put_ordered(partition, entries)
  }

  fn get_all(&self, partition: Partition) -> Result<Vec<StoredRecord>, SyncError> {
    self.check()?;
    self.inner.get_all(partition)
  }

  fn delete(&self, _partition: Partition, _id: &str) -> Result<(), SyncError> {
    Err(SyncError::StorageUnavailable("disk gone".to_string()))
  }

  fn prune(&self, partition: Partition, older_than: DateTime<Utc>) -> Result<usize, SyncError> {
    self.check()?;
    self.inner.prune(partition, older_than)
  }

  fn put_blob(&self, bucket: BlobBucket, key: &str, response: &Response) -> Result<(), SyncError> {
    self.check()?;
    self.inner.put_blob(bucket, key, response)
  }

  fn get_blob(&self, bucket: BlobBucket, key: &str) -> Result<Option<Response>, SyncError> {
    self.check()?;
    self.inner.get_blob(bucket, key)
  }

  fn record_attempt(&self, partition: Partition, id: &str, error: &str) -> Result<AttemptRecord, SyncError> {
    self.check()?;
    self.inner.record_attempt(partition, id, error)
  }

  fn attempt(&self, partition: Partition, id: &str) -> Result<Option<AttemptRecord>, SyncError> {
    self.check()?;
    self.inner.attempt(partition, id)
  }
}
