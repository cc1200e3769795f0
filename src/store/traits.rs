//! Core traits and types for the storage layer.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};

/// Named entity key space. Partitions never share keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
  /// Mirrors remote read entities, replaceable
  CachedReads,
  /// Authoritative until synced
  PendingWrites,
}

impl Partition {
  pub fn as_str(&self) -> &'static str {
    match self {
      Partition::CachedReads => "cached_reads",
      Partition::PendingWrites => "pending_writes",
    }
  }
}

impl fmt::Display for Partition {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Named bucket of cached responses, keyed by locator digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlobBucket {
  /// Static assets, served cache-first
  Static,
  /// Attachments referenced by cached entities
  Images,
}

impl BlobBucket {
  pub fn as_str(&self) -> &'static str {
    match self {
      BlobBucket::Static => "static",
      BlobBucket::Images => "images",
    }
  }
}

/// Trait for entities that can be persisted in a partition.
pub trait Storable: Serialize + DeserializeOwned + Send + Sync {
  /// Unique identifier within the partition
  fn key(&self) -> &str;

  /// Partition the entity type lives in
  fn partition() -> Partition;
}

/// A raw row as returned by a backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredRecord {
  pub id: String,
  pub data: Vec<u8>,
  pub stored_at: DateTime<Utc>,
}

/// Submission diagnostics for one pending entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
  pub attempts: u32,
  pub last_attempt_at: DateTime<Utc>,
  pub last_error: String,
}
