//! Durable local storage for offline support.
//!
//! This module provides the persistence layer shared by the cache manager and
//! the pending-write queue:
//! - Independent entity partitions (`cached_reads`, `pending_writes`)
//! - Response blob buckets for static assets and attachments
//! - Per-entity sync attempt diagnostics
//!
//! `DurableStore` is the object-safe backend trait; `Store` is the cloneable
//! typed handle the rest of the crate is constructed with.

mod handle;
mod storage;
mod traits;

pub use handle::Store;
pub use storage::{DurableStore, NoopStore, SqliteStore};
pub use traits::{AttemptRecord, BlobBucket, Partition, Storable, StoredRecord};
