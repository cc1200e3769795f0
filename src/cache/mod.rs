//! Cache admission and offline substitutes.
//!
//! This module decides what gets cached and rebuilds responses from the store
//! when the network cannot answer:
//! - Listing responses are split into per-entity `cached_reads` entries
//! - Attachments referenced by cached entities are fetched best-effort
//! - Static assets are pre-cached and served cache-first

mod key;
mod manager;

pub use key::locator_key;
pub use manager::{CacheManager, PrecacheReport};
