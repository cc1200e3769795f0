//! Offline synchronization for a tweet client.
//!
//! Outbound requests go through [`proxy::Proxy`], which serves cached reads and
//! queues writes while the remote service is unreachable. [`sync::Reconciler`]
//! drains the queue once connectivity returns. [`client::OfflineClient`] wires
//! all of it up from a [`config::Config`].

pub mod api;
pub mod cache;
pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod model;
pub mod proxy;
pub mod queue;
pub mod store;
pub mod sync;

#[cfg(test)]
mod test_support;

pub use client::OfflineClient;
pub use error::SyncError;
