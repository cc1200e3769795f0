//! Request interception for offline support.
//!
//! Every outbound request goes through `Proxy::handle`. The `RouteTable` sorts
//! it into a `RequestKind`, and each kind has its own path through lookup,
//! forward and fallback:
//! - Static assets are served cache-first
//! - Listings are network-first, admitted into the cache, substituted offline
//! - Creates that cannot reach the service are queued for the reconciler
//! - Attachments fall back to the image bucket

mod dispatch;
mod routes;

pub use dispatch::{Intercepted, Proxy, ResponseSource};
pub use routes::{RequestKind, RouteTable};
